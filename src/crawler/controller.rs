// controller.rs
//
// Drives one crawl from the first search page to a stop reason. The session
// and store are owned here and released exactly once, in `shutdown`.

use crate::browser::{render_lazy_content, wait_for, BrowserSession, Condition};
use crate::config::{CrawlConfig, Timing};
use crate::db::{DedupStore, InsertOutcome};
use crate::domain::{
    Clock, DedupKey, ListingRecord, ListingStub, RawListing, RunState, RunSummary, StopReason,
    SystemClock,
};
use crate::errors::CrawlError;
use crate::scraper::{fetcher_for, DetailFetcher, Layout, ListingExtractor, PageNavigator};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Where the run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Starting,
    SeekingStartPage,
    Crawling,
    Stopping(StopReason),
    Done,
}

/// Everything a run needs that does not hold an external resource. Built
/// before the browser and store are acquired so a bad configuration fails
/// without opening anything.
pub struct CrawlPlan {
    pub layout: Layout,
    pub search_url: String,
    pub card_container: String,
    pub budget: Duration,
    pub start_page: u32,
    pub max_pages: u32,
    pub timing: Timing,
    pub extractor: ListingExtractor,
    pub navigator: PageNavigator,
    pub fetcher: Box<dyn DetailFetcher>,
}

impl CrawlPlan {
    pub fn from_config(config: &CrawlConfig) -> Result<Self, CrawlError> {
        config.validate()?;
        let profile = &config.profile;
        let timing = config.timing;

        Ok(Self {
            layout: profile.layout,
            search_url: config.search_url.clone(),
            card_container: profile.card.container.clone(),
            budget: config.budget,
            start_page: config.start_page,
            max_pages: config.max_pages,
            timing,
            extractor: ListingExtractor::new(&profile.card, &profile.site_base)?,
            navigator: PageNavigator::new(
                profile.pagination.clone(),
                timing.wait,
                timing.settle,
                timing.post_click,
            ),
            fetcher: fetcher_for(config.strategy, profile, &timing)?,
        })
    }
}

pub struct RunController<B: BrowserSession, S: DedupStore> {
    plan: CrawlPlan,
    session: B,
    store: S,
    clock: Box<dyn Clock>,
    interrupt: Arc<AtomicBool>,
    state: RunState,
}

impl<B: BrowserSession, S: DedupStore> RunController<B, S> {
    pub fn new(plan: CrawlPlan, session: B, store: S) -> Self {
        let clock: Box<dyn Clock> = Box::new(SystemClock);
        let state = RunState::new(clock.now(), plan.budget, plan.start_page, plan.max_pages);
        Self {
            plan,
            session,
            store,
            clock,
            interrupt: Arc::new(AtomicBool::new(false)),
            state,
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Flag checked at every budget checkpoint; setting it stops the run.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = flag;
        self
    }

    pub fn run(mut self) -> RunSummary {
        let mut phase = Phase::Starting;
        loop {
            debug!(?phase, page = self.state.current_page, "run phase");
            phase = match phase {
                Phase::Starting => self.start(),
                Phase::SeekingStartPage => self.seek_start_page(),
                Phase::Crawling => self.crawl_page(),
                Phase::Stopping(reason) => {
                    self.state.stop(reason);
                    Phase::Done
                }
                Phase::Done => break,
            };
        }
        self.shutdown()
    }

    fn start(&mut self) -> Phase {
        self.state.started_at = self.clock.now();

        if let Err(e) = self
            .store
            .start_run(self.plan.layout.as_str(), &self.plan.search_url)
        {
            error!("Could not record crawl run: {e}");
            return Phase::Stopping(StopReason::StoreUnavailable);
        }

        info!(url = %self.plan.search_url, "Opening search results");
        if let Err(e) = self.session.navigate(&self.plan.search_url) {
            error!(url = %self.plan.search_url, "Could not open search results: {e}");
            return Phase::Stopping(StopReason::StartFailed);
        }
        self.session.pause(self.plan.timing.settle);

        if self.state.current_page < self.state.start_page {
            Phase::SeekingStartPage
        } else {
            Phase::Crawling
        }
    }

    fn seek_start_page(&mut self) -> Phase {
        while self.state.current_page < self.state.start_page {
            if let Err(reason) = self.checkpoint(StopReason::BudgetExceededPhase1) {
                return Phase::Stopping(reason);
            }

            let target = self.state.current_page + 1;
            match self.plan.navigator.next(&mut self.session, target) {
                Ok(page) => self.state.current_page = page,
                Err(e) => {
                    error!(page = target, reason = e.kind(), "Could not reach start page: {e}");
                    return Phase::Stopping(StopReason::NavFailedPhase1);
                }
            }
        }

        info!(page = self.state.current_page, "Reached start page");
        Phase::Crawling
    }

    fn crawl_page(&mut self) -> Phase {
        let elapsed = match self.checkpoint(StopReason::BudgetExceededPhase2) {
            Ok(elapsed) => elapsed,
            Err(reason) => return Phase::Stopping(reason),
        };
        let page = self.state.current_page;

        let timing = self.plan.timing;
        if let Err(e) = render_lazy_content(
            &mut self.session,
            timing.scroll_step,
            timing.scroll_rounds,
            timing.settle,
        ) {
            warn!(page, "Scrolling for lazy content failed: {e}");
        }

        let page_state = self
            .session
            .current_url()
            .and_then(|url| Ok((url, self.session.page_source()?)));
        let (search_page_url, markup) = match page_state {
            Ok(state) => state,
            Err(e) => {
                error!(page, "Lost the browser session: {e}");
                return Phase::Stopping(StopReason::SessionLost);
            }
        };
        self.state.pages_visited += 1;

        let stubs = self.plan.extractor.parse(&markup);
        info!(
            page,
            listings = stubs.len(),
            "Processing page {page} ({}m {}s elapsed)",
            elapsed.as_secs() / 60,
            elapsed.as_secs() % 60
        );

        if stubs.is_empty() {
            warn!(page, "No listings on page, stopping");
            return Phase::Stopping(StopReason::EmptyPage);
        }

        for stub in &stubs {
            if let Err(reason) = self.checkpoint(StopReason::BudgetExceededPhase2) {
                return Phase::Stopping(reason);
            }
            if let Err(reason) = self.process_stub(stub, &search_page_url) {
                return Phase::Stopping(reason);
            }
        }

        let next = page + 1;
        if next > self.state.max_pages {
            info!(page, max_pages = self.state.max_pages, "Page limit reached");
            return Phase::Stopping(StopReason::PageLimit);
        }

        match self.plan.navigator.next(&mut self.session, next) {
            Ok(page) => {
                self.state.current_page = page;
                Phase::Crawling
            }
            Err(e) => {
                info!(page, reason = e.kind(), "No further pages: {e}");
                Phase::Stopping(StopReason::NoMorePages)
            }
        }
    }

    /// Dedup, enrich and store one listing. Only fatal conditions come back
    /// as an error; everything else is a logged skip.
    fn process_stub(
        &mut self,
        stub: &ListingStub,
        search_page_url: &str,
    ) -> Result<(), StopReason> {
        let Some(key) = DedupKey::for_stub(stub) else {
            self.skip(stub, "missing_url");
            return Ok(());
        };
        if self.state.processed_urls.contains(&stub.url) {
            self.skip(stub, "already_processed");
            return Ok(());
        }

        match self.store.exists(&key) {
            Ok(true) => {
                self.state.processed_urls.insert(stub.url.clone());
                self.skip(stub, "already_stored");
                return Ok(());
            }
            Ok(false) => {}
            Err(e) => {
                error!(url = %stub.url, "Dedup lookup failed: {e}");
                return Err(StopReason::StoreUnavailable);
            }
        }
        self.state.processed_urls.insert(stub.url.clone());

        let fetched = self.plan.fetcher.fetch(&mut self.session, &stub.url);
        let stored = match fetched {
            Ok(raw) => self.store_listing(raw, stub),
            Err(e) => {
                self.skip(stub, e.kind());
                debug!(url = %stub.url, "Detail fetch failed: {e}");
                Ok(())
            }
        };
        stored?;

        if self.plan.fetcher.uses_session() {
            self.return_to(search_page_url)?;
        }
        Ok(())
    }

    fn store_listing(&mut self, raw: RawListing, stub: &ListingStub) -> Result<(), StopReason> {
        let record = ListingRecord::from_raw(raw, stub, Utc::now().timestamp());

        match self.store.insert(&record) {
            Ok(InsertOutcome::Inserted) => {
                self.state.inserted_count += 1;
                info!(
                    url = %record.listing_url,
                    name = %record.name,
                    min_price = record.min_price,
                    "Inserted listing"
                );
                Ok(())
            }
            Ok(InsertOutcome::Duplicate) => {
                self.skip(stub, "duplicate");
                Ok(())
            }
            Err(e) => {
                error!(url = %record.listing_url, "Insert failed: {e}");
                Err(StopReason::StoreUnavailable)
            }
        }
    }

    fn return_to(&mut self, search_page_url: &str) -> Result<(), StopReason> {
        let wait = self.plan.timing.wait;
        let back = self.session.navigate(search_page_url).and_then(|_| {
            wait_for(
                &mut self.session,
                &self.plan.card_container,
                Condition::Present,
                &wait,
            )
        });

        if let Err(e) = back {
            let err = CrawlError::ReturnNavigation {
                url: search_page_url.to_string(),
                reason: e.to_string(),
            };
            error!("{err}");
            return Err(StopReason::ReturnNavFailed);
        }
        Ok(())
    }

    fn skip(&mut self, stub: &ListingStub, reason: &str) {
        self.state.skipped_count += 1;
        warn!(url = %stub.url, name = %stub.name, reason, "Skipped listing");
    }

    /// Returns the elapsed time, or the reason to stop when interrupted or
    /// out of budget.
    fn checkpoint(&mut self, budget_reason: StopReason) -> Result<Duration, StopReason> {
        if self.interrupt.load(Ordering::SeqCst) {
            warn!("Interrupted, stopping");
            return Err(StopReason::Interrupted);
        }

        let now = self.clock.now();
        let elapsed = self.state.elapsed(now);
        if self.state.budget_exhausted(now) {
            info!(
                elapsed_secs = elapsed.as_secs(),
                budget_secs = self.state.budget.as_secs(),
                "Time budget exhausted"
            );
            return Err(budget_reason);
        }
        Ok(elapsed)
    }

    fn shutdown(self) -> RunSummary {
        let summary = self.state.summary();
        let RunController {
            mut session,
            mut store,
            ..
        } = self;

        if let Err(e) = store.finish_run(&summary) {
            warn!("Could not close crawl run record: {e}");
        }
        if let Err(e) = session.quit() {
            warn!("Browser did not shut down cleanly: {e}");
        }
        if let Err(e) = store.close() {
            warn!("Store did not close cleanly: {e}");
        }

        if summary.stop_reason.is_failure() {
            error!(
                pages = summary.pages_visited,
                inserted = summary.listings_inserted,
                skipped = summary.listings_skipped,
                reason = %summary.stop_reason,
                "Crawl stopped"
            );
        } else {
            info!(
                pages = summary.pages_visited,
                inserted = summary.listings_inserted,
                skipped = summary.listings_skipped,
                reason = %summary.stop_reason,
                "Crawl finished"
            );
        }
        summary
    }
}
