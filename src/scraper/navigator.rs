// navigator.rs
use crate::browser::{wait_for, BrowserSession, Condition, WaitPolicy};
use crate::errors::CrawlError;
use crate::scraper::layouts::PaginationSelectors;
use std::time::Duration;
use tracing::{debug, info};

/// Advances the search results one page at a time.
pub struct PageNavigator {
    selectors: PaginationSelectors,
    wait: WaitPolicy,
    settle: Duration,
    post_click: Duration,
}

impl PageNavigator {
    pub fn new(
        selectors: PaginationSelectors,
        wait: WaitPolicy,
        settle: Duration,
        post_click: Duration,
    ) -> Self {
        Self {
            selectors,
            wait,
            settle,
            post_click,
        }
    }

    /// Moves the session to `target` and returns it as the new current page.
    ///
    /// The numbered control for `target` is preferred; the forward arrow is
    /// used when the numbered one is not rendered. Every call clicks
    /// something, so calling it twice moves two pages.
    pub fn next(&self, session: &mut dyn BrowserSession, target: u32) -> Result<u32, CrawlError> {
        // pagination is only rendered once the bottom of the page is reached
        session.scroll_to_bottom()?;
        session.pause(self.settle);

        let numbered = self.selectors.numbered_for(target);
        if session.is_present(&numbered)? {
            wait_for(session, &numbered, Condition::Clickable, &self.wait)?;
            session.click(&numbered)?;
            debug!(page = target, "Clicked numbered pagination");
        } else if session.is_present(&self.selectors.forward)? {
            session.click(&self.selectors.forward)?;
            debug!(page = target, "Clicked forward arrow");
        } else {
            return Err(CrawlError::NoMoreResults { page: target });
        }

        session.pause(self.post_click);
        info!(page = target, "Moved to page {target}");
        Ok(target)
    }
}
