// src/tests/controller_tests.rs

use crate::crawler::RunController;
use crate::db::{DedupStore, InsertOutcome, SqliteStore};
use crate::domain::{DedupKey, ListingRecord, RunSummary, StopReason};
use crate::errors::CrawlError;
use crate::normalize::AreaMagnitude;
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use super::fake_browser::{FakeSession, FakeSite};
use super::fixtures::{self, Pager, StepClock};

const HOUR: Duration = Duration::from_secs(3600);

fn temp_db() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crawl.sqlite3");
    (dir, path)
}

fn run_resale(
    site: FakeSite,
    path: &Path,
    budget: Duration,
    start: u32,
    max: u32,
) -> (RunSummary, SessionLogHandle) {
    let session = FakeSession::new(site);
    let log = session.log_handle();
    let store = SqliteStore::open(path).unwrap();
    let plan = fixtures::resale_plan(budget, start, max);
    let summary = RunController::new(plan, session, store).run();
    (summary, log)
}

type SessionLogHandle = Rc<std::cell::RefCell<super::fake_browser::SessionLog>>;

fn stored(path: &Path) -> Vec<ListingRecord> {
    SqliteStore::open(path).unwrap().load_all().unwrap()
}

fn detail_visits(log: &SessionLogHandle) -> Vec<String> {
    log
        .borrow()
        .navigations
        .iter()
        .filter(|url| !url.contains("/resale/search"))
        .cloned()
        .collect()
}

#[test]
fn two_pages_with_a_repeated_listing() {
    let (_dir, path) = temp_db();
    let site = fixtures::resale_site(&[&["a", "b", "c"], &["d", "a", "e"]]);

    let (summary, log) = run_resale(site, &path, HOUR, 1, 10);

    assert_eq!(
        summary,
        RunSummary {
            pages_visited: 2,
            listings_inserted: 5,
            listings_skipped: 1,
            stop_reason: StopReason::NoMorePages,
        }
    );
    assert_eq!(log.borrow().quit_calls, 1);

    let records = stored(&path);
    let urls: Vec<_> = records.iter().map(|r| r.listing_url.as_str()).collect();
    assert_eq!(
        urls,
        ["a", "b", "c", "d", "e"]
            .iter()
            .map(|s| fixtures::detail_url(s))
            .collect::<Vec<_>>()
    );

    let first = &records[0];
    assert_eq!(first.name, "Project a");
    assert_eq!(first.min_price, 1_20_00_000);
    assert_eq!(first.per_sqft_cost, 9_500);
    assert_eq!(first.total_area.magnitude, AreaMagnitude::Value(1260.0));
    assert_eq!(first.photo_url, "https://img.squareyards.com/a.jpg");
    assert_eq!(first.amenities, vec!["Lift", "Power Backup"]);
}

#[test]
fn every_detail_visit_returns_to_its_search_page() {
    let (_dir, path) = temp_db();
    let site = fixtures::resale_site(&[&["a"], &["b"]]);

    let (_, log) = run_resale(site, &path, HOUR, 1, 10);

    assert_eq!(
        log.borrow().navigations,
        vec![
            fixtures::search_url(1),
            fixtures::detail_url("a"),
            fixtures::search_url(1),
            fixtures::detail_url("b"),
            fixtures::search_url(2),
        ]
    );
}

#[test]
fn zero_budget_inserts_nothing() {
    let (_dir, path) = temp_db();
    let site = fixtures::resale_site(&[&["a", "b", "c"]]);

    let (summary, log) = run_resale(site, &path, Duration::ZERO, 1, 10);

    assert_eq!(summary.listings_inserted, 0);
    assert_eq!(summary.stop_reason, StopReason::BudgetExceededPhase2);
    assert!(detail_visits(&log).is_empty());
    assert!(stored(&path).is_empty());
}

#[test]
fn empty_page_stops_without_paginating() {
    let (_dir, path) = temp_db();
    let site = FakeSite::with_search_pages(vec![
        fixtures::resale_page(&[], Pager::Numbered(2)),
        fixtures::resale_page(&["a"], Pager::None),
    ]);

    let (summary, log) = run_resale(site, &path, HOUR, 1, 10);

    assert_eq!(summary.stop_reason, StopReason::EmptyPage);
    assert_eq!(summary.pages_visited, 1);
    assert!(log.borrow().clicks.is_empty());
}

#[test]
fn stored_listings_are_not_fetched_again() {
    let (_dir, path) = temp_db();

    let (first, _) = run_resale(fixtures::resale_site(&[&["a", "b"]]), &path, HOUR, 1, 10);
    assert_eq!(first.listings_inserted, 2);

    let (second, log) = run_resale(fixtures::resale_site(&[&["a", "b"]]), &path, HOUR, 1, 10);
    assert_eq!(second.listings_inserted, 0);
    assert_eq!(second.listings_skipped, 2);
    assert!(detail_visits(&log).is_empty());
    assert_eq!(stored(&path).len(), 2);
}

#[test]
fn listing_with_a_different_canonical_url_is_not_fetched_again() {
    let (_dir, path) = temp_db();
    let canonical = "https://www.squareyards.com/resale/3-bhk-apartment-in-hebbal-a";
    let site = || {
        FakeSite::with_search_pages(vec![fixtures::resale_page(&["a"], Pager::None)]).detail(
            fixtures::detail_url("a"),
            fixtures::resale_detail_with_canonical("a", canonical),
        )
    };

    let (first, _) = run_resale(site(), &path, HOUR, 1, 10);
    assert_eq!(first.listings_inserted, 1);
    let records = stored(&path);
    assert_eq!(records[0].listing_url, canonical);
    assert_eq!(records[0].source_url, Some(fixtures::detail_url("a")));

    let (second, log) = run_resale(site(), &path, HOUR, 1, 10);
    assert_eq!(second.listings_inserted, 0);
    assert_eq!(second.listings_skipped, 1);
    assert!(detail_visits(&log).is_empty());
    assert_eq!(stored(&path).len(), 1);
}

#[test]
fn forward_arrow_is_used_when_no_numbered_control() {
    let (_dir, path) = temp_db();
    let mut site = FakeSite::with_search_pages(vec![
        fixtures::resale_page(&["a"], Pager::ForwardOnly),
        fixtures::resale_page(&["b"], Pager::None),
    ]);
    for slug in ["a", "b"] {
        site = site.detail(fixtures::detail_url(slug), fixtures::resale_detail(slug));
    }

    let (summary, log) = run_resale(site, &path, HOUR, 1, 10);

    assert_eq!(summary.pages_visited, 2);
    assert_eq!(summary.listings_inserted, 2);
    assert!(log
        .borrow()
        .clicks
        .contains(&"li.applyPagination span em.icon-arrow-right".to_string()));
}

#[test]
fn page_limit_is_an_absolute_page_number() {
    let (_dir, path) = temp_db();
    let site = fixtures::resale_site(&[&["a"], &["b"], &["c"]]);

    let (summary, _) = run_resale(site, &path, HOUR, 1, 2);

    assert_eq!(summary.pages_visited, 2);
    assert_eq!(summary.listings_inserted, 2);
    assert_eq!(summary.stop_reason, StopReason::PageLimit);
}

#[test]
fn start_page_is_reached_before_crawling() {
    let (_dir, path) = temp_db();
    let site = fixtures::resale_site(&[&["a"], &["b"], &["c", "d"]]);

    let (summary, _) = run_resale(site, &path, HOUR, 3, 10);

    assert_eq!(summary.pages_visited, 1);
    assert_eq!(summary.listings_inserted, 2);
    let urls: Vec<_> = stored(&path).into_iter().map(|r| r.listing_url).collect();
    assert_eq!(urls, vec![fixtures::detail_url("c"), fixtures::detail_url("d")]);
}

#[test]
fn unreachable_start_page_fails_the_seek() {
    let (_dir, path) = temp_db();
    let site = fixtures::resale_site(&[&["a"]]);

    let (summary, _) = run_resale(site, &path, HOUR, 2, 10);

    assert_eq!(summary.stop_reason, StopReason::NavFailedPhase1);
    assert_eq!(summary.pages_visited, 0);
}

#[test]
fn budget_runs_out_while_seeking() {
    let (_dir, path) = temp_db();
    let site = fixtures::resale_site(&[&["a"], &["b"], &["c"]]);
    let session = FakeSession::new(site);

    let summary = RunController::new(
        fixtures::resale_plan(Duration::from_secs(15), 3, 10),
        session,
        SqliteStore::open(&path).unwrap(),
    )
    .with_clock(StepClock::new(Duration::from_secs(10)))
    .run();

    assert_eq!(summary.stop_reason, StopReason::BudgetExceededPhase1);
    assert_eq!(summary.pages_visited, 0);
}

#[test]
fn budget_runs_out_between_listings() {
    let (_dir, path) = temp_db();
    let site = fixtures::resale_site(&[&["a", "b", "c", "d", "e"]]);

    // start, page check, then one read per listing: a at 20s, b at 30s, c at 40s
    let summary = RunController::new(
        fixtures::resale_plan(Duration::from_secs(35), 1, 10),
        FakeSession::new(site),
        SqliteStore::open(&path).unwrap(),
    )
    .with_clock(StepClock::new(Duration::from_secs(10)))
    .run();

    assert_eq!(summary.stop_reason, StopReason::BudgetExceededPhase2);
    assert_eq!(summary.listings_inserted, 2);
    assert_eq!(summary.pages_visited, 1);
}

#[test]
fn interrupt_stops_at_the_next_checkpoint() {
    let (_dir, path) = temp_db();
    let site = fixtures::resale_site(&[&["a"]]);
    let session = FakeSession::new(site);
    let log = session.log_handle();

    let summary = RunController::new(
        fixtures::resale_plan(HOUR, 1, 10),
        session,
        SqliteStore::open(&path).unwrap(),
    )
    .with_interrupt(Arc::new(AtomicBool::new(true)))
    .run();

    assert_eq!(summary.stop_reason, StopReason::Interrupted);
    assert_eq!(summary.listings_inserted, 0);
    assert_eq!(log.borrow().quit_calls, 1);
}

#[test]
fn failed_detail_page_is_skipped() {
    let (_dir, path) = temp_db();
    let mut site = fixtures::resale_site(&[&["a", "c"]]);
    site.search_pages = vec![fixtures::resale_page(&["a", "missing", "c"], Pager::None)];

    let (summary, _) = run_resale(site, &path, HOUR, 1, 10);

    assert_eq!(summary.listings_inserted, 2);
    assert_eq!(summary.listings_skipped, 1);
    assert_eq!(summary.stop_reason, StopReason::NoMorePages);
}

#[test]
fn card_without_link_is_skipped() {
    let (_dir, path) = temp_db();
    let mut site = fixtures::resale_site(&[&["a"]]);
    site.search_pages = vec![fixtures::resale_page(&["a"], Pager::None).replace(
        "</div><",
        r#"<article class="listing-card"><h2 class="heading">No link</h2></article></div><"#,
    )];

    let (summary, _) = run_resale(site, &path, HOUR, 1, 10);

    assert_eq!(summary.listings_inserted, 1);
    assert_eq!(summary.listings_skipped, 1);
}

#[test]
fn failed_return_navigation_is_fatal() {
    let (_dir, path) = temp_db();
    let mut site = fixtures::resale_site(&[&["a", "b", "c"]]);
    site.fail_return = true;

    let (summary, log) = run_resale(site, &path, HOUR, 1, 10);

    assert_eq!(summary.stop_reason, StopReason::ReturnNavFailed);
    // the listing fetched before the failed return is kept
    assert_eq!(summary.listings_inserted, 1);
    assert_eq!(detail_visits(&log), vec![fixtures::detail_url("a")]);
    assert_eq!(log.borrow().quit_calls, 1);
}

#[test]
fn start_failure_still_releases_the_session() {
    let (_dir, path) = temp_db();
    // no search pages: the first navigation fails
    let session = FakeSession::new(FakeSite::default());
    let log = session.log_handle();

    let summary = RunController::new(
        fixtures::resale_plan(HOUR, 1, 10),
        session,
        SqliteStore::open(&path).unwrap(),
    )
    .run();

    assert_eq!(summary.stop_reason, StopReason::StartFailed);
    assert_eq!(log.borrow().quit_calls, 1);
}

/// Store whose lookups fail, recording whether it was closed.
struct BrokenStore {
    closed: Rc<Cell<u32>>,
}

impl DedupStore for BrokenStore {
    fn exists(&mut self, _key: &DedupKey) -> Result<bool, CrawlError> {
        Err(CrawlError::StoreUnavailable("disk I/O error".into()))
    }

    fn insert(&mut self, _record: &ListingRecord) -> Result<InsertOutcome, CrawlError> {
        Err(CrawlError::StoreUnavailable("disk I/O error".into()))
    }

    fn close(self) -> Result<(), CrawlError> {
        self.closed.set(self.closed.get() + 1);
        Ok(())
    }
}

#[test]
fn store_failure_stops_the_run() {
    let closed = Rc::new(Cell::new(0));
    let session = FakeSession::new(fixtures::resale_site(&[&["a", "b"]]));
    let log = session.log_handle();

    let summary = RunController::new(
        fixtures::resale_plan(HOUR, 1, 10),
        session,
        BrokenStore {
            closed: Rc::clone(&closed),
        },
    )
    .run();

    assert_eq!(summary.stop_reason, StopReason::StoreUnavailable);
    assert_eq!(summary.listings_inserted, 0);
    assert_eq!(closed.get(), 1);
    assert_eq!(log.borrow().quit_calls, 1);
}

#[test]
fn amenities_are_read_from_the_expanded_panel() {
    let (_dir, path) = temp_db();
    let site = FakeSite::with_search_pages(vec![fixtures::projects_page(&["lakeside"])])
        .detail_with_modal(
            fixtures::project_url("lakeside"),
            fixtures::projects_detail("lakeside"),
            fixtures::projects_modal(),
        );
    let session = FakeSession::new(site);
    let log = session.log_handle();

    let summary = RunController::new(
        fixtures::projects_plan(),
        session,
        SqliteStore::open(&path).unwrap(),
    )
    .run();
    assert_eq!(summary.listings_inserted, 1);

    let record = &stored(&path)[0];
    assert_eq!(record.amenities, vec!["Club House", "Jogging Track", "Gymnasium"]);
    assert_eq!(record.name, "Project lakeside");
    assert_eq!(record.min_price, 45_00_000);
    assert_eq!(record.max_price, 1_20_00_000);
    assert_eq!(record.num_units, Some(240));
    assert_eq!(record.total_area.magnitude, AreaMagnitude::Value(217_800.0));

    let clicks = log.borrow().clicks.clone();
    assert_eq!(
        clicks,
        vec![
            "#amenitiesModalBtn".to_string(),
            "#amenitiesModalBox .modal-close.button".to_string(),
        ]
    );
}

#[test]
fn stuck_amenity_panel_falls_back_to_the_visible_list() {
    let (_dir, path) = temp_db();
    let mut site = FakeSite::with_search_pages(vec![fixtures::projects_page(&["lakeside"])])
        .detail_with_modal(
            fixtures::project_url("lakeside"),
            fixtures::projects_detail("lakeside"),
            fixtures::projects_modal(),
        );
    site.stuck_modal = true;

    let summary = RunController::new(
        fixtures::projects_plan(),
        FakeSession::new(site),
        SqliteStore::open(&path).unwrap(),
    )
    .run();

    assert_eq!(summary.listings_inserted, 1);
    assert_eq!(stored(&path)[0].amenities, vec!["Club House"]);
}

#[test]
fn missing_amenities_section_still_stores_the_listing() {
    let (_dir, path) = temp_db();
    let detail = r#"<div class="npProjectHeading"><h1>Project quiet</h1>
                      <span class="npProjectCity">Sarjapur, Bangalore</span></div>
                    <div class="npTotalUnits"><strong>96 Units</strong></div>"#;
    let site = FakeSite::with_search_pages(vec![fixtures::projects_page(&["quiet"])])
        .detail(fixtures::project_url("quiet"), detail);
    let session = FakeSession::new(site);
    let log = session.log_handle();

    let summary = RunController::new(
        fixtures::projects_plan(),
        session,
        SqliteStore::open(&path).unwrap(),
    )
    .run();

    assert_eq!(summary.listings_inserted, 1);
    assert_eq!(summary.listings_skipped, 0);
    let record = &stored(&path)[0];
    assert_eq!(record.name, "Project quiet");
    assert_eq!(record.num_units, Some(96));
    assert!(record.amenities.is_empty());
    assert!(log.borrow().clicks.is_empty());
}
