// src/domain/run_state.rs

use serde::{Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};

/// Why a crawl run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    StartFailed,
    BudgetExceededPhase1,
    NavFailedPhase1,
    EmptyPage,
    BudgetExceededPhase2,
    NoMorePages,
    PageLimit,
    ReturnNavFailed,
    SessionLost,
    StoreUnavailable,
    Interrupted,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::StartFailed => "start_failed",
            StopReason::BudgetExceededPhase1 => "budget_exceeded_phase1",
            StopReason::NavFailedPhase1 => "nav_failed_phase1",
            StopReason::EmptyPage => "empty_page",
            StopReason::BudgetExceededPhase2 => "budget_exceeded_phase2",
            StopReason::NoMorePages => "no_more_pages",
            StopReason::PageLimit => "page_limit",
            StopReason::ReturnNavFailed => "return_nav_failed",
            StopReason::SessionLost => "session_lost",
            StopReason::StoreUnavailable => "store_unavailable",
            StopReason::Interrupted => "interrupted",
        }
    }

    /// Whether the run ended because something broke rather than running out
    /// of work or time.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            StopReason::StartFailed
                | StopReason::NavFailedPhase1
                | StopReason::ReturnNavFailed
                | StopReason::SessionLost
                | StopReason::StoreUnavailable
        )
    }
}

impl Serialize for StopReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of monotonic time for budget checks.
pub trait Clock {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Counters and budget for one crawl, owned by the run controller.
#[derive(Debug)]
pub struct RunState {
    pub started_at: Instant,
    pub budget: Duration,
    pub current_page: u32,
    pub start_page: u32,
    pub max_pages: u32,
    pub pages_visited: u32,
    pub inserted_count: u32,
    pub skipped_count: u32,
    pub processed_urls: HashSet<String>,
    pub stop_reason: Option<StopReason>,
}

impl RunState {
    pub fn new(started_at: Instant, budget: Duration, start_page: u32, max_pages: u32) -> Self {
        Self {
            started_at,
            budget,
            current_page: 1,
            start_page,
            max_pages,
            pages_visited: 0,
            inserted_count: 0,
            skipped_count: 0,
            processed_urls: HashSet::new(),
            stop_reason: None,
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    /// A zero budget is exhausted before any work starts.
    pub fn budget_exhausted(&self, now: Instant) -> bool {
        self.elapsed(now) >= self.budget
    }

    /// Records the first stop reason; later calls are ignored.
    pub fn stop(&mut self, reason: StopReason) {
        self.stop_reason.get_or_insert(reason);
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            pages_visited: self.pages_visited,
            listings_inserted: self.inserted_count,
            listings_skipped: self.skipped_count,
            stop_reason: self.stop_reason.unwrap_or(StopReason::Interrupted),
        }
    }
}

/// Emitted once when the run ends, whatever the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub pages_visited: u32,
    pub listings_inserted: u32,
    pub listings_skipped: u32,
    pub stop_reason: StopReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_budget_is_exhausted_immediately() {
        let start = Instant::now();
        let state = RunState::new(start, Duration::ZERO, 1, 10);
        assert!(state.budget_exhausted(start));
    }

    #[test]
    fn budget_is_checked_against_elapsed_time() {
        let start = Instant::now();
        let state = RunState::new(start, Duration::from_secs(60), 1, 10);
        assert!(!state.budget_exhausted(start + Duration::from_secs(59)));
        assert!(state.budget_exhausted(start + Duration::from_secs(60)));
    }

    #[test]
    fn first_stop_reason_wins() {
        let mut state = RunState::new(Instant::now(), Duration::from_secs(1), 1, 1);
        state.stop(StopReason::EmptyPage);
        state.stop(StopReason::PageLimit);
        assert_eq!(state.summary().stop_reason, StopReason::EmptyPage);
    }

    #[test]
    fn summary_serializes_with_camel_case_keys() {
        let mut state = RunState::new(Instant::now(), Duration::from_secs(1), 1, 1);
        state.pages_visited = 2;
        state.inserted_count = 5;
        state.stop(StopReason::NoMorePages);

        let json = serde_json::to_value(state.summary()).unwrap();
        assert_eq!(json["pagesVisited"], 2);
        assert_eq!(json["listingsInserted"], 5);
        assert_eq!(json["listingsSkipped"], 0);
        assert_eq!(json["stopReason"], "no_more_pages");
    }
}
