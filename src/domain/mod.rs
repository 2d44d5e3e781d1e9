pub mod listing;
pub mod run_state;

pub use listing::{
    CardHints, DedupKey, ListingRecord, ListingStub, RawListing, NOT_AVAILABLE, UNKNOWN_URL,
};
pub use run_state::{Clock, RunState, RunSummary, StopReason, SystemClock};
