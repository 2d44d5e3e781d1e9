pub mod connection;
pub mod listings;
pub mod runs;

pub use listings::{export_json, DedupStore, InsertOutcome, SqliteStore};
