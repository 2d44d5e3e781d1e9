mod controller;

pub use controller::{CrawlPlan, RunController};
