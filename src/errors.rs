// errors.rs
use std::time::Duration;
use thiserror::Error;

/// Errors raised while crawling. The controller matches on the variant to
/// decide between skip-and-continue and stopping the run.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Parse error: {0}")]
    TransientParse(String),

    #[error("Timed out after {waited:?} waiting for `{selector}` to be {condition}")]
    NavigationTimeout {
        selector: String,
        condition: &'static str,
        waited: Duration,
    },

    #[error("No pagination control found for page {page}")]
    NoMoreResults { page: u32 },

    #[error("Could not return to search results at {url}: {reason}")]
    ReturnNavigation { url: String, reason: String },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CrawlError {
    /// Short machine-readable label used as the `reason` field in skip logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CrawlError::TransientParse(_) => "parse_error",
            CrawlError::NavigationTimeout { .. } => "timeout",
            CrawlError::NoMoreResults { .. } => "no_more_results",
            CrawlError::ReturnNavigation { .. } => "return_navigation",
            CrawlError::StoreUnavailable(_) => "store_unavailable",
            CrawlError::Browser(_) => "browser_error",
            CrawlError::Http(_) => "http_error",
            CrawlError::Config(_) => "config_error",
            CrawlError::Io(_) => "io_error",
        }
    }
}

impl From<rusqlite::Error> for CrawlError {
    fn from(e: rusqlite::Error) -> Self {
        CrawlError::StoreUnavailable(e.to_string())
    }
}

impl From<reqwest::Error> for CrawlError {
    fn from(e: reqwest::Error) -> Self {
        CrawlError::Http(e.to_string())
    }
}

impl From<chromiumoxide::error::CdpError> for CrawlError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        CrawlError::Browser(e.to_string())
    }
}
