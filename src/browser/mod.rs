//! Browser automation seam.
//!
//! The crawler only needs a handful of primitives from a live browser. They
//! are collected in [`BrowserSession`] so the run controller can be driven by
//! a real Chromium tab or by a scripted one in tests.

mod chrome;

pub use chrome::{ChromeSession, LaunchOptions};

use crate::errors::CrawlError;
use std::time::Duration;
use tracing::debug;

/// Sent by both the browser and the plain HTTP fetcher.
pub const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0 Safari/537.36";

pub trait BrowserSession {
    /// Loads `url` in the current tab and blocks until the page load completes.
    fn navigate(&mut self, url: &str) -> Result<(), CrawlError>;

    fn current_url(&mut self) -> Result<String, CrawlError>;

    /// Rendered markup of the current page.
    fn page_source(&mut self) -> Result<String, CrawlError>;

    fn is_present(&mut self, css: &str) -> Result<bool, CrawlError>;

    /// True when the first element matching `css` exists and is rendered.
    fn is_displayed(&mut self, css: &str) -> Result<bool, CrawlError>;

    /// Clicks the first element matching `css` via script, which also works
    /// for controls covered by sticky headers.
    fn click(&mut self, css: &str) -> Result<(), CrawlError>;

    fn scroll_to_bottom(&mut self) -> Result<(), CrawlError>;

    fn scroll_by(&mut self, pixels: i64) -> Result<(), CrawlError>;

    fn document_height(&mut self) -> Result<i64, CrawlError>;

    fn pause(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }

    /// Ends the browser session. Called once when the run ends.
    fn quit(&mut self) -> Result<(), CrawlError>;
}

/// Bounds for every element wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl WaitPolicy {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    fn max_polls(&self) -> u32 {
        let poll_ms = self.poll_interval.as_millis().max(1);
        let polls = self.timeout.as_millis() / poll_ms;
        u32::try_from(polls).unwrap_or(u32::MAX).max(1)
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_millis(250))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Present,
    Visible,
    Clickable,
}

impl Condition {
    fn label(&self) -> &'static str {
        match self {
            Condition::Present => "present",
            Condition::Visible => "visible",
            Condition::Clickable => "clickable",
        }
    }
}

/// Polls until `css` satisfies `condition`, giving up after the policy's
/// timeout with [`CrawlError::NavigationTimeout`].
pub fn wait_for(
    session: &mut dyn BrowserSession,
    css: &str,
    condition: Condition,
    policy: &WaitPolicy,
) -> Result<(), CrawlError> {
    let polls = policy.max_polls();
    for attempt in 0..=polls {
        let satisfied = match condition {
            Condition::Present => session.is_present(css)?,
            Condition::Visible | Condition::Clickable => session.is_displayed(css)?,
        };
        if satisfied {
            debug!(selector = css, condition = condition.label(), attempt, "wait satisfied");
            return Ok(());
        }
        if attempt < polls {
            session.pause(policy.poll_interval);
        }
    }

    Err(CrawlError::NavigationTimeout {
        selector: css.to_string(),
        condition: condition.label(),
        waited: policy.timeout,
    })
}

/// Scrolls in steps until the document stops growing, so lazily rendered
/// cards are in the markup before it is read.
pub fn render_lazy_content(
    session: &mut dyn BrowserSession,
    step: i64,
    rounds: u32,
    settle: Duration,
) -> Result<(), CrawlError> {
    let mut last_height = session.document_height()?;
    for _ in 0..rounds {
        session.scroll_by(step)?;
        session.pause(settle);
        let height = session.document_height()?;
        if height == last_height {
            break;
        }
        last_height = height;
    }
    Ok(())
}
