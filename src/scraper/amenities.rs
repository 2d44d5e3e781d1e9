// amenities.rs
//
// Amenities come in three shapes: a flat list already on the page, a short
// list with the full set behind a "More Amenities" modal, or nothing at all.
// None of them is allowed to fail the detail fetch.

use crate::browser::{wait_for, BrowserSession, Condition, WaitPolicy};
use crate::errors::CrawlError;
use crate::scraper::layouts::AmenitySelectors;
use crate::scraper::select::{compile, element_text};
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, warn};

/// Where the expandable amenity panel is in its open/close cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmenityPhase {
    Collapsed,
    Expanding,
    Expanded,
    Closing,
}

pub struct AmenityReader {
    selectors: AmenitySelectors,
    items: Selector,
    expanded_items: Option<Selector>,
    wait: WaitPolicy,
    settle: Duration,
}

impl AmenityReader {
    pub fn new(
        selectors: &AmenitySelectors,
        wait: WaitPolicy,
        settle: Duration,
    ) -> Result<Self, CrawlError> {
        Ok(Self {
            items: compile(&selectors.items)?,
            expanded_items: selectors.expanded_items.as_deref().map(compile).transpose()?,
            selectors: selectors.clone(),
            wait,
            settle,
        })
    }

    pub fn parse_flat(&self, markup: &str) -> Vec<String> {
        self.collect(markup, &self.items)
    }

    pub fn parse_expanded(&self, markup: &str) -> Vec<String> {
        match &self.expanded_items {
            Some(selector) => self.collect(markup, selector),
            None => Vec::new(),
        }
    }

    /// Reads amenities from markup that was fetched without a browser. A
    /// modal that the server rendered into the page is used when present.
    pub fn from_markup(&self, markup: &str) -> Vec<String> {
        let expanded = self.parse_expanded(markup);
        if expanded.is_empty() {
            self.parse_flat(markup)
        } else {
            expanded
        }
    }

    /// Reads amenities from the live page, opening and closing the modal when
    /// the layout has one. Timeouts degrade to whatever was already visible.
    pub fn read(&self, session: &mut dyn BrowserSession, url: &str) -> Vec<String> {
        if let Some(section) = &self.selectors.section {
            if let Err(e) = wait_for(session, section, Condition::Present, &self.wait) {
                warn!(url, reason = e.kind(), "Amenities section unavailable, recording none");
                return Vec::new();
            }
        }

        let markup = match session.page_source() {
            Ok(markup) => markup,
            Err(e) => {
                warn!(url, "Could not read page for amenities: {e}");
                return Vec::new();
            }
        };
        let flat = self.parse_flat(&markup);

        let (Some(expand), Some(container)) = (&self.selectors.expand, &self.selectors.container)
        else {
            return flat;
        };

        match session.is_present(expand) {
            Ok(true) => {}
            Ok(false) => {
                debug!(url, "No expand control, using visible amenities");
                return flat;
            }
            Err(e) => {
                warn!(url, "Could not look for expand control: {e}");
                return flat;
            }
        }

        self.expand_and_read(session, url, expand, container)
            .unwrap_or(flat)
    }

    fn expand_and_read(
        &self,
        session: &mut dyn BrowserSession,
        url: &str,
        expand: &str,
        container: &str,
    ) -> Option<Vec<String>> {
        let mut phase = AmenityPhase::Collapsed;
        let mut expanded: Option<Vec<String>> = None;

        loop {
            debug!(url, ?phase, "amenity panel");
            phase = match phase {
                AmenityPhase::Collapsed => {
                    let opened = wait_for(session, expand, Condition::Clickable, &self.wait)
                        .and_then(|_| session.click(expand));
                    if let Err(e) = opened {
                        warn!(url, reason = e.kind(), "Could not open amenities panel: {e}");
                        return None;
                    }
                    session.pause(self.settle);
                    AmenityPhase::Expanding
                }
                AmenityPhase::Expanding => {
                    match wait_for(session, container, Condition::Visible, &self.wait) {
                        Ok(()) => AmenityPhase::Expanded,
                        Err(e) => {
                            warn!(url, reason = e.kind(), "Amenities panel never became visible");
                            AmenityPhase::Closing
                        }
                    }
                }
                AmenityPhase::Expanded => {
                    match session.page_source() {
                        Ok(markup) => expanded = Some(self.parse_expanded(&markup)),
                        Err(e) => warn!(url, "Could not read expanded amenities: {e}"),
                    }
                    AmenityPhase::Closing
                }
                AmenityPhase::Closing => {
                    self.close(session, url);
                    return expanded.filter(|items| !items.is_empty());
                }
            };
        }
    }

    fn close(&self, session: &mut dyn BrowserSession, url: &str) {
        let Some(close) = &self.selectors.close else {
            return;
        };
        let closed = session.is_present(close).and_then(|present| {
            if present {
                session.click(close)
            } else {
                Ok(())
            }
        });
        match closed {
            Ok(()) => session.pause(self.settle),
            Err(e) => warn!(url, "Could not close amenities panel: {e}"),
        }
    }

    fn collect(&self, markup: &str, selector: &Selector) -> Vec<String> {
        let document = Html::parse_document(markup);
        document
            .select(selector)
            .map(element_text)
            .filter(|text| !text.is_empty())
            .filter(|text| match &self.selectors.exclude_text {
                Some(exclude) => !text.contains(exclude.as_str()),
                None => true,
            })
            .collect()
    }
}
