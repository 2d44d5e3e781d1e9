// listing_extractor.rs
use crate::domain::{CardHints, ListingStub, NOT_AVAILABLE, UNKNOWN_URL};
use crate::errors::CrawlError;
use crate::scraper::layouts::CardSelectors;
use crate::scraper::select::{compile, CompiledField};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, error};
use url::Url;

/// Turns a search-results page into listing stubs, in page order.
pub struct ListingExtractor {
    container: Selector,
    heading: Selector,
    link: Selector,
    name: CompiledField,
    location: Option<CompiledField>,
    price: Option<CompiledField>,
    photo: Option<CompiledField>,
    base: Url,
}

impl ListingExtractor {
    pub fn new(cards: &CardSelectors, site_base: &str) -> Result<Self, CrawlError> {
        let base = Url::parse(site_base)
            .map_err(|e| CrawlError::Config(format!("invalid site base `{site_base}`: {e}")))?;

        Ok(Self {
            container: compile(&cards.container)?,
            heading: compile(&cards.heading)?,
            link: compile(&cards.link)?,
            name: CompiledField::new(&cards.name)?,
            location: CompiledField::optional(cards.location.as_ref())?,
            price: CompiledField::optional(cards.price.as_ref())?,
            photo: CompiledField::optional(cards.photo.as_ref())?,
            base,
        })
    }

    /// Malformed cards are logged and left out; they never fail the page.
    pub fn parse(&self, markup: &str) -> Vec<ListingStub> {
        let document = Html::parse_document(markup);
        let mut stubs = Vec::new();

        for (index, card) in document.select(&self.container).enumerate() {
            match self.parse_card(card) {
                Ok(stub) => stubs.push(stub),
                Err(e) => error!(card = index, "Skipping listing card: {e}"),
            }
        }

        debug!("Parsed {} listing cards", stubs.len());
        stubs
    }

    fn parse_card(&self, card: ElementRef<'_>) -> Result<ListingStub, CrawlError> {
        let heading = card
            .select(&self.heading)
            .next()
            .ok_or_else(|| CrawlError::TransientParse("card has no heading element".into()))?;

        let url = heading
            .select(&self.link)
            .next()
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| resolve_url(&self.base, href))
            .unwrap_or_else(|| UNKNOWN_URL.to_string());

        let name = self
            .name
            .extract(card)
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());

        let pick = |field: &Option<CompiledField>| field.as_ref().and_then(|f| f.extract(card));
        let hints = CardHints {
            location: pick(&self.location),
            price: pick(&self.price),
            photo_url: pick(&self.photo).and_then(|src| resolve_url(&self.base, &src)),
        };

        Ok(ListingStub { url, name, hints })
    }
}

/// Resolves relative and protocol-relative links against the site. Links
/// that do not lead to an http(s) page resolve to nothing.
pub fn resolve_url(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href == NOT_AVAILABLE {
        return None;
    }
    let resolved = base.join(href).ok()?;
    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}
