// detail.rs
use crate::browser::{wait_for, BrowserSession, Condition, WaitPolicy, USER_AGENT};
use crate::config::Timing;
use crate::domain::{RawListing, NOT_AVAILABLE};
use crate::errors::CrawlError;
use crate::scraper::amenities::AmenityReader;
use crate::scraper::layouts::{DetailSelectors, LayoutProfile};
use crate::scraper::listing_extractor::resolve_url;
use crate::scraper::select::CompiledField;
use clap::ValueEnum;
use rand::Rng;
use reqwest::blocking::Client;
use scraper::Html;
use std::time::Duration;
use tracing::debug;
use url::Url;

const JITTER_MAX_MS: u64 = 750;

/// Reads the detail fields of one listing page.
pub struct DetailParser {
    name: CompiledField,
    location: CompiledField,
    price: CompiledField,
    per_sqft: Option<CompiledField>,
    units: Option<CompiledField>,
    area: Option<CompiledField>,
    photo: CompiledField,
    canonical: CompiledField,
    latitude: Option<CompiledField>,
    longitude: Option<CompiledField>,
    base: Url,
}

impl DetailParser {
    pub fn new(selectors: &DetailSelectors, site_base: &str) -> Result<Self, CrawlError> {
        let base = Url::parse(site_base)
            .map_err(|e| CrawlError::Config(format!("invalid site base `{site_base}`: {e}")))?;

        Ok(Self {
            name: CompiledField::new(&selectors.name)?,
            location: CompiledField::new(&selectors.location)?,
            price: CompiledField::new(&selectors.price)?,
            per_sqft: CompiledField::optional(selectors.per_sqft.as_ref())?,
            units: CompiledField::optional(selectors.units.as_ref())?,
            area: CompiledField::optional(selectors.area.as_ref())?,
            photo: CompiledField::new(&selectors.photo)?,
            canonical: CompiledField::new(&selectors.canonical)?,
            latitude: CompiledField::optional(selectors.latitude.as_ref())?,
            longitude: CompiledField::optional(selectors.longitude.as_ref())?,
            base,
        })
    }

    /// Missing fields come back as "N/A"; amenities are read separately.
    pub fn parse(&self, markup: &str) -> RawListing {
        let document = Html::parse_document(markup);
        let root = document.root_element();

        let text = |field: &CompiledField| {
            field
                .extract(root)
                .unwrap_or_else(|| NOT_AVAILABLE.to_string())
        };
        let optional_text = |field: &Option<CompiledField>| match field {
            Some(f) => text(f),
            None => NOT_AVAILABLE.to_string(),
        };
        let optional = |field: &Option<CompiledField>| field.as_ref().and_then(|f| f.extract(root));

        RawListing {
            name: text(&self.name),
            location: text(&self.location),
            price: text(&self.price),
            per_sqft: optional_text(&self.per_sqft),
            units: optional_text(&self.units),
            area: optional_text(&self.area),
            photo_url: self
                .photo
                .extract(root)
                .and_then(|src| resolve_url(&self.base, &src))
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            canonical_url: self
                .canonical
                .extract(root)
                .and_then(|href| resolve_url(&self.base, &href)),
            amenities: Vec::new(),
            latitude: optional(&self.latitude),
            longitude: optional(&self.longitude),
        }
    }
}

/// How a listing's detail page is retrieved.
pub trait DetailFetcher {
    fn fetch(
        &mut self,
        session: &mut dyn BrowserSession,
        url: &str,
    ) -> Result<RawListing, CrawlError>;

    /// Whether fetching moves the shared browser away from the search page,
    /// so the caller has to navigate back afterwards.
    fn uses_session(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FetchStrategy {
    /// Open the detail page in the browser; needed for client-rendered pages
    /// and the amenities modal.
    Interactive,
    /// Plain HTTP GET; cheaper, for pages that arrive fully rendered.
    Direct,
}

pub fn fetcher_for(
    strategy: FetchStrategy,
    profile: &LayoutProfile,
    timing: &Timing,
) -> Result<Box<dyn DetailFetcher>, CrawlError> {
    let parser = DetailParser::new(&profile.detail, &profile.site_base)?;
    let amenities = AmenityReader::new(&profile.amenities, timing.wait, timing.settle)?;

    Ok(match strategy {
        FetchStrategy::Interactive => Box::new(InteractiveFetcher {
            parser,
            amenities,
            ready: profile.detail.ready.clone(),
            wait: timing.wait,
            settle: timing.detail_settle,
        }),
        FetchStrategy::Direct => Box::new(DirectFetcher::new(
            parser,
            amenities,
            timing.wait.timeout,
        )?),
    })
}

pub struct InteractiveFetcher {
    parser: DetailParser,
    amenities: AmenityReader,
    ready: String,
    wait: WaitPolicy,
    settle: Duration,
}

impl DetailFetcher for InteractiveFetcher {
    fn fetch(
        &mut self,
        session: &mut dyn BrowserSession,
        url: &str,
    ) -> Result<RawListing, CrawlError> {
        session.navigate(url)?;
        wait_for(session, &self.ready, Condition::Present, &self.wait)?;
        session.pause(jittered(self.settle));

        let markup = session.page_source()?;
        let mut raw = self.parser.parse(&markup);
        raw.amenities = self.amenities.read(session, url);

        debug!(url, amenities = raw.amenities.len(), "Detail page read");
        Ok(raw)
    }

    fn uses_session(&self) -> bool {
        true
    }
}

pub struct DirectFetcher {
    client: Client,
    parser: DetailParser,
    amenities: AmenityReader,
}

impl DirectFetcher {
    pub fn new(
        parser: DetailParser,
        amenities: AmenityReader,
        timeout: Duration,
    ) -> Result<Self, CrawlError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| CrawlError::Http(e.to_string()))?;

        Ok(Self {
            client,
            parser,
            amenities,
        })
    }
}

impl DetailFetcher for DirectFetcher {
    fn fetch(
        &mut self,
        _session: &mut dyn BrowserSession,
        url: &str,
    ) -> Result<RawListing, CrawlError> {
        let resp = self.client.get(url).send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CrawlError::Http(format!("GET {url} returned {status}")));
        }
        let markup = resp.text()?;

        let mut raw = self.parser.parse(&markup);
        raw.amenities = self.amenities.from_markup(&markup);
        Ok(raw)
    }

    fn uses_session(&self) -> bool {
        false
    }
}

/// Adds a little randomness to fixed waits so visits are not perfectly
/// periodic.
fn jittered(base: Duration) -> Duration {
    if base.is_zero() {
        return base;
    }
    base + Duration::from_millis(rand::thread_rng().gen_range(0..=JITTER_MAX_MS))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESALE_DETAIL: &str = r#"
        <html><head>
          <link rel="canonical" href="https://www.squareyards.com/resale/3-bhk-in-hebbal-101">
        </head><body>
          <div class="dProjectName"> Brigade Orchards </div>
          <input id="hd_subLocalityName" value="Hebbal ">
          <input id="hd_latitude" value="13.0358">
          <input id="hd_longitude" value="77.5970">
          <div class="dProjectPrice"><strong>₹1.2 Cr</strong><span class="dPerSqft">₹ 9,500 per sq. ft</span></div>
          <div class="dProjectArea"><strong>1,260 Sq. Ft</strong></div>
          <div class="dPslider"><img src="//img.squareyards.com/101.jpg"></div>
          <div class="npAmenitiesTableBox"><table class="npAmenitiesTable">
            <tr><td><span>Lift</span></td></tr>
          </table></div>
        </body></html>
    "#;

    fn resale_parser() -> DetailParser {
        let profile = LayoutProfile::resale();
        DetailParser::new(&profile.detail, &profile.site_base).unwrap()
    }

    #[test]
    fn parses_resale_detail_page() {
        let raw = resale_parser().parse(RESALE_DETAIL);

        assert_eq!(raw.name, "Brigade Orchards");
        assert_eq!(raw.location, "Hebbal");
        assert_eq!(raw.price, "₹1.2 Cr");
        assert_eq!(raw.per_sqft, "₹ 9,500 per sq. ft");
        assert_eq!(raw.area, "1,260 Sq. Ft");
        assert_eq!(raw.units, NOT_AVAILABLE);
        assert_eq!(raw.photo_url, "https://img.squareyards.com/101.jpg");
        assert_eq!(
            raw.canonical_url.as_deref(),
            Some("https://www.squareyards.com/resale/3-bhk-in-hebbal-101")
        );
        assert_eq!(raw.latitude.as_deref(), Some("13.0358"));
        assert!(raw.amenities.is_empty());
    }

    #[test]
    fn missing_fields_are_not_available() {
        let raw = resale_parser().parse("<html><body></body></html>");
        assert_eq!(raw, RawListing::default());
    }

    #[test]
    fn direct_fetch_reads_fields_and_amenities() {
        let mut server = mockito::Server::new();
        let page = server
            .mock("GET", "/resale/101")
            .with_header("content-type", "text/html")
            .with_body(RESALE_DETAIL)
            .create();

        let profile = LayoutProfile::resale();
        let timing = Timing::default();
        let mut fetcher = fetcher_for(FetchStrategy::Direct, &profile, &timing).unwrap();
        assert!(!fetcher.uses_session());

        let mut session = crate::tests::fake_browser::FakeSession::new(Default::default());
        let raw = fetcher
            .fetch(&mut session, &format!("{}/resale/101", server.url()))
            .unwrap();

        page.assert();
        assert_eq!(raw.name, "Brigade Orchards");
        assert_eq!(raw.amenities, vec!["Lift"]);
        assert!(session.log().navigations.is_empty());
    }

    #[test]
    fn direct_fetch_reports_http_errors() {
        let mut server = mockito::Server::new();
        let _gone = server.mock("GET", "/gone").with_status(404).create();

        let profile = LayoutProfile::resale();
        let mut fetcher = fetcher_for(FetchStrategy::Direct, &profile, &Timing::default()).unwrap();
        let mut session = crate::tests::fake_browser::FakeSession::new(Default::default());

        let err = fetcher
            .fetch(&mut session, &format!("{}/gone", server.url()))
            .unwrap_err();
        assert!(matches!(err, CrawlError::Http(_)));
    }
}
