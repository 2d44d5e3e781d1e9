// layouts.rs
//
// Selector sets for the listing-card layouts the portal serves. A profile is
// chosen by configuration; any field can be overridden from the CLI.

use crate::errors::CrawlError;
use clap::ValueEnum;

/// A CSS selector, optionally reading an attribute instead of the text.
/// Written as `css` or `css@attr`, e.g. `input#hd_subLocalityName@value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSelector {
    pub css: String,
    pub attr: Option<String>,
}

impl FieldSelector {
    pub fn text(css: &str) -> Self {
        Self {
            css: css.to_string(),
            attr: None,
        }
    }

    pub fn attr(css: &str, attr: &str) -> Self {
        Self {
            css: css.to_string(),
            attr: Some(attr.to_string()),
        }
    }

    pub fn parse(text: &str) -> Self {
        match text.rsplit_once('@') {
            Some((css, attr)) if !css.is_empty() && !attr.is_empty() => Self::attr(css, attr),
            _ => Self::text(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardSelectors {
    pub container: String,
    /// Required inside a card; a card without it is malformed.
    pub heading: String,
    /// Link inside the heading, read through `href`.
    pub link: String,
    pub name: FieldSelector,
    pub location: Option<FieldSelector>,
    pub price: Option<FieldSelector>,
    pub photo: Option<FieldSelector>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailSelectors {
    /// Element whose presence marks the detail page as rendered.
    pub ready: String,
    pub name: FieldSelector,
    pub location: FieldSelector,
    pub price: FieldSelector,
    pub per_sqft: Option<FieldSelector>,
    pub units: Option<FieldSelector>,
    pub area: Option<FieldSelector>,
    pub photo: FieldSelector,
    pub canonical: FieldSelector,
    pub latitude: Option<FieldSelector>,
    pub longitude: Option<FieldSelector>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmenitySelectors {
    /// Waited for before reading amenities; `None` reads the page as is.
    pub section: Option<String>,
    pub items: String,
    /// Items whose text contains this are controls, not amenities.
    pub exclude_text: Option<String>,
    pub expand: Option<String>,
    pub container: Option<String>,
    pub expanded_items: Option<String>,
    pub close: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationSelectors {
    /// `{page}` is replaced with the target page number.
    pub numbered: String,
    pub forward: String,
}

impl PaginationSelectors {
    pub fn numbered_for(&self, page: u32) -> String {
        self.numbered.replace("{page}", &page.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Layout {
    /// Resale search: `article.listing-card` cards, flat amenity table.
    Resale,
    /// New-project search: `div.npTile` cards, amenities behind a modal.
    Projects,
}

impl Layout {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layout::Resale => "resale",
            Layout::Projects => "projects",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutProfile {
    pub layout: Layout,
    pub site_base: String,
    pub default_search_url: String,
    pub card: CardSelectors,
    pub detail: DetailSelectors,
    pub amenities: AmenitySelectors,
    pub pagination: PaginationSelectors,
}

const SITE_BASE: &str = "https://www.squareyards.com";

fn pagination() -> PaginationSelectors {
    PaginationSelectors {
        numbered: r#"li.applyPagination[data-page="{page}"]"#.into(),
        forward: "li.applyPagination span em.icon-arrow-right".into(),
    }
}

impl LayoutProfile {
    pub fn for_layout(layout: Layout) -> Self {
        match layout {
            Layout::Resale => Self::resale(),
            Layout::Projects => Self::projects(),
        }
    }

    pub fn resale() -> Self {
        Self {
            layout: Layout::Resale,
            site_base: SITE_BASE.into(),
            default_search_url: format!(
                "{SITE_BASE}/resale/search?buildingType=1&propertyType=1&propertyTypeName=Apartment&possessionStatus=Ready%20To%20Move&cityId=5"
            ),
            card: CardSelectors {
                container: "article.listing-card".into(),
                heading: "h2.heading".into(),
                link: "a".into(),
                name: FieldSelector::text("span.project-name"),
                location: Some(FieldSelector::attr("div.favorite-btn", "data-locality")),
                price: Some(FieldSelector::text("p.listing-price strong")),
                photo: Some(FieldSelector::attr("figure.listing-img img", "src")),
            },
            detail: DetailSelectors {
                ready: ".dProjectName".into(),
                name: FieldSelector::text("div.dProjectName"),
                location: FieldSelector::attr("input#hd_subLocalityName", "value"),
                price: FieldSelector::text("div.dProjectPrice strong"),
                per_sqft: Some(FieldSelector::text("div.dProjectPrice span.dPerSqft")),
                units: None,
                area: Some(FieldSelector::text("div.dProjectArea strong")),
                photo: FieldSelector::attr("div.dPslider img", "src"),
                canonical: FieldSelector::attr("link[rel=canonical]", "href"),
                latitude: Some(FieldSelector::attr("input#hd_latitude", "value")),
                longitude: Some(FieldSelector::attr("input#hd_longitude", "value")),
            },
            amenities: AmenitySelectors {
                section: None,
                items: "div.npAmenitiesTableBox table.npAmenitiesTable tr span".into(),
                exclude_text: None,
                expand: None,
                container: None,
                expanded_items: None,
                close: None,
            },
            pagination: pagination(),
        }
    }

    pub fn projects() -> Self {
        Self {
            layout: Layout::Projects,
            site_base: SITE_BASE.into(),
            default_search_url: format!("{SITE_BASE}/ready-to-move-projects-in-bangalore"),
            card: CardSelectors {
                container: "div.npTile".into(),
                heading: "h2.npProjectName".into(),
                link: "a".into(),
                name: FieldSelector::text("h2.npProjectName a strong"),
                location: Some(FieldSelector::text("h2.npProjectName span.npProjectCity")),
                price: Some(FieldSelector::text("div.npPriceBox")),
                photo: Some(FieldSelector::attr("figure.npTileFigure img", "src")),
            },
            detail: DetailSelectors {
                ready: "body".into(),
                name: FieldSelector::text("div.npProjectHeading h1"),
                location: FieldSelector::text("div.npProjectHeading span.npProjectCity"),
                price: FieldSelector::text("div.npProjectPrice"),
                per_sqft: Some(FieldSelector::text("div.npPerSqftPrice")),
                units: Some(FieldSelector::text("div.npTotalUnits strong")),
                area: Some(FieldSelector::text("div.npProjectArea strong")),
                photo: FieldSelector::attr("div.npProjectGallery img", "src"),
                canonical: FieldSelector::attr("link[rel=canonical]", "href"),
                latitude: Some(FieldSelector::attr(r#"meta[itemprop="latitude"]"#, "content")),
                longitude: Some(FieldSelector::attr(r#"meta[itemprop="longitude"]"#, "content")),
            },
            amenities: AmenitySelectors {
                section: Some("#amenities".into()),
                items: "div.amenities-list-box li span".into(),
                exclude_text: Some("More".into()),
                expand: Some("#amenitiesModalBtn".into()),
                container: Some("#amenitiesModalBox".into()),
                expanded_items: Some(
                    "#amenitiesModalBox .accordion-item table.amenities-popup-table td span".into(),
                ),
                close: Some("#amenitiesModalBox .modal-close.button".into()),
            },
            pagination: pagination(),
        }
    }

    /// Applies a `--selector key=css` override.
    pub fn apply_override(&mut self, key: &str, value: &str) -> Result<(), CrawlError> {
        let field = FieldSelector::parse(value);
        let plain = value.to_string();
        match key {
            "card" => self.card.container = plain,
            "card.heading" => self.card.heading = plain,
            "card.link" => self.card.link = plain,
            "card.name" => self.card.name = field,
            "card.location" => self.card.location = Some(field),
            "card.price" => self.card.price = Some(field),
            "card.photo" => self.card.photo = Some(field),
            "detail.ready" => self.detail.ready = plain,
            "detail.name" => self.detail.name = field,
            "detail.location" => self.detail.location = field,
            "detail.price" => self.detail.price = field,
            "detail.per_sqft" => self.detail.per_sqft = Some(field),
            "detail.units" => self.detail.units = Some(field),
            "detail.area" => self.detail.area = Some(field),
            "detail.photo" => self.detail.photo = field,
            "detail.canonical" => self.detail.canonical = field,
            "detail.latitude" => self.detail.latitude = Some(field),
            "detail.longitude" => self.detail.longitude = Some(field),
            "amenities.section" => self.amenities.section = Some(plain),
            "amenities.items" => self.amenities.items = plain,
            "amenities.expand" => self.amenities.expand = Some(plain),
            "amenities.container" => self.amenities.container = Some(plain),
            "amenities.expanded_items" => self.amenities.expanded_items = Some(plain),
            "amenities.close" => self.amenities.close = Some(plain),
            "pagination.numbered" => self.pagination.numbered = plain,
            "pagination.forward" => self.pagination.forward = plain,
            other => {
                return Err(CrawlError::Config(format!("unknown selector key `{other}`")));
            }
        }
        Ok(())
    }
}
