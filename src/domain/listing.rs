// src/domain/listing.rs

use crate::normalize::{
    normalize_area, normalize_coordinate, normalize_count, normalize_price, normalize_price_range,
    AreaValue,
};
use serde::{Deserialize, Serialize};

/// Sentinel url for cards whose detail link could not be resolved.
pub const UNKNOWN_URL: &str = "unknown";

/// Placeholder for text fields the page did not provide.
pub const NOT_AVAILABLE: &str = "N/A";

/// Extra fields some card layouts show on the search page itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CardHints {
    pub location: Option<String>,
    pub price: Option<String>,
    pub photo_url: Option<String>,
}

/// Minimal reference to a listing, as found on a search-results page.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingStub {
    pub url: String,
    pub name: String,
    pub hints: CardHints,
}

impl ListingStub {
    pub fn has_url(&self) -> bool {
        self.url != UNKNOWN_URL
    }
}

/// Detail-page fields exactly as displayed, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawListing {
    pub name: String,
    pub location: String,
    pub price: String,
    pub per_sqft: String,
    pub units: String,
    pub area: String,
    pub photo_url: String,
    pub canonical_url: Option<String>,
    pub amenities: Vec<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
}

impl Default for RawListing {
    fn default() -> Self {
        let na = || NOT_AVAILABLE.to_string();
        Self {
            name: na(),
            location: na(),
            price: na(),
            per_sqft: na(),
            units: na(),
            area: na(),
            photo_url: na(),
            canonical_url: None,
            amenities: Vec::new(),
            latitude: None,
            longitude: None,
        }
    }
}

/// A normalized listing as persisted. Never modified after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingRecord {
    pub name: String,
    pub location: String,
    pub min_price: i64,
    pub max_price: i64,
    pub per_sqft_cost: i64,
    pub num_units: Option<i64>,
    pub total_area: AreaValue,
    pub photo_url: String,
    pub listing_url: String,
    /// Card link the listing was reached through. Matched alongside
    /// `listing_url` when deciding whether to fetch a card again.
    pub source_url: Option<String>,
    pub amenities: Vec<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub scrape_timestamp: i64,
}

impl ListingRecord {
    /// Normalizes the raw detail fields. Card hints fill whatever the detail
    /// page left empty, and the canonical link wins over the card's url.
    pub fn from_raw(raw: RawListing, stub: &ListingStub, scrape_timestamp: i64) -> Self {
        let name = prefer(raw.name, Some(&stub.name));
        let location = prefer(raw.location, stub.hints.location.as_ref());
        let price = prefer(raw.price, stub.hints.price.as_ref());
        let photo_url = prefer(raw.photo_url, stub.hints.photo_url.as_ref());

        let listing_url = raw
            .canonical_url
            .filter(|u| is_present(u))
            .unwrap_or_else(|| stub.url.clone());

        let (min_price, max_price) = normalize_price_range(&price);

        Self {
            name,
            location,
            min_price,
            max_price,
            per_sqft_cost: normalize_price(&raw.per_sqft),
            num_units: normalize_count(&raw.units),
            total_area: normalize_area(&raw.area),
            photo_url,
            listing_url,
            source_url: stub.has_url().then(|| stub.url.clone()),
            amenities: raw.amenities,
            latitude: raw
                .latitude
                .as_deref()
                .and_then(|v| normalize_coordinate(v, 90.0)),
            longitude: raw
                .longitude
                .as_deref()
                .and_then(|v| normalize_coordinate(v, 180.0)),
            scrape_timestamp,
        }
    }
}

/// How a listing is recognised as already stored.
///
/// The composite form is an approximation: two distinct units sharing name,
/// location and prices collapse into one, and a re-listed unit with a new
/// price is treated as new.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    Url(String),
    Composite {
        name: String,
        location: String,
        min_price: i64,
        max_price: i64,
    },
}

impl DedupKey {
    /// Key checked before a detail page is fetched. Stubs without a link
    /// have none and cannot be deduplicated.
    pub fn for_stub(stub: &ListingStub) -> Option<Self> {
        stub.has_url().then(|| DedupKey::Url(stub.url.clone()))
    }

    pub fn for_record(record: &ListingRecord) -> Self {
        if record.listing_url != UNKNOWN_URL {
            DedupKey::Url(record.listing_url.clone())
        } else {
            DedupKey::Composite {
                name: record.name.clone(),
                location: record.location.clone(),
                min_price: record.min_price,
                max_price: record.max_price,
            }
        }
    }
}

fn is_present(value: &str) -> bool {
    let v = value.trim();
    !v.is_empty() && v != NOT_AVAILABLE
}

fn prefer(primary: String, fallback: Option<&String>) -> String {
    if is_present(&primary) {
        return primary;
    }
    match fallback {
        Some(f) if is_present(f) => f.clone(),
        _ => primary,
    }
}
