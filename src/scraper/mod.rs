pub mod amenities;
pub mod detail;
pub mod layouts;
pub mod listing_extractor;
pub mod navigator;
mod select;

pub use detail::{fetcher_for, DetailFetcher, FetchStrategy};
pub use layouts::{Layout, LayoutProfile};
pub use listing_extractor::ListingExtractor;
pub use navigator::PageNavigator;
