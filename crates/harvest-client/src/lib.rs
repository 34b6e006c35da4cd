pub mod adapter;
pub mod fetcher;
pub mod listing;
pub mod status;

#[cfg(feature = "browser")]
pub mod browser_fetcher;

pub use adapter::ListingAdapter;
pub use fetcher::{Fetcher, ReqwestFetcher};
pub use listing::{ListingHandle, SearchPageSource};
pub use status::HttpStatusReporter;

#[cfg(feature = "browser")]
pub use browser_fetcher::{BrowserFetcher, BrowserOptions};
