//! Acquisition of bundle assets from disk or over HTTP

mod fetcher;
mod locator;

pub use fetcher::{FetchError, FetchResult, FetchedContent, ResourceFetcher};
pub use locator::Locator;
