//! Network adapters

pub mod http;

pub use http::{HttpFetcher, HttpFetcherConfig};
