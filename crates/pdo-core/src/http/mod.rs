//! HTTP adapters backed by libcurl.
//!
//! Transfers run on blocking threads (`spawn_blocking`); results and body
//! chunks cross back to async code over tokio channels.

mod fetcher;
mod transport;

use url::Url;

use crate::error::EndpointError;

pub use fetcher::CurlFetcher;
pub use transport::CurlTransport;

/// Backend base URL; endpoints are built by appending path segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base: Url,
}

impl Endpoint {
    pub fn parse(base: &str) -> Result<Self, EndpointError> {
        let base = Url::parse(base)?;
        if base.cannot_be_a_base() {
            return Err(EndpointError::NotABase(base.to_string()));
        }
        Ok(Self { base })
    }

    /// `base` + percent-encoded `segments`.
    pub fn url_for(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}
