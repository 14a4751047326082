//! Paginated catalogue discovery over a JSON HTTP API

use crate::config::SourceConfig;
use crate::error::DiscoveryError;
use crate::types::Listing;
use async_trait::async_trait;
use tracing::debug;

/// Interface for paginated catalogue discovery
///
/// Pages are numbered from 1 and fetched strictly one at a time by the scan
/// loop. A page shorter than [`page_size`](CatalogSource::page_size) signals
/// the end of the catalogue.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch the listings of one catalogue page
    ///
    /// An empty page is a valid result, not an error.
    async fn fetch_page(&self, page: u32) -> Result<Vec<Listing>, DiscoveryError>;

    /// Number of listings a full page carries
    fn page_size(&self) -> usize;
}

/// Catalogue source backed by a JSON HTTP index
///
/// Fetches `{base_url}?page={n}` and deserializes the body as an array of
/// listings. One HTTP client is built at construction with the configured
/// request timeout and user agent, and reused for every page.
pub struct JsonCatalogSource {
    client: reqwest::Client,
    base_url: String,
    page_size: usize,
}

impl JsonCatalogSource {
    /// Create a source from its configuration
    ///
    /// Fails only when the underlying HTTP client cannot be constructed.
    pub fn new(config: SourceConfig) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            page_size: config.page_size,
        })
    }
}

#[async_trait]
impl CatalogSource for JsonCatalogSource {
    async fn fetch_page(&self, page: u32) -> Result<Vec<Listing>, DiscoveryError> {
        let url = format!("{}?page={}", self.base_url, page);
        debug!(url = %url, "fetching catalogue page");

        let response =
            self.client
                .get(&url)
                .send()
                .await
                .map_err(|e| DiscoveryError::Transport {
                    page,
                    reason: e.to_string(),
                })?;

        // Check HTTP status before trying to parse the response body
        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::Http {
                page,
                status: status.as_u16(),
            });
        }

        let listings: Vec<Listing> =
            response
                .json()
                .await
                .map_err(|e| DiscoveryError::MalformedPage {
                    page,
                    reason: e.to_string(),
                })?;
        debug!(page, listings = listings.len(), "catalogue page fetched");
        Ok(listings)
    }

    fn page_size(&self) -> usize {
        self.page_size
    }
}
