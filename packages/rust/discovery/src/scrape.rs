//! Page-scrape fallback source.
//!
//! Fetches the seed's desktop detail page and harvests identifiers from
//! recommendation widgets and `/dp/` links. Never fails: transport errors,
//! bad statuses and junk markup all end as an empty result.

use async_trait::async_trait;
use tracing::{debug, warn};

use asinscout_fetcher::{PageClient, extract_related_asins};
use asinscout_shared::{Asin, Marketplace, RelationResult, SourceKind};

use crate::{CandidateSet, RelationshipSource};

/// Relationship source backed by the storefront detail page.
#[derive(Debug, Clone)]
pub struct PageScrapeSource {
    client: PageClient,
}

impl PageScrapeSource {
    /// `client` should use the desktop profile.
    pub fn with_client(client: PageClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RelationshipSource for PageScrapeSource {
    fn kind(&self) -> SourceKind {
        SourceKind::PageScrape
    }

    async fn discover(&self, seed: &Asin, marketplace: Marketplace, max_items: usize) -> RelationResult {
        let body = match self.client.fetch_product_page(seed, marketplace).await {
            Ok(body) => body,
            Err(e) => {
                warn!(%seed, error = %e, "detail page fetch failed");
                return RelationResult::empty(format!("detail page fetch failed: {e}"));
            }
        };

        let mut candidates = CandidateSet::new(seed.clone(), max_items);
        candidates.extend(extract_related_asins(&body));
        debug!(%seed, found = candidates.len(), "scraped detail page");

        if candidates.is_empty() {
            return RelationResult::empty("detail page contained no related identifiers");
        }
        candidates.into_result(SourceKind::PageScrape)
    }
}
