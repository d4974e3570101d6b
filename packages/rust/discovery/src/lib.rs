//! Related-item discovery for a seed identifier.
//!
//! Sources implement [`RelationshipSource`] and are tried in priority order
//! by the [`Discoverer`]: the first non-empty result wins and later sources
//! are skipped. This is a fallback chain, not a merge, so a successful
//! structured lookup is never diluted with scraped candidates.

mod keepa;
mod scrape;

use std::collections::HashSet;

use async_trait::async_trait;
use secrecy::SecretString;
use tracing::{debug, info, instrument, warn};
use url::Url;

use asinscout_fetcher::{DeviceProfile, PageClient};
use asinscout_shared::{Asin, FetchConfig, Marketplace, RelationResult, Result, SourceKind};

pub use keepa::{KeepaClient, KeepaSource, KeywordHit};
pub use scrape::PageScrapeSource;

/// Diagnostic recorded when every source came back empty.
pub const NOTHING_FOUND: &str = "no related identifiers found by any source";

// ---------------------------------------------------------------------------
// Source contract
// ---------------------------------------------------------------------------

/// A strategy that turns a seed identifier into related identifiers.
///
/// Implementations never fail: every problem is reported as an empty
/// [`RelationResult`] carrying a diagnostic.
#[async_trait]
pub trait RelationshipSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Related identifiers for `seed`: seed excluded, deduplicated, at most `max_items`.
    async fn discover(&self, seed: &Asin, marketplace: Marketplace, max_items: usize) -> RelationResult;
}

// ---------------------------------------------------------------------------
// CandidateSet
// ---------------------------------------------------------------------------

/// Insertion-ordered, deduplicated candidate collection that refuses the
/// seed and stops accepting at its cap.
#[derive(Debug, Clone)]
pub struct CandidateSet {
    seed: Asin,
    cap: usize,
    seen: HashSet<Asin>,
    items: Vec<Asin>,
}

impl CandidateSet {
    pub fn new(seed: Asin, cap: usize) -> Self {
        Self {
            seed,
            cap,
            seen: HashSet::new(),
            items: Vec::new(),
        }
    }

    /// Add `asin`; returns whether it was accepted.
    pub fn insert(&mut self, asin: Asin) -> bool {
        if self.is_full() || asin == self.seed || self.seen.contains(&asin) {
            return false;
        }
        self.seen.insert(asin.clone());
        self.items.push(asin);
        true
    }

    pub fn extend(&mut self, asins: impl IntoIterator<Item = Asin>) {
        for asin in asins {
            if self.is_full() {
                break;
            }
            self.insert(asin);
        }
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.cap
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn into_result(self, source: SourceKind) -> RelationResult {
        RelationResult {
            asins: self.items,
            diagnostic: None,
            source: Some(source),
        }
    }
}

// ---------------------------------------------------------------------------
// Discoverer
// ---------------------------------------------------------------------------

/// Construction options for the default source chain.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Try the Keepa API before scraping.
    pub use_keepa: bool,
    /// Keepa credential; `None` makes the Keepa source report a diagnostic.
    pub api_key: Option<SecretString>,
    pub keepa_endpoint: String,
    pub fetch: FetchConfig,
    /// Replaces the storefront host for page fetches (tests).
    pub page_base_url: Option<Url>,
}

/// What discovery produced and how it got there.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    /// The winning source's result, or an empty result.
    pub result: RelationResult,
    /// Diagnostics from every source that came back empty, in order.
    pub diagnostics: Vec<String>,
    /// Sources actually invoked, in order.
    pub attempted: Vec<SourceKind>,
}

/// Runs relationship sources in priority order until one yields candidates.
pub struct Discoverer {
    sources: Vec<Box<dyn RelationshipSource>>,
}

impl Discoverer {
    /// Use an explicit, priority-ordered source list.
    pub fn new(sources: Vec<Box<dyn RelationshipSource>>) -> Self {
        Self { sources }
    }

    /// The default chain: Keepa (when enabled), then the page scrape.
    pub fn from_options(opts: &DiscoveryOptions) -> Result<Self> {
        let mut sources: Vec<Box<dyn RelationshipSource>> = Vec::new();

        if opts.use_keepa {
            sources.push(Box::new(KeepaSource::new(
                opts.api_key.clone(),
                &opts.keepa_endpoint,
                opts.fetch.timeout_secs,
            )?));
        }

        let mut client = PageClient::new(DeviceProfile::Desktop, &opts.fetch)?;
        if let Some(base) = &opts.page_base_url {
            client = client.with_base_url(base.clone());
        }
        sources.push(Box::new(PageScrapeSource::with_client(client)));

        Ok(Self::new(sources))
    }

    pub fn source_kinds(&self) -> Vec<SourceKind> {
        self.sources.iter().map(|s| s.kind()).collect()
    }

    /// Discover identifiers related to `seed`.
    #[instrument(skip_all, fields(seed = %seed, marketplace = %marketplace, max_items = max_items))]
    pub async fn discover(
        &self,
        seed: &Asin,
        marketplace: Marketplace,
        max_items: usize,
    ) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();

        if max_items == 0 {
            debug!("max_items is 0, skipping discovery");
            report.result = RelationResult::empty("max_items is 0; discovery skipped");
            return report;
        }

        for source in &self.sources {
            let kind = source.kind();
            report.attempted.push(kind);

            let result = source.discover(seed, marketplace, max_items).await;

            // Re-apply the invariants in case a source is sloppy about them.
            let mut candidates = CandidateSet::new(seed.clone(), max_items);
            candidates.extend(result.asins);

            if let Some(diagnostic) = result.diagnostic {
                if candidates.is_empty() {
                    warn!(source = kind.as_str(), %diagnostic, "source returned nothing");
                }
                report.diagnostics.push(diagnostic);
            }

            if !candidates.is_empty() {
                info!(
                    source = kind.as_str(),
                    candidates = candidates.len(),
                    "related identifiers discovered"
                );
                report.result = candidates.into_result(kind);
                return report;
            }
        }

        info!(sources = report.attempted.len(), "no related identifiers found");
        report.diagnostics.push(NOTHING_FOUND.to_string());
        report.result = RelationResult::empty(NOTHING_FOUND);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Source returning a canned list and counting invocations.
    struct Canned {
        kind: SourceKind,
        asins: Vec<&'static str>,
        diagnostic: Option<&'static str>,
        calls: Arc<AtomicUsize>,
    }

    impl Canned {
        fn new(kind: SourceKind, asins: Vec<&'static str>, diagnostic: Option<&'static str>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    kind,
                    asins,
                    diagnostic,
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl RelationshipSource for Canned {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        async fn discover(&self, _seed: &Asin, _m: Marketplace, _max: usize) -> RelationResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            RelationResult {
                asins: self.asins.iter().map(|a| Asin::parse(a).unwrap()).collect(),
                diagnostic: self.diagnostic.map(str::to_string),
                source: Some(self.kind),
            }
        }
    }

    fn seed() -> Asin {
        Asin::parse("B0D4QMBS75").unwrap()
    }

    #[tokio::test]
    async fn first_non_empty_source_wins() {
        let (keepa, keepa_calls) = Canned::new(SourceKind::Keepa, vec!["B0AAAAAAA1"], None);
        let (scrape, scrape_calls) = Canned::new(SourceKind::PageScrape, vec!["B0BBBBBBB2"], None);
        let discoverer = Discoverer::new(vec![Box::new(keepa), Box::new(scrape)]);

        let report = discoverer.discover(&seed(), Marketplace::Uk, 10).await;
        assert_eq!(report.result.source, Some(SourceKind::Keepa));
        assert_eq!(report.result.asins[0].as_str(), "B0AAAAAAA1");
        assert_eq!(keepa_calls.load(Ordering::SeqCst), 1);
        assert_eq!(scrape_calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.attempted, vec![SourceKind::Keepa]);
    }

    #[tokio::test]
    async fn falls_back_when_first_source_is_empty() {
        let (keepa, _) = Canned::new(SourceKind::Keepa, vec![], Some("no Keepa API key configured"));
        let (scrape, scrape_calls) = Canned::new(SourceKind::PageScrape, vec!["B0BBBBBBB2"], None);
        let discoverer = Discoverer::new(vec![Box::new(keepa), Box::new(scrape)]);

        let report = discoverer.discover(&seed(), Marketplace::Uk, 10).await;
        assert_eq!(scrape_calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.result.source, Some(SourceKind::PageScrape));
        assert_eq!(report.diagnostics, vec!["no Keepa API key configured"]);
    }

    #[tokio::test]
    async fn seed_only_result_counts_as_empty() {
        let (keepa, _) = Canned::new(SourceKind::Keepa, vec!["B0D4QMBS75"], None);
        let (scrape, scrape_calls) = Canned::new(SourceKind::PageScrape, vec![], None);
        let discoverer = Discoverer::new(vec![Box::new(keepa), Box::new(scrape)]);

        let report = discoverer.discover(&seed(), Marketplace::Uk, 10).await;
        assert_eq!(scrape_calls.load(Ordering::SeqCst), 1);
        assert!(report.result.is_empty());
    }

    #[tokio::test]
    async fn all_empty_aggregates_diagnostic() {
        let (keepa, _) = Canned::new(SourceKind::Keepa, vec![], Some("Keepa returned no product"));
        let (scrape, _) = Canned::new(SourceKind::PageScrape, vec![], None);
        let discoverer = Discoverer::new(vec![Box::new(keepa), Box::new(scrape)]);

        let report = discoverer.discover(&seed(), Marketplace::Uk, 10).await;
        assert!(report.result.is_empty());
        assert_eq!(report.result.diagnostic.as_deref(), Some(NOTHING_FOUND));
        assert_eq!(report.diagnostics, vec!["Keepa returned no product", NOTHING_FOUND]);
        assert_eq!(report.attempted, vec![SourceKind::Keepa, SourceKind::PageScrape]);
    }

    #[tokio::test]
    async fn result_never_contains_seed_and_respects_cap() {
        let (sloppy, _) = Canned::new(
            SourceKind::PageScrape,
            vec!["B0D4QMBS75", "B0AAAAAAA1", "B0AAAAAAA1", "B0BBBBBBB2", "B0CCCCCCC3"],
            None,
        );
        let discoverer = Discoverer::new(vec![Box::new(sloppy)]);

        for cap in 1..=4 {
            let report = discoverer.discover(&seed(), Marketplace::Uk, cap).await;
            assert!(report.result.len() <= cap);
            assert!(!report.result.asins.contains(&seed()));
        }
    }

    #[tokio::test]
    async fn zero_cap_skips_sources() {
        let (keepa, calls) = Canned::new(SourceKind::Keepa, vec!["B0AAAAAAA1"], None);
        let discoverer = Discoverer::new(vec![Box::new(keepa)]);

        let report = discoverer.discover(&seed(), Marketplace::Uk, 0).await;
        assert!(report.result.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn candidate_set_orders_and_dedups() {
        let mut set = CandidateSet::new(seed(), 3);
        assert!(set.insert(Asin::parse("B0BBBBBBB2").unwrap()));
        assert!(!set.insert(Asin::parse("B0BBBBBBB2").unwrap()));
        assert!(!set.insert(seed()));
        assert!(set.insert(Asin::parse("B0AAAAAAA1").unwrap()));
        let result = set.into_result(SourceKind::Keepa);
        let ids: Vec<&str> = result.asins.iter().map(Asin::as_str).collect();
        assert_eq!(ids, vec!["B0BBBBBBB2", "B0AAAAAAA1"]);
    }

    #[test]
    fn default_chain_respects_use_keepa() {
        let mut opts = DiscoveryOptions {
            use_keepa: true,
            api_key: None,
            keepa_endpoint: "https://api.keepa.com".into(),
            fetch: FetchConfig::default(),
            page_base_url: None,
        };
        let chain = Discoverer::from_options(&opts).unwrap();
        assert_eq!(chain.source_kinds(), vec![SourceKind::Keepa, SourceKind::PageScrape]);

        opts.use_keepa = false;
        let chain = Discoverer::from_options(&opts).unwrap();
        assert_eq!(chain.source_kinds(), vec![SourceKind::PageScrape]);
    }
}
