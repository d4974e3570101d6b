//! End-to-end `scout` pipeline: seed → discovery → enrichment → relevance.

use std::time::Duration;

use secrecy::SecretString;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, instrument, warn};
use url::Url;

use asinscout_discovery::{Discoverer, DiscoveryOptions, DiscoveryReport};
use asinscout_fetcher::{DeviceProfile, PageClient};
use asinscout_shared::{
    Asin, FetchConfig, FilterCriteria, Marketplace, ProductSnapshot, RelationResult, Result, RunId,
    ScoredSnapshot,
};

use crate::enrichment::{EnrichOptions, Enricher, SnapshotProgress};
use crate::relevance;

/// Diagnostic recorded when the run deadline cuts discovery short.
pub const DISCOVERY_DEADLINE: &str = "deadline elapsed during discovery";

/// Inputs for one `scout` run.
#[derive(Debug, Clone)]
pub struct ScoutRequest {
    /// Raw seed identifier as typed by the user.
    pub seed: String,
    pub marketplace: Marketplace,
    /// Cap on discovered candidates.
    pub max_items: usize,
    /// Try the Keepa API before the page scrape.
    pub use_keepa: bool,
    pub api_key: Option<SecretString>,
    pub keepa_endpoint: String,
    pub fetch: FetchConfig,
    pub criteria: FilterCriteria,
    /// Overall budget for discovery and enrichment together.
    pub deadline: Option<Duration>,
    /// Replaces the storefront host for every page fetch.
    pub base_url: Option<Url>,
}

/// Result of a `scout` run.
#[derive(Debug, Clone, Serialize)]
pub struct ScoutReport {
    pub run_id: RunId,
    pub seed: Asin,
    pub marketplace: Marketplace,
    /// The discovery outcome that fed enrichment.
    pub relation: RelationResult,
    /// Non-fatal problems, in the order they occurred.
    pub diagnostics: Vec<String>,
    /// Every enriched candidate, in discovery order.
    pub snapshots: Vec<ProductSnapshot>,
    pub kept: Vec<ScoredSnapshot>,
    pub dropped: Vec<ScoredSnapshot>,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each candidate's detail fetch finishes.
    fn snapshot_done(&self, asin: &Asin, completed: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, report: &ScoutReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn snapshot_done(&self, _asin: &Asin, _completed: usize, _total: usize) {}
    fn done(&self, _report: &ScoutReport) {}
}

/// Forwards enricher callbacks to the pipeline reporter.
struct ForwardProgress<'a>(&'a dyn ProgressReporter);

impl SnapshotProgress for ForwardProgress<'_> {
    fn snapshot_done(&self, asin: &Asin, completed: usize, total: usize) {
        self.0.snapshot_done(asin, completed, total);
    }
}

/// Run the full `scout` pipeline.
///
/// 1. Validate the seed (the only fatal step)
/// 2. Discover related identifiers
/// 3. Enrich each candidate
/// 4. Score and filter
#[instrument(skip_all, fields(seed = %request.seed, marketplace = %request.marketplace))]
pub async fn run(request: &ScoutRequest, progress: &dyn ProgressReporter) -> Result<ScoutReport> {
    let start = Instant::now();
    let run_id = RunId::new();

    // --- Phase 1: Validate ---
    let seed = Asin::parse(&request.seed)?;
    info!(%run_id, %seed, "starting scout pipeline");

    let deadline = request.deadline.map(|budget| start + budget);

    // --- Phase 2: Discovery ---
    progress.phase("Discovering related products");
    let discoverer = Discoverer::from_options(&DiscoveryOptions {
        use_keepa: request.use_keepa,
        api_key: request.api_key.clone(),
        keepa_endpoint: request.keepa_endpoint.clone(),
        fetch: request.fetch.clone(),
        page_base_url: request.base_url.clone(),
    })?;

    let discovery = discoverer.discover(&seed, request.marketplace, request.max_items);
    let report = match deadline {
        Some(deadline) => match tokio::time::timeout_at(deadline, discovery).await {
            Ok(report) => report,
            Err(_) => {
                warn!("deadline elapsed during discovery");
                DiscoveryReport {
                    result: RelationResult::empty(DISCOVERY_DEADLINE),
                    diagnostics: vec![DISCOVERY_DEADLINE.to_string()],
                    attempted: Vec::new(),
                }
            }
        },
        None => discovery.await,
    };

    let DiscoveryReport {
        result: relation,
        diagnostics,
        ..
    } = report;

    // --- Phase 3: Enrichment ---
    progress.phase("Fetching product details");
    let mut client = PageClient::new(DeviceProfile::Mobile, &request.fetch)?;
    if let Some(base) = &request.base_url {
        client = client.with_base_url(base.clone());
    }
    let enricher = Enricher::new(
        client,
        EnrichOptions {
            concurrency: request.fetch.concurrency,
            deadline,
        },
    );
    let snapshots = enricher
        .enrich(&relation.asins, request.marketplace, &ForwardProgress(progress))
        .await;

    // --- Phase 4: Relevance ---
    progress.phase("Scoring relevance");
    let outcome = relevance::filter(&snapshots, &request.criteria);

    let report = ScoutReport {
        run_id,
        seed,
        marketplace: request.marketplace,
        relation,
        diagnostics,
        snapshots,
        kept: outcome.kept,
        dropped: outcome.dropped,
        elapsed: start.elapsed(),
    };

    info!(
        candidates = report.snapshots.len(),
        kept = report.kept.len(),
        dropped = report.dropped.len(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "scout pipeline complete"
    );
    progress.done(&report);

    Ok(report)
}
