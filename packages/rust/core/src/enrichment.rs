//! Snapshot enrichment.
//!
//! Fetches the lightweight mobile detail page for every candidate through a
//! bounded worker pool and extracts best-effort metadata. Output always has
//! the same length and order as the input: failed fetches and tasks cut off
//! by the deadline become snapshots with every optional field absent.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use asinscout_fetcher::{PageClient, extract_detail};
use asinscout_shared::{Asin, Marketplace, ProductSnapshot};

/// Pool settings for one enrichment batch.
#[derive(Debug, Clone, Copy)]
pub struct EnrichOptions {
    /// Maximum in-flight page fetches. Clamped to at least 1.
    pub concurrency: usize,
    /// Point in time after which unfinished fetches are abandoned.
    pub deadline: Option<Instant>,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            concurrency: 8,
            deadline: None,
        }
    }
}

impl EnrichOptions {
    /// Deadline `budget` from now.
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.deadline = Some(Instant::now() + budget);
        self
    }
}

/// Called after every completed fetch, in completion order.
pub trait SnapshotProgress: Send + Sync {
    fn snapshot_done(&self, asin: &Asin, completed: usize, total: usize);
}

/// No-op reporter.
pub struct SilentProgress;

impl SnapshotProgress for SilentProgress {
    fn snapshot_done(&self, _asin: &Asin, _completed: usize, _total: usize) {}
}

/// Counters for one batch, logged when the batch finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichSummary {
    /// Snapshots with at least one field captured.
    pub fetched: usize,
    /// Fetches that completed but captured nothing.
    pub empty: usize,
    /// Slots filled because the deadline expired first.
    pub timed_out: usize,
    /// Tasks that panicked or were cancelled.
    pub failed: usize,
}

/// Fetches product snapshots concurrently.
#[derive(Debug, Clone)]
pub struct Enricher {
    client: PageClient,
    opts: EnrichOptions,
}

impl Enricher {
    /// `client` should use the mobile profile; its per-request timeout and
    /// retry policy apply to every fetch.
    pub fn new(client: PageClient, opts: EnrichOptions) -> Self {
        Self { client, opts }
    }

    /// One snapshot per identifier, in input order.
    #[instrument(skip_all, fields(count = asins.len(), marketplace = %marketplace))]
    pub async fn enrich(
        &self,
        asins: &[Asin],
        marketplace: Marketplace,
        progress: &dyn SnapshotProgress,
    ) -> Vec<ProductSnapshot> {
        let (snapshots, summary) = self.enrich_with_summary(asins, marketplace, progress).await;
        info!(
            fetched = summary.fetched,
            empty = summary.empty,
            timed_out = summary.timed_out,
            failed = summary.failed,
            "enrichment complete"
        );
        snapshots
    }

    async fn enrich_with_summary(
        &self,
        asins: &[Asin],
        marketplace: Marketplace,
        progress: &dyn SnapshotProgress,
    ) -> (Vec<ProductSnapshot>, EnrichSummary) {
        if asins.is_empty() {
            return (Vec::new(), EnrichSummary::default());
        }

        let semaphore = Arc::new(Semaphore::new(self.opts.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (index, asin) in asins.iter().cloned().enumerate() {
            let semaphore = semaphore.clone();
            let client = self.client.clone();
            tasks.spawn(async move {
                // The semaphore is never closed, so acquire only fails if it were.
                let _permit = semaphore.acquire_owned().await.ok();
                let snapshot = fetch_snapshot(&client, asin, marketplace).await;
                (index, snapshot)
            });
        }

        collect_slots(tasks, asins, marketplace, self.opts.deadline, progress).await
    }
}

/// Drain `tasks` into indexed slots until they finish or `deadline` passes.
/// Slots left empty become empty snapshots.
async fn collect_slots(
    mut tasks: JoinSet<(usize, ProductSnapshot)>,
    asins: &[Asin],
    marketplace: Marketplace,
    deadline: Option<Instant>,
    progress: &dyn SnapshotProgress,
) -> (Vec<ProductSnapshot>, EnrichSummary) {
    let total = asins.len();
    let mut slots: Vec<Option<ProductSnapshot>> = vec![None; total];
    let mut summary = EnrichSummary::default();
    let mut completed = 0;

    loop {
        let next = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(next) => next,
                Err(_) => {
                    warn!(remaining = tasks.len(), "enrichment deadline elapsed");
                    tasks.abort_all();
                    break;
                }
            },
            None => tasks.join_next().await,
        };

        let Some(joined) = next else { break };
        match joined {
            Ok((index, snapshot)) => {
                completed += 1;
                if snapshot.has_data() {
                    summary.fetched += 1;
                } else {
                    summary.empty += 1;
                }
                progress.snapshot_done(&snapshot.asin, completed, total);
                slots[index] = Some(snapshot);
            }
            Err(e) => {
                summary.failed += 1;
                warn!(error = %e, "enrichment task failed");
            }
        }
    }

    let mut missing: usize = 0;
    let snapshots = slots
        .into_iter()
        .zip(asins)
        .map(|(slot, asin)| {
            slot.unwrap_or_else(|| {
                missing += 1;
                ProductSnapshot::empty(asin.clone(), marketplace)
            })
        })
        .collect();
    summary.timed_out = missing.saturating_sub(summary.failed);

    (snapshots, summary)
}

/// Fetch and parse one detail page. Failures leave fields absent.
async fn fetch_snapshot(client: &PageClient, asin: Asin, marketplace: Marketplace) -> ProductSnapshot {
    let mut snapshot = ProductSnapshot::empty(asin, marketplace);

    match client.fetch_product_page(&snapshot.asin, marketplace).await {
        Ok(html) => {
            let fields = extract_detail(&html);
            snapshot.title = fields.title;
            snapshot.price = fields.price;
            snapshot.rating = fields.rating;
            snapshot.reviews = fields.reviews;
        }
        Err(e) => debug!(asin = %snapshot.asin, error = %e, "detail fetch failed"),
    }

    snapshot
}
