//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use rust_decimal::Decimal;
use tracing::info;

use asinscout_core::pipeline::{ProgressReporter, ScoutReport, ScoutRequest};
use asinscout_discovery::KeepaClient;
use asinscout_shared::{
    AppConfig, Asin, FetchConfig, FilterCriteria, Marketplace, ScoredSnapshot, init_config,
    load_config, resolve_api_key,
};

use crate::export;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// asinscout: find and rank products related to a seed ASIN.
#[derive(Parser)]
#[command(
    name = "asinscout",
    version,
    about = "Discover, enrich, and filter products related to a seed ASIN.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Discover related products for a seed ASIN and export them as CSV.
    Scout(ScoutArgs),

    /// Keyword search through the Keepa catalog.
    Search {
        /// Search term.
        term: String,

        /// Marketplace: uk, us, de, fr, it, es.
        #[arg(short, long)]
        marketplace: Option<Marketplace>,

        /// Result page (0-based).
        #[arg(long, default_value = "0")]
        page: u32,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Arguments for `scout`.
#[derive(clap::Args)]
pub(crate) struct ScoutArgs {
    /// Seed ASIN (B0 followed by 8 letters or digits).
    pub asin: String,

    /// Marketplace: uk, us, de, fr, it, es.
    #[arg(short, long)]
    pub marketplace: Option<Marketplace>,

    /// Maximum related products to enrich.
    #[arg(long)]
    pub max_items: Option<usize>,

    /// Skip the Keepa API and scrape the detail page directly.
    #[arg(long)]
    pub no_keepa: bool,

    /// Title term that raises relevance (repeatable).
    #[arg(long = "include")]
    pub include: Vec<String>,

    /// Title term that drops a product (repeatable).
    #[arg(long = "exclude")]
    pub exclude: Vec<String>,

    #[arg(long)]
    pub price_min: Option<Decimal>,

    #[arg(long)]
    pub price_max: Option<Decimal>,

    /// Minimum star rating; products without a rating are dropped.
    #[arg(long)]
    pub rating_min: Option<f64>,

    /// Minimum review count; products without a count are dropped.
    #[arg(long)]
    pub reviews_min: Option<u64>,

    /// Concurrent detail-page fetches.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Overall time budget in seconds (0 disables it).
    #[arg(long)]
    pub deadline_secs: Option<u64>,

    /// Directory for the CSV exports (defaults to the working directory).
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "asinscout=info",
        1 => "asinscout=debug",
        _ => "asinscout=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Scout(args) => cmd_scout(args).await,
        Command::Search {
            term,
            marketplace,
            page,
        } => cmd_search(&term, marketplace, page).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// scout
// ---------------------------------------------------------------------------

/// Command-line criteria replace the config file's, field by field.
fn merge_criteria(base: &FilterCriteria, args: &ScoutArgs) -> FilterCriteria {
    FilterCriteria {
        include_terms: if args.include.is_empty() {
            base.include_terms.clone()
        } else {
            args.include.clone()
        },
        exclude_terms: if args.exclude.is_empty() {
            base.exclude_terms.clone()
        } else {
            args.exclude.clone()
        },
        price_min: args.price_min.or(base.price_min),
        price_max: args.price_max.or(base.price_max),
        rating_min: args.rating_min.or(base.rating_min),
        reviews_min: args.reviews_min.or(base.reviews_min),
    }
}

fn build_request(config: &AppConfig, args: &ScoutArgs) -> ScoutRequest {
    let mut fetch = FetchConfig::from(config);
    if let Some(concurrency) = args.concurrency {
        fetch.concurrency = concurrency;
    }

    let deadline_secs = args.deadline_secs.unwrap_or(config.fetch.deadline_secs);

    ScoutRequest {
        seed: args.asin.clone(),
        marketplace: args.marketplace.unwrap_or(config.defaults.marketplace),
        max_items: args.max_items.unwrap_or(config.defaults.max_items),
        use_keepa: config.defaults.use_keepa && !args.no_keepa,
        api_key: resolve_api_key(config),
        keepa_endpoint: config.keepa.endpoint.clone(),
        fetch,
        criteria: merge_criteria(&config.filter, args),
        deadline: (deadline_secs > 0).then(|| Duration::from_secs(deadline_secs)),
        base_url: None,
    }
}

async fn cmd_scout(args: ScoutArgs) -> Result<()> {
    let config = load_config()?;
    let request = build_request(&config, &args);

    info!(
        seed = %request.seed,
        marketplace = %request.marketplace,
        max_items = request.max_items,
        use_keepa = request.use_keepa,
        "scouting related products"
    );

    let reporter = CliProgress::new();
    let report = asinscout_core::pipeline::run(&request, &reporter).await?;

    for diagnostic in &report.diagnostics {
        eprintln!("warning: {diagnostic}");
    }

    let out_dir = match args.out {
        Some(dir) => dir,
        None => std::env::current_dir()
            .map_err(|e| eyre!("cannot determine working directory: {e}"))?,
    };
    let filtered = !request.criteria.is_empty();
    let today = chrono::Local::now().date_naive();
    let written = export::write_report(&out_dir, &report, filtered, today)?;

    print_summary(&report, filtered);
    for path in &written {
        println!("  Wrote:      {}", path.display());
    }
    println!();

    Ok(())
}

fn print_summary(report: &ScoutReport, filtered: bool) {
    let source = report
        .relation
        .source
        .map(|s| s.as_str())
        .unwrap_or("none");

    println!();
    println!("  Seed:       {} ({})", report.seed, report.marketplace);
    println!("  Source:     {source}");
    println!("  Candidates: {}", report.snapshots.len());
    if filtered {
        println!("  Kept:       {}", report.kept.len());
        println!("  Dropped:    {}", report.dropped.len());
        for item in &report.dropped {
            println!("    {}", drop_line(item));
        }
    }
    println!("  Time:       {:.1}s", report.elapsed.as_secs_f64());
}

/// `B0... (reason; reason)` for the dropped listing.
fn drop_line(item: &ScoredSnapshot) -> String {
    let reasons: Vec<String> = item.drop_reasons.iter().map(ToString::to_string).collect();
    format!("{} ({})", item.snapshot.asin, reasons.join("; "))
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn snapshot_done(&self, asin: &Asin, completed: usize, total: usize) {
        self.spinner
            .set_message(format!("Fetching details [{completed}/{total}] {asin}"));
    }

    fn done(&self, _report: &ScoutReport) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// search
// ---------------------------------------------------------------------------

async fn cmd_search(term: &str, marketplace: Option<Marketplace>, page: u32) -> Result<()> {
    let config = load_config()?;
    let api_key = resolve_api_key(&config).ok_or_else(|| {
        eyre!(
            "no Keepa API key configured: set the {} environment variable",
            config.keepa.api_key_env
        )
    })?;
    let marketplace = marketplace.unwrap_or(config.defaults.marketplace);

    let client = KeepaClient::new(&config.keepa.endpoint, api_key, config.fetch.timeout_secs)?;
    let hits = client.search(term, marketplace, page).await?;

    if hits.is_empty() {
        println!("No results for '{term}' on {marketplace}.");
        return Ok(());
    }

    println!();
    for hit in &hits {
        let title = hit.title.as_deref().unwrap_or("(no title)");
        let brand = hit.brand.as_deref().unwrap_or("-");
        let drops = hit
            .sales_rank_drops_30
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("  {}  {brand:<16}  drops30={drops:<5}  {title}", hit.asin);
    }
    println!();
    println!("  {} result(s), page {page}", hits.len());

    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("asinscout").chain(args.iter().copied())).unwrap()
    }

    fn scout_args(args: &[&str]) -> ScoutArgs {
        match parse(args).command {
            Command::Scout(a) => a,
            _ => panic!("expected scout"),
        }
    }

    #[test]
    fn parses_scout_flags() {
        let args = scout_args(&[
            "scout",
            "b0d4qmbs75",
            "--marketplace",
            "de",
            "--include",
            "brew",
            "--include",
            "airlock",
            "--exclude",
            "reptile",
            "--price-min",
            "10",
            "--rating-min",
            "3.8",
            "--reviews-min",
            "20",
            "--no-keepa",
        ]);
        assert_eq!(args.asin, "b0d4qmbs75");
        assert_eq!(args.marketplace, Some(Marketplace::De));
        assert_eq!(args.include, vec!["brew", "airlock"]);
        assert_eq!(args.price_min, Some(Decimal::from(10)));
        assert!(args.no_keepa);
    }

    #[test]
    fn drop_line_lists_every_reason() {
        use asinscout_shared::{DropReason, ProductSnapshot};

        let asin = Asin::parse("B0AAAAAAA1").unwrap();
        let item = ScoredSnapshot {
            snapshot: ProductSnapshot::empty(asin, Marketplace::Uk),
            score: 0,
            kept: false,
            drop_reasons: vec![DropReason::RatingMissing, DropReason::ReviewsBelowMin],
        };
        assert_eq!(
            drop_line(&item),
            "B0AAAAAAA1 (rating missing; reviews below minimum)"
        );

        let vetoed = ScoredSnapshot {
            drop_reasons: vec![DropReason::ExcludedTerm("reptile".into())],
            ..item
        };
        assert_eq!(drop_line(&vetoed), "B0AAAAAAA1 (excluded term 'reptile')");
    }

    #[test]
    fn rejects_unknown_marketplace() {
        let result = Cli::try_parse_from(["asinscout", "scout", "B0D4QMBS75", "-m", "jp"]);
        assert!(result.is_err());
    }

    #[test]
    fn request_merges_config_and_flags() {
        let mut config = AppConfig::default();
        config.filter.exclude_terms = vec!["reptile".into()];
        config.filter.reviews_min = Some(5);

        let args = scout_args(&[
            "scout",
            "B0D4QMBS75",
            "--include",
            "brew",
            "--reviews-min",
            "20",
            "--concurrency",
            "3",
            "--deadline-secs",
            "0",
            "--no-keepa",
        ]);
        let request = build_request(&config, &args);

        assert_eq!(request.criteria.include_terms, vec!["brew"]);
        assert_eq!(request.criteria.exclude_terms, vec!["reptile"]);
        assert_eq!(request.criteria.reviews_min, Some(20));
        assert_eq!(request.fetch.concurrency, 3);
        assert_eq!(request.deadline, None);
        assert!(!request.use_keepa);
        assert_eq!(request.max_items, config.defaults.max_items);
        assert_eq!(request.marketplace, config.defaults.marketplace);
    }

    #[test]
    fn default_deadline_comes_from_config() {
        let config = AppConfig::default();
        let request = build_request(&config, &scout_args(&["scout", "B0D4QMBS75"]));
        assert_eq!(
            request.deadline,
            Some(Duration::from_secs(config.fetch.deadline_secs))
        );
        assert!(request.use_keepa);
    }
}
