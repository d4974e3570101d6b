//! Application configuration for asinscout.
//!
//! User config lives at `~/.asinscout/asinscout.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoutError};
use crate::types::{FilterCriteria, Marketplace};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "asinscout.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".asinscout";

// ---------------------------------------------------------------------------
// Config structs (matching asinscout.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Keepa API settings.
    #[serde(default)]
    pub keepa: KeepaConfig,

    /// Page fetch policy.
    #[serde(default)]
    pub fetch: FetchPolicyConfig,

    /// Saved niche criteria.
    #[serde(default)]
    pub filter: FilterCriteria,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Marketplace used when none is given on the command line.
    #[serde(default)]
    pub marketplace: Marketplace,

    /// Maximum number of related identifiers to keep.
    #[serde(default = "default_max_items")]
    pub max_items: usize,

    /// Whether to try the Keepa API before scraping.
    #[serde(default = "default_true")]
    pub use_keepa: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            marketplace: Marketplace::default(),
            max_items: default_max_items(),
            use_keepa: true,
        }
    }
}

fn default_max_items() -> usize {
    120
}
fn default_true() -> bool {
    true
}

/// `[keepa]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeepaConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// API base URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

impl Default for KeepaConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            endpoint: default_endpoint(),
        }
    }
}

fn default_api_key_env() -> String {
    "KEEPA_API_KEY".into()
}
fn default_endpoint() -> String {
    "https://api.keepa.com".into()
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchPolicyConfig {
    /// Concurrent snapshot fetches.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts per URL (1 = no retry).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial retry backoff, doubled per attempt.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Overall deadline for a run; 0 disables it.
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

impl Default for FetchPolicyConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            deadline_secs: default_deadline_secs(),
        }
    }
}

fn default_concurrency() -> usize {
    8
}
fn default_timeout_secs() -> u64 {
    12
}
fn default_max_attempts() -> u32 {
    2
}
fn default_backoff_ms() -> u64 {
    500
}
fn default_deadline_secs() -> u64 {
    180
}

// ---------------------------------------------------------------------------
// Fetch config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime fetch configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Maximum concurrent HTTP requests during enrichment.
    pub concurrency: usize,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Attempts per URL for transient failures.
    pub max_attempts: u32,
    /// Initial backoff between attempts, in ms.
    pub backoff_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            concurrency: config.fetch.concurrency,
            timeout_secs: config.fetch.timeout_secs,
            max_attempts: config.fetch.max_attempts,
            backoff_ms: config.fetch.backoff_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.asinscout/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| ScoutError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.asinscout/asinscout.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ScoutError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| ScoutError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ScoutError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| ScoutError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ScoutError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the Keepa API key from the configured env var.
///
/// Returns `None` when the variable is unset or blank; the structured source
/// then reports "no API key configured" and discovery falls back to scraping.
pub fn resolve_api_key(config: &AppConfig) -> Option<SecretString> {
    let var_name = &config.keepa.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Some(SecretString::from(val.trim().to_string())),
        _ => {
            tracing::debug!(var = %var_name, "Keepa API key not set");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("marketplace = \"uk\""));
        assert!(toml_str.contains("KEEPA_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.max_items, 120);
        assert_eq!(parsed.fetch.concurrency, 8);
        assert_eq!(parsed.keepa.endpoint, "https://api.keepa.com");
    }

    #[test]
    fn config_with_filter_section() {
        let toml_str = r#"
[defaults]
marketplace = "de"
use_keepa = false

[filter]
include_terms = ["brew", "airlock"]
exclude_terms = ["reptile"]
rating_min = 3.8
reviews_min = 20
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.marketplace, Marketplace::De);
        assert!(!config.defaults.use_keepa);
        assert_eq!(config.defaults.max_items, 120);
        assert_eq!(config.filter.include_terms, vec!["brew", "airlock"]);
        assert_eq!(config.filter.rating_min, Some(3.8));
        assert_eq!(config.filter.reviews_min, Some(20));
        assert!(config.filter.price_min.is_none());
    }

    #[test]
    fn fetch_config_from_app_config() {
        let fetch = FetchConfig::from(&AppConfig::default());
        assert_eq!(fetch.concurrency, 8);
        assert_eq!(fetch.timeout_secs, 12);
        assert_eq!(fetch.max_attempts, 2);
    }

    #[test]
    fn load_config_from_file() {
        let dir = std::env::temp_dir().join(format!("asinscout-config-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[fetch]\nconcurrency = 3\n").unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.fetch.concurrency, 3);
        assert_eq!(config.fetch.timeout_secs, 12);

        std::fs::write(&path, "[fetch\n").unwrap();
        assert!(matches!(load_config_from(&path), Err(ScoutError::Config { .. })));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn api_key_absent_when_env_unset() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.keepa.api_key_env = "ASINSCOUT_TEST_NONEXISTENT_KEY_12345".into();
        assert!(resolve_api_key(&config).is_none());
    }
}
