//! Shared types, error model, and configuration for asinscout.
//!
//! This crate is the foundation depended on by all other asinscout crates.
//! It provides:
//! - [`ScoutError`]: the unified error type
//! - Domain types ([`Asin`], [`Marketplace`], [`ProductSnapshot`], [`FilterCriteria`])
//! - Configuration ([`AppConfig`], [`FetchConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, FetchConfig, FetchPolicyConfig, KeepaConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, resolve_api_key,
};
pub use error::{FetchErrorKind, Result, ScoutError};
pub use types::{
    Asin, DropReason, FilterCriteria, Marketplace, ProductSnapshot, RelationResult, RunId,
    ScoredSnapshot, SourceKind,
};
