//! Shared types, error model, and configuration for leadscout.
//!
//! This crate is the foundation depended on by all other leadscout crates.
//! It provides:
//! - [`LeadscoutError`]: the unified error type
//! - Domain types ([`Lead`], [`LeadQuery`], [`CacheEntry`], [`HttpResult`])
//! - Configuration ([`AppConfig`], runtime [`Settings`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ContactConfig, DatasetConfig, DefaultsConfig, DirectoryConfig, HttpConfig,
    KeywordsConfig, OpenRouterConfig, SearchConfig, Settings, config_dir, config_file_path,
    init_config, load_config, load_config_from,
};
pub use error::{LeadscoutError, Result};
pub use types::{
    CacheEntry, DISCOVERY_HASHES_KEY, HttpResult, Lead, LeadQuery, PLACEHOLDER_SUFFIX,
    normalize_domain, placeholder_domain, sha256_hex, slugify,
};
