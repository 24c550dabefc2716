//! Application configuration for leadscout.
//!
//! User config lives at `~/.leadscout/leadscout.toml`.
//! CLI flags override config file values, which override defaults.
//! API keys are never written to the file; each section names the
//! environment variable that holds its key.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LeadscoutError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "leadscout.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".leadscout";

// ---------------------------------------------------------------------------
// Config structs (matching leadscout.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub dataset: DatasetConfig,

    #[serde(default)]
    pub directory: DirectoryConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    #[serde(default)]
    pub keywords: KeywordsConfig,

    #[serde(default)]
    pub contact: ContactConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Root for the lead archive and cache database.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Minimum score a lead needs to pass the filter.
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            score_threshold: default_score_threshold(),
        }
    }
}

fn default_output_dir() -> String {
    "var".into()
}
fn default_score_threshold() -> f64 {
    0.35
}

/// `[http]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// In-flight request permits shared by the whole client.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Tries per request on transport failure.
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Linear backoff unit; the n-th retry sleeps `n * backoff_base_ms`.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// TTL applied to cached responses when the caller gives none.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            attempts: default_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            timeout_secs: default_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_max_concurrency() -> usize {
    5
}
fn default_attempts() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    500
}
fn default_timeout_secs() -> u64 {
    20
}
fn default_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}

/// `[dataset]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Line-delimited JSON business records. Connector is disabled when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// `[directory]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Listing URL templates with `{industry}` / `{location}` placeholders.
    #[serde(default = "default_url_templates")]
    pub url_templates: Vec<String>,

    /// Headless-render service endpoint (POST `{"url": ...}` → HTML).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_endpoint: Option<String>,

    /// Remote render proxy endpoint (GET `?api_key=&url=&render=true`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_endpoint: Option<String>,

    #[serde(default = "default_proxy_api_key_env")]
    pub proxy_api_key_env: String,

    #[serde(default = "default_render_timeout_secs")]
    pub render_timeout_secs: u64,

    #[serde(default = "default_proxy_timeout_secs")]
    pub proxy_timeout_secs: u64,

    #[serde(default = "default_plain_timeout_secs")]
    pub plain_timeout_secs: u64,

    /// Candidates kept per run after ranking.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            url_templates: default_url_templates(),
            render_endpoint: None,
            proxy_endpoint: None,
            proxy_api_key_env: default_proxy_api_key_env(),
            render_timeout_secs: default_render_timeout_secs(),
            proxy_timeout_secs: default_proxy_timeout_secs(),
            plain_timeout_secs: default_plain_timeout_secs(),
            top_n: default_top_n(),
        }
    }
}

fn default_url_templates() -> Vec<String> {
    vec![
        "https://www.yellowpages.com/search?search_terms={industry}&geo_location_terms={location}"
            .into(),
        "https://www.yelp.com/search?find_desc={industry}&find_loc={location}".into(),
        "https://www.manta.com/search?search={industry}&context={location}".into(),
    ]
}
fn default_proxy_api_key_env() -> String {
    "SCRAPER_PROXY_API_KEY".into()
}
fn default_render_timeout_secs() -> u64 {
    25
}
fn default_proxy_timeout_secs() -> u64 {
    20
}
fn default_plain_timeout_secs() -> u64 {
    15
}
fn default_top_n() -> usize {
    15
}

/// `[search]` section: the people / organization search API family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_base_url")]
    pub base_url: String,

    #[serde(default = "default_search_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_per_page")]
    pub per_page: u32,

    /// Upper bound on pages requested per fetch.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: default_search_base_url(),
            api_key_env: default_search_api_key_env(),
            per_page: default_per_page(),
            max_pages: default_max_pages(),
        }
    }
}

fn default_search_base_url() -> String {
    "https://api.apollo.io/v1".into()
}
fn default_search_api_key_env() -> String {
    "APOLLO_API_KEY".into()
}
fn default_per_page() -> u32 {
    25
}
fn default_max_pages() -> u32 {
    5
}

/// `[openrouter]` section: optional keyword expansion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_openrouter_base_url")]
    pub base_url: String,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            default_model: default_model(),
            base_url: default_openrouter_base_url(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_openrouter_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}

/// `[keywords]` section: fallback synonym table used without an LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordsConfig {
    #[serde(default = "default_fallback_keywords")]
    pub fallback: BTreeMap<String, Vec<String>>,
}

impl Default for KeywordsConfig {
    fn default() -> Self {
        Self {
            fallback: default_fallback_keywords(),
        }
    }
}

fn default_fallback_keywords() -> BTreeMap<String, Vec<String>> {
    let table: [(&str, &[&str]); 8] = [
        ("dentist", &["dentist", "dental", "orthodont", "endodont", "oral surgeon", "periodont"]),
        ("plumber", &["plumb", "drain", "water heater", "pipe", "sewer"]),
        ("restaurant", &["restaurant", "food", "diner", "bistro", "cafe", "grill", "eatery"]),
        ("lawyer", &["lawyer", "attorney", "law firm", "legal", "paralegal"]),
        ("gym", &["gym", "fitness", "health club", "crossfit", "personal trainer"]),
        ("salon", &["salon", "hair", "barber", "beauty", "nail"]),
        ("accountant", &["accountant", "accounting", "cpa", "bookkeep", "tax"]),
        ("roofer", &["roof", "gutter", "shingle", "contractor"]),
    ];
    table
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
        .collect()
}

/// `[contact]` section: website contact crawler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactConfig {
    /// Paths probed under `https://{domain}`, in order.
    #[serde(default = "default_contact_paths")]
    pub paths: Vec<String>,
}

impl Default for ContactConfig {
    fn default() -> Self {
        Self {
            paths: default_contact_paths(),
        }
    }
}

fn default_contact_paths() -> Vec<String> {
    ["", "contact", "contact-us", "about", "about-us", "team", "support", "help"]
        .into_iter()
        .map(String::from)
        .collect()
}

// ---------------------------------------------------------------------------
// Settings (runtime, resolved once from config + env)
// ---------------------------------------------------------------------------

/// Immutable runtime settings threaded through every connector and enricher.
#[derive(Debug, Clone)]
pub struct Settings {
    pub output_dir: PathBuf,
    pub score_threshold: f64,
    pub http: HttpConfig,
    pub dataset_path: Option<PathBuf>,
    pub directory: DirectoryConfig,
    pub proxy_api_key: Option<String>,
    pub search: SearchConfig,
    pub search_api_key: Option<String>,
    pub openrouter: OpenRouterConfig,
    pub openrouter_api_key: Option<String>,
    pub fallback_keywords: BTreeMap<String, Vec<String>>,
    pub contact_paths: Vec<String>,
}

impl Settings {
    /// Resolve settings, reading API keys from the env vars the config names.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut settings = Self::without_secrets(config);
        settings.proxy_api_key = read_env(&config.directory.proxy_api_key_env);
        settings.search_api_key = read_env(&config.search.api_key_env);
        settings.openrouter_api_key = read_env(&config.openrouter.api_key_env);
        settings
    }

    /// Settings with every API key unset.
    pub fn without_secrets(config: &AppConfig) -> Self {
        Self {
            output_dir: PathBuf::from(&config.defaults.output_dir),
            score_threshold: config.defaults.score_threshold,
            http: config.http.clone(),
            dataset_path: config.dataset.path.as_ref().map(PathBuf::from),
            directory: config.directory.clone(),
            proxy_api_key: None,
            search: config.search.clone(),
            search_api_key: None,
            openrouter: config.openrouter.clone(),
            openrouter_api_key: None,
            fallback_keywords: config.keywords.fallback.clone(),
            contact_paths: config.contact.paths.clone(),
        }
    }

    /// Directory holding the cache database.
    pub fn cache_dir(&self) -> PathBuf {
        self.output_dir.join("cache")
    }

    /// Path of the cache database file.
    pub fn cache_path(&self) -> PathBuf {
        self.cache_dir().join("leadscout-cache.db")
    }

    /// Root of the exported lead archive.
    pub fn leads_dir(&self) -> PathBuf {
        self.output_dir.join("leads")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }

    pub fn default_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.http.cache_ttl_secs)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::without_secrets(&AppConfig::default())
    }
}

fn read_env(var_name: &str) -> Option<String> {
    std::env::var(var_name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.leadscout/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LeadscoutError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.leadscout/leadscout.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| LeadscoutError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        LeadscoutError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LeadscoutError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LeadscoutError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LeadscoutError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
