//! Pluggable lead sources for leadscout.
//!
//! A [`Connector`] discovers candidate leads for a query; an [`Enricher`]
//! fills in missing fields on one lead. Both run against a shared
//! [`SourceContext`] and are held in a name-keyed [`SourceRegistry`].

pub mod connectors;
pub mod enrichers;
pub mod extract;
pub mod keywords;

use std::sync::Arc;

use async_trait::async_trait;

use leadscout_http::HttpClient;
use leadscout_shared::{Lead, LeadQuery, LeadscoutError, Result, Settings};
use leadscout_storage::CacheStore;

pub use connectors::{DatasetConnector, DirectoryConnector, OrganizationSearch, PeopleSearch};
pub use enrichers::ContactCrawler;

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Run-scoped collaborators handed to every connector and enricher.
#[derive(Clone)]
pub struct SourceContext {
    pub settings: Arc<Settings>,
    pub cache: CacheStore,
    pub http: Arc<HttpClient>,
}

impl SourceContext {
    /// Build a context whose HTTP client shares `cache`.
    pub fn new(settings: Arc<Settings>, cache: CacheStore) -> Result<Self> {
        let http = HttpClient::new(&settings, cache.clone())?;
        Ok(Self {
            settings,
            cache,
            http: Arc::new(http),
        })
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// A discovery source.
///
/// `fetch` may return any number of leads, possibly duplicates; it should
/// degrade to an empty list rather than error on upstream trouble.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Stable identifier, also used as the lead `source`.
    fn name(&self) -> &str;

    /// Whether the settings carry everything this connector needs.
    fn is_configured(&self, settings: &Settings) -> bool;

    async fn fetch(&self, query: &LeadQuery, ctx: &SourceContext) -> Result<Vec<Lead>>;
}

/// A per-lead augmentation step.
///
/// `enrich` returns the (possibly unchanged) lead and must never clear a
/// populated field.
#[async_trait]
pub trait Enricher: Send + Sync {
    fn name(&self) -> &str;

    fn is_configured(&self, settings: &Settings) -> bool;

    async fn enrich(&self, lead: Lead, ctx: &SourceContext) -> Result<Lead>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Connectors and enrichers in registration order.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    connectors: Vec<Arc<dyn Connector>>,
    enrichers: Vec<Arc<dyn Enricher>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in source. Organization search is registered both as a
    /// connector and as an enricher.
    pub fn with_defaults() -> Self {
        let org = Arc::new(OrganizationSearch);
        let mut registry = Self::new();
        registry
            .register_connector(Arc::new(DatasetConnector))
            .register_connector(Arc::new(DirectoryConnector))
            .register_connector(Arc::new(PeopleSearch))
            .register_connector(org.clone())
            .register_enricher(org)
            .register_enricher(Arc::new(ContactCrawler::new()));
        registry
    }

    pub fn register_connector(&mut self, connector: Arc<dyn Connector>) -> &mut Self {
        self.connectors.push(connector);
        self
    }

    pub fn register_enricher(&mut self, enricher: Arc<dyn Enricher>) -> &mut Self {
        self.enrichers.push(enricher);
        self
    }

    pub fn connectors(&self) -> &[Arc<dyn Connector>] {
        &self.connectors
    }

    pub fn enrichers(&self) -> &[Arc<dyn Enricher>] {
        &self.enrichers
    }

    pub fn connector(&self, name: &str) -> Option<Arc<dyn Connector>> {
        self.connectors.iter().find(|c| c.name() == name).cloned()
    }

    pub fn enricher(&self, name: &str) -> Option<Arc<dyn Enricher>> {
        self.enrichers.iter().find(|e| e.name() == name).cloned()
    }

    pub fn connector_names(&self) -> Vec<String> {
        self.connectors.iter().map(|c| c.name().to_string()).collect()
    }

    /// Narrow the connector set to `names`, keeping registration order.
    /// Enrichers are untouched. Unknown names are rejected.
    pub fn retain<S: AsRef<str>>(&mut self, names: &[S]) -> Result<()> {
        let known = self.connector_names();
        if let Some(unknown) = names
            .iter()
            .map(AsRef::as_ref)
            .find(|n| !known.iter().any(|k| k.as_str() == *n))
        {
            return Err(LeadscoutError::validation(format!(
                "unknown source '{unknown}' (available: {})",
                known.join(", ")
            )));
        }
        self.connectors
            .retain(|c| names.iter().any(|n| n.as_ref() == c.name()));
        Ok(())
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("connectors", &self.connector_names())
            .field(
                "enrichers",
                &self.enrichers.iter().map(|e| e.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
