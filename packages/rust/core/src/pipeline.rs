//! End-to-end `generate` pipeline:
//! INIT → DISCOVER → DEDUP → ENRICH → SCORE → FILTER → EXPORT.
//!
//! Only a zero limit or an unusable working directory aborts a run. Connector
//! and enricher failures are logged and demoted to "no results" or "no
//! enrichment" for that source alone.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use leadscout_shared::{Lead, LeadQuery, LeadscoutError, Result, Settings};
use leadscout_sources::{Enricher, SourceContext, SourceRegistry};
use leadscout_storage::CacheStore;

use crate::{export, filter, scoring};

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

/// Outcome of one connector during DISCOVER.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectorReport {
    pub name: String,
    pub leads: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Counters collected over one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub connectors: Vec<ConnectorReport>,
    /// Leads returned by all connectors before dedup.
    pub discovered: usize,
    /// Leads folded into an earlier lead with the same identity.
    pub duplicates_merged: usize,
    /// Leads dropped because an earlier run already exported them.
    pub already_seen: usize,
    /// Leads changed by at least one enricher.
    pub enriched: usize,
    pub enricher_failures: usize,
    pub returned: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exported_to: Option<PathBuf>,
    pub elapsed_ms: u64,
}

/// Ranked leads plus the run report.
#[derive(Debug, Clone)]
pub struct GenerateResult {
    pub leads: Vec<Lead>,
    pub report: RunReport,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called as each connector's results are collected.
    fn connector_finished(&self, name: &str, leads: usize);
    /// Called as each lead leaves the enrichers.
    fn lead_enriched(&self, current: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn connector_finished(&self, _name: &str, _leads: usize) {}
    fn lead_enriched(&self, _current: usize, _total: usize) {}
    fn done(&self, _report: &RunReport) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Orchestrates one or more `generate` runs over a fixed source registry.
#[derive(Debug, Clone)]
pub struct LeadPipeline {
    settings: Arc<Settings>,
    registry: SourceRegistry,
}

impl LeadPipeline {
    pub fn new(settings: Settings, registry: SourceRegistry) -> Self {
        Self {
            settings: Arc::new(settings),
            registry,
        }
    }

    /// Pipeline over every built-in connector and enricher.
    pub fn with_defaults(settings: Settings) -> Self {
        Self::new(settings, SourceRegistry::with_defaults())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Discover, enrich, rank, and export leads for an industry and location.
    pub async fn generate(
        &self,
        industry: &str,
        location: &str,
        limit: usize,
    ) -> Result<Vec<Lead>> {
        let query = LeadQuery::new(industry, location, limit)?;
        Ok(self.generate_with_report(&query, &SilentProgress).await?.leads)
    }

    /// [`generate`](Self::generate) with a run report and progress callbacks.
    #[instrument(
        skip_all,
        fields(industry = %query.industry, location = %query.location, limit = query.limit)
    )]
    pub async fn generate_with_report(
        &self,
        query: &LeadQuery,
        progress: &dyn ProgressReporter,
    ) -> Result<GenerateResult> {
        query.validate()?;
        let start = Instant::now();
        let mut report = RunReport::default();

        // --- INIT ---
        progress.phase("Initializing");
        let (ctx, mut seen) = self.init().await?;

        // --- DISCOVER ---
        progress.phase("Discovering leads");
        let mut batch = self.discover(query, &ctx, &mut report, progress).await;
        report.discovered = batch.len();
        for lead in &mut batch {
            lead.mark_discovered();
        }

        // --- DEDUP ---
        progress.phase("Deduplicating");
        let unique = dedup(batch, &seen, &mut report);
        info!(
            unique = unique.len(),
            merged = report.duplicates_merged,
            already_seen = report.already_seen,
            "dedup complete"
        );

        // --- ENRICH ---
        progress.phase("Enriching leads");
        let enriched = self.enrich(unique, &ctx, &mut report, progress).await;

        // Enrichment can give two leads the same identity, or an identity an
        // earlier run already exported.
        let mut leads = dedup(enriched, &seen, &mut report);

        // --- SCORE ---
        progress.phase("Scoring");
        scoring::score_all(&mut leads, query);

        // --- FILTER ---
        let selected = filter::select_leads(leads, self.settings.score_threshold, query.limit);
        report.returned = selected.len();

        // --- EXPORT ---
        progress.phase("Exporting");
        match export::write_batch(&self.settings.leads_dir(), query, &selected).await {
            Ok(path) => {
                if path.is_some() {
                    seen.extend(selected.iter().flat_map(Lead::known_hashes));
                }
                report.exported_to = path;
            }
            Err(e) => warn!(error = %e, "export failed, returning leads without archiving"),
        }

        report.elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            returned = report.returned,
            elapsed_ms = report.elapsed_ms,
            "generate complete"
        );
        progress.done(&report);

        Ok(GenerateResult {
            leads: selected,
            report,
        })
    }

    /// Create working directories, open the cache, and warm the seen-set.
    async fn init(&self) -> Result<(SourceContext, HashSet<String>)> {
        let settings = &self.settings;
        for dir in [settings.cache_dir(), settings.leads_dir()] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| LeadscoutError::io(&dir, e))?;
        }

        let cache = CacheStore::open(&settings.cache_path(), settings.default_cache_ttl()).await?;
        match cache.purge_expired().await {
            Ok(0) => {}
            Ok(purged) => debug!(purged, "purged expired cache entries"),
            Err(e) => warn!(error = %e, "cache purge failed"),
        }

        let seen = export::load_seen_hashes(&settings.leads_dir())
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "could not load seen-set, starting empty");
                HashSet::new()
            });

        let ctx = SourceContext::new(Arc::clone(&self.settings), cache)?;
        Ok((ctx, seen))
    }

    /// Run every configured connector concurrently; concatenate results in
    /// registration order.
    async fn discover(
        &self,
        query: &LeadQuery,
        ctx: &SourceContext,
        report: &mut RunReport,
        progress: &dyn ProgressReporter,
    ) -> Vec<Lead> {
        let mut handles = Vec::new();
        for connector in self.registry.connectors() {
            if !connector.is_configured(&self.settings) {
                debug!(connector = connector.name(), "not configured, skipping");
                continue;
            }
            let connector = Arc::clone(connector);
            let ctx = ctx.clone();
            let query = query.clone();
            let name = connector.name().to_string();
            let handle = tokio::spawn(async move { connector.fetch(&query, &ctx).await });
            handles.push((name, handle));
        }

        let mut batch = Vec::new();
        for (name, handle) in handles {
            let (leads, error) = match handle.await {
                Ok(Ok(leads)) => (leads, None),
                Ok(Err(e)) => {
                    warn!(connector = %name, error = %e, "connector failed");
                    (Vec::new(), Some(e.to_string()))
                }
                Err(e) => {
                    warn!(connector = %name, error = %e, "connector task aborted");
                    (Vec::new(), Some(format!("task aborted: {e}")))
                }
            };
            info!(connector = %name, leads = leads.len(), "connector finished");
            progress.connector_finished(&name, leads.len());
            report.connectors.push(ConnectorReport {
                name,
                leads: leads.len(),
                error,
            });
            batch.extend(leads);
        }
        batch
    }

    /// Run the enricher chain over every lead concurrently. A failing enricher
    /// leaves the lead as it was before that enricher.
    async fn enrich(
        &self,
        leads: Vec<Lead>,
        ctx: &SourceContext,
        report: &mut RunReport,
        progress: &dyn ProgressReporter,
    ) -> Vec<Lead> {
        let enrichers: Arc<Vec<Arc<dyn Enricher>>> = Arc::new(
            self.registry
                .enrichers()
                .iter()
                .filter(|e| e.is_configured(&self.settings))
                .cloned()
                .collect(),
        );
        if enrichers.is_empty() || leads.is_empty() {
            return leads;
        }

        let handles: Vec<_> = leads
            .into_iter()
            .map(|lead| {
                let enrichers = Arc::clone(&enrichers);
                let ctx = ctx.clone();
                let original = lead.clone();
                let handle = tokio::spawn(async move { enrich_one(lead, &enrichers, &ctx).await });
                (original, handle)
            })
            .collect();

        let total = handles.len();
        let mut out = Vec::with_capacity(total);
        for (i, (original, handle)) in handles.into_iter().enumerate() {
            match handle.await {
                Ok((lead, failures)) => {
                    report.enricher_failures += failures;
                    if lead != original {
                        report.enriched += 1;
                    }
                    out.push(lead);
                }
                Err(e) => {
                    let err = LeadscoutError::Enrichment(format!("enrichment task aborted: {e}"));
                    warn!(domain = %original.domain, error = %err, "keeping lead unenriched");
                    report.enricher_failures += 1;
                    out.push(original);
                }
            }
            progress.lead_enriched(i + 1, total);
        }
        info!(
            enriched = report.enriched,
            failures = report.enricher_failures,
            "enrichment complete"
        );
        out
    }
}

/// Apply each enricher in turn, returning the lead and the failure count.
async fn enrich_one(
    mut lead: Lead,
    enrichers: &[Arc<dyn Enricher>],
    ctx: &SourceContext,
) -> (Lead, usize) {
    let mut failures = 0;
    for enricher in enrichers {
        let before = lead.clone();
        lead = match enricher.enrich(lead, ctx).await {
            Ok(enriched) => enriched,
            Err(e) => {
                warn!(
                    enricher = enricher.name(),
                    domain = %before.domain,
                    error = %e,
                    "enricher failed"
                );
                failures += 1;
                before
            }
        };
    }
    (lead, failures)
}

/// Merge leads sharing an identity hash (first occurrence wins), then drop
/// leads known under any identity already in `seen`.
fn dedup(batch: Vec<Lead>, seen: &HashSet<String>, report: &mut RunReport) -> Vec<Lead> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<Lead> = Vec::new();

    for lead in batch {
        let hash = lead.identity_hash();
        match index.get(&hash) {
            Some(&i) => {
                unique[i].merge(lead);
                report.duplicates_merged += 1;
            }
            None => {
                index.insert(hash, unique.len());
                unique.push(lead);
            }
        }
    }

    let before = unique.len();
    unique.retain(|lead| lead.known_hashes().iter().all(|h| !seen.contains(h)));
    report.already_seen += before - unique.len();
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use leadscout_sources::Connector;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // --- Test doubles ---

    struct StaticConnector {
        name: &'static str,
        leads: Vec<Lead>,
    }

    #[async_trait]
    impl Connector for StaticConnector {
        fn name(&self) -> &str {
            self.name
        }
        fn is_configured(&self, _settings: &Settings) -> bool {
            true
        }
        async fn fetch(&self, _query: &LeadQuery, _ctx: &SourceContext) -> Result<Vec<Lead>> {
            Ok(self.leads.clone())
        }
    }

    struct FailingConnector;

    #[async_trait]
    impl Connector for FailingConnector {
        fn name(&self) -> &str {
            "failing"
        }
        fn is_configured(&self, _settings: &Settings) -> bool {
            true
        }
        async fn fetch(&self, _query: &LeadQuery, _ctx: &SourceContext) -> Result<Vec<Lead>> {
            Err(LeadscoutError::Network("upstream exploded".into()))
        }
    }

    struct UnconfiguredConnector {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Connector for UnconfiguredConnector {
        fn name(&self) -> &str {
            "unconfigured"
        }
        fn is_configured(&self, _settings: &Settings) -> bool {
            false
        }
        async fn fetch(&self, _query: &LeadQuery, _ctx: &SourceContext) -> Result<Vec<Lead>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Lead::new("Ghost", Some("ghost.com"), "unconfigured")])
        }
    }

    struct FailingEnricher;

    #[async_trait]
    impl Enricher for FailingEnricher {
        fn name(&self) -> &str {
            "failing_enricher"
        }
        fn is_configured(&self, _settings: &Settings) -> bool {
            true
        }
        async fn enrich(&self, _lead: Lead, _ctx: &SourceContext) -> Result<Lead> {
            Err(LeadscoutError::Enrichment("lookup failed".into()))
        }
    }

    struct PhoneEnricher;

    #[async_trait]
    impl Enricher for PhoneEnricher {
        fn name(&self) -> &str {
            "phone"
        }
        fn is_configured(&self, _settings: &Settings) -> bool {
            true
        }
        async fn enrich(&self, mut lead: Lead, _ctx: &SourceContext) -> Result<Lead> {
            if lead.phone.is_none() {
                lead.phone = Some("555-0100".into());
            }
            Ok(lead)
        }
    }

    struct InfoEmailEnricher;

    #[async_trait]
    impl Enricher for InfoEmailEnricher {
        fn name(&self) -> &str {
            "info_email"
        }
        fn is_configured(&self, _settings: &Settings) -> bool {
            true
        }
        async fn enrich(&self, mut lead: Lead, _ctx: &SourceContext) -> Result<Lead> {
            if lead.email.is_none() {
                let email = format!("info@{}", lead.domain);
                lead.add_email(&email);
            }
            Ok(lead)
        }
    }

    // --- Helpers ---

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.output_dir = std::env::temp_dir().join(format!("ls_pipeline_{}", Uuid::now_v7()));
        settings
    }

    fn lead(name: &str, domain: &str, source: &str, tag: &str) -> Lead {
        let mut lead = Lead::new(name, Some(domain), source);
        lead.tags.insert(tag.into());
        lead
    }

    fn registry(
        connectors: Vec<Arc<dyn Connector>>,
        enrichers: Vec<Arc<dyn Enricher>>,
    ) -> SourceRegistry {
        let mut registry = SourceRegistry::new();
        for c in connectors {
            registry.register_connector(c);
        }
        for e in enrichers {
            registry.register_enricher(e);
        }
        registry
    }

    fn query(limit: usize) -> LeadQuery {
        LeadQuery::new("dentist", "Austin, TX", limit).unwrap()
    }

    // --- Tests ---

    #[tokio::test]
    async fn zero_limit_is_fatal() {
        let pipeline = LeadPipeline::new(settings(), SourceRegistry::new());
        let err = pipeline.generate("dentist", "Austin", 0).await.unwrap_err();
        assert!(matches!(err, LeadscoutError::Validation { .. }));
        assert!(!pipeline.settings().output_dir.exists());
    }

    #[tokio::test]
    async fn unwritable_output_dir_is_fatal() {
        let blocker = std::env::temp_dir().join(format!("ls_blocker_{}", Uuid::now_v7()));
        std::fs::File::create(&blocker).unwrap().write_all(b"x").unwrap();

        let mut settings = settings();
        settings.output_dir = blocker.join("nested");
        let pipeline = LeadPipeline::new(settings, SourceRegistry::new());
        let err = pipeline.generate("dentist", "Austin", 5).await.unwrap_err();
        assert!(matches!(err, LeadscoutError::Io { .. }));
    }

    #[tokio::test]
    async fn same_domain_from_two_connectors_merges_tags() {
        let registry = registry(
            vec![
                Arc::new(StaticConnector {
                    name: "alpha",
                    leads: vec![lead("Smile Dental", "https://smiledental.com", "alpha", "alpha")],
                }),
                Arc::new(StaticConnector {
                    name: "beta",
                    leads: vec![lead("Smile Dental LLC", "www.smiledental.com", "beta", "beta")],
                }),
            ],
            Vec::new(),
        );
        let pipeline = LeadPipeline::new(settings(), registry);

        let result = pipeline.generate_with_report(&query(10), &SilentProgress).await.unwrap();
        assert_eq!(result.leads.len(), 1);
        let merged = &result.leads[0];
        assert_eq!(merged.name, "Smile Dental");
        assert!(merged.tags.contains("alpha") && merged.tags.contains("beta"));
        assert_eq!(result.report.discovered, 2);
        assert_eq!(result.report.duplicates_merged, 1);
    }

    #[tokio::test]
    async fn failing_connector_is_isolated() {
        let registry = registry(
            vec![
                Arc::new(FailingConnector),
                Arc::new(StaticConnector {
                    name: "ok",
                    leads: vec![lead("A", "a.com", "ok", "ok"), lead("B", "b.com", "ok", "ok")],
                }),
            ],
            Vec::new(),
        );
        let pipeline = LeadPipeline::new(settings(), registry);

        let result = pipeline.generate_with_report(&query(10), &SilentProgress).await.unwrap();
        assert_eq!(result.leads.len(), 2);
        assert_eq!(result.report.connectors[0].name, "failing");
        assert!(result.report.connectors[0].error.is_some());
        assert_eq!(result.report.connectors[1].leads, 2);
    }

    #[tokio::test]
    async fn unconfigured_connector_is_never_called() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = registry(
            vec![Arc::new(UnconfiguredConnector {
                calls: Arc::clone(&calls),
            })],
            Vec::new(),
        );
        let pipeline = LeadPipeline::new(settings(), registry);

        let leads = pipeline.generate("dentist", "", 5).await.unwrap();
        assert!(leads.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failing_enricher_passes_lead_through() {
        let registry = registry(
            vec![Arc::new(StaticConnector {
                name: "ok",
                leads: vec![lead("A", "a.com", "ok", "ok")],
            })],
            vec![Arc::new(FailingEnricher), Arc::new(PhoneEnricher)],
        );
        let pipeline = LeadPipeline::new(settings(), registry);

        let result = pipeline.generate_with_report(&query(5), &SilentProgress).await.unwrap();
        assert_eq!(result.leads.len(), 1);
        assert_eq!(result.leads[0].phone.as_deref(), Some("555-0100"));
        assert_eq!(result.report.enricher_failures, 1);
        assert_eq!(result.report.enriched, 1);
    }

    #[tokio::test]
    async fn below_threshold_falls_back_to_top_limit() {
        let leads = (0..4)
            .map(|i| lead(&format!("Biz {i}"), &format!("biz{i}.com"), "ok", "ok"))
            .collect();
        let registry = registry(vec![Arc::new(StaticConnector { name: "ok", leads })], Vec::new());
        let pipeline = LeadPipeline::new(settings(), registry);

        // Bare leads score 0.1, under the 0.35 threshold
        let leads = pipeline.generate("dentist", "Austin", 2).await.unwrap();
        assert_eq!(leads.len(), 2);
        assert_eq!(leads[0].name, "Biz 0");
        assert!(leads.iter().all(|l| (l.score - 0.1).abs() < 1e-9));
    }

    #[tokio::test]
    async fn exported_leads_are_not_exported_again() {
        let registry = registry(
            vec![Arc::new(StaticConnector {
                name: "ok",
                leads: vec![lead("A", "a.com", "ok", "ok"), lead("B", "b.com", "ok", "ok")],
            })],
            Vec::new(),
        );
        let pipeline = LeadPipeline::new(settings(), registry);

        let first = pipeline.generate_with_report(&query(5), &SilentProgress).await.unwrap();
        let exported = first.report.exported_to.clone().expect("first run exports");
        let batch_dir = pipeline.settings().leads_dir().join("dentist").join("austin-tx");
        assert!(exported.starts_with(batch_dir));
        assert_eq!(first.leads.len(), 2);

        let second = pipeline.generate_with_report(&query(5), &SilentProgress).await.unwrap();
        assert!(second.leads.is_empty());
        assert_eq!(second.report.already_seen, 2);
        assert!(second.report.exported_to.is_none());
    }

    #[tokio::test]
    async fn lead_enriched_with_email_is_not_exported_again() {
        let registry = registry(
            vec![Arc::new(StaticConnector {
                name: "ok",
                leads: vec![lead("A", "a.com", "ok", "ok")],
            })],
            vec![Arc::new(InfoEmailEnricher)],
        );
        let pipeline = LeadPipeline::new(settings(), registry);

        let first = pipeline.generate_with_report(&query(5), &SilentProgress).await.unwrap();
        assert_eq!(first.leads.len(), 1);
        assert_eq!(first.leads[0].email.as_deref(), Some("info@a.com"));
        assert!(first.report.exported_to.is_some());

        let second = pipeline.generate_with_report(&query(5), &SilentProgress).await.unwrap();
        assert!(second.leads.is_empty());
        assert_eq!(second.report.already_seen, 1);
        assert!(second.report.exported_to.is_none());
    }

    #[tokio::test]
    async fn leads_converging_after_enrichment_are_merged() {
        let mut with_email = lead("A Dental", "a.com", "beta", "beta");
        with_email.add_email("info@a.com");
        let registry = registry(
            vec![
                Arc::new(StaticConnector {
                    name: "alpha",
                    leads: vec![lead("A", "a.com", "alpha", "alpha")],
                }),
                Arc::new(StaticConnector {
                    name: "beta",
                    leads: vec![with_email],
                }),
            ],
            vec![Arc::new(InfoEmailEnricher)],
        );
        let pipeline = LeadPipeline::new(settings(), registry);

        let result = pipeline.generate_with_report(&query(5), &SilentProgress).await.unwrap();
        assert_eq!(result.leads.len(), 1);
        let merged = &result.leads[0];
        assert_eq!(merged.name, "A");
        assert!(merged.tags.contains("alpha") && merged.tags.contains("beta"));
        assert_eq!(result.report.duplicates_merged, 1);

        let hashes: HashSet<String> = result.leads.iter().map(Lead::identity_hash).collect();
        assert_eq!(hashes.len(), result.leads.len());
    }

    #[tokio::test]
    async fn dataset_lead_keeps_record_website_as_domain() {
        let dataset = std::env::temp_dir().join(format!("ls_pipeline_ds_{}.jsonl", Uuid::now_v7()));
        let mut file = std::fs::File::create(&dataset).unwrap();
        writeln!(
            file,
            r#"{{"name":"Smile Dental","website":"https://www.SmileDental.com/","categories":"Dentists","city":"Austin","state":"TX"}}"#
        )
        .unwrap();
        writeln!(
            file,
            r#"{{"name":"Taco Stand","website":"tacostand.com","categories":"Restaurants","city":"Austin","state":"TX"}}"#
        )
        .unwrap();
        writeln!(
            file,
            r#"{{"name":"Rose City Dental","website":"rosecitydental.com","categories":"Dentists","city":"Portland","state":"OR"}}"#
        )
        .unwrap();

        let mut settings = settings();
        settings.dataset_path = Some(dataset);
        let registry = registry(vec![Arc::new(leadscout_sources::DatasetConnector)], Vec::new());
        let pipeline = LeadPipeline::new(settings, registry);

        let leads = pipeline.generate("dentist", "Austin, TX", 1).await.unwrap();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].domain, "smiledental.com");
        assert_eq!(leads[0].name, "Smile Dental");
    }

    #[tokio::test]
    async fn end_to_end_with_dataset_and_contact_crawl() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/contact"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<a href="mailto:hello@smiledental.com">Email</a> sales@smiledental.com"#,
            ))
            .mount(&server)
            .await;

        let mut settings = settings();
        let dataset = std::env::temp_dir().join(format!("ls_pipeline_ds_{}.jsonl", Uuid::now_v7()));
        let mut file = std::fs::File::create(&dataset).unwrap();
        writeln!(
            file,
            r#"{{"name":"Smile Dental","categories":"Dentists","city":"Austin","state":"TX","phone":"512-555-0100","stars":4.0}}"#
        )
        .unwrap();
        writeln!(
            file,
            r#"{{"name":"Taco Stand","categories":"Restaurants","city":"Austin"}}"#
        )
        .unwrap();
        settings.dataset_path = Some(dataset);
        settings.contact_paths = vec!["contact".into()];

        // Dataset leads get placeholder domains; point one at the mock site.
        struct Retarget {
            domain: String,
        }
        #[async_trait]
        impl Enricher for Retarget {
            fn name(&self) -> &str {
                "retarget"
            }
            fn is_configured(&self, _settings: &Settings) -> bool {
                true
            }
            async fn enrich(&self, mut lead: Lead, _ctx: &SourceContext) -> Result<Lead> {
                lead.domain = self.domain.clone();
                Ok(lead)
            }
        }

        let registry = registry(
            vec![Arc::new(leadscout_sources::DatasetConnector)],
            vec![
                Arc::new(Retarget {
                    domain: server.address().to_string(),
                }),
                Arc::new(leadscout_sources::ContactCrawler::with_scheme("http")),
            ],
        );
        let pipeline = LeadPipeline::new(settings, registry);

        let leads = pipeline.generate("dentist", "Austin", 5).await.unwrap();
        assert_eq!(leads.len(), 1);
        let lead = &leads[0];
        assert_eq!(lead.name, "Smile Dental");
        assert_eq!(lead.email.as_deref(), Some("hello@smiledental.com"));
        assert!(lead.has_secondary_emails());
        // 0.1 + 0.45 + 0.15 + 0.1 + 0.05 * 0.8
        assert!((lead.score - 0.84).abs() < 1e-9);
        assert!((lead.confidence - 0.94).abs() < 1e-9);
    }
}
