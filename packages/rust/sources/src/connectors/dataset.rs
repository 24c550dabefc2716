//! Local business dataset connector.
//!
//! Streams a line-delimited JSON file and keeps records whose categories
//! match the expanded industry keywords and whose address matches the
//! location terms. Scanning stops once `3 × limit` matches are collected.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, instrument, warn};

use leadscout_shared::{Lead, LeadQuery, LeadscoutError, Result, Settings, normalize_domain};

use super::directory::is_third_party_host;
use crate::keywords::expand_industry;
use crate::{Connector, SourceContext};

const NAME: &str = "dataset";

/// Candidates gathered per requested lead before the scan stops.
const SCAN_MULTIPLIER: usize = 3;

/// One line of the dataset file. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatasetRecord {
    #[serde(default)]
    pub business_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    /// Either a directory listing page or, when `website` is absent, the
    /// business's own site.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub categories: Option<Categories>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub stars: Option<f64>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub review_count: Option<u64>,
}

/// Category labels: a comma-separated string or an array of labels.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Categories {
    Joined(String),
    List(Vec<String>),
}

impl DatasetRecord {
    /// Lowercased, trimmed category labels.
    pub fn category_tokens(&self) -> Vec<String> {
        let labels: Vec<&str> = match &self.categories {
            Some(Categories::Joined(s)) => s.split(',').collect(),
            Some(Categories::List(items)) => items.iter().flat_map(|s| s.split(',')).collect(),
            None => Vec::new(),
        };
        labels
            .into_iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// A keyword matches a token by substring, or as a prefix-stem of it
    /// ("dentistry" keyword vs "dentist" token).
    pub fn matches_industry(&self, keywords: &[String]) -> bool {
        let tokens = self.category_tokens();
        tokens.iter().any(|token| {
            keywords.iter().any(|kw| {
                token.contains(kw.as_str()) || (token.len() >= 4 && kw.starts_with(token.as_str()))
            })
        })
    }

    /// Any term contained in city, state, or postal code. No terms matches all.
    pub fn matches_location(&self, terms: &[String]) -> bool {
        if terms.is_empty() {
            return true;
        }
        let fields: Vec<String> = [&self.city, &self.state, &self.postal_code]
            .into_iter()
            .flatten()
            .map(|f| f.to_lowercase())
            .collect();
        terms
            .iter()
            .any(|term| fields.iter().any(|f| f.contains(term.as_str())))
    }

    fn into_lead(self) -> Option<Lead> {
        let name = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty())?.to_string();
        let url = self.url.clone().filter(|u| !u.trim().is_empty());
        let url_is_listing = url
            .as_deref()
            .and_then(normalize_domain)
            .is_some_and(|host| is_third_party_host(&host));
        let website = self
            .website
            .as_deref()
            .filter(|w| !w.trim().is_empty())
            .or(url.as_deref().filter(|_| !url_is_listing));
        let mut lead = Lead::new(name, website, NAME);

        let location = [self.city.as_deref(), self.state.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", ");
        if !location.is_empty() {
            lead.location = Some(location);
        }

        let categories = self.category_tokens();
        if !categories.is_empty() {
            lead.industry = Some(categories.join(", "));
        }
        lead.description = self.description.filter(|d| !d.trim().is_empty());
        lead.phone = self.phone.filter(|p| !p.trim().is_empty());

        if let Some(rating) = self.rating.or(self.stars) {
            lead.metadata.insert("rating".into(), serde_json::json!(rating));
        }
        if let Some(count) = self.review_count {
            lead.metadata.insert("review_count".into(), serde_json::json!(count));
        }
        if let Some(id) = self.business_id {
            lead.metadata.insert("business_id".into(), serde_json::json!(id));
        }
        if let Some(address) = self.address.filter(|a| !a.trim().is_empty()) {
            lead.metadata.insert("address".into(), serde_json::json!(address));
        }
        if let Some(url) = url.filter(|_| url_is_listing) {
            lead.profile_urls.insert("listing".into(), url);
        }
        lead.tags.insert(NAME.into());
        Some(lead)
    }
}

/// Scans the `[dataset] path` file.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatasetConnector;

#[async_trait]
impl Connector for DatasetConnector {
    fn name(&self) -> &str {
        NAME
    }

    fn is_configured(&self, settings: &Settings) -> bool {
        settings.dataset_path.is_some()
    }

    #[instrument(skip_all, fields(connector = NAME, industry = %query.industry))]
    async fn fetch(&self, query: &LeadQuery, ctx: &SourceContext) -> Result<Vec<Lead>> {
        let Some(path) = ctx.settings.dataset_path.clone() else {
            return Ok(Vec::new());
        };

        let keywords = expand_industry(&query.industry, ctx).await;
        let terms = query.location_terms();
        let cap = query.limit.saturating_mul(SCAN_MULTIPLIER);

        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| LeadscoutError::io(&path, e))?;
        let mut lines = BufReader::new(file).lines();

        let mut leads = Vec::new();
        let mut scanned = 0usize;
        let mut malformed = 0usize;

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, scanned, "dataset read failed, keeping matches so far");
                    break;
                }
            };
            scanned += 1;

            if line.trim().is_empty() {
                continue;
            }
            let record: DatasetRecord = match serde_json::from_str(&line) {
                Ok(r) => r,
                Err(e) => {
                    malformed += 1;
                    debug!(line = scanned, error = %e, "skipping malformed record");
                    continue;
                }
            };

            if !record.matches_industry(&keywords) || !record.matches_location(&terms) {
                continue;
            }
            if let Some(lead) = record.into_lead() {
                leads.push(lead);
                if leads.len() >= cap {
                    debug!(scanned, "scan cap reached");
                    break;
                }
            }
        }

        info!(scanned, malformed, leads = leads.len(), "dataset scan complete");
        Ok(leads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use leadscout_storage::CacheStore;
    use uuid::Uuid;

    fn record(json: serde_json::Value) -> DatasetRecord {
        serde_json::from_value(json).unwrap()
    }

    fn write_dataset(lines: &[String]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("ls_dataset_{}.jsonl", Uuid::now_v7()));
        let mut file = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        path
    }

    async fn ctx(dataset: PathBuf) -> SourceContext {
        let mut settings = Settings::default();
        settings.dataset_path = Some(dataset);
        let db = std::env::temp_dir().join(format!("ls_dataset_cache_{}.db", Uuid::now_v7()));
        let cache = CacheStore::open(&db, Duration::from_secs(60)).await.unwrap();
        SourceContext::new(Arc::new(settings), cache).unwrap()
    }

    #[test]
    fn industry_matching_by_substring_and_stem() {
        let r = record(serde_json::json!({ "categories": "Health & Medical, General Dentistry" }));
        assert!(r.matches_industry(&["dentist".into()]));

        let stem = record(serde_json::json!({ "categories": ["Dent"] }));
        assert!(stem.matches_industry(&["dentist".into()]));

        let short = record(serde_json::json!({ "categories": "Den" }));
        assert!(!short.matches_industry(&["dentist".into()]));

        let none = record(serde_json::json!({ "name": "x" }));
        assert!(!none.matches_industry(&["dentist".into()]));
    }

    #[test]
    fn location_matching() {
        let r = record(serde_json::json!({
            "city": "Austin",
            "state": "TX",
            "postal_code": "78701"
        }));
        assert!(r.matches_location(&[]));
        assert!(r.matches_location(&["austin".into(), "tx".into()]));
        assert!(r.matches_location(&["787".into()]));
        assert!(!r.matches_location(&["dallas".into()]));
    }

    #[test]
    fn record_maps_to_lead() {
        let lead = record(serde_json::json!({
            "business_id": "b1",
            "name": "Smile Dental",
            "website": "https://www.smiledental.com/",
            "phone": "512-555-0100",
            "city": "Austin",
            "state": "TX",
            "categories": "Dentists, General Dentistry",
            "stars": 4.5,
            "review_count": 87
        }))
        .into_lead()
        .unwrap();

        assert_eq!(lead.domain, "smiledental.com");
        assert_eq!(lead.location.as_deref(), Some("Austin, TX"));
        assert_eq!(lead.industry.as_deref(), Some("dentists, general dentistry"));
        assert_eq!(lead.metadata["rating"], serde_json::json!(4.5));
        assert_eq!(lead.source, "dataset");

        let nameless = record(serde_json::json!({ "website": "x.com" }));
        assert!(nameless.into_lead().is_none());
    }

    #[test]
    fn url_is_website_unless_it_is_a_listing() {
        let own_site = record(serde_json::json!({
            "name": "Smile Dental",
            "url": "https://www.smiledental.com/contact"
        }))
        .into_lead()
        .unwrap();
        assert_eq!(own_site.domain, "smiledental.com");
        assert!(!own_site.has_placeholder_domain());
        assert!(own_site.profile_urls.is_empty());

        let listing = record(serde_json::json!({
            "name": "Smile Dental",
            "url": "https://www.yelp.com/biz/smile-dental-austin"
        }))
        .into_lead()
        .unwrap();
        assert!(listing.has_placeholder_domain());
        assert_eq!(
            listing.profile_urls["listing"],
            "https://www.yelp.com/biz/smile-dental-austin"
        );

        let both = record(serde_json::json!({
            "name": "Smile Dental",
            "website": "smiledental.com",
            "url": "https://smile-dental.example.org/"
        }))
        .into_lead()
        .unwrap();
        assert_eq!(both.domain, "smiledental.com");
    }

    #[tokio::test]
    async fn scan_skips_bad_lines_and_filters() {
        let path = write_dataset(&[
            r#"{"name":"Smile Dental","categories":"Dentists","city":"Austin","state":"TX"}"#.into(),
            "{not json".into(),
            r#"{"name":"Joe's Pizza","categories":"Restaurants","city":"Austin","state":"TX"}"#.into(),
            r#"{"name":"Far Dental","categories":"Dentists","city":"Dallas","state":"TX"}"#.into(),
            String::new(),
            r#"{"name":"Bright Smiles","categories":"Cosmetic Dentists","city":"Austin","state":"TX"}"#.into(),
        ]);
        let ctx = ctx(path).await;
        let query = LeadQuery::new("dentist", "Austin", 10).unwrap();

        let leads = DatasetConnector.fetch(&query, &ctx).await.unwrap();
        let names: Vec<_> = leads.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Smile Dental", "Bright Smiles"]);
        assert!(leads.iter().all(|l| l.has_placeholder_domain()));
    }

    #[tokio::test]
    async fn scan_stops_at_three_times_limit() {
        let lines: Vec<String> = (0..50)
            .map(|i| format!(r#"{{"name":"Dental {i}","categories":"Dentists","city":"Austin"}}"#))
            .collect();
        let ctx = ctx(write_dataset(&lines)).await;
        let query = LeadQuery::new("dentist", "", 4).unwrap();

        let leads = DatasetConnector.fetch(&query, &ctx).await.unwrap();
        assert_eq!(leads.len(), 12);
        assert_eq!(leads[0].name, "Dental 0");
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let ctx = ctx(PathBuf::from("/nonexistent/leadscout/dataset.jsonl")).await;
        let query = LeadQuery::new("dentist", "", 1).unwrap();
        assert!(DatasetConnector.fetch(&query, &ctx).await.is_err());
    }
}
