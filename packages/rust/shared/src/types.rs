//! Core domain types: leads, queries, cache entries, and normalized HTTP results.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{LeadscoutError, Result};

/// Suffix that marks a synthesized (non-resolvable) domain.
pub const PLACEHOLDER_SUFFIX: &str = "placeholder";

/// Metadata key listing the identity hashes a lead carried when discovered.
pub const DISCOVERY_HASHES_KEY: &str = "discovery_hashes";

// ---------------------------------------------------------------------------
// Normalization helpers
// ---------------------------------------------------------------------------

/// Normalize a website, URL, or bare hostname into a lowercase hostname
/// without scheme, port, path, or leading `www.`.
///
/// Returns `None` when nothing host-like can be extracted.
pub fn normalize_domain(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    let url = Url::parse(&candidate).ok()?;
    let host = url.host_str()?.to_lowercase();
    let host = host.trim_end_matches('.');
    let host = host.strip_prefix("www.").unwrap_or(host);

    if host.is_empty() || !host.contains('.') {
        return None;
    }
    Some(host.to_string())
}

/// Generate a filesystem/URL-safe slug.
pub fn slugify(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Deterministic synthetic domain for a business with no known website.
pub fn placeholder_domain(name: &str, source: &str) -> String {
    let slug = slugify(name);
    let slug = if slug.is_empty() { "unknown".to_string() } else { slug };
    format!("{slug}.{}.{PLACEHOLDER_SUFFIX}", slugify(source))
}

/// Compute the SHA-256 hex digest of a string.
pub fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// LeadQuery
// ---------------------------------------------------------------------------

/// An immutable discovery request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadQuery {
    /// Industry term, e.g. "dentist".
    pub industry: String,
    /// Free-form location, e.g. "Austin, TX". Empty matches everywhere.
    pub location: String,
    /// Maximum number of leads to return.
    pub limit: usize,
}

impl LeadQuery {
    /// Build a validated query.
    pub fn new(
        industry: impl Into<String>,
        location: impl Into<String>,
        limit: usize,
    ) -> Result<Self> {
        let query = Self {
            industry: industry.into(),
            location: location.into(),
            limit,
        };
        query.validate()?;
        Ok(query)
    }

    /// Reject non-positive limits.
    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(LeadscoutError::validation(
                "limit must be a positive integer, got 0",
            ));
        }
        Ok(())
    }

    /// Lowercased location terms split on commas and whitespace.
    pub fn location_terms(&self) -> Vec<String> {
        self.location
            .split(|c: char| c == ',' || c.is_whitespace())
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Lead
// ---------------------------------------------------------------------------

/// A candidate business record.
///
/// Invariants: `domain` is never empty, `email` is always contained in
/// `emails`, and `score <= confidence`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub name: String,
    pub domain: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub emails: BTreeSet<String>,
    /// Social, review, directory, or registry profile URLs keyed by kind.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub profile_urls: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub confidence: f64,
}

impl Lead {
    /// Create a lead, deriving `domain` from `website` or synthesizing a placeholder.
    pub fn new(name: impl Into<String>, website: Option<&str>, source: &str) -> Self {
        let name = name.into();
        let domain = website
            .and_then(normalize_domain)
            .unwrap_or_else(|| placeholder_domain(&name, source));

        Self {
            name,
            domain,
            source: source.to_string(),
            location: None,
            industry: None,
            description: None,
            phone: None,
            email: None,
            emails: BTreeSet::new(),
            profile_urls: BTreeMap::new(),
            metadata: BTreeMap::new(),
            tags: BTreeSet::new(),
            score: 0.0,
            confidence: 0.0,
        }
    }

    /// Whether the domain was synthesized rather than observed.
    pub fn has_placeholder_domain(&self) -> bool {
        self.domain.ends_with(&format!(".{PLACEHOLDER_SUFFIX}"))
    }

    /// `sha256(lowercase(domain) + "|" + (email or ""))`.
    pub fn identity_hash(&self) -> String {
        let email = self.email.as_deref().unwrap_or("");
        sha256_hex(&format!("{}|{email}", self.domain.to_lowercase()))
    }

    /// Identity hashes recorded by [`Lead::mark_discovered`].
    pub fn discovery_hashes(&self) -> BTreeSet<String> {
        match self.metadata.get(DISCOVERY_HASHES_KEY) {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => BTreeSet::new(),
        }
    }

    /// Record the current identity hash as one this lead was discovered under.
    pub fn mark_discovered(&mut self) {
        let mut hashes = self.discovery_hashes();
        hashes.insert(self.identity_hash());
        self.set_discovery_hashes(hashes);
    }

    /// Every identity this lead has been known by: the current one plus all
    /// discovery-time ones.
    pub fn known_hashes(&self) -> BTreeSet<String> {
        let mut hashes = self.discovery_hashes();
        hashes.insert(self.identity_hash());
        hashes
    }

    fn set_discovery_hashes(&mut self, hashes: BTreeSet<String>) {
        if !hashes.is_empty() {
            self.metadata
                .insert(DISCOVERY_HASHES_KEY.into(), serde_json::json!(hashes));
        }
    }

    /// Add an address to `emails`, promoting it to primary if none is set.
    pub fn add_email(&mut self, email: &str) {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return;
        }
        if self.email.is_none() {
            self.email = Some(email.clone());
        }
        self.emails.insert(email);
    }

    /// Whether any email (primary or collected) is known.
    pub fn has_any_email(&self) -> bool {
        self.email.is_some() || !self.emails.is_empty()
    }

    /// Whether `emails` holds addresses beyond the primary one.
    pub fn has_secondary_emails(&self) -> bool {
        self.emails
            .iter()
            .any(|e| self.email.as_deref() != Some(e.as_str()))
    }

    /// External rating normalized to `[0, 1]` from a 0–5 `rating` metadata value.
    pub fn normalized_rating(&self) -> Option<f64> {
        let rating = match self.metadata.get("rating")? {
            serde_json::Value::Number(n) => n.as_f64()?,
            serde_json::Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        Some((rating / 5.0).clamp(0.0, 1.0))
    }

    /// Fold `other` into `self` without clearing any populated field of `self`.
    pub fn merge(&mut self, other: Lead) {
        let mut discovered = self.discovery_hashes();
        discovered.extend(other.discovery_hashes());

        fill(&mut self.location, other.location);
        fill(&mut self.industry, other.industry);
        fill(&mut self.description, other.description);
        fill(&mut self.phone, other.phone);
        fill(&mut self.email, other.email);

        self.emails.extend(other.emails);
        if let Some(email) = &self.email {
            self.emails.insert(email.clone());
        }
        self.tags.extend(other.tags);
        for (k, v) in other.profile_urls {
            self.profile_urls.entry(k).or_insert(v);
        }
        for (k, v) in other.metadata {
            self.metadata.entry(k).or_insert(v);
        }
        self.set_discovery_hashes(discovered);
        self.score = self.score.max(other.score);
        self.confidence = self.confidence.max(other.confidence);
    }
}

fn fill(slot: &mut Option<String>, value: Option<String>) {
    let empty = slot.as_deref().is_none_or(|s| s.trim().is_empty());
    if empty {
        if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
            *slot = Some(v);
        }
    }
}

// ---------------------------------------------------------------------------
// CacheEntry
// ---------------------------------------------------------------------------

/// One row of the TTL cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    /// Opaque serialized payload.
    pub payload: String,
    /// Absolute expiry instant.
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Whether the entry is past its expiry at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

// ---------------------------------------------------------------------------
// HttpResult
// ---------------------------------------------------------------------------

/// Normalized HTTP response. Exactly one of `text` / `json` is populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResult {
    pub url: String,
    pub status_code: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<serde_json::Value>,
}

impl HttpResult {
    /// Normalize a raw body: JSON if it parses, raw text otherwise.
    pub fn from_body(
        url: impl Into<String>,
        status_code: u16,
        headers: BTreeMap<String, String>,
        body: String,
    ) -> Self {
        let (text, json) = match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(value) => (None, Some(value)),
            Err(_) => (Some(body), None),
        };
        Self {
            url: url.into(),
            status_code,
            headers,
            text,
            json,
        }
    }

    /// Whether the status code is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Body as a string regardless of which representation was populated.
    pub fn body_text(&self) -> String {
        match (&self.text, &self.json) {
            (Some(text), _) => text.clone(),
            (None, Some(json)) => json.to_string(),
            (None, None) => String::new(),
        }
    }
}
