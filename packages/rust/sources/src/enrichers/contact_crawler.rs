//! Website contact-page email crawler.
//!
//! Probes likely contact paths on a lead's own site, stopping at the first
//! path that yields any address. A headless render is attempted for a path
//! only when the plain fetch found nothing.

use std::collections::BTreeSet;

use async_trait::async_trait;
use tracing::{debug, instrument};

use leadscout_http::{FetchChain, RequestOptions};
use leadscout_shared::{Lead, Result, Settings};

use crate::extract::extract_emails;
use crate::{Enricher, SourceContext};

const NAME: &str = "contact_crawler";

#[derive(Debug, Clone)]
pub struct ContactCrawler {
    scheme: String,
}

impl Default for ContactCrawler {
    fn default() -> Self {
        Self {
            scheme: "https".into(),
        }
    }
}

impl ContactCrawler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe sites over `scheme` instead of https.
    pub fn with_scheme(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
        }
    }

    fn probe_url(&self, domain: &str, path: &str) -> String {
        let path = path.trim_matches('/');
        format!("{}://{domain}/{path}", self.scheme)
    }

    async fn plain(&self, url: &str, ctx: &SourceContext) -> BTreeSet<String> {
        let opts = RequestOptions::new()
            .header("Accept", "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .cached();
        match ctx.http.get(url, opts).await {
            Ok(response) if response.is_success() => extract_emails(&response.body_text()),
            Ok(response) => {
                debug!(url, status = response.status_code, "probe returned error status");
                BTreeSet::new()
            }
            Err(e) => {
                debug!(url, error = %e, "probe failed");
                BTreeSet::new()
            }
        }
    }
}

#[async_trait]
impl Enricher for ContactCrawler {
    fn name(&self) -> &str {
        NAME
    }

    fn is_configured(&self, settings: &Settings) -> bool {
        !settings.contact_paths.is_empty()
    }

    #[instrument(skip_all, fields(enricher = NAME, domain = %lead.domain))]
    async fn enrich(&self, mut lead: Lead, ctx: &SourceContext) -> Result<Lead> {
        if lead.has_any_email() || lead.has_placeholder_domain() {
            return Ok(lead);
        }

        let render = FetchChain::render_only(&ctx.settings).map(|c| c.with_min_usable_bytes(1));

        for path in &ctx.settings.contact_paths {
            let url = self.probe_url(&lead.domain, path);

            let mut found = self.plain(&url, ctx).await;
            if found.is_empty() {
                if let Some(chain) = &render {
                    if let Some(page) = chain.fetch(&ctx.http, &url).await {
                        found = extract_emails(&page.html);
                    }
                }
            }

            if !found.is_empty() {
                debug!(%url, count = found.len(), "found contact emails");
                for email in &found {
                    lead.add_email(email);
                }
                lead.metadata
                    .insert("email_source".into(), serde_json::json!(url));
                lead.tags.insert(NAME.into());
                break;
            }
        }

        Ok(lead)
    }
}
