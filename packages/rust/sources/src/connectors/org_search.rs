//! Organization search, both as a discovery connector and as an enricher.
//!
//! Discovery pages through `mixed_companies/search`; enrichment looks one
//! domain up through `organizations/enrich` and fills only the industry,
//! phone, and location fields that are still empty.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, instrument};

use leadscout_shared::{Lead, LeadQuery, Result, Settings};

use super::search_api::{self, DomainDedup};
use crate::{Connector, Enricher, SourceContext};

const NAME: &str = "org_search";
const SEARCH_PATH: &str = "mixed_companies/search";
const ENRICH_PATH: &str = "organizations/enrich";

#[derive(Debug, Clone, Copy, Default)]
pub struct OrganizationSearch;

#[async_trait]
impl Connector for OrganizationSearch {
    fn name(&self) -> &str {
        NAME
    }

    fn is_configured(&self, settings: &Settings) -> bool {
        settings.search_api_key.is_some()
    }

    #[instrument(skip_all, fields(connector = NAME, industry = %query.industry))]
    async fn fetch(&self, query: &LeadQuery, ctx: &SourceContext) -> Result<Vec<Lead>> {
        let search = &ctx.settings.search;
        let mut dedup = DomainDedup::default();
        let mut leads = Vec::new();

        'pages: for page in 1..=search.max_pages.max(1) {
            let mut body = search_api::query_filters(
                &query.industry,
                &query.location,
                "organization_locations",
            );
            body.insert("page".into(), page.into());
            body.insert("per_page".into(), search.per_page.into());

            let Some(response) =
                search_api::post_search(ctx, SEARCH_PATH, Value::Object(body)).await
            else {
                break;
            };

            // Saved accounts come back separately from new organizations.
            let orgs: Vec<Value> = ["accounts", "organizations"]
                .into_iter()
                .filter_map(|k| response.get(k).and_then(Value::as_array))
                .flatten()
                .cloned()
                .collect();
            if orgs.is_empty() {
                debug!(page, "no more results");
                break;
            }

            for org in &orgs {
                let Some(lead) = search_api::lead_from_org(org, NAME) else {
                    continue;
                };
                if !dedup.accept(&lead) {
                    continue;
                }
                leads.push(lead);
                if leads.len() >= query.limit {
                    break 'pages;
                }
            }

            if search_api::total_pages(&response).is_some_and(|total| u64::from(page) >= total) {
                break;
            }
        }

        info!(leads = leads.len(), "organization search complete");
        Ok(leads)
    }
}

#[async_trait]
impl Enricher for OrganizationSearch {
    fn name(&self) -> &str {
        NAME
    }

    fn is_configured(&self, settings: &Settings) -> bool {
        settings.search_api_key.is_some()
    }

    #[instrument(skip_all, fields(enricher = NAME, domain = %lead.domain))]
    async fn enrich(&self, mut lead: Lead, ctx: &SourceContext) -> Result<Lead> {
        let complete = lead.industry.is_some() && lead.phone.is_some() && lead.location.is_some();
        if complete || lead.has_placeholder_domain() {
            return Ok(lead);
        }

        let Some(response) =
            search_api::get_lookup(ctx, ENRICH_PATH, &[("domain", lead.domain.as_str())]).await
        else {
            return Ok(lead);
        };
        let Some(org) = response.get("organization").filter(|o| o.is_object()) else {
            debug!("no organization on record");
            return Ok(lead);
        };

        fill_missing(&mut lead, org);
        Ok(lead)
    }
}

/// Copy industry, phone, and location from `org` into whichever of them are empty.
fn fill_missing(lead: &mut Lead, org: &Value) {
    let empty = |v: &Option<String>| v.as_deref().is_none_or(|s| s.trim().is_empty());

    if empty(&lead.industry) {
        if let Some(industry) = search_api::str_field(org, "industry") {
            lead.industry = Some(industry.to_string());
        }
    }
    if empty(&lead.phone) {
        if let Some(phone) = search_api::org_phone(org) {
            lead.phone = Some(phone);
        }
    }
    if empty(&lead.location) {
        if let Some(location) = search_api::org_location(org) {
            lead.location = Some(location);
        }
    }
}
