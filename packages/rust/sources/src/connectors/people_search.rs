//! People search connector.
//!
//! Pages through `mixed_people/search` and turns each person's employer
//! into a lead, carrying the person as the contact.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, instrument};

use leadscout_shared::{Lead, LeadQuery, Result, Settings};

use super::search_api::{self, DomainDedup};
use crate::{Connector, SourceContext};

const NAME: &str = "people_search";
const PATH: &str = "mixed_people/search";

#[derive(Debug, Clone, Copy, Default)]
pub struct PeopleSearch;

#[async_trait]
impl Connector for PeopleSearch {
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
            let mut body =
                search_api::query_filters(&query.industry, &query.location, "person_locations");
            body.insert("page".into(), page.into());
            body.insert("per_page".into(), search.per_page.into());

            let Some(response) = search_api::post_search(ctx, PATH, Value::Object(body)).await
            else {
                break;
            };

            let people = response
                .get("people")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            if people.is_empty() {
                debug!(page, "no more results");
                break;
            }

            for person in &people {
                let Some(lead) = lead_from_person(person) else {
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

        info!(leads = leads.len(), "people search complete");
        Ok(leads)
    }
}

/// Map one person record. The employer names the lead; a person without an
/// employer name is skipped.
fn lead_from_person(person: &Value) -> Option<Lead> {
    let org = person.get("organization").filter(|o| o.is_object());
    let org_name = org.and_then(|o| search_api::str_field(o, "name"));
    let name = org_name.or_else(|| search_api::str_field(person, "organization_name"))?;

    let website = org.and_then(search_api::org_website);
    let mut lead = Lead::new(name, website, NAME);

    if let Some(email) = search_api::str_field(person, "email").filter(|e| is_real_email(e)) {
        lead.add_email(email);
    }
    if let Some(org) = org {
        lead.industry = search_api::str_field(org, "industry").map(str::to_string);
        lead.phone = search_api::org_phone(org);
        if let Some(url) = search_api::str_field(org, "linkedin_url") {
            lead.profile_urls.insert("company_linkedin".into(), url.to_string());
        }
    }
    lead.location = search_api::org_location(person)
        .or_else(|| org.and_then(search_api::org_location));

    if let Some(url) = search_api::str_field(person, "linkedin_url") {
        lead.profile_urls.insert("linkedin".into(), url.to_string());
    }
    if let Some(contact) = search_api::str_field(person, "name") {
        lead.metadata.insert("contact_name".into(), Value::from(contact));
    }
    if let Some(title) = search_api::str_field(person, "title") {
        lead.metadata.insert("contact_title".into(), Value::from(title));
    }
    lead.tags.insert(NAME.into());
    Some(lead)
}

/// The API masks locked addresses with a sentinel rather than omitting them.
fn is_real_email(email: &str) -> bool {
    email.contains('@') && !email.contains("not_unlocked")
}
