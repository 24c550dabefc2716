//! Shared plumbing for the people / organization search API family.

use serde_json::Value;
use tracing::{debug, warn};

use leadscout_http::RequestOptions;
use leadscout_shared::{Lead, normalize_domain};

use crate::SourceContext;

const API_KEY_HEADER: &str = "X-Api-Key";

pub(crate) fn endpoint(ctx: &SourceContext, path: &str) -> String {
    format!("{}/{path}", ctx.settings.search.base_url.trim_end_matches('/'))
}

/// POST a search body. Any non-200 answer or transport failure is "no results".
pub(crate) async fn post_search(ctx: &SourceContext, path: &str, body: Value) -> Option<Value> {
    let api_key = ctx.settings.search_api_key.as_deref()?;
    let url = endpoint(ctx, path);

    let opts = RequestOptions::new()
        .header(API_KEY_HEADER, api_key)
        .header("Cache-Control", "no-cache")
        .json(body)
        .cached();

    handle(ctx.http.post(&url, opts).await, &url)
}

/// GET with query params. Same failure handling as [`post_search`].
pub(crate) async fn get_lookup(
    ctx: &SourceContext,
    path: &str,
    params: &[(&str, &str)],
) -> Option<Value> {
    let api_key = ctx.settings.search_api_key.as_deref()?;
    let url = endpoint(ctx, path);

    let mut opts = RequestOptions::new().header(API_KEY_HEADER, api_key).cached();
    for (k, v) in params {
        opts = opts.param(*k, *v);
    }

    handle(ctx.http.get(&url, opts).await, &url)
}

fn handle(
    result: leadscout_shared::Result<leadscout_shared::HttpResult>,
    url: &str,
) -> Option<Value> {
    match result {
        Ok(response) if response.status_code == 200 => {
            if response.json.is_none() {
                warn!(url, "search API returned a non-JSON body");
            }
            response.json
        }
        Ok(response) => {
            warn!(url, status = response.status_code, "search API returned no results");
            None
        }
        Err(e) => {
            warn!(url, error = %e, "search API request failed");
            None
        }
    }
}

pub(crate) fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Website of an organization object: `website_url`, else `primary_domain`.
pub(crate) fn org_website(org: &Value) -> Option<&str> {
    str_field(org, "website_url").or_else(|| str_field(org, "primary_domain"))
}

/// Phone of an organization object in either of the shapes the API uses.
pub(crate) fn org_phone(org: &Value) -> Option<String> {
    str_field(org, "phone")
        .or_else(|| org.pointer("/primary_phone/number").and_then(Value::as_str))
        .or_else(|| org.pointer("/primary_phone/sanitized_number").and_then(Value::as_str))
        .map(str::to_string)
        .filter(|p| !p.trim().is_empty())
}

/// `"city, state"` from whichever parts are present.
pub(crate) fn org_location(value: &Value) -> Option<String> {
    let parts: Vec<&str> = ["city", "state"]
        .into_iter()
        .filter_map(|k| str_field(value, k))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

/// Build a lead from an organization object. `None` without a name.
pub(crate) fn lead_from_org(org: &Value, source: &str) -> Option<Lead> {
    let name = str_field(org, "name")?;
    let mut lead = Lead::new(name, org_website(org), source);
    lead.industry = str_field(org, "industry").map(str::to_string);
    lead.phone = org_phone(org);
    lead.location = org_location(org);
    lead.description = str_field(org, "short_description").map(str::to_string);

    for (kind, key) in [
        ("linkedin", "linkedin_url"),
        ("facebook", "facebook_url"),
        ("twitter", "twitter_url"),
    ] {
        if let Some(url) = str_field(org, key) {
            lead.profile_urls.insert(kind.to_string(), url.to_string());
        }
    }
    if let Some(employees) = org.get("estimated_num_employees").filter(|v| v.is_number()) {
        lead.metadata.insert("employees".into(), employees.clone());
    }
    if let Some(year) = org.get("founded_year").filter(|v| v.is_number()) {
        lead.metadata.insert("founded_year".into(), year.clone());
    }
    lead.tags.insert(source.to_string());
    Some(lead)
}

/// Tracks normalized domains already accepted within one fetch.
#[derive(Debug, Default)]
pub(crate) struct DomainDedup {
    seen: std::collections::HashSet<String>,
}

impl DomainDedup {
    /// Whether `lead` is the first with its domain.
    pub(crate) fn accept(&mut self, lead: &Lead) -> bool {
        let domain = normalize_domain(&lead.domain).unwrap_or_else(|| lead.domain.to_lowercase());
        let fresh = self.seen.insert(domain);
        if !fresh {
            debug!(domain = %lead.domain, "dropping duplicate domain in search response");
        }
        fresh
    }
}

/// Filters for the search body: industry keyword tag and optional location.
pub(crate) fn query_filters(
    industry: &str,
    location: &str,
    location_key: &str,
) -> serde_json::Map<String, Value> {
    let mut filters = serde_json::Map::new();
    filters.insert(
        "q_organization_keyword_tags".into(),
        serde_json::json!([industry.trim()]),
    );
    if !location.trim().is_empty() {
        filters.insert(location_key.into(), serde_json::json!([location.trim()]));
    }
    filters
}

/// Total pages reported in a response's `pagination` block, if any.
pub(crate) fn total_pages(response: &Value) -> Option<u64> {
    response.pointer("/pagination/total_pages").and_then(Value::as_u64)
}
