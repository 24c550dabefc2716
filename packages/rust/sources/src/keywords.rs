//! Industry keyword expansion.
//!
//! An OpenRouter chat completion turns an industry term into roughly ten
//! synonyms, cached for a week under `keywords:{industry}`. Without a key,
//! or when the call fails, the built-in synonym table is used instead.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use leadscout_http::RequestOptions;
use leadscout_shared::Settings;

use crate::SourceContext;

/// How long an LLM expansion stays cached.
pub const KEYWORD_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Cap on keywords kept from one expansion.
const MAX_KEYWORDS: usize = 10;

const SYSTEM_PROMPT: &str = "You expand a business category into search keywords. \
Reply with a comma-separated list of up to 10 short lowercase keywords or word stems \
that would appear in business category labels for that industry. No numbering, no prose.";

pub fn cache_key(industry: &str) -> String {
    format!("keywords:{}", industry.trim().to_lowercase())
}

/// Lowercased keywords for `industry`, always including the term itself.
#[instrument(skip(ctx))]
pub async fn expand_industry(industry: &str, ctx: &SourceContext) -> Vec<String> {
    let industry = industry.trim().to_lowercase();
    if industry.is_empty() {
        return Vec::new();
    }
    let key = cache_key(&industry);

    match ctx.cache.get(&key).await {
        Ok(Some(payload)) => match serde_json::from_str::<Vec<String>>(&payload) {
            Ok(keywords) if !keywords.is_empty() => {
                debug!(count = keywords.len(), "keyword cache hit");
                return keywords;
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "discarding malformed keyword cache entry"),
        },
        Ok(None) => {}
        Err(e) => warn!(error = %e, "keyword cache read failed"),
    }

    if let Some(keywords) = expand_with_llm(&industry, ctx).await {
        match serde_json::to_string(&keywords) {
            Ok(payload) => {
                if let Err(e) = ctx.cache.set(&key, &payload, Some(KEYWORD_CACHE_TTL)).await {
                    warn!(error = %e, "failed to cache keywords");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize keywords"),
        }
        return keywords;
    }

    fallback_keywords(&industry, &ctx.settings.fallback_keywords)
}

async fn expand_with_llm(industry: &str, ctx: &SourceContext) -> Option<Vec<String>> {
    let settings: &Settings = &ctx.settings;
    let api_key = settings.openrouter_api_key.as_deref()?;
    let url = format!(
        "{}/chat/completions",
        settings.openrouter.base_url.trim_end_matches('/')
    );

    let body = serde_json::json!({
        "model": settings.openrouter.default_model,
        "temperature": 0,
        "messages": [
            { "role": "system", "content": SYSTEM_PROMPT },
            { "role": "user", "content": industry },
        ],
    });

    let response = match ctx
        .http
        .post(
            &url,
            RequestOptions::new()
                .header("Authorization", format!("Bearer {api_key}"))
                .json(body),
        )
        .await
    {
        Ok(r) if r.is_success() => r,
        Ok(r) => {
            warn!(status = r.status_code, "keyword expansion returned error status");
            return None;
        }
        Err(e) => {
            warn!(error = %e, "keyword expansion request failed");
            return None;
        }
    };

    let content = response
        .json
        .as_ref()
        .and_then(|j| j.pointer("/choices/0/message/content"))
        .and_then(|c| c.as_str())?;

    let mut keywords = vec![industry.to_string()];
    for kw in parse_keyword_list(content) {
        if keywords.len() >= MAX_KEYWORDS {
            break;
        }
        if !keywords.contains(&kw) {
            keywords.push(kw);
        }
    }
    debug!(count = keywords.len(), "expanded industry keywords");
    Some(keywords)
}

/// Split a completion into clean keywords: commas or newlines separate
/// entries; bullets, numbering, and quotes are stripped.
pub fn parse_keyword_list(content: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for raw in content.split([',', '\n', ';']) {
        let kw = raw
            .trim()
            .trim_start_matches(|c: char| c.is_ascii_digit() || matches!(c, '-' | '*' | '.' | ')'))
            .trim()
            .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '.'))
            .trim()
            .to_lowercase();
        if kw.is_empty() || kw.len() > 40 || out.contains(&kw) {
            continue;
        }
        out.push(kw);
        if out.len() == MAX_KEYWORDS {
            break;
        }
    }
    out
}

/// The industry term plus its entries in the synonym table. Table keys
/// match when either side contains the other ("dentists" → "dentist").
pub fn fallback_keywords(industry: &str, table: &BTreeMap<String, Vec<String>>) -> Vec<String> {
    let industry = industry.trim().to_lowercase();
    let mut keywords = vec![industry.clone()];

    let entries = table
        .iter()
        .filter(|(k, _)| {
            let k = k.to_lowercase();
            k == industry || industry.contains(&k) || (industry.len() >= 3 && k.contains(&industry))
        })
        .flat_map(|(_, v)| v.iter());

    for kw in entries {
        let kw = kw.to_lowercase();
        if !keywords.contains(&kw) {
            keywords.push(kw);
        }
    }
    keywords
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use leadscout_storage::CacheStore;
    use uuid::Uuid;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn ctx(settings: Settings) -> SourceContext {
        let db = std::env::temp_dir().join(format!("ls_keywords_test_{}.db", Uuid::now_v7()));
        let cache = CacheStore::open(&db, Duration::from_secs(60)).await.unwrap();
        SourceContext::new(Arc::new(settings), cache).unwrap()
    }

    #[test]
    fn parses_messy_completions() {
        let parsed = parse_keyword_list("1. Dental, \"orthodontist\"\n- oral surgeon\n\n* Dental.");
        assert_eq!(parsed, vec!["dental", "orthodontist", "oral surgeon"]);
    }

    #[test]
    fn fallback_includes_industry_and_table() {
        let table = Settings::default().fallback_keywords;
        let kws = fallback_keywords("Dentists", &table);
        assert_eq!(kws[0], "dentists");
        assert!(kws.contains(&"dental".to_string()));

        let unknown = fallback_keywords("falconry", &table);
        assert_eq!(unknown, vec!["falconry"]);
    }

    #[tokio::test]
    async fn without_key_uses_fallback() {
        let ctx = ctx(Settings::default()).await;
        let kws = expand_industry("plumber", &ctx).await;
        assert_eq!(kws[0], "plumber");
        assert!(kws.contains(&"drain".to_string()));
        // Fallbacks are not cached
        assert!(ctx.cache.get(&cache_key("plumber")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn llm_expansion_is_cached_for_a_week() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer or-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "content": "dental, orthodontist, teeth whitening" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut settings = Settings::default();
        settings.openrouter.base_url = server.uri();
        settings.openrouter_api_key = Some("or-key".into());
        let ctx = ctx(settings).await;

        let first = expand_industry("Dentist", &ctx).await;
        assert_eq!(first, vec!["dentist", "dental", "orthodontist", "teeth whitening"]);

        let second = expand_industry("dentist", &ctx).await;
        assert_eq!(first, second);

        let entry = ctx.cache.get_entry("keywords:dentist").await.unwrap().unwrap();
        let ttl = entry.expires_at - chrono::Utc::now();
        assert!(ttl > chrono::Duration::days(6));
    }

    #[tokio::test]
    async fn llm_failure_degrades_to_table() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut settings = Settings::default();
        settings.openrouter.base_url = server.uri();
        settings.openrouter_api_key = Some("or-key".into());
        let ctx = ctx(settings).await;

        let kws = expand_industry("gym", &ctx).await;
        assert!(kws.contains(&"fitness".to_string()));
    }
}
