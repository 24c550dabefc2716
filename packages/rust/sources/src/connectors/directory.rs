//! Business directory scraping connector.
//!
//! Fills each configured listing URL template, fetches it through the
//! render → proxy → plain chain, and ranks the anchors found inside listing
//! containers with a handful of text heuristics.

use std::collections::HashMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument};
use url::Url;

use leadscout_http::FetchChain;
use leadscout_shared::{Lead, LeadQuery, Result, Settings, normalize_domain};

use crate::keywords::fallback_keywords;
use crate::{Connector, SourceContext};

const NAME: &str = "directory";

/// Candidates scoring below this are discarded.
const MIN_SCORE: i32 = 1;

/// Anchor text shorter than this is navigation chrome.
const MIN_TEXT_LEN: usize = 4;

/// Listing container selectors, tried in order; the first that matches wins.
const CONTAINER_SELECTORS: &[&str] = &[
    ".result",
    ".business",
    ".listing",
    ".search-result",
    "article",
    "li",
];

/// Social networks, maps, and other aggregators that never identify a business.
const BLOCKED_HOSTS: &[&str] = &[
    "facebook.com",
    "instagram.com",
    "twitter.com",
    "x.com",
    "linkedin.com",
    "youtube.com",
    "tiktok.com",
    "pinterest.com",
    "google.com",
    "apple.com",
    "yelp.com",
    "yellowpages.com",
    "manta.com",
    "bbb.org",
    "tripadvisor.com",
    "foursquare.com",
    "angi.com",
    "thumbtack.com",
    "nextdoor.com",
    "wikipedia.org",
];

const GENERIC_TEXT: &[&str] = &[
    "home",
    "about",
    "about us",
    "contact",
    "contact us",
    "login",
    "log in",
    "sign in",
    "sign up",
    "more",
    "next",
    "previous",
    "menu",
    "search",
    "website",
    "visit website",
    "directions",
    "get directions",
    "reviews",
    "write a review",
    "see more",
    "view more",
    "read more",
    "learn more",
    "more info",
    "privacy policy",
    "terms",
    "terms of service",
    "help",
    "careers",
    "advertise",
    "order online",
    "book now",
    "call now",
];

const BUSINESS_SUFFIXES: &[&str] = &[
    "llc",
    "inc",
    "co",
    "group",
    "clinic",
    "studio",
    "services",
    "associates",
    "company",
    "corp",
    "ltd",
];

static ANCHOR_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid anchor selector"));

static CONTAINER_SELS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    CONTAINER_SELECTORS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect()
});

/// One ranked anchor from a listing page.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryCandidate {
    pub name: String,
    /// Business website, when the anchor leaves the directory.
    pub website: Option<String>,
    /// Directory detail page, when the anchor stays on the directory.
    pub profile_url: Option<String>,
    pub score: i32,
}

impl DirectoryCandidate {
    fn domain(&self) -> String {
        self.website
            .as_deref()
            .and_then(normalize_domain)
            .unwrap_or_else(|| leadscout_shared::placeholder_domain(&self.name, NAME))
    }
}

/// Substitute URL-encoded query terms into a listing template.
pub fn fill_template(template: &str, query: &LeadQuery) -> String {
    let encode =
        |s: &str| url::form_urlencoded::byte_serialize(s.trim().as_bytes()).collect::<String>();
    template
        .replace("{industry}", &encode(&query.industry))
        .replace("{location}", &encode(&query.location))
}

/// Extract and score candidate business anchors from one listing page.
pub fn parse_listings(html: &str, page_url: &str, keywords: &[String]) -> Vec<DirectoryCandidate> {
    let doc = Html::parse_document(html);
    let base = Url::parse(page_url).ok();
    let page_host = base
        .as_ref()
        .and_then(|u| u.host_str())
        .and_then(normalize_domain);

    let containers: Vec<ElementRef<'_>> = CONTAINER_SELS
        .iter()
        .map(|sel| doc.select(sel).collect::<Vec<_>>())
        .find(|found| !found.is_empty())
        .unwrap_or_else(|| vec![doc.root_element()]);

    let mut candidates = Vec::new();
    for container in containers {
        for anchor in container.select(&ANCHOR_SEL) {
            let text = collapse_whitespace(&anchor.text().collect::<String>());
            if is_generic(&text, keywords) {
                continue;
            }
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let Some(resolved) = resolve(base.as_ref(), href) else {
                continue;
            };
            let Some(host) = resolved.host_str().and_then(normalize_domain) else {
                continue;
            };

            let (website, profile_url) = if page_host.as_deref() == Some(host.as_str()) {
                (None, Some(resolved.to_string()))
            } else if is_third_party_host(&host) {
                continue;
            } else {
                (Some(resolved.to_string()), None)
            };

            let score = score_text(&text, keywords);
            if score < MIN_SCORE {
                continue;
            }
            candidates.push(DirectoryCandidate {
                name: text,
                website,
                profile_url,
                score,
            });
        }
    }
    candidates
}

fn resolve(base: Option<&Url>, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let url = match base {
        Some(base) => base.join(href).ok()?,
        None => Url::parse(href).ok()?,
    };
    matches!(url.scheme(), "http" | "https").then_some(url)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_generic(text: &str, keywords: &[String]) -> bool {
    if text.chars().count() < MIN_TEXT_LEN {
        return true;
    }
    let lower = text.to_lowercase();
    GENERIC_TEXT.contains(&lower.as_str()) || keywords.iter().any(|k| *k == lower)
}

/// Social networks, review sites, and other directories: never a business's own site.
pub(super) fn is_third_party_host(host: &str) -> bool {
    BLOCKED_HOSTS
        .iter()
        .any(|b| host == *b || host.ends_with(&format!(".{b}")))
}

/// Industry keyword +2, title-case +1, digits −1, business suffix +2.
fn score_text(text: &str, keywords: &[String]) -> i32 {
    let lower = text.to_lowercase();
    let mut score = 0;

    if keywords.iter().any(|k| lower.contains(k.as_str())) {
        score += 2;
    }

    let words: Vec<&str> = text
        .split_whitespace()
        .filter(|w| w.chars().any(char::is_alphabetic))
        .collect();
    let title_case = !words.is_empty()
        && words.iter().all(|w| {
            w.chars()
                .find(|c| c.is_alphabetic())
                .is_some_and(char::is_uppercase)
        });
    if title_case {
        score += 1;
    }

    if text.chars().any(|c| c.is_ascii_digit()) {
        score -= 1;
    }

    let has_suffix = lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|token| BUSINESS_SUFFIXES.contains(&token));
    if has_suffix {
        score += 2;
    }

    score
}

/// Scrapes the `[directory] url_templates` listing pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryConnector;

#[async_trait]
impl Connector for DirectoryConnector {
    fn name(&self) -> &str {
        NAME
    }

    fn is_configured(&self, settings: &Settings) -> bool {
        !settings.directory.url_templates.is_empty()
    }

    #[instrument(skip_all, fields(connector = NAME, industry = %query.industry))]
    async fn fetch(&self, query: &LeadQuery, ctx: &SourceContext) -> Result<Vec<Lead>> {
        let settings = &ctx.settings;
        let keywords = fallback_keywords(&query.industry, &settings.fallback_keywords);
        let chain = FetchChain::from_settings(settings);

        // Best candidate per domain, in first-seen order.
        let mut order: Vec<String> = Vec::new();
        let mut best: HashMap<String, DirectoryCandidate> = HashMap::new();

        for template in &settings.directory.url_templates {
            let url = fill_template(template, query);
            let Some(page) = chain.fetch(&ctx.http, &url).await else {
                debug!(%url, "no usable listing page");
                continue;
            };

            let found = parse_listings(&page.html, &page.url, &keywords);
            debug!(
                %url,
                stage = page.stage.as_str(),
                candidates = found.len(),
                "parsed listing page"
            );

            for candidate in found {
                let domain = candidate.domain();
                match best.get(&domain) {
                    Some(existing) if existing.score >= candidate.score => {}
                    Some(_) => {
                        best.insert(domain, candidate);
                    }
                    None => {
                        order.push(domain.clone());
                        best.insert(domain, candidate);
                    }
                }
            }
        }

        let mut ranked: Vec<(String, DirectoryCandidate)> = order
            .into_iter()
            .filter_map(|d| best.remove(&d).map(|c| (d, c)))
            .collect();
        ranked.sort_by(|a, b| b.1.score.cmp(&a.1.score));
        ranked.truncate(settings.directory.top_n);

        let leads: Vec<Lead> = ranked
            .into_iter()
            .map(|(_, candidate)| to_lead(candidate, query))
            .collect();

        info!(leads = leads.len(), "directory scrape complete");
        Ok(leads)
    }
}

fn to_lead(candidate: DirectoryCandidate, query: &LeadQuery) -> Lead {
    let mut lead = Lead::new(candidate.name, candidate.website.as_deref(), NAME);
    if !query.industry.trim().is_empty() {
        lead.industry = Some(query.industry.trim().to_string());
    }
    if !query.location.trim().is_empty() {
        lead.location = Some(query.location.trim().to_string());
    }
    if let Some(url) = candidate.profile_url {
        lead.profile_urls.insert(NAME.into(), url);
    }
    lead.metadata
        .insert("directory_score".into(), serde_json::json!(candidate.score));
    lead.tags.insert(NAME.into());
    lead
}
