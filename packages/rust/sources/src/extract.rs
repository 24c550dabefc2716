//! Email address extraction from HTML.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9-]+(?:\.[a-z0-9-]+)*\.[a-z]{2,24}\b")
        .expect("valid email regex")
});

static ANCHOR_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid anchor selector"));

/// File extensions that look like TLDs in retina asset names (`logo@2x.png`).
const ASSET_SUFFIXES: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp", ".css", ".js"];

/// Lowercased addresses found in `mailto:` anchors and in the raw page text.
pub fn extract_emails(html: &str) -> BTreeSet<String> {
    let mut found = BTreeSet::new();

    let doc = Html::parse_document(html);
    for anchor in doc.select(&ANCHOR_SEL) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(target) = strip_mailto(href.trim()) else {
            continue;
        };
        let target = target.split('?').next().unwrap_or_default();
        for address in target.split(',') {
            if let Some(email) = clean(address) {
                found.insert(email);
            }
        }
    }

    for m in EMAIL_RE.find_iter(html) {
        if let Some(email) = clean(m.as_str()) {
            found.insert(email);
        }
    }

    found
}

fn strip_mailto(href: &str) -> Option<&str> {
    let scheme = href.get(.."mailto:".len())?;
    scheme
        .eq_ignore_ascii_case("mailto:")
        .then(|| &href["mailto:".len()..])
}

fn clean(raw: &str) -> Option<String> {
    let email = raw.trim().trim_matches('.').to_lowercase();
    let email = email.replace("%40", "@");
    if !EMAIL_RE.is_match(&email) || email.matches('@').count() != 1 {
        return None;
    }
    if ASSET_SUFFIXES.iter().any(|s| email.ends_with(s)) {
        return None;
    }
    Some(email)
}
