//! Lead scoring.
//!
//! | signal | weight |
//! |---|---|
//! | base | 0.10 |
//! | secondary emails collected | 0.45 |
//! | primary email only | 0.35 |
//! | phone | 0.15 |
//! | industry mentions the query industry | 0.10 |
//! | description mentions the query industry | 0.05 |
//! | external rating, scaled | up to 0.05 |

use leadscout_shared::{Lead, LeadQuery};

const BASE: f64 = 0.1;
const SECONDARY_EMAILS: f64 = 0.45;
const PRIMARY_EMAIL: f64 = 0.35;
const PHONE: f64 = 0.15;
const INDUSTRY_MATCH: f64 = 0.1;
const DESCRIPTION_MATCH: f64 = 0.05;
const RATING: f64 = 0.05;
const CONFIDENCE_MARGIN: f64 = 0.1;

/// Score one lead against the query, clamped to `[0, 1]`.
pub fn score_lead(lead: &Lead, query: &LeadQuery) -> f64 {
    let industry = query.industry.trim().to_lowercase();
    let mentions = |field: &Option<String>| {
        !industry.is_empty()
            && field
                .as_deref()
                .is_some_and(|v| v.to_lowercase().contains(&industry))
    };

    let mut score = BASE;

    if lead.has_secondary_emails() {
        score += SECONDARY_EMAILS;
    } else if lead.email.is_some() {
        score += PRIMARY_EMAIL;
    }
    if lead.phone.as_deref().is_some_and(|p| !p.trim().is_empty()) {
        score += PHONE;
    }
    if mentions(&lead.industry) {
        score += INDUSTRY_MATCH;
    }
    if mentions(&lead.description) {
        score += DESCRIPTION_MATCH;
    }
    if let Some(rating) = lead.normalized_rating() {
        score += RATING * rating;
    }

    score.clamp(0.0, 1.0)
}

/// Set `score` and `confidence` on every lead.
pub fn score_all(leads: &mut [Lead], query: &LeadQuery) {
    for lead in leads {
        lead.score = score_lead(lead, query);
        lead.confidence = (lead.score + CONFIDENCE_MARGIN).min(1.0);
    }
}
