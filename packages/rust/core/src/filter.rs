//! Ranking and threshold filtering.

use leadscout_shared::Lead;

/// Sort descending by score (stable) and keep up to `limit` leads at or above
/// `threshold`. When none clears the threshold, the top `limit` are kept anyway.
pub fn select_leads(mut leads: Vec<Lead>, threshold: f64, limit: usize) -> Vec<Lead> {
    leads.sort_by(|a, b| b.score.total_cmp(&a.score));

    let passing = leads.iter().take_while(|l| l.score >= threshold).count();
    if passing > 0 {
        leads.truncate(passing.min(limit));
    } else {
        leads.truncate(limit);
    }
    leads
}
