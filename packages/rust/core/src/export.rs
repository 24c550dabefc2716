//! Lead archive: one JSON array file per run under
//! `leads/{industry}/{location}/{timestamp}_{count}.json`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use leadscout_shared::{Lead, LeadQuery, LeadscoutError, Result, slugify};

/// Filename timestamp, millisecond resolution.
const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%3f";

/// Attempts at finding an unused filename before giving up.
const CREATE_ATTEMPTS: u32 = 5;

fn slug_or_any(text: &str) -> String {
    let slug = slugify(text);
    if slug.is_empty() { "any".to_string() } else { slug }
}

/// Directory holding every batch exported for `query`.
pub fn batch_dir(leads_dir: &Path, query: &LeadQuery) -> PathBuf {
    leads_dir
        .join(slug_or_any(&query.industry))
        .join(slug_or_any(&query.location))
}

/// Write `leads` as a new batch file. Empty batches write nothing.
#[instrument(skip_all, fields(count = leads.len()))]
pub async fn write_batch(
    leads_dir: &Path,
    query: &LeadQuery,
    leads: &[Lead],
) -> Result<Option<PathBuf>> {
    if leads.is_empty() {
        debug!("empty batch, nothing to export");
        return Ok(None);
    }

    let dir = batch_dir(leads_dir, query);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| LeadscoutError::io(&dir, e))?;

    let body = serde_json::to_vec_pretty(leads)
        .map_err(|e| LeadscoutError::parse(format!("failed to serialize leads: {e}")))?;

    let mut attempt = 0;
    let (path, mut file) = loop {
        attempt += 1;
        let name = format!("{}_{}.json", Utc::now().format(TIMESTAMP_FORMAT), leads.len());
        let path = dir.join(name);

        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => break (path, file),
            Err(e)
                if e.kind() == std::io::ErrorKind::AlreadyExists && attempt < CREATE_ATTEMPTS =>
            {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            Err(e) => return Err(LeadscoutError::io(&path, e)),
        }
    };

    file.write_all(&body)
        .await
        .map_err(|e| LeadscoutError::io(&path, e))?;
    file.flush().await.map_err(|e| LeadscoutError::io(&path, e))?;

    info!(path = %path.display(), "exported lead batch");
    Ok(Some(path))
}

/// Every identity hash (current and discovery-time) of every lead in every
/// previously exported batch.
///
/// Unreadable or malformed files are skipped.
pub async fn load_seen_hashes(leads_dir: &Path) -> Result<HashSet<String>> {
    let root = leads_dir.to_path_buf();
    tokio::task::spawn_blocking(move || scan_archive(&root))
        .await
        .map_err(|e| LeadscoutError::Storage(format!("archive scan task failed: {e}")))
}

fn scan_archive(root: &Path) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                if dir != root || e.kind() != std::io::ErrorKind::NotFound {
                    warn!(dir = %dir.display(), error = %e, "cannot read archive directory");
                }
                continue;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "json") {
                match std::fs::read_to_string(&path)
                    .map_err(|e| e.to_string())
                    .and_then(|s| serde_json::from_str::<Vec<Lead>>(&s).map_err(|e| e.to_string()))
                {
                    Ok(leads) => seen.extend(leads.iter().flat_map(Lead::known_hashes)),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping unreadable batch")
                    }
                }
            }
        }
    }

    debug!(count = seen.len(), "loaded seen identity hashes");
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("ls_export_test_{}", Uuid::now_v7()))
    }

    fn lead(domain: &str) -> Lead {
        Lead::new("Biz", Some(domain), "test")
    }

    #[test]
    fn batch_dir_is_slugged() {
        let query = LeadQuery::new("Hair Salon", "Austin, TX", 1).unwrap();
        assert_eq!(
            batch_dir(Path::new("/var/leads"), &query),
            PathBuf::from("/var/leads/hair-salon/austin-tx")
        );
        let anywhere = LeadQuery::new("dentist", "", 1).unwrap();
        assert_eq!(
            batch_dir(Path::new("/l"), &anywhere),
            PathBuf::from("/l/dentist/any")
        );
    }

    #[tokio::test]
    async fn writes_new_file_per_batch() {
        let root = temp_dir();
        let query = LeadQuery::new("dentist", "Austin", 5).unwrap();

        let first = write_batch(&root, &query, &[lead("a.com"), lead("b.com")])
            .await
            .unwrap()
            .unwrap();
        let second = write_batch(&root, &query, &[lead("c.com")]).await.unwrap().unwrap();

        assert_ne!(first, second);
        assert!(first.file_name().unwrap().to_string_lossy().ends_with("_2.json"));
        assert!(second.file_name().unwrap().to_string_lossy().ends_with("_1.json"));

        let parsed: Vec<Lead> =
            serde_json::from_str(&std::fs::read_to_string(&first).unwrap()).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].domain, "a.com");

        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn empty_batch_writes_nothing() {
        let root = temp_dir();
        let query = LeadQuery::new("dentist", "Austin", 5).unwrap();
        assert!(write_batch(&root, &query, &[]).await.unwrap().is_none());
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn seen_hashes_span_all_batches() {
        let root = temp_dir();
        let dentists = LeadQuery::new("dentist", "Austin", 5).unwrap();
        let plumbers = LeadQuery::new("plumber", "Dallas", 5).unwrap();

        let mut with_email = lead("a.com");
        with_email.add_email("hi@a.com");
        write_batch(&root, &dentists, &[with_email.clone()]).await.unwrap();
        write_batch(&root, &plumbers, &[lead("b.com")]).await.unwrap();

        // Garbage alongside real batches is ignored
        let junk_dir = batch_dir(&root, &plumbers);
        std::fs::write(junk_dir.join("broken.json"), "{oops").unwrap();

        let seen = load_seen_hashes(&root).await.unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.contains(&with_email.identity_hash()));
        assert!(seen.contains(&lead("b.com").identity_hash()));
        assert!(!seen.contains(&lead("a.com").identity_hash()));

        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn seen_hashes_include_discovery_identity() {
        let root = temp_dir();
        let query = LeadQuery::new("dentist", "Austin", 5).unwrap();

        let mut enriched = lead("a.com");
        enriched.mark_discovered();
        enriched.add_email("info@a.com");
        write_batch(&root, &query, &[enriched.clone()]).await.unwrap();

        let seen = load_seen_hashes(&root).await.unwrap();
        assert!(seen.contains(&enriched.identity_hash()));
        assert!(seen.contains(&lead("a.com").identity_hash()));
        assert_eq!(seen.len(), 2);

        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn missing_archive_is_empty() {
        let seen = load_seen_hashes(&temp_dir()).await.unwrap();
        assert!(seen.is_empty());
    }
}
