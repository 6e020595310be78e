use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::errors::StorageError;
use crate::snapshot::{LinkRef, NormalizedSnapshot, PageElement};

/// One observed page, immutable once recorded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageState {
    /// Canonical URL
    pub url: String,
    /// Content fingerprint: the page's identity for deduplication
    pub fingerprint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Hops from the start URL
    pub depth: u32,
    #[serde(default)]
    pub links: Vec<LinkRef>,
    #[serde(default)]
    pub elements: Vec<PageElement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl PageState {
    /// Build a page state from a normalized snapshot observed at `depth`
    pub fn from_snapshot(snapshot: &NormalizedSnapshot, depth: u32) -> Self {
        Self {
            url: snapshot.url.clone(),
            fingerprint: snapshot.fingerprint.clone(),
            title: snapshot.title.clone(),
            depth,
            links: snapshot.links.clone(),
            elements: snapshot.elements.clone(),
            screenshot_path: None,
            timestamp: Utc::now(),
        }
    }
}

/// Content-addressed registry of visited page states.
///
/// `record` is idempotent by fingerprint (unless deduplication is turned
/// off): recording the same normalized page twice never produces two
/// distinct entries. Implementations must keep previously recorded
/// entries intact even when a write fails.
pub trait MemoryStore {
    /// Record a page state. Returns the stored state and whether it was
    /// novel. With deduplication enabled, a repeated fingerprint returns
    /// the existing record and `false`.
    fn record(&mut self, state: PageState) -> Result<(PageState, bool), StorageError>;

    /// Look up a page state by fingerprint
    fn lookup(&self, fingerprint: &str) -> Option<&PageState>;

    /// All recorded states in visitation order; restartable iteration
    fn visited(&self) -> &[PageState];

    /// Whether a canonical URL has already been recorded; used by the
    /// planner to avoid re-enqueueing known pages
    fn contains_url(&self, url: &str) -> bool;

    /// Where screenshots should be written, if this store persists them
    fn screenshot_dir(&self) -> Option<PathBuf> {
        None
    }
}

/// Purely in-memory store; also the fallback when persistence fails
#[derive(Debug, Default)]
pub struct InMemoryStore {
    pages: Vec<PageState>,
    by_fingerprint: HashMap<String, usize>,
    urls: HashSet<String>,
    dedup: bool,
}

impl InMemoryStore {
    pub fn new(dedup: bool) -> Self {
        Self {
            dedup,
            ..Default::default()
        }
    }

    fn insert(&mut self, state: PageState) -> (PageState, bool) {
        if self.dedup {
            if let Some(&idx) = self.by_fingerprint.get(&state.fingerprint) {
                return (self.pages[idx].clone(), false);
            }
        }

        self.urls.insert(state.url.clone());
        self.by_fingerprint
            .insert(state.fingerprint.clone(), self.pages.len());
        self.pages.push(state.clone());
        (state, true)
    }
}

impl MemoryStore for InMemoryStore {
    fn record(&mut self, state: PageState) -> Result<(PageState, bool), StorageError> {
        Ok(self.insert(state))
    }

    fn lookup(&self, fingerprint: &str) -> Option<&PageState> {
        self.by_fingerprint
            .get(fingerprint)
            .map(|&idx| &self.pages[idx])
    }

    fn visited(&self) -> &[PageState] {
        &self.pages
    }

    fn contains_url(&self, url: &str) -> bool {
        self.urls.contains(url)
    }
}

/// File-backed store: an append-only JSON-lines log, one record per page.
///
/// Records from earlier runs against the same directory are loaded into a
/// read-only index that feeds `lookup` and `contains_url`, so known pages
/// still deduplicate across sessions. The visitation log (`visited`) is
/// scoped to the current session and starts empty on open. An interrupted
/// write leaves at most one partial trailing line, which is discarded on
/// the next load, so earlier records survive any interruption.
pub struct FileMemoryStore {
    /// Current session's records only
    inner: InMemoryStore,
    /// Fingerprint index of records from earlier sessions
    prior: HashMap<String, PageState>,
    prior_urls: HashSet<String>,
    writer: File,
    dir: PathBuf,
}

impl FileMemoryStore {
    const LOG_FILE: &'static str = "pages.jsonl";

    /// Open (creating if needed) a store rooted at `dir`
    pub fn open<P: AsRef<Path>>(dir: P, dedup: bool) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let log_path = dir.join(Self::LOG_FILE);
        let mut prior: HashMap<String, PageState> = HashMap::new();
        let mut prior_urls = HashSet::new();

        if log_path.exists() {
            let reader = BufReader::new(File::open(&log_path)?);
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<PageState>(&line) {
                    Ok(state) => {
                        prior_urls.insert(state.url.clone());
                        prior.entry(state.fingerprint.clone()).or_insert(state);
                    }
                    Err(e) => {
                        // Incomplete record from an interrupted write
                        ::log::warn!("discarding unreadable page record: {}", e);
                    }
                }
            }
            ::log::info!(
                "loaded {} prior page records from {}",
                prior.len(),
                log_path.display()
            );
        }

        let writer = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        Ok(Self {
            inner: InMemoryStore::new(dedup),
            prior,
            prior_urls,
            writer,
            dir,
        })
    }

    fn append(&mut self, state: &PageState) -> Result<(), StorageError> {
        let mut line = serde_json::to_string(state)?;
        line.push('\n');
        self.writer.write_all(line.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }
}

impl MemoryStore for FileMemoryStore {
    fn record(&mut self, state: PageState) -> Result<(PageState, bool), StorageError> {
        if self.inner.dedup {
            if let Some(&idx) = self.inner.by_fingerprint.get(&state.fingerprint) {
                return Ok((self.inner.pages[idx].clone(), false));
            }
            // Known from an earlier session: dedup, but keep it out of
            // this session's visitation log
            if let Some(prior) = self.prior.get(&state.fingerprint) {
                return Ok((prior.clone(), false));
            }
        }

        // Keep the in-memory view consistent even if the write fails, so
        // the session can continue without persistence
        let (stored, novel) = self.inner.insert(state);
        self.append(&stored)?;
        Ok((stored, novel))
    }

    fn lookup(&self, fingerprint: &str) -> Option<&PageState> {
        self.inner
            .lookup(fingerprint)
            .or_else(|| self.prior.get(fingerprint))
    }

    fn visited(&self) -> &[PageState] {
        self.inner.visited()
    }

    fn contains_url(&self, url: &str) -> bool {
        self.inner.contains_url(url) || self.prior_urls.contains(url)
    }

    fn screenshot_dir(&self) -> Option<PathBuf> {
        Some(self.dir.join("screenshots"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(url: &str, fingerprint: &str, depth: u32) -> PageState {
        PageState {
            url: url.to_string(),
            fingerprint: fingerprint.to_string(),
            title: None,
            depth,
            links: Vec::new(),
            elements: Vec::new(),
            screenshot_path: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_record_is_idempotent_by_fingerprint() {
        let mut store = InMemoryStore::new(true);

        let (_, novel) = store.record(page("https://a", "f1", 0)).unwrap();
        assert!(novel);

        // Same fingerprint from a different URL is still the same page
        let (existing, novel) = store.record(page("https://a2", "f1", 1)).unwrap();
        assert!(!novel);
        assert_eq!(existing.url, "https://a");
        assert_eq!(store.visited().len(), 1);
    }

    #[test]
    fn test_dedup_disabled_allows_revisits() {
        let mut store = InMemoryStore::new(false);
        store.record(page("https://a", "f1", 0)).unwrap();
        let (_, novel) = store.record(page("https://a", "f1", 1)).unwrap();
        assert!(novel);
        assert_eq!(store.visited().len(), 2);
    }

    #[test]
    fn test_visitation_order_preserved() {
        let mut store = InMemoryStore::new(true);
        store.record(page("https://a", "f1", 0)).unwrap();
        store.record(page("https://b", "f2", 1)).unwrap();
        store.record(page("https://c", "f3", 1)).unwrap();

        let urls: Vec<&str> = store.visited().iter().map(|p| p.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a", "https://b", "https://c"]);
        assert!(store.contains_url("https://b"));
        assert!(!store.contains_url("https://d"));
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();

        {
            let mut store = FileMemoryStore::open(dir.path(), true).unwrap();
            store.record(page("https://a", "f1", 0)).unwrap();
            store.record(page("https://b", "f2", 1)).unwrap();
        }

        // Earlier records feed lookup and URL dedup but not the new
        // session's visitation log
        let store = FileMemoryStore::open(dir.path(), true).unwrap();
        assert!(store.visited().is_empty());
        assert!(store.contains_url("https://b"));
        assert_eq!(store.lookup("f2").unwrap().url, "https://b");
    }

    #[test]
    fn test_prior_session_records_stay_out_of_the_log() {
        let dir = tempfile::tempdir().unwrap();

        {
            let mut store = FileMemoryStore::open(dir.path(), true).unwrap();
            store.record(page("https://example.com/old1", "f1", 0)).unwrap();
            store.record(page("https://example.com/old2", "f2", 1)).unwrap();
        }

        let mut store = FileMemoryStore::open(dir.path(), true).unwrap();
        assert!(store.visited().is_empty());

        // Re-observing a known page dedups against the prior index
        // without entering the log
        let (existing, novel) = store.record(page("https://a2", "f1", 0)).unwrap();
        assert!(!novel);
        assert_eq!(existing.url, "https://example.com/old1");
        assert!(store.visited().is_empty());

        // A genuinely new page starts this session's log
        let (_, novel) = store.record(page("https://example.com/new", "f3", 0)).unwrap();
        assert!(novel);
        assert_eq!(store.visited().len(), 1);
        assert_eq!(store.visited()[0].url, "https://example.com/new");
    }

    #[test]
    fn test_file_store_discards_partial_trailing_record() {
        let dir = tempfile::tempdir().unwrap();

        {
            let mut store = FileMemoryStore::open(dir.path(), true).unwrap();
            store.record(page("https://a", "f1", 0)).unwrap();
        }

        // Simulate a write interrupted mid-record
        let log_path = dir.path().join("pages.jsonl");
        let mut file = OpenOptions::new().append(true).open(&log_path).unwrap();
        file.write_all(b"{\"url\":\"https://b\",\"finger").unwrap();
        drop(file);

        let store = FileMemoryStore::open(dir.path(), true).unwrap();
        assert!(store.lookup("f1").is_some());
        assert!(!store.contains_url("https://b"));
    }
}
