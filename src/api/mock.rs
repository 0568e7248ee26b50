use super::{CatalogSearch, PlaylistSource};
use crate::error::ImportError;
use crate::models::{ExternalTrack, LocalCandidate, SearchPage};
use crate::reference::PlaylistId;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

/// In-memory catalog used in tests. Answers queries from a fixed table and
/// records how many searches were in flight at once.
#[derive(Default)]
pub struct MockCatalog {
    results: HashMap<String, Vec<LocalCandidate>>,
    failing: HashSet<String>,
    fail_all: bool,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
    queries: Mutex<Vec<(String, usize)>>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `query` with `candidates`.
    pub fn with_results(mut self, query: &str, candidates: Vec<LocalCandidate>) -> Self {
        self.results.insert(query.to_string(), candidates);
        self
    }

    /// Make searches for `query` fail.
    pub fn with_failure(mut self, query: &str) -> Self {
        self.failing.insert(query.to_string());
        self
    }

    pub fn failing_always(mut self) -> Self {
        self.fail_all = true;
        self
    }

    /// Hold every search for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every (query, limit) pair received, in arrival order.
    pub fn queries(&self) -> Vec<(String, usize)> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CatalogSearch for MockCatalog {
    async fn search_tracks(&self, query: &str, limit: usize) -> Result<SearchPage<LocalCandidate>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut q) = self.queries.lock() {
            q.push((query.to_string(), limit));
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_all || self.failing.contains(query) {
            info!("MockCatalog: failing search {}", query);
            return Err(anyhow!("mock search failure for {}", query));
        }
        let mut items = self.results.get(query).cloned().unwrap_or_default();
        items.truncate(limit);
        Ok(SearchPage::end(items))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// In-memory playlist service used in tests.
#[derive(Default)]
pub struct MockPlaylistSource {
    playlists: HashMap<String, Vec<String>>,
    tracks: HashMap<String, ExternalTrack>,
    metadata_calls: AtomicUsize,
}

impl MockPlaylistSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a playlist whose tracks are given in order.
    pub fn with_playlist(mut self, id: &str, tracks: Vec<ExternalTrack>) -> Self {
        let ids = tracks.iter().map(|t| t.external_id.clone()).collect();
        for t in tracks {
            self.tracks.insert(t.external_id.clone(), t);
        }
        self.playlists.insert(id.to_string(), ids);
        self
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlaylistSource for MockPlaylistSource {
    async fn list_track_ids(&self, playlist_id: &PlaylistId) -> Result<Vec<String>, ImportError> {
        self.playlists
            .get(playlist_id.as_str())
            .cloned()
            .ok_or_else(|| ImportError::UpstreamUnavailable(format!("no playlist {}", playlist_id)))
    }

    async fn fetch_track_metadata(&self, ids: &[String]) -> Vec<ExternalTrack> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        ids.iter().filter_map(|id| self.tracks.get(id).cloned()).collect()
    }
}
