use crate::api::{CatalogSearch, PlaylistSource};
use crate::config::ImportConfig;
use crate::error::{ImportError, MatchAttemptError};
use crate::matcher::{merge_match, select_best_match};
use crate::models::{ExternalTrack, MatchedTrack, MusicItem};
use crate::reference;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Outcome of one search-and-score unit. `Ok(None)` means searched but no
/// acceptable candidate.
pub type MatchOutcome = Result<Option<MatchedTrack>, MatchAttemptError>;

/// Phases of one import run. Every phase except `Matching` may end in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Resolving,
    FetchingIds,
    FetchingMetadata,
    Matching,
    Done,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub concurrency: usize,
    pub match_result_count: usize,
    pub duration_tolerance_secs: u64,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self::from(&ImportConfig::default())
    }
}

impl From<&ImportConfig> for ImportOptions {
    fn from(cfg: &ImportConfig) -> Self {
        Self {
            concurrency: cfg.concurrency.max(1),
            match_result_count: cfg.match_result_count,
            duration_tolerance_secs: cfg.duration_tolerance_secs,
        }
    }
}

/// Counts and matched tracks from a matching pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchSummary {
    pub matched: Vec<MatchedTrack>,
    /// Tracks left without a local match (unmatched or failed), as NetEase items.
    pub missing: Vec<MusicItem>,
    pub unmatched: usize,
    pub failed: usize,
}

/// Result of one import run.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub playlist_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Track ids listed by the playlist.
    pub listed: usize,
    /// Tracks whose metadata could be fetched.
    pub fetched: usize,
    pub unmatched: usize,
    pub failed: usize,
    /// Matched tracks in batch-settle order. Unmatched tracks are dropped.
    pub tracks: Vec<MatchedTrack>,
    /// Unmatched and failed tracks, tagged `NcmImport`. Not playable from Emby.
    pub missing: Vec<MusicItem>,
}

/// Drives playlist imports: resolve the reference, fetch the upstream track
/// list, then match every track against the local catalog.
pub struct Importer {
    source: Arc<dyn PlaylistSource>,
    catalog: Arc<dyn CatalogSearch>,
    options: ImportOptions,
}

impl Importer {
    pub fn new(source: Arc<dyn PlaylistSource>, catalog: Arc<dyn CatalogSearch>, mut options: ImportOptions) -> Self {
        options.concurrency = options.concurrency.max(1);
        Self { source, catalog, options }
    }

    /// Run a full import for a playlist reference (share link or numeric id).
    ///
    /// Fails only when the reference is unrecognized or the playlist cannot be
    /// listed. Per-track search failures are counted and the track dropped.
    pub async fn import_playlist(&self, reference: &str) -> Result<ImportReport, ImportError> {
        let started_at = Utc::now();
        let mut state = RunState::Resolving;
        debug!("import: {:?}", state);

        let playlist_id = reference::resolve(reference).map_err(|e| {
            warn!("import: {:?} -> {:?}: {}", state, RunState::Failed, e);
            e
        })?;

        state = RunState::FetchingIds;
        debug!("import: {:?} for playlist {}", state, playlist_id);
        let ids = self.source.list_track_ids(&playlist_id).await.map_err(|e| {
            error!("import: {:?} -> {:?}: {}", state, RunState::Failed, e);
            e
        })?;

        if ids.is_empty() {
            info!("import: playlist {} is empty", playlist_id);
            return Ok(ImportReport {
                playlist_id: playlist_id.to_string(),
                started_at,
                finished_at: Utc::now(),
                listed: 0,
                fetched: 0,
                unmatched: 0,
                failed: 0,
                tracks: Vec::new(),
                missing: Vec::new(),
            });
        }

        state = RunState::FetchingMetadata;
        debug!("import: {:?} for {} tracks", state, ids.len());
        let tracks = self.source.fetch_track_metadata(&ids).await;
        if tracks.len() < ids.len() {
            warn!(
                "import: metadata fetched for {} of {} tracks in playlist {}",
                tracks.len(),
                ids.len(),
                playlist_id
            );
        }

        state = RunState::Matching;
        debug!("import: {:?} {} tracks against {}", state, tracks.len(), self.catalog.name());
        let summary = self.match_tracks(&tracks).await;

        state = RunState::Done;
        info!(
            "import: {:?}. Found {} tracks on {} out of {} ({} unmatched, {} failed)",
            state,
            summary.matched.len(),
            self.catalog.name(),
            tracks.len(),
            summary.unmatched,
            summary.failed
        );

        Ok(ImportReport {
            playlist_id: playlist_id.to_string(),
            started_at,
            finished_at: Utc::now(),
            listed: ids.len(),
            fetched: tracks.len(),
            unmatched: summary.unmatched,
            failed: summary.failed,
            tracks: summary.matched,
            missing: summary.missing,
        })
    }

    /// Match tracks in batches of `concurrency`. A batch is admitted only
    /// after the previous one has fully settled.
    pub async fn match_tracks(&self, tracks: &[ExternalTrack]) -> MatchSummary {
        let total = tracks.len();
        let mut completed = 0usize;
        let mut summary = MatchSummary::default();

        for batch in tracks.chunks(self.options.concurrency) {
            let outcomes = join_all(batch.iter().map(|t| self.match_track(t))).await;

            for (track, outcome) in batch.iter().zip(outcomes) {
                completed += 1;
                if completed % 10 == 0 || completed == total {
                    info!("import: match progress {}/{}", completed, total);
                }
                match outcome {
                    Ok(Some(m)) => summary.matched.push(m),
                    Ok(None) => {
                        summary.unmatched += 1;
                        summary.missing.push(MusicItem::from(track));
                    }
                    Err(e) => {
                        error!("import: {}", e);
                        summary.failed += 1;
                        summary.missing.push(MusicItem::from(track));
                    }
                }
            }
        }

        summary
    }

    /// Search the catalog for one external track and score the candidates.
    pub async fn match_track(&self, track: &ExternalTrack) -> MatchOutcome {
        let query = format!("{} {}", track.title, track.artist);
        debug!("import: searching {} for {:?} (NCM id {})", self.catalog.name(), query, track.external_id);

        let page = self
            .catalog
            .search_tracks(&query, self.options.match_result_count)
            .await
            .map_err(|e| MatchAttemptError {
                external_id: track.external_id.clone(),
                title: track.title.clone(),
                message: e.to_string(),
            })?;

        if page.items.is_empty() {
            debug!("import: no results for {:?}", query);
            return Ok(None);
        }

        match select_best_match(track, &page.items, self.options.duration_tolerance_secs) {
            Some(winner) => Ok(Some(merge_match(track, winner))),
            None => {
                debug!("import: no confident match for {:?} by {}", track.title, track.artist);
                Ok(None)
            }
        }
    }
}
