pub mod emby;
pub mod emby_auth;
pub mod mock;
pub mod ncm;

use crate::error::ImportError;
use crate::models::{ExternalTrack, LocalCandidate, SearchPage};
use crate::reference::PlaylistId;

/// The one capability the import core needs from the local media server.
/// Implementations: emby::EmbyClient, mock::MockCatalog.
#[async_trait::async_trait]
pub trait CatalogSearch: Send + Sync {
    /// Free-text track search returning at most `limit` candidates, in the
    /// server's relevance order.
    async fn search_tracks(&self, query: &str, limit: usize) -> anyhow::Result<SearchPage<LocalCandidate>>;

    /// Return the catalog's name (for logging)
    fn name(&self) -> &str;
}

/// Read access to an external playlist service.
/// Implementations: ncm::NcmClient, mock::MockPlaylistSource.
#[async_trait::async_trait]
pub trait PlaylistSource: Send + Sync {
    /// Ordered track ids of a playlist. Any failure is fatal to an import.
    async fn list_track_ids(&self, playlist_id: &PlaylistId) -> Result<Vec<String>, ImportError>;

    /// Full metadata for the given ids. Batching is done by the implementation;
    /// failed batches are skipped.
    async fn fetch_track_metadata(&self, ids: &[String]) -> Vec<ExternalTrack>;
}
