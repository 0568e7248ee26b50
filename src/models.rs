use serde::{Deserialize, Serialize};

/// Where a music item came from. Hosts use this to decide which operations
/// (streaming, artwork refresh) apply to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemSource {
    Emby,
    NcmImport,
    // Emby-hosted audio carrying NetEase artwork; artwork must not be refreshed
    EmbyNcmArtwork,
}

/// A track as described by the NetEase playlist API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalTrack {
    pub external_id: String,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub artwork_url: Option<String>,
    pub duration_secs: Option<u64>,
}

/// A search hit from the local Emby catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalCandidate {
    pub local_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub artwork_url: Option<String>,
    pub duration_secs: Option<u64>,
}

/// Result of a successful match: local playable identity, external artwork.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedTrack {
    pub local_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub artwork_url: Option<String>,
    pub duration_secs: Option<u64>,
    pub source: ItemSource,
}

/// A playable track item exposed to the host player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicItem {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub artwork: Option<String>,
    pub duration_secs: Option<u64>,
    pub source: ItemSource,
}

impl From<MatchedTrack> for MusicItem {
    fn from(m: MatchedTrack) -> Self {
        MusicItem {
            id: m.local_id,
            title: m.title,
            artist: m.artist,
            album: m.album,
            artwork: m.artwork_url,
            duration_secs: m.duration_secs,
            source: m.source,
        }
    }
}

/// Prefix of ids given to NetEase tracks that have no Emby counterpart.
pub const NCM_TMP_ID_PREFIX: &str = "ncm-tmp-";

impl From<&ExternalTrack> for MusicItem {
    fn from(t: &ExternalTrack) -> Self {
        MusicItem {
            id: format!("{}{}", NCM_TMP_ID_PREFIX, t.external_id),
            title: t.title.clone(),
            artist: t.artist.clone(),
            album: t
                .album
                .clone()
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| "unknown album".to_string()),
            artwork: t.artwork_url.clone(),
            duration_secs: t.duration_secs,
            source: ItemSource::NcmImport,
        }
    }
}

impl From<MusicItem> for LocalCandidate {
    fn from(m: MusicItem) -> Self {
        LocalCandidate {
            local_id: m.id,
            title: m.title,
            artist: m.artist,
            album: m.album,
            artwork_url: m.artwork,
            duration_secs: m.duration_secs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlbumItem {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub artwork: Option<String>,
    pub description: String,
    pub year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtistItem {
    pub id: String,
    pub name: String,
    pub avatar: Option<String>,
}

/// A playlist ("sheet") on the Emby server, or one of the virtual sheets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistItem {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub artwork: Option<String>,
    pub description: String,
}

/// One page of results. `is_end` is true when no further page exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPage<T> {
    pub is_end: bool,
    pub items: Vec<T>,
}

impl<T> SearchPage<T> {
    pub fn end(items: Vec<T>) -> Self {
        Self { is_end: true, items }
    }

    pub fn empty() -> Self {
        Self::end(Vec::new())
    }
}

/// Tracks of an album or playlist, plus the collection's own display record
/// on the first page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetTracks<H> {
    pub is_end: bool,
    pub tracks: Vec<MusicItem>,
    pub header: Option<H>,
}

/// A browse tag on the recommendation screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetTag {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendTags {
    pub pinned: Vec<SheetTag>,
    pub data: Vec<SheetTag>,
}
