use super::emby_auth::{self, authorization_value, EmbySession, EmbySettings, AUTH_HEADER};
use super::CatalogSearch;
use crate::error::{EmbyError, EmbyResult};
use crate::models::{
    AlbumItem, ArtistItem, ItemSource, LocalCandidate, MusicItem, PlaylistItem, RecommendTags,
    SearchPage, SheetTag, SheetTracks,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

pub const ALL_PLAYLISTS_TAG_ID: &str = "emby__all_playlists";
pub const ALL_SONGS_TAG_ID: &str = "emby__all_songs";

const TRACK_FIELDS: &str = "SortName,MediaSources,ProductionYear,PrimaryImageAspectRatio,BasicSyncInfo";
const ALBUM_FIELDS: &str = "SortName,ProductionYear,BasicSyncInfo,ChildCount";
const ARTIST_FIELDS: &str = "SortName,BasicSyncInfo,PrimaryImageAspectRatio";
const PLAYLIST_FIELDS: &str = "SortName,CanDelete,PrimaryImageAspectRatio,BasicSyncInfo,ChildCount";
const USER_ITEMS: &str = "/Users/{user_id}/Items";

const UNKNOWN_TITLE: &str = "unknown title";
const UNKNOWN_ARTIST: &str = "unknown artist";
const UNKNOWN_ALBUM: &str = "unknown album";

/// `RunTimeTicks` are 100ns units.
const TICKS_PER_SECOND: f64 = 10_000_000.0;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ItemsResponse {
    #[serde(default)]
    items: Vec<EmbyItem>,
    #[serde(default)]
    total_record_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NameRef {
    Named {
        #[serde(rename = "Name")]
        name: Option<String>,
    },
    Plain(String),
}

impl NameRef {
    fn name(&self) -> Option<&str> {
        match self {
            NameRef::Named { name } => name.as_deref(),
            NameRef::Plain(s) => Some(s),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct EmbyItem {
    id: String,
    name: Option<String>,
    artists: Vec<String>,
    album: Option<String>,
    album_artists: Option<Vec<NameRef>>,
    artist_items: Option<Vec<NameRef>>,
    image_tags: HashMap<String, String>,
    album_primary_image_tag: Option<String>,
    run_time_ticks: Option<i64>,
    production_year: Option<i32>,
    child_count: Option<u64>,
}

/// Emby API client. Holds the session explicitly: login happens lazily on the
/// first request and again once after a 401.
pub struct EmbyClient {
    client: Client,
    settings: EmbySettings,
    page_size: usize,
    session: tokio::sync::Mutex<Option<EmbySession>>,
}

impl EmbyClient {
    pub fn new(settings: EmbySettings, page_size: usize) -> Self {
        Self {
            client: Client::new(),
            settings,
            page_size: page_size.max(1),
            session: tokio::sync::Mutex::new(None),
        }
    }

    pub fn host(&self) -> &str {
        &self.settings.host
    }

    /// Return the current session, logging in first when there is none.
    pub async fn ensure_login(&self) -> EmbyResult<EmbySession> {
        let mut lock = self.session.lock().await;
        if let Some(s) = lock.as_ref() {
            return Ok(s.clone());
        }
        debug!("Emby: not logged in, logging in");
        let s = emby_auth::login(&self.client, &self.settings).await?;
        *lock = Some(s.clone());
        Ok(s)
    }

    /// Force a fresh login, replacing any existing session.
    pub async fn login(&self) -> EmbyResult<EmbySession> {
        self.invalidate_session().await;
        self.ensure_login().await
    }

    async fn invalidate_session(&self) {
        let mut lock = self.session.lock().await;
        *lock = None;
    }

    /// Drop the session only if it is still `stale`. A concurrent request may
    /// already have replaced it after its own 401.
    async fn invalidate_stale_session(&self, stale: &EmbySession) {
        let mut lock = self.session.lock().await;
        if lock.as_ref() == Some(stale) {
            *lock = None;
        }
    }

    async fn send_get(
        &self,
        session: &EmbySession,
        path: &str,
        params: &[(&str, String)],
    ) -> EmbyResult<reqwest::Response> {
        let url = format!(
            "{}{}",
            self.settings.host,
            path.replace("{user_id}", &session.user_id)
        );
        let resp = self
            .client
            .get(&url)
            .query(&[("UserId", session.user_id.as_str())])
            .query(params)
            .header(AUTH_HEADER, authorization_value(&self.settings, Some(&session.access_token)))
            .timeout(self.settings.timeout)
            .send()
            .await?;
        Ok(resp)
    }

    /// Authenticated GET. `{user_id}` in `path` is replaced by the session's
    /// user id. On 401 the session is dropped and the request retried once.
    async fn get_json<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> EmbyResult<T> {
        let session = self.ensure_login().await?;
        let mut resp = self.send_get(&session, path, params).await?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            warn!("Emby: got 401 for {}; logging in again", path);
            self.invalidate_stale_session(&session).await;
            let session = self.ensure_login().await?;
            resp = self.send_get(&session, path, params).await?;
            if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
                return Err(EmbyError::Unauthorized);
            }
        }

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EmbyError::Status { status: status.as_u16(), body });
        }
        resp.json::<T>()
            .await
            .map_err(|e| EmbyError::Decode(e.to_string()))
    }

    async fn list_items(&self, path: &str, params: Vec<(&str, String)>) -> EmbyResult<ItemsResponse> {
        self.get_json(path, &params).await
    }

    /// Artwork URL for an item, or None when the id or image tag is missing.
    pub fn artwork_url(&self, item_id: &str, image_tag: Option<&str>, kind: &str, max_width: u32, max_height: u32) -> Option<String> {
        artwork_url(&self.settings.host, item_id, image_tag, kind, max_width, max_height)
    }

    pub async fn search_music(&self, query: &str, page: usize, count: usize) -> EmbyResult<SearchPage<MusicItem>> {
        let start = start_index(page, count);
        let mut params = paged_params("Audio", TRACK_FIELDS, start, count, "SortName");
        params.push(("SearchTerm", query.to_string()));
        let data = self.list_items(USER_ITEMS, params).await?;
        Ok(self.page_of(start, data, |h, it| format_music_item(h, it)))
    }

    pub async fn search_albums(&self, query: &str, page: usize) -> EmbyResult<SearchPage<AlbumItem>> {
        let start = start_index(page, self.page_size);
        let mut params = paged_params("MusicAlbum", ALBUM_FIELDS, start, self.page_size, "SortName");
        params.push(("SearchTerm", query.to_string()));
        let data = self.list_items(USER_ITEMS, params).await?;
        Ok(self.page_of(start, data, |h, it| format_album_item(h, it)))
    }

    /// Search artists via `/Artists`, falling back to `/Artists/AlbumArtists`
    /// when the first endpoint fails.
    pub async fn search_artists(&self, query: &str, page: usize) -> EmbyResult<SearchPage<ArtistItem>> {
        let start = start_index(page, self.page_size);
        let mut params = vec![
            ("SearchTerm", query.to_string()),
            ("Recursive", "true".to_string()),
            ("Fields", ARTIST_FIELDS.to_string()),
            ("EnableImageTypes", "Primary".to_string()),
            ("ImageTypeLimit", "1".to_string()),
            ("StartIndex", start.to_string()),
            ("Limit", self.page_size.to_string()),
        ];
        params.extend(sort_params("SortName"));
        let data = match self.get_json::<ItemsResponse>("/Artists", &params).await {
            Ok(d) => d,
            Err(e) => {
                warn!("Emby: /Artists search failed ({}); trying /Artists/AlbumArtists", e);
                self.get_json::<ItemsResponse>("/Artists/AlbumArtists", &params).await?
            }
        };
        Ok(self.page_of(start, data, |h, it| format_artist_item(h, it)))
    }

    pub async fn search_playlists(&self, query: &str, page: usize) -> EmbyResult<SearchPage<PlaylistItem>> {
        let start = start_index(page, self.page_size);
        let mut params = playlist_params(start, self.page_size);
        params.push(("SearchTerm", query.to_string()));
        let data = self.list_items(USER_ITEMS, params).await?;
        Ok(self.page_of(start, data, |h, it| format_playlist_item(h, it)))
    }

    /// All tracks of an album in disc/track order. Albums are a single page.
    pub async fn album_tracks(&self, album: &AlbumItem, page: usize) -> EmbyResult<SheetTracks<AlbumItem>> {
        if page > 1 {
            return Ok(SheetTracks { is_end: true, tracks: Vec::new(), header: None });
        }
        let params = vec![
            ("ParentId", album.id.clone()),
            ("IncludeItemTypes", "Audio".to_string()),
            ("Recursive", "true".to_string()),
            ("Fields", TRACK_FIELDS.to_string()),
            ("EnableImageTypes", "Primary".to_string()),
            ("ImageTypeLimit", "1".to_string()),
            ("SortBy", "ParentIndexNumber,IndexNumber,SortName".to_string()),
            ("SortOrder", "Ascending".to_string()),
        ];
        let data = self.list_items(USER_ITEMS, params).await?;
        let host = &self.settings.host;
        Ok(SheetTracks {
            is_end: true,
            tracks: data.items.iter().map(|it| format_music_item(host, it)).collect(),
            header: Some(album.clone()),
        })
    }

    /// Tracks of a server playlist. The virtual all-songs sheet lists the
    /// whole library.
    pub async fn playlist_tracks(&self, sheet: &PlaylistItem, page: usize) -> EmbyResult<SheetTracks<PlaylistItem>> {
        if sheet.id == ALL_SONGS_TAG_ID {
            return self.all_songs(page).await;
        }
        let start = start_index(page, self.page_size);
        let mut params = paged_params("Audio", TRACK_FIELDS, start, self.page_size, "SortName");
        params.push(("ParentId", sheet.id.clone()));
        let data = self.list_items(USER_ITEMS, params).await?;
        let tracks = self.page_of(start, data, |h, it| format_music_item(h, it));
        Ok(SheetTracks {
            is_end: tracks.is_end,
            tracks: tracks.items,
            header: (page <= 1).then(|| sheet.clone()),
        })
    }

    pub async fn all_songs(&self, page: usize) -> EmbyResult<SheetTracks<PlaylistItem>> {
        let start = start_index(page, self.page_size);
        let params = paged_params("Audio", TRACK_FIELDS, start, self.page_size, "SortName");
        let data = self.list_items(USER_ITEMS, params).await?;
        let tracks = self.page_of(start, data, |h, it| format_music_item(h, it));
        Ok(SheetTracks {
            is_end: tracks.is_end,
            tracks: tracks.items,
            header: (page <= 1).then(|| all_songs_sheet("All music on the server")),
        })
    }

    pub async fn list_playlists(&self, page: usize) -> EmbyResult<SearchPage<PlaylistItem>> {
        let start = start_index(page, self.page_size);
        let params = playlist_params(start, self.page_size);
        let data = self.list_items(USER_ITEMS, params).await?;
        Ok(self.page_of(start, data, |h, it| format_playlist_item(h, it)))
    }

    pub fn recommend_tags(&self) -> RecommendTags {
        RecommendTags {
            pinned: vec![
                SheetTag { id: ALL_SONGS_TAG_ID.into(), title: "All songs".into() },
                SheetTag { id: ALL_PLAYLISTS_TAG_ID.into(), title: "Emby playlists".into() },
            ],
            data: Vec::new(),
        }
    }

    pub async fn sheets_by_tag(&self, tag: &SheetTag, page: usize) -> EmbyResult<SearchPage<PlaylistItem>> {
        match tag.id.as_str() {
            ALL_PLAYLISTS_TAG_ID => self.list_playlists(page).await,
            ALL_SONGS_TAG_ID if page <= 1 => Ok(SearchPage::end(vec![all_songs_sheet(
                "Browse every song on the server",
            )])),
            _ => Ok(SearchPage::empty()),
        }
    }

    /// Direct stream URL for an Emby-hosted item. Items from other sources
    /// have none.
    pub async fn stream_url(&self, item: &MusicItem) -> EmbyResult<Option<String>> {
        if !matches!(item.source, ItemSource::Emby | ItemSource::EmbyNcmArtwork) {
            warn!("Emby: no media source for item {} from {:?}", item.id, item.source);
            return Ok(None);
        }
        let session = self.ensure_login().await?;
        Ok(Some(stream_url(&self.settings.host, &item.id, &session.access_token)))
    }

    fn page_of<T, F>(&self, start: usize, data: ItemsResponse, format: F) -> SearchPage<T>
    where
        F: Fn(&str, &EmbyItem) -> T,
    {
        let total = data.total_record_count.unwrap_or(0) as usize;
        let is_end = start + data.items.len() >= total;
        let items = data
            .items
            .iter()
            .map(|it| format(&self.settings.host, it))
            .collect();
        SearchPage { is_end, items }
    }
}

#[async_trait]
impl CatalogSearch for EmbyClient {
    async fn search_tracks(&self, query: &str, limit: usize) -> anyhow::Result<SearchPage<LocalCandidate>> {
        let page = self.search_music(query, 1, limit).await?;
        Ok(SearchPage {
            is_end: page.is_end,
            items: page.items.into_iter().map(LocalCandidate::from).collect(),
        })
    }

    fn name(&self) -> &str {
        "emby"
    }
}

fn start_index(page: usize, count: usize) -> usize {
    page.saturating_sub(1) * count
}

fn sort_params(sort_by: &str) -> [(&'static str, String); 2] {
    [("SortBy", sort_by.to_string()), ("SortOrder", "Ascending".to_string())]
}

fn paged_params(types: &str, fields: &str, start: usize, limit: usize, sort_by: &str) -> Vec<(&'static str, String)> {
    let mut p = vec![
        ("IncludeItemTypes", types.to_string()),
        ("Recursive", "true".to_string()),
        ("Fields", fields.to_string()),
        ("EnableImageTypes", "Primary".to_string()),
        ("ImageTypeLimit", "1".to_string()),
        ("StartIndex", start.to_string()),
        ("Limit", limit.to_string()),
    ];
    p.extend(sort_params(sort_by));
    p
}

fn playlist_params(start: usize, limit: usize) -> Vec<(&'static str, String)> {
    let mut p = paged_params("Playlist", PLAYLIST_FIELDS, start, limit, "SortName");
    p.push(("mediaTypes", "Audio".to_string()));
    p
}

fn all_songs_sheet(description: &str) -> PlaylistItem {
    PlaylistItem {
        id: ALL_SONGS_TAG_ID.into(),
        title: "All songs".into(),
        artist: "Emby".into(),
        artwork: None,
        description: description.into(),
    }
}

pub fn artwork_url(host: &str, item_id: &str, image_tag: Option<&str>, kind: &str, max_width: u32, max_height: u32) -> Option<String> {
    let tag = image_tag.filter(|t| !t.is_empty())?;
    if item_id.is_empty() {
        return None;
    }
    Some(format!(
        "{}/Items/{}/Images/{}?tag={}&maxWidth={}&maxHeight={}&quality=90",
        host, item_id, kind, tag, max_width, max_height
    ))
}

pub fn stream_url(host: &str, item_id: &str, token: &str) -> String {
    format!("{}/Audio/{}/stream?static=true&api_key={}", host, item_id, token)
}

fn non_empty_or(s: Option<&str>, fallback: &str) -> String {
    s.filter(|v| !v.is_empty()).unwrap_or(fallback).to_string()
}

fn join_names(names: &[NameRef]) -> String {
    names.iter().filter_map(|n| n.name()).collect::<Vec<_>>().join(", ")
}

fn format_music_item(host: &str, it: &EmbyItem) -> MusicItem {
    let tag = it
        .image_tags
        .get("Primary")
        .map(String::as_str)
        .or(it.album_primary_image_tag.as_deref());
    let artist = it.artists.join(", ");
    MusicItem {
        id: it.id.clone(),
        title: non_empty_or(it.name.as_deref(), UNKNOWN_TITLE),
        artist: non_empty_or(Some(artist.as_str()), UNKNOWN_ARTIST),
        album: non_empty_or(it.album.as_deref(), UNKNOWN_ALBUM),
        artwork: artwork_url(host, &it.id, tag, "Primary", 600, 600),
        duration_secs: it
            .run_time_ticks
            .filter(|t| *t > 0)
            .map(|t| (t as f64 / TICKS_PER_SECOND).round() as u64),
        source: ItemSource::Emby,
    }
}

fn format_album_item(host: &str, it: &EmbyItem) -> AlbumItem {
    let artists = it
        .album_artists
        .as_deref()
        .or(it.artist_items.as_deref())
        .map(join_names)
        .unwrap_or_default();
    AlbumItem {
        id: it.id.clone(),
        title: non_empty_or(it.name.as_deref(), UNKNOWN_ALBUM),
        artist: non_empty_or(Some(artists.as_str()), UNKNOWN_ARTIST),
        artwork: artwork_url(host, &it.id, it.image_tags.get("Primary").map(String::as_str), "Primary", 600, 600),
        description: format!(
            "Year: {}",
            it.production_year.map(|y| y.to_string()).unwrap_or_else(|| "?".into())
        ),
        year: it.production_year,
    }
}

fn format_artist_item(host: &str, it: &EmbyItem) -> ArtistItem {
    ArtistItem {
        id: it.id.clone(),
        name: non_empty_or(it.name.as_deref(), UNKNOWN_ARTIST),
        avatar: artwork_url(host, &it.id, it.image_tags.get("Primary").map(String::as_str), "Primary", 600, 600),
    }
}

fn format_playlist_item(host: &str, it: &EmbyItem) -> PlaylistItem {
    PlaylistItem {
        id: it.id.clone(),
        title: non_empty_or(it.name.as_deref(), "unknown playlist"),
        artist: "Emby".into(),
        artwork: artwork_url(host, &it.id, it.image_tags.get("Primary").map(String::as_str), "Primary", 200, 200),
        description: format!(
            "Songs: {}",
            it.child_count.map(|c| c.to_string()).unwrap_or_else(|| "?".into())
        ),
    }
}
