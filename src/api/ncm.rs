use super::PlaylistSource;
use crate::config::ImportConfig;
use crate::error::ImportError;
use crate::models::ExternalTrack;
use crate::reference::PlaylistId;
use async_trait::async_trait;
use reqwest::header::{ORIGIN, REFERER, USER_AGENT};
use reqwest::Client;
use serde_json::Value;
use std::env;
use std::time::Duration;
use tracing::{debug, error, warn};

pub const NCM_DETAIL_BATCH_SIZE: usize = 200;

const NCM_REFERER: &str = "https://music.163.com/";
const NCM_USER_AGENT: &str = "Mozilla/5.0";
const UNKNOWN_TITLE: &str = "unknown title";
const UNKNOWN_ARTIST: &str = "unknown artist";

/// Read-only client for the public NetEase Cloud Music web API.
/// The base URL may be overridden by the NCM_API_BASE env var (useful for tests).
pub struct NcmClient {
    client: Client,
    base: String,
    batch_size: usize,
    timeout: Duration,
}

impl NcmClient {
    pub fn new(base: Option<String>, batch_size: usize, timeout: Duration) -> Self {
        let base = env::var("NCM_API_BASE")
            .ok()
            .or(base)
            .unwrap_or_else(|| "https://music.163.com".into());
        Self {
            client: Client::new(),
            base: base.trim_end_matches('/').to_string(),
            batch_size: batch_size.max(1),
            timeout,
        }
    }

    pub fn from_config(cfg: &ImportConfig) -> Self {
        Self::new(
            cfg.ncm_api_base.clone(),
            cfg.ncm_batch_size,
            Duration::from_secs(cfg.ncm_timeout_secs),
        )
    }

    async fn get_json(&self, url: &str) -> anyhow::Result<Value> {
        let resp = self
            .client
            .get(url)
            .header(REFERER, NCM_REFERER)
            .header(ORIGIN, NCM_REFERER)
            .header(USER_AGENT, NCM_USER_AGENT)
            .timeout(self.timeout)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            anyhow::bail!("{} => {}", status, txt);
        }
        Ok(resp.json().await?)
    }

    /// Fetch details for one batch of ids. Errors and empty payloads yield
    /// an empty list.
    pub async fn fetch_track_details(&self, ids: &[String]) -> Vec<ExternalTrack> {
        if ids.is_empty() {
            return Vec::new();
        }
        let ids_param = format!("[{}]", ids.join(","));
        let url = format!(
            "{}/api/song/detail/?ids={}",
            self.base,
            urlencoding::encode(&ids_param)
        );
        match self.get_json(&url).await {
            Ok(j) => match j["songs"].as_array() {
                Some(songs) if !songs.is_empty() => songs.iter().filter_map(parse_song).collect(),
                _ => {
                    warn!("NCM: invalid response from song detail for {} ids", ids.len());
                    Vec::new()
                }
            },
            Err(e) => {
                error!("NCM: failed to fetch track details for {} ids: {}", ids.len(), e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl PlaylistSource for NcmClient {
    async fn list_track_ids(&self, playlist_id: &PlaylistId) -> Result<Vec<String>, ImportError> {
        let url = format!(
            "{}/api/v3/playlist/detail?id={}&n=100000",
            self.base,
            urlencoding::encode(playlist_id.as_str())
        );
        let j = self.get_json(&url).await.map_err(|e| {
            error!("NCM: failed to get track ids for playlist {}: {}", playlist_id, e);
            ImportError::UpstreamUnavailable(e.to_string())
        })?;

        let track_ids = j["playlist"]["trackIds"].as_array().ok_or_else(|| {
            error!("NCM: invalid playlist detail response for {}", playlist_id);
            ImportError::UpstreamUnavailable(format!(
                "playlist {} detail response has no trackIds",
                playlist_id
            ))
        })?;

        let ids: Vec<String> = track_ids.iter().filter_map(|t| json_id(&t["id"])).collect();
        debug!("NCM: playlist {} lists {} tracks", playlist_id, ids.len());
        Ok(ids)
    }

    async fn fetch_track_metadata(&self, ids: &[String]) -> Vec<ExternalTrack> {
        let mut out = Vec::with_capacity(ids.len());
        for (i, batch) in ids.chunks(self.batch_size).enumerate() {
            let tracks = self.fetch_track_details(batch).await;
            debug!("NCM: batch {} returned {}/{} tracks", i + 1, tracks.len(), batch.len());
            out.extend(tracks);
        }
        out
    }
}

/// NetEase ids are numbers, occasionally strings.
fn json_id(v: &Value) -> Option<String> {
    match v {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Convert one song object into an ExternalTrack. Accepts both the `ar`/`al`
/// and the older `artists`/`album` spellings.
fn parse_song(song: &Value) -> Option<ExternalTrack> {
    let external_id = json_id(&song["id"])?;

    let title = song["name"]
        .as_str()
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_TITLE)
        .to_string();

    let artists = song
        .get("ar")
        .or_else(|| song.get("artists"))
        .and_then(|a| a.as_array());
    let artist = artists
        .map(|list| {
            list.iter()
                .filter_map(|a| a["name"].as_str())
                .collect::<Vec<_>>()
                .join("/")
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| UNKNOWN_ARTIST.to_string());

    let album = song.get("al").or_else(|| song.get("album"));
    let album_name = album
        .and_then(|a| a["name"].as_str())
        .filter(|s| !s.is_empty())
        .map(String::from);
    let artwork_url = album
        .and_then(|a| a["picUrl"].as_str())
        .filter(|s| !s.is_empty())
        .map(String::from);

    let duration_secs = song
        .get("dt")
        .or_else(|| song.get("duration"))
        .and_then(|d| d.as_f64())
        .filter(|ms| *ms > 0.0)
        .map(|ms| (ms / 1000.0).round() as u64);

    Some(ExternalTrack {
        external_id,
        title,
        artist,
        album: album_name,
        artwork_url,
        duration_secs,
    })
}
