//! Parsing of user-supplied NetEase playlist references.

use crate::error::ImportError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

// Alternatives are tried left to right; the first non-empty group is the id.
static PLAYLIST_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?:https://y\.music\.163\.com/m/playlist\?id=([0-9]+))",
        r"|(?:https?://music\.163\.com/playlist/([0-9]+)/.*)",
        r"|(?:https?://music\.163\.com(?:/#)?/playlist\?id=([0-9]+))",
        r"|(?:^\s*([0-9]+)\s*$)",
    ))
    .expect("playlist reference pattern is valid")
});

/// Canonical numeric NetEase playlist id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlaylistId(String);

impl PlaylistId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlaylistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extract the playlist id from a share link or a bare numeric id.
///
/// Accepted shapes:
/// - `https://y.music.163.com/m/playlist?id=<id>`
/// - `http(s)://music.163.com/playlist/<id>/...`
/// - `http(s)://music.163.com/playlist?id=<id>` (with or without `/#`)
/// - `<id>`, optionally surrounded by whitespace
pub fn resolve(input: &str) -> Result<PlaylistId, ImportError> {
    let caps = PLAYLIST_REF
        .captures(input)
        .ok_or_else(|| ImportError::UnrecognizedReference(input.to_string()))?;

    (1..=4)
        .filter_map(|i| caps.get(i))
        .map(|m| m.as_str())
        .find(|s| !s.is_empty())
        .map(|s| PlaylistId(s.to_string()))
        .ok_or_else(|| ImportError::UnrecognizedReference(input.to_string()))
}
