//! Error types surfaced by the library.
//!
//! Library modules return these typed errors; the CLI wraps them with
//! `anyhow` context.

/// Fatal failures of an import run.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// The input matches none of the accepted playlist reference shapes.
    #[error("unrecognized NetEase playlist reference: {0:?}")]
    UnrecognizedReference(String),

    /// The playlist listing call failed or returned an invalid payload.
    #[error("NetEase playlist unavailable: {0}")]
    UpstreamUnavailable(String),
}

/// Failure of a single search-and-score unit. Never fatal to a run.
#[derive(Debug, thiserror::Error)]
#[error("match attempt for {title:?} failed: {message}")]
pub struct MatchAttemptError {
    pub external_id: String,
    pub title: String,
    pub message: String,
}

/// Errors from the Emby API client.
#[derive(Debug, thiserror::Error)]
pub enum EmbyError {
    #[error("emby server url, username and password must be configured")]
    MissingConfig,

    #[error("emby login failed ({status}): {message}")]
    Login { status: u16, message: String },

    #[error("emby login failed: invalid server response")]
    InvalidLoginResponse,

    #[error("emby request unauthorized even after re-login")]
    Unauthorized,

    #[error("emby request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("emby request failed: {status} => {body}")]
    Status { status: u16, body: String },

    #[error("emby response could not be decoded: {0}")]
    Decode(String),
}

pub type EmbyResult<T> = std::result::Result<T, EmbyError>;
