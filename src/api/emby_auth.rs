use crate::config::EmbyConfig;
use crate::error::{EmbyError, EmbyResult};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{error, info};

pub const AUTH_HEADER: &str = "X-Emby-Authorization";
const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Static settings for talking to one Emby server.
#[derive(Debug, Clone)]
pub struct EmbySettings {
    pub host: String,
    pub username: String,
    pub password: String,
    pub client_name: String,
    pub device_name: String,
    pub device_id: String,
    pub timeout: Duration,
}

impl EmbySettings {
    pub fn from_config(cfg: &EmbyConfig) -> EmbyResult<Self> {
        if !cfg.is_complete() {
            return Err(EmbyError::MissingConfig);
        }
        Ok(Self {
            host: normalize_host(&cfg.url),
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            client_name: cfg.client_name.clone(),
            device_name: cfg.device_name.clone(),
            device_id: format!("{}-{}", cfg.device_name, uuid::Uuid::new_v4().simple()),
            timeout: Duration::from_secs(cfg.request_timeout_secs),
        })
    }
}

/// An authenticated session: the token and user id returned by login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbySession {
    pub access_token: String,
    pub user_id: String,
}

#[derive(Deserialize)]
struct AuthUser {
    #[serde(rename = "Id")]
    id: Option<String>,
}

#[derive(Deserialize)]
struct AuthResponse {
    #[serde(rename = "AccessToken")]
    access_token: Option<String>,
    #[serde(rename = "User")]
    user: Option<AuthUser>,
}

/// Prefix `http://` when no scheme is given and strip trailing slashes.
pub fn normalize_host(url: &str) -> String {
    let url = url.trim();
    let with_scheme = if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{}", url)
    };
    with_scheme.trim_end_matches('/').to_string()
}

/// Value of the `X-Emby-Authorization` header.
pub fn authorization_value(settings: &EmbySettings, token: Option<&str>) -> String {
    let mut v = format!(
        "MediaBrowser Client=\"{}\", Device=\"{}\", DeviceId=\"{}\", Version=\"{}\"",
        settings.client_name, settings.device_name, settings.device_id, CLIENT_VERSION
    );
    if let Some(t) = token {
        v.push_str(&format!(", Token=\"{}\"", t));
    }
    v
}

/// Authenticate by username/password and return a fresh session.
pub async fn login(client: &Client, settings: &EmbySettings) -> EmbyResult<EmbySession> {
    info!("Emby: attempting login to {}", settings.host);
    let url = format!("{}/Users/AuthenticateByName", settings.host);
    let body = json!({ "Username": settings.username, "Pw": settings.password });
    let resp = client
        .post(&url)
        .header(CONTENT_TYPE, "application/json")
        .header(AUTH_HEADER, authorization_value(settings, None))
        .timeout(settings.timeout)
        .json(&body)
        .send()
        .await
        .map_err(|e| {
            error!("Emby: login request failed: {}", e);
            EmbyError::Request(e)
        })?;

    let status = resp.status();
    if !status.is_success() {
        let txt = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&txt)
            .ok()
            .and_then(|j| j["error_message"].as_str().map(String::from))
            .unwrap_or(txt);
        error!("Emby: login failed ({}): {}", status, message);
        return Err(EmbyError::Login { status: status.as_u16(), message });
    }

    let parsed: AuthResponse = resp
        .json()
        .await
        .map_err(|e| EmbyError::Decode(e.to_string()))?;
    match (parsed.access_token, parsed.user.and_then(|u| u.id)) {
        (Some(access_token), Some(user_id)) if !access_token.is_empty() && !user_id.is_empty() => {
            info!("Emby: login successful, user id {}", user_id);
            Ok(EmbySession { access_token, user_id })
        }
        _ => {
            error!("Emby: login response missing AccessToken or User.Id");
            Err(EmbyError::InvalidLoginResponse)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> EmbySettings {
        EmbySettings {
            host: "http://emby.local:8096".into(),
            username: "u".into(),
            password: "p".into(),
            client_name: "C".into(),
            device_name: "D".into(),
            device_id: "D-1".into(),
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn host_normalization() {
        assert_eq!(normalize_host("192.168.1.100:8096/"), "http://192.168.1.100:8096");
        assert_eq!(normalize_host("https://emby.example.com//"), "https://emby.example.com");
        assert_eq!(normalize_host(" http://h "), "http://h");
    }

    #[test]
    fn authorization_header_includes_token_when_present() {
        let s = settings();
        let anon = authorization_value(&s, None);
        assert!(anon.starts_with("MediaBrowser Client=\"C\", Device=\"D\", DeviceId=\"D-1\""));
        assert!(!anon.contains("Token="));
        assert!(authorization_value(&s, Some("abc")).ends_with(", Token=\"abc\""));
    }

    #[test]
    fn incomplete_config_is_rejected() {
        let cfg = EmbyConfig::default();
        assert!(matches!(EmbySettings::from_config(&cfg), Err(EmbyError::MissingConfig)));
    }
}
