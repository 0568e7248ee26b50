use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub emby: EmbyConfig,
    #[serde(default)]
    pub import: ImportConfig,

    /// Directory for the daily-rotated log file. Stderr only when unset.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Page size for browse and search operations.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbyConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_client_name")]
    pub client_name: String,
    #[serde(default = "default_client_name")]
    pub device_name: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImportConfig {
    // Tracks searched concurrently per batch
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_match_result_count")]
    pub match_result_count: usize,
    #[serde(default = "default_duration_tolerance")]
    pub duration_tolerance_secs: u64,
    #[serde(default = "default_ncm_batch_size")]
    pub ncm_batch_size: usize,
    #[serde(default)]
    pub ncm_api_base: Option<String>,
    #[serde(default = "default_ncm_timeout")]
    pub ncm_timeout_secs: u64,
}

fn default_page_size() -> usize { 50 }
fn default_client_name() -> String { "EmbyNcmBridge".into() }
fn default_request_timeout() -> u64 { 20 }
fn default_concurrency() -> usize { 5 }
fn default_match_result_count() -> usize { 5 }
fn default_duration_tolerance() -> u64 { 5 }
fn default_ncm_batch_size() -> usize { 200 }
fn default_ncm_timeout() -> u64 { 15 }

impl Default for EmbyConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            password: String::new(),
            client_name: default_client_name(),
            device_name: default_client_name(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            match_result_count: default_match_result_count(),
            duration_tolerance_secs: default_duration_tolerance(),
            ncm_batch_size: default_ncm_batch_size(),
            ncm_api_base: None,
            ncm_timeout_secs: default_ncm_timeout(),
        }
    }
}

impl EmbyConfig {
    /// True when url, username and password are all present.
    pub fn is_complete(&self) -> bool {
        !self.url.trim().is_empty() && !self.username.is_empty() && !self.password.is_empty()
    }
}

impl Config {
    pub fn from_path(path: &std::path::Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let cfg: Config = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.import.concurrency == 0 {
            anyhow::bail!("import.concurrency must be at least 1");
        }
        if self.import.ncm_batch_size == 0 {
            anyhow::bail!("import.ncm_batch_size must be at least 1");
        }
        if self.page_size == 0 {
            anyhow::bail!("page_size must be at least 1");
        }
        if !self.emby.url.trim().is_empty() {
            let host = crate::api::emby_auth::normalize_host(&self.emby.url);
            url::Url::parse(&host).map_err(|e| anyhow::anyhow!("emby.url {:?} is not a valid URL: {}", self.emby.url, e))?;
        }
        if let Some(base) = &self.import.ncm_api_base {
            url::Url::parse(base).map_err(|e| anyhow::anyhow!("import.ncm_api_base {:?} is not a valid URL: {}", base, e))?;
        }
        Ok(())
    }
}
