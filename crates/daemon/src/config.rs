use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub listen: SocketAddr,
    pub upstream: UpstreamConfig,

    pub refresh_interval_secs: u64,
    /// Upper bound on concurrent comment fetches, and the batch size.
    pub comment_batch_size: usize,
}

#[derive(Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub access_token: String,
    pub request_timeout_secs: u64,
}

// Hand-written so the credential never reaches the logs.
impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("base_url", &self.base_url)
            .field("access_token", &"<redacted>")
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no upstream access token configured (set ACCESS_TOKEN or --access-token)")]
    MissingAccessToken,
    #[error("upstream base url {0:?} is not an absolute http(s) url")]
    BaseUrl(String),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

impl DaemonConfig {
    /// Checks everything the daemon cannot start without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream.access_token.trim().is_empty() {
            return Err(ConfigError::MissingAccessToken);
        }
        match reqwest::Url::parse(&self.upstream.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => return Err(ConfigError::BaseUrl(self.upstream.base_url.clone())),
        }
        if self.refresh_interval_secs == 0 {
            return Err(ConfigError::Zero("refresh interval"));
        }
        if self.upstream.request_timeout_secs == 0 {
            return Err(ConfigError::Zero("request timeout"));
        }
        if self.comment_batch_size == 0 {
            return Err(ConfigError::Zero("comment batch size"));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}
