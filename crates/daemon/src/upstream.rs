//! Client for the evaluation service that owns users, posts and comments.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::UpstreamConfig;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("could not build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("upstream base URL `{0}` cannot carry path segments")]
    BaseUrl(String),
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },
}

/// Outcome of one upstream call.
///
/// Failures never abort a cycle: callers count them and carry on with
/// [`Fetch::into_data_or_default`], which is the same empty payload an
/// upstream with no data would produce.
#[derive(Debug)]
pub enum Fetch<T> {
    Data(T),
    Failed(UpstreamError),
}

impl<T> Fetch<T> {
    pub fn is_failed(&self) -> bool {
        matches!(self, Fetch::Failed(_))
    }

    pub fn into_data_or_default(self) -> T
    where
        T: Default,
    {
        match self {
            Fetch::Data(data) => data,
            Fetch::Failed(_) => T::default(),
        }
    }
}

/// The three upstream reads a refresh cycle needs.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// `GET /users`
    async fn users(&self) -> Fetch<Value>;
    /// `GET /users/{id}/posts`
    async fn user_posts(&self, user_id: &str) -> Fetch<Value>;
    /// `GET /posts/{id}/comments`
    async fn post_comments(&self, post_id: &str) -> Fetch<Value>;
}

/// [`Upstream`] over HTTP with a static bearer credential.
#[derive(Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    base_url: Url,
    access_token: String,
}

impl HttpUpstream {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let base_url = match Url::parse(&config.base_url) {
            Ok(url) if !url.cannot_be_a_base() => url,
            _ => return Err(UpstreamError::BaseUrl(config.base_url.clone())),
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(UpstreamError::Client)?;
        Ok(Self {
            client,
            base_url,
            access_token: config.access_token.clone(),
        })
    }

    /// Base URL with `segments` appended, each percent-encoded as one segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked in `new`, so the Err arm is unreachable.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json(&self, url: Url) -> Result<Value, UpstreamError> {
        let resp = self
            .client
            .get(url.clone())
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|source| UpstreamError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        resp.json::<Value>()
            .await
            .map_err(|source| UpstreamError::Transport {
                url: url.to_string(),
                source,
            })
    }

    async fn fetch(&self, segments: &[&str]) -> Fetch<Value> {
        let url = self.endpoint(segments);
        match self.get_json(url).await {
            Ok(body) => {
                debug!(path = ?segments, "upstream fetch ok");
                Fetch::Data(body)
            }
            Err(e) => {
                warn!(error = %e, "upstream fetch failed; using empty payload");
                Fetch::Failed(e)
            }
        }
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn users(&self) -> Fetch<Value> {
        self.fetch(&["users"]).await
    }

    async fn user_posts(&self, user_id: &str) -> Fetch<Value> {
        self.fetch(&["users", user_id, "posts"]).await
    }

    async fn post_comments(&self, post_id: &str) -> Fetch<Value> {
        self.fetch(&["posts", post_id, "comments"]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_fetch_degrades_to_default() {
        let failed: Fetch<Value> = Fetch::Failed(UpstreamError::Status {
            url: "http://upstream/users".into(),
            status: 503,
        });
        assert!(failed.is_failed());
        assert_eq!(failed.into_data_or_default(), Value::Null);

        let ok = Fetch::Data(serde_json::json!({ "users": {} }));
        assert!(!ok.is_failed());
        assert_eq!(ok.into_data_or_default()["users"], serde_json::json!({}));
    }

    fn upstream(base_url: &str) -> Result<HttpUpstream, UpstreamError> {
        HttpUpstream::new(&UpstreamConfig {
            base_url: base_url.into(),
            access_token: "t".into(),
            request_timeout_secs: 1,
        })
    }

    #[test]
    fn ids_are_escaped_as_single_segments() {
        let upstream = upstream("http://localhost:9/api/").unwrap();
        assert_eq!(
            upstream.endpoint(&["users", "a/b c", "posts"]).as_str(),
            "http://localhost:9/api/users/a%2Fb%20c/posts"
        );
        assert_eq!(
            upstream.endpoint(&["posts", "42?x=1#f", "comments"]).as_str(),
            "http://localhost:9/api/posts/42%3Fx=1%23f/comments"
        );
    }

    #[test]
    fn base_path_is_kept_with_or_without_trailing_slash() {
        for base in ["http://localhost:9/api", "http://localhost:9/api/"] {
            let upstream = upstream(base).unwrap();
            assert_eq!(upstream.endpoint(&["users"]).as_str(), "http://localhost:9/api/users");
        }
        let bare = upstream("http://localhost:9").unwrap();
        assert_eq!(bare.endpoint(&["users"]).as_str(), "http://localhost:9/users");
    }

    #[test]
    fn opaque_base_url_is_rejected() {
        assert!(matches!(upstream("mailto:ops@example.com"), Err(UpstreamError::BaseUrl(_))));
        assert!(matches!(upstream("not a url"), Err(UpstreamError::BaseUrl(_))));
    }
}
