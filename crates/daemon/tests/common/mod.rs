//! In-memory upstream shared by the daemon integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use feedrank_daemon::upstream::{Fetch, Upstream, UpstreamError};
use serde_json::{json, Value};
use tokio::sync::Semaphore;

/// Serves canned payloads. A `None` payload answers like an HTTP 503.
#[derive(Default)]
pub struct ScriptedUpstream {
    pub users: Option<Value>,
    pub posts: HashMap<String, Value>,
    pub comments: HashMap<String, Value>,
    pub failing_posts: Vec<String>,
    /// Panic while fetching comments of this post.
    pub panic_on_post: Option<String>,
    /// Simulated latency of a comment fetch.
    pub comment_delay: Duration,
    /// When set, `users()` waits for a permit before answering.
    pub users_gate: Option<Arc<Semaphore>>,

    pub calls: Mutex<Vec<String>>,
    pub in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
}

impl ScriptedUpstream {
    /// Users with the given ids and names and no posts.
    pub fn with_users(names: &[(&str, &str)]) -> Self {
        let map: serde_json::Map<String, Value> = names
            .iter()
            .map(|(id, name)| (id.to_string(), json!(name)))
            .collect();
        Self {
            users: Some(json!({ "users": map })),
            ..Self::default()
        }
    }

    /// Gives `user_id` posts with the given ids; post `k` gets hour `k % 24`.
    pub fn posts_for(mut self, user_id: &str, post_ids: &[&str]) -> Self {
        let mut map = serde_json::Map::new();
        for id in post_ids {
            let hour = id.trim_start_matches(|c: char| !c.is_ascii_digit()).parse::<u32>().unwrap_or(0) % 24;
            map.insert(
                id.to_string(),
                json!({
                    "userId": user_id,
                    "title": format!("post {id}"),
                    "content": "body",
                    "timestamp": format!("2025-02-01T{hour:02}:00:00Z"),
                }),
            );
        }
        self.posts.insert(user_id.to_string(), json!({ "posts": map }));
        self
    }

    /// Gives `post_id` `n` comments.
    pub fn comments_for(mut self, post_id: &str, n: usize) -> Self {
        let map: serde_json::Map<String, Value> = (0..n)
            .map(|i| (format!("{post_id}-c{i}"), json!({ "postId": post_id, "content": "nice" })))
            .collect();
        self.comments.insert(post_id.to_string(), json!({ "comments": map }));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn unavailable(path: &str) -> Fetch<Value> {
    Fetch::Failed(UpstreamError::Status {
        url: format!("http://upstream.test{path}"),
        status: 503,
    })
}

#[async_trait]
impl Upstream for ScriptedUpstream {
    async fn users(&self) -> Fetch<Value> {
        self.record("/users".into());
        if let Some(gate) = &self.users_gate {
            let _permit = gate.acquire().await.expect("gate closed");
        }
        match &self.users {
            Some(v) => Fetch::Data(v.clone()),
            None => unavailable("/users"),
        }
    }

    async fn user_posts(&self, user_id: &str) -> Fetch<Value> {
        let path = format!("/users/{user_id}/posts");
        self.record(path.clone());
        if self.failing_posts.iter().any(|id| id == user_id) {
            return unavailable(&path);
        }
        Fetch::Data(self.posts.get(user_id).cloned().unwrap_or_else(|| json!({ "posts": {} })))
    }

    async fn post_comments(&self, post_id: &str) -> Fetch<Value> {
        let path = format!("/posts/{post_id}/comments");
        self.record(path);
        if self.panic_on_post.as_deref() == Some(post_id) {
            panic!("scripted failure for post {post_id}");
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.comment_delay.is_zero() {
            tokio::time::sleep(self.comment_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        Fetch::Data(
            self.comments
                .get(post_id)
                .cloned()
                .unwrap_or_else(|| json!({ "comments": {} })),
        )
    }
}
