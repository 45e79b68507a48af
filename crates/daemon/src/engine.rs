//! One refresh cycle: fetch, normalize, rank.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use feedrank_core::model::{CycleReport, PopularPost, Post, Snapshot, User};
use feedrank_core::normalize::{self, Collection, Record, COMMENTS, POSTS, USERS};
use feedrank_core::ranking::{self, UserPostCounts, LATEST_POSTS_LIMIT, TOP_USERS_LIMIT};
use feedrank_core::now_ms;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};
use ulid::Ulid;

use crate::pool::{BatchPool, PoolError};
use crate::upstream::{Fetch, Upstream};

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("comment count fetch aborted: {0}")]
    CommentFetch(#[from] PoolError),
}

/// Result of a successful cycle, ready to publish.
#[derive(Debug, Clone)]
pub struct CycleOutput {
    pub snapshot: Snapshot,
    pub report: CycleReport,
}

#[derive(Debug, Default)]
struct CycleStats {
    failed_fetches: usize,
    malformed_payloads: usize,
}

pub struct AggregationEngine {
    upstream: Arc<dyn Upstream>,
    pool: BatchPool,
}

impl AggregationEngine {
    pub fn new(upstream: Arc<dyn Upstream>, comment_batch_size: usize) -> Self {
        Self {
            upstream,
            pool: BatchPool::new(comment_batch_size),
        }
    }

    /// Runs a full cycle and returns the new snapshot without publishing it.
    ///
    /// Upstream failures and malformed payloads degrade to empty data. Only a
    /// failure of the comment fan-out itself aborts the cycle.
    pub async fn run_cycle(&self) -> Result<CycleOutput, CycleError> {
        let cycle_id = Ulid::new().to_string();
        let span = info_span!("cycle", cycle_id = %cycle_id);
        self.run_cycle_inner(cycle_id).instrument(span).await
    }

    async fn run_cycle_inner(&self, cycle_id: String) -> Result<CycleOutput, CycleError> {
        let started = Instant::now();
        let mut stats = CycleStats::default();

        let users: Vec<User> = decode_payload(self.upstream.users().await, USERS, &mut stats);
        debug!(users = users.len(), "fetched users");

        let mut counts = UserPostCounts::new();
        let mut posts: Vec<Post> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for user in &users {
            let fetched = self.upstream.user_posts(&user.id).await;
            let records = normalize_payload(fetched, POSTS, &mut stats);
            // Every record the payload returned counts, decodable or not.
            counts.record(&user.id, records.len());
            for mut post in normalize::decode_all::<Post>(records, POSTS) {
                if post.user_id.is_empty() {
                    post.user_id = user.id.clone();
                }
                if seen.insert(post.id.clone()) {
                    posts.push(post);
                } else {
                    debug!(post_id = %post.id, "post already collected this cycle");
                }
            }
        }

        let top_users = ranking::top_users(&counts, &users, TOP_USERS_LIMIT);
        let latest_posts = ranking::latest_posts(&posts, LATEST_POSTS_LIMIT);

        let comment_counts = self.comment_counts(&posts, &mut stats).await?;
        let with_counts: Vec<PopularPost> = posts
            .into_iter()
            .zip(comment_counts)
            .map(|(post, comment_count)| PopularPost {
                post,
                comment_count,
            })
            .collect();
        let popular_posts = ranking::popular_posts(&with_counts);

        let report = CycleReport {
            cycle_id,
            users: users.len(),
            posts: with_counts.len(),
            failed_fetches: stats.failed_fetches,
            malformed_payloads: stats.malformed_payloads,
            duration_ms: started.elapsed().as_millis() as u64,
            finished_at_ms: now_ms(),
        };
        info!(
            users = report.users,
            posts = report.posts,
            failed_fetches = report.failed_fetches,
            malformed_payloads = report.malformed_payloads,
            duration_ms = report.duration_ms,
            "cycle complete"
        );

        Ok(CycleOutput {
            snapshot: Snapshot {
                top_users,
                latest_posts,
                popular_posts,
            },
            report,
        })
    }

    /// Comment count per post, aligned with `posts`.
    async fn comment_counts(
        &self,
        posts: &[Post],
        stats: &mut CycleStats,
    ) -> Result<Vec<usize>, CycleError> {
        let ids: Vec<String> = posts.iter().map(|p| p.id.clone()).collect();
        let fetched = self
            .pool
            .run(ids, |post_id| {
                let upstream = Arc::clone(&self.upstream);
                async move { upstream.post_comments(&post_id).await }
            })
            .await?;

        Ok(fetched
            .into_iter()
            .map(|f| count_records(f, COMMENTS, stats))
            .collect())
    }
}

fn payload(fetched: Fetch<Value>, stats: &mut CycleStats) -> Value {
    if fetched.is_failed() {
        stats.failed_fetches += 1;
    }
    fetched.into_data_or_default()
}

fn normalize_payload(
    fetched: Fetch<Value>,
    collection: Collection,
    stats: &mut CycleStats,
) -> Vec<Record> {
    let raw = payload(fetched, stats);
    match normalize::normalize(&raw, collection) {
        Ok(records) => records,
        Err(e) => {
            stats.malformed_payloads += 1;
            warn!(collection = collection.key, error = %e, "malformed payload; treating as empty");
            Vec::new()
        }
    }
}

fn decode_payload<T: DeserializeOwned>(
    fetched: Fetch<Value>,
    collection: Collection,
    stats: &mut CycleStats,
) -> Vec<T> {
    normalize::decode_all(normalize_payload(fetched, collection, stats), collection)
}

fn count_records(fetched: Fetch<Value>, collection: Collection, stats: &mut CycleStats) -> usize {
    normalize_payload(fetched, collection, stats).len()
}
