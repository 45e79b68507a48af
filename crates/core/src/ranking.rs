//! Ranking functions over one cycle's collected data.
//!
//! All sorts are stable, so ties keep input order. Callers feed users and
//! posts in natural id order (see [`crate::normalize::compare_ids`]), which
//! makes every tie-break deterministic.

use std::collections::HashMap;

use crate::model::{PopularPost, Post, TopUser, User};

/// Size of the top users ranking.
pub const TOP_USERS_LIMIT: usize = 5;

/// Size of the latest posts ranking.
pub const LATEST_POSTS_LIMIT: usize = 5;

/// Name used when a counted user id is missing from the user list.
pub const UNKNOWN_USER_NAME: &str = "Unknown User";

/// Post count per user id, in the order users were recorded.
///
/// Built from scratch every cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPostCounts {
    entries: Vec<(String, usize)>,
    index: HashMap<String, usize>,
}

impl UserPostCounts {
    /// An empty tally.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the count for `user_id`. Re-recording a user keeps its original
    /// position and replaces the count.
    pub fn record(&mut self, user_id: &str, count: usize) {
        match self.index.get(user_id) {
            Some(&pos) => self.entries[pos].1 = count,
            None => {
                self.index.insert(user_id.to_owned(), self.entries.len());
                self.entries.push((user_id.to_owned(), count));
            }
        }
    }

    /// Recorded count for `user_id`.
    pub fn get(&self, user_id: &str) -> Option<usize> {
        self.index.get(user_id).map(|&pos| self.entries[pos].1)
    }

    /// Number of users recorded.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no user has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(user_id, count)` pairs in recording order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.entries.iter().map(|(id, n)| (id.as_str(), *n))
    }
}

/// Users with the most posts, descending, at most `limit`.
pub fn top_users(counts: &UserPostCounts, users: &[User], limit: usize) -> Vec<TopUser> {
    let names: HashMap<&str, &str> = users
        .iter()
        .map(|u| (u.id.as_str(), u.name.as_str()))
        .collect();

    let mut ranked: Vec<(&str, usize)> = counts.iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));

    ranked
        .into_iter()
        .take(limit)
        .map(|(id, post_count)| TopUser {
            id: id.to_owned(),
            name: names
                .get(id)
                .copied()
                .unwrap_or(UNKNOWN_USER_NAME)
                .to_owned(),
            post_count,
        })
        .collect()
}

/// Most recent posts, descending by timestamp, at most `limit`.
///
/// Posts without a timestamp rank after every timestamped post.
pub fn latest_posts(posts: &[Post], limit: usize) -> Vec<Post> {
    let mut sorted: Vec<&Post> = posts.iter().collect();
    // `None < Some(_)`, so descending order leaves untimed posts last.
    sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    sorted.into_iter().take(limit).cloned().collect()
}

/// Every post whose comment count equals the maximum. Ties are not broken.
pub fn popular_posts(posts: &[PopularPost]) -> Vec<PopularPost> {
    let Some(max) = posts.iter().map(|p| p.comment_count).max() else {
        return Vec::new();
    };
    posts
        .iter()
        .filter(|p| p.comment_count == max)
        .cloned()
        .collect()
}
