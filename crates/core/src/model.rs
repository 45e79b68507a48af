//! Upstream entities and the published snapshot types.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Author of posts, as listed by the upstream `/users` route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Upstream user id.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Display name.
    #[serde(deserialize_with = "string_or_number")]
    pub name: String,
}

/// A post. Identity is `id`, unique across all users.
///
/// Only `id` is required; every other field tolerates being absent or
/// `null` so one sparse record never drops out of the rankings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Upstream post id.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Author id. Empty when the upstream record omitted it; the engine fills
    /// it from the user whose posts were being fetched.
    #[serde(default, alias = "userid", deserialize_with = "string_or_number_or_null")]
    pub user_id: String,
    /// Headline, empty if the upstream sent none.
    #[serde(default, deserialize_with = "string_or_number_or_null")]
    pub title: String,
    /// Body text, empty if the upstream sent none.
    #[serde(default, deserialize_with = "string_or_number_or_null")]
    pub content: String,
    /// `None` when the upstream value was missing or unparseable.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Entry of the top users ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUser {
    /// User id.
    pub id: String,
    /// Display name, or a placeholder when the id was not in the user list.
    pub name: String,
    /// Posts the user's payload returned this cycle.
    pub post_count: usize,
}

/// A post with its comment count attached, as served by the popular view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopularPost {
    /// The post itself, serialized flat.
    #[serde(flatten)]
    pub post: Post,
    /// Number of comments the upstream returned for the post.
    pub comment_count: usize,
}

/// The aggregate result set of one refresh cycle.
///
/// A snapshot is built completely before it is published and is never
/// mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// At most five users, non-increasing by post count.
    pub top_users: Vec<TopUser>,
    /// At most five posts, non-increasing by timestamp.
    pub latest_posts: Vec<Post>,
    /// Every post tied at the maximum comment count.
    pub popular_posts: Vec<PopularPost>,
}

impl Snapshot {
    /// True when no ranking holds any entry.
    pub fn is_empty(&self) -> bool {
        self.top_users.is_empty() && self.latest_posts.is_empty() && self.popular_posts.is_empty()
    }
}

/// Operational summary of one completed cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    /// ULID of the cycle, also attached to its log span.
    pub cycle_id: String,
    /// Users listed by the upstream.
    pub users: usize,
    /// Distinct posts collected across all users.
    pub posts: usize,
    /// Upstream calls that degraded to an empty payload.
    pub failed_fetches: usize,
    /// Payloads that were present but not in a recognised shape.
    pub malformed_payloads: usize,
    /// Wall time of the cycle.
    pub duration_ms: u64,
    /// When the cycle finished, see [`now_ms`].
    pub finished_at_ms: i64,
}

/// Milliseconds since the unix epoch; 0 if the clock is before it.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "expected string or number, found {}",
            value_kind(&other)
        ))),
    }
}

fn string_or_number_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "expected string, number or null, found {}",
            value_kind(&other)
        ))),
    }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(parse_timestamp))
}

/// Parses the timestamp encodings seen upstream: RFC 3339, naive
/// `YYYY-MM-DD HH:MM:SS` (taken as UTC) and unix epoch seconds or
/// milliseconds, either as numbers or numeric strings.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp_str(s.trim()),
        Value::Number(n) => n.as_i64().and_then(from_epoch),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    s.parse::<i64>().ok().and_then(from_epoch)
}

// Values past 1e11 cannot be seconds in any plausible range, so they are millis.
fn from_epoch(n: i64) -> Option<DateTime<Utc>> {
    if n.abs() >= 100_000_000_000 {
        DateTime::from_timestamp_millis(n)
    } else {
        DateTime::from_timestamp(n, 0)
    }
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn post_accepts_lowercase_author_and_numeric_ids() {
        let post: Post = serde_json::from_value(json!({
            "id": 150,
            "userid": 7,
            "content": "hello",
            "timestamp": "2025-03-01 10:15:00"
        }))
        .unwrap();

        assert_eq!(post.id, "150");
        assert_eq!(post.user_id, "7");
        assert_eq!(post.title, "");
        assert_eq!(
            post.timestamp,
            Some(Utc.with_ymd_and_hms(2025, 3, 1, 10, 15, 0).unwrap())
        );
    }

    #[test]
    fn unparseable_timestamp_becomes_none() {
        let post: Post = serde_json::from_value(json!({
            "id": "1",
            "userId": "2",
            "timestamp": "last tuesday"
        }))
        .unwrap();
        assert_eq!(post.timestamp, None);
    }

    #[test]
    fn epoch_seconds_and_millis_agree() {
        let secs = parse_timestamp(&json!(1_700_000_000)).unwrap();
        let millis = parse_timestamp(&json!("1700000000000")).unwrap();
        assert_eq!(secs, millis);
    }

    #[test]
    fn popular_post_serializes_flat_with_comment_count() {
        let post = PopularPost {
            post: Post {
                id: "p2".into(),
                user_id: "u1".into(),
                title: "t".into(),
                content: "c".into(),
                timestamp: None,
            },
            comment_count: 5,
        };
        let v = serde_json::to_value(&post).unwrap();
        assert_eq!(v["id"], "p2");
        assert_eq!(v["userId"], "u1");
        assert_eq!(v["commentCount"], 5);
    }

    #[test]
    fn null_optional_fields_decode_as_empty() {
        let post: Post = serde_json::from_value(json!({
            "id": "9",
            "userId": null,
            "title": null,
            "content": null,
            "timestamp": null
        }))
        .unwrap();

        assert_eq!(post.id, "9");
        assert_eq!(post.user_id, "");
        assert_eq!(post.title, "");
        assert_eq!(post.content, "");
        assert_eq!(post.timestamp, None);
    }

    #[test]
    fn user_without_name_is_rejected() {
        let res: Result<User, _> = serde_json::from_value(json!({ "id": "1" }));
        assert!(res.is_err());
    }
}
