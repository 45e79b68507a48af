//! Response normalization.
//!
//! The upstream delivers entities as id-keyed maps wrapped in an envelope,
//! e.g. `{"users": {"1": "Ann", "2": "Bob"}}` or
//! `{"posts": {"10": {"title": "..."}}}`. Everything downstream wants an
//! ordered list of records that carry their id as a field, so this module is
//! the only place that knows about the envelope and the map layout.

use std::cmp::Ordering;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::model::value_kind;

/// Where a collection lives in its envelope and how scalar entries are named.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collection {
    /// Envelope key holding the entities.
    pub key: &'static str,
    /// Field a scalar entry is stored under (`{"1": "Ann"}` -> `name: "Ann"`).
    pub scalar_field: &'static str,
}

/// `GET /users`
pub const USERS: Collection = Collection {
    key: "users",
    scalar_field: "name",
};

/// `GET /users/{id}/posts`
pub const POSTS: Collection = Collection {
    key: "posts",
    scalar_field: "content",
};

/// `GET /posts/{id}/comments`
pub const COMMENTS: Collection = Collection {
    key: "comments",
    scalar_field: "content",
};

/// The payload was present but could not be read as a collection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShapeError {
    /// The body itself is not a JSON object.
    #[error("response body is a {found}, expected an object envelope")]
    Envelope {
        /// JSON kind of the body.
        found: &'static str,
    },
    /// The collection key holds something other than a map or a list.
    #[error("`{key}` is a {found}, expected an id-keyed object or a list")]
    Payload {
        /// Envelope key that was read.
        key: &'static str,
        /// JSON kind found under it.
        found: &'static str,
    },
}

/// One normalized entity: its fields with `id` merged in.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    id: String,
    fields: Map<String, Value>,
}

impl Record {
    fn new(id: String, mut fields: Map<String, Value>) -> Self {
        fields.insert("id".to_owned(), Value::String(id.clone()));
        Self { id, fields }
    }

    /// Entity id, taken from the map key or the item's `id` field.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Field lookup, `id` included.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// The record as a JSON object.
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    /// Deserializes the record into a typed entity.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.into_value())
    }
}

/// Converts a raw upstream response into records ordered by [`compare_ids`].
///
/// A missing or `null` body, or a missing or `null` collection key, yields
/// an empty list. Individual entries that are neither scalars nor objects
/// (or list items without an id) are skipped with a warning.
pub fn normalize(raw: &Value, collection: Collection) -> Result<Vec<Record>, ShapeError> {
    let envelope = match raw {
        Value::Null => return Ok(Vec::new()),
        Value::Object(map) => map,
        other => {
            return Err(ShapeError::Envelope {
                found: value_kind(other),
            })
        }
    };

    let mut records = match envelope.get(collection.key) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Object(entries)) => entries
            .iter()
            .filter_map(|(id, entry)| from_keyed_entry(collection, id, entry))
            .collect::<Vec<_>>(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| from_list_item(collection, item))
            .collect::<Vec<_>>(),
        Some(other) => {
            return Err(ShapeError::Payload {
                key: collection.key,
                found: value_kind(other),
            })
        }
    };

    records.sort_by(|a, b| compare_ids(&a.id, &b.id));
    Ok(records)
}

/// Normalizes and decodes in one step, dropping records that do not decode.
pub fn normalize_as<T: DeserializeOwned>(
    raw: &Value,
    collection: Collection,
) -> Result<Vec<T>, ShapeError> {
    Ok(decode_all(normalize(raw, collection)?, collection))
}

/// Decodes records in order, skipping (and logging) those that do not decode.
pub fn decode_all<T: DeserializeOwned>(records: Vec<Record>, collection: Collection) -> Vec<T> {
    records
        .into_iter()
        .filter_map(|record| {
            let id = record.id.clone();
            match record.decode::<T>() {
                Ok(entity) => Some(entity),
                Err(e) => {
                    warn!(collection = collection.key, id = %id, error = %e, "skipping undecodable record");
                    None
                }
            }
        })
        .collect()
}

fn from_keyed_entry(collection: Collection, id: &str, entry: &Value) -> Option<Record> {
    match entry {
        Value::Object(fields) => Some(Record::new(id.to_owned(), fields.clone())),
        Value::String(_) | Value::Number(_) | Value::Bool(_) => {
            let mut fields = Map::new();
            fields.insert(collection.scalar_field.to_owned(), scalar_as_string(entry));
            Some(Record::new(id.to_owned(), fields))
        }
        other => {
            warn!(
                collection = collection.key,
                id,
                found = value_kind(other),
                "skipping entry that is neither a scalar nor an object"
            );
            None
        }
    }
}

fn from_list_item(collection: Collection, item: &Value) -> Option<Record> {
    let fields = match item {
        Value::Object(fields) => fields,
        other => {
            warn!(collection = collection.key, found = value_kind(other), "skipping non-object list item");
            return None;
        }
    };
    let id = match fields.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            warn!(collection = collection.key, "skipping list item without an id");
            return None;
        }
    };
    Some(Record::new(id, fields.clone()))
}

fn scalar_as_string(value: &Value) -> Value {
    match value {
        Value::String(_) => value.clone(),
        other => Value::String(other.to_string()),
    }
}

/// Natural id order: ids that parse as unsigned integers compare
/// numerically and sort before all other ids, which compare lexically.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids(records: &[Record]) -> Vec<&str> {
        records.iter().map(Record::id).collect()
    }

    #[test]
    fn scalar_map_becomes_named_records() {
        let raw = json!({ "users": { "10": "Jo", "2": "Ann", "1": "Bob" } });
        let records = normalize(&raw, USERS).unwrap();

        assert_eq!(ids(&records), vec!["1", "2", "10"]);
        assert_eq!(records[1].get("name"), Some(&json!("Ann")));
        assert_eq!(records[1].get("id"), Some(&json!("2")));
    }

    #[test]
    fn object_map_merges_id_into_fields() {
        let raw = json!({ "posts": { "7": { "userId": "1", "title": "hi", "id": "ignored" } } });
        let records = normalize(&raw, POSTS).unwrap();

        assert_eq!(records.len(), 1);
        let v = records[0].clone().into_value();
        assert_eq!(v, json!({ "id": "7", "userId": "1", "title": "hi" }));
    }

    #[test]
    fn missing_key_or_body_is_empty() {
        assert!(normalize(&json!({}), USERS).unwrap().is_empty());
        assert!(normalize(&json!({ "users": null }), USERS).unwrap().is_empty());
        assert!(normalize(&Value::Null, COMMENTS).unwrap().is_empty());
        assert!(normalize(&json!({ "posts": {} }), USERS).unwrap().is_empty());
    }

    #[test]
    fn list_payload_is_accepted() {
        let raw = json!({ "comments": [ { "id": 3, "postId": 9 }, { "id": 1 }, { "text": "no id" }, 4 ] });
        let records = normalize(&raw, COMMENTS).unwrap();
        assert_eq!(ids(&records), vec!["1", "3"]);
    }

    #[test]
    fn wrong_payload_shape_is_an_error() {
        let err = normalize(&json!({ "users": "nope" }), USERS).unwrap_err();
        assert_eq!(
            err,
            ShapeError::Payload {
                key: "users",
                found: "string"
            }
        );

        let err = normalize(&json!([1, 2]), USERS).unwrap_err();
        assert_eq!(err, ShapeError::Envelope { found: "array" });
    }

    #[test]
    fn bad_entries_are_skipped_not_fatal() {
        let raw = json!({ "posts": { "1": { "title": "ok" }, "2": [1, 2], "3": null } });
        let records = normalize(&raw, POSTS).unwrap();
        assert_eq!(ids(&records), vec!["1"]);
    }

    #[test]
    fn natural_order_puts_numbers_first() {
        let mut v = vec!["b", "10", "a", "9", "010"];
        v.sort_by(|a, b| compare_ids(a, b));
        assert_eq!(v, vec!["9", "010", "10", "a", "b"]);
    }
}
