//! Server-side session buckets.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A server-side session: a JSON object whose top-level keys are buckets
/// owned by different parts of the application.
///
/// Bucket contents are plain JSON objects, so values written by one
/// component survive alongside values written by another under the same
/// bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Session(Map<String, Value>);

impl Session {
    /// Create an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the bucket stored at `key`, if it exists and is an object.
    pub fn bucket(&self, key: &str) -> Option<&Map<String, Value>> {
        self.0.get(key).and_then(Value::as_object)
    }

    /// Mutably borrow the bucket at `key`, creating an empty one if absent.
    ///
    /// A non-object value at `key` is replaced by an empty bucket.
    pub fn bucket_mut(&mut self, key: &str) -> &mut Map<String, Value> {
        let entry = self
            .0
            .entry(key.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        match entry {
            Value::Object(map) => map,
            _ => unreachable!("bucket was just normalised to an object"),
        }
    }

    /// Remove the bucket at `key`, returning its previous value.
    pub fn remove_bucket(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Remove `field` from the bucket at `key`, dropping the bucket once it
    /// is empty. Other fields in the bucket are left in place.
    pub fn take(&mut self, key: &str, field: &str) -> Option<Value> {
        let bucket = self.0.get_mut(key)?.as_object_mut()?;
        let value = bucket.remove(field);
        if bucket.is_empty() {
            self.0.remove(key);
        }
        value
    }

    /// Raw top-level lookup.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Raw top-level insert.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Whether the session holds no buckets.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for Session {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bucket_mut_preserves_siblings() {
        let mut session = Session::new();
        session.bucket_mut("oidc:op").insert("other".into(), json!(1));
        session.bucket_mut("oidc:op").insert("state".into(), json!({"handle": "h"}));

        let bucket = session.bucket("oidc:op").unwrap();
        assert_eq!(bucket.get("other"), Some(&json!(1)));
        assert_eq!(bucket.get("state"), Some(&json!({"handle": "h"})));
    }

    #[test]
    fn bucket_mut_replaces_non_object() {
        let mut session = Session::new();
        session.insert("k", json!("scalar"));
        session.bucket_mut("k").insert("a".into(), json!(true));
        assert_eq!(session.get("k"), Some(&json!({"a": true})));
    }

    #[test]
    fn take_drops_empty_bucket_only() {
        let mut session = Session::new();
        session.bucket_mut("a").insert("state".into(), json!(1));
        session.bucket_mut("b").insert("state".into(), json!(2));
        session.bucket_mut("b").insert("keep".into(), json!(3));

        assert_eq!(session.take("a", "state"), Some(json!(1)));
        assert!(session.get("a").is_none());

        assert_eq!(session.take("b", "state"), Some(json!(2)));
        assert_eq!(session.get("b"), Some(&json!({"keep": 3})));

        assert_eq!(session.take("missing", "state"), None);
    }

    #[test]
    fn serializes_transparently() {
        let mut session = Session::new();
        session.bucket_mut("b").insert("x".into(), json!("y"));
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value, json!({"b": {"x": "y"}}));
        let back: Session = serde_json::from_value(value).unwrap();
        assert_eq!(back, session);
    }
}
