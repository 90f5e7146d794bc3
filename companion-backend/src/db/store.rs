//! Document store interface
//!
//! A store holds named collections of JSON object documents. Collections
//! spring into existence on first insert. Every document gets a store-assigned
//! id that only grows, so ordering by id is ordering by creation.

use crate::error::StoreError;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A stored document: its id plus the JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: i64,
    pub body: Value,
}

impl Document {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        Ok(serde_json::from_value(self.body.clone())?)
    }
}

/// Equality filter over top-level fields. A missing field compares equal to `null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Value)>,
}

impl Filter {
    /// Matches every document
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.clauses.push((field.to_string(), value.into()));
        self
    }

    pub fn clauses(&self) -> &[(String, Value)] {
        &self.clauses
    }

    pub fn matches(&self, body: &Value) -> bool {
        self.clauses
            .iter()
            .all(|(field, expected)| body.get(field).unwrap_or(&Value::Null) == expected)
    }
}

/// Storage backend. Implementations assume a single writer process.
pub trait DocumentStore: Send + Sync {
    /// Declare a collection and the fields it is usually queried by
    fn ensure_collection(&self, name: &str, indices: &[&str]) -> Result<(), StoreError>;

    /// All matching documents in creation order
    fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError>;

    fn insert(&self, collection: &str, body: Value) -> Result<Document, StoreError>;

    /// Replace the body of an existing document
    fn update(&self, collection: &str, doc: &Document) -> Result<(), StoreError>;

    /// Returns whether a document was removed
    fn remove(&self, collection: &str, id: i64) -> Result<bool, StoreError>;

    /// Read-modify-write of the first document matching `filter`, atomic with
    /// respect to every other call on this store. When nothing matches, `seed`
    /// is inserted after `change` has been applied to it; without a seed the
    /// collection is left alone and `None` is returned. An error from `change`
    /// aborts the write.
    ///
    /// `change` runs while the store is locked and must not call back into it.
    fn modify(
        &self,
        collection: &str,
        filter: &Filter,
        seed: Option<Value>,
        change: &mut dyn FnMut(&mut Value) -> Result<(), StoreError>,
    ) -> Result<Option<Document>, StoreError>;

    fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>, StoreError> {
        Ok(self.find(collection, filter)?.into_iter().next())
    }

    fn remove_where(&self, collection: &str, filter: &Filter) -> Result<usize, StoreError> {
        let mut removed = 0;
        for doc in self.find(collection, filter)? {
            if self.remove(collection, doc.id)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Collection and field names end up in index names and JSON paths
pub(crate) fn validate_identifier(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_matches() {
        let body = json!({"module": "dice", "key": null, "count": 3});

        assert!(Filter::all().matches(&body));
        assert!(Filter::all().eq("module", "dice").matches(&body));
        assert!(Filter::all().eq("module", "dice").eq("count", 3).matches(&body));
        assert!(!Filter::all().eq("module", "reminder").matches(&body));

        // Explicit null and missing field both match a null clause
        assert!(Filter::all().eq("key", Value::Null).matches(&body));
        assert!(Filter::all().eq("absent", Value::Null).matches(&body));
        assert!(!Filter::all().eq("absent", "x").matches(&body));
    }

    #[test]
    fn test_filter_is_type_strict() {
        let body = json!({"flag": true, "n": 1});
        assert!(!Filter::all().eq("flag", 1).matches(&body));
        assert!(!Filter::all().eq("n", "1").matches(&body));
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("moduleData").is_ok());
        assert!(validate_identifier("user_id2").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("a'; DROP TABLE documents; --").is_err());
        assert!(validate_identifier("a.b").is_err());
    }
}
