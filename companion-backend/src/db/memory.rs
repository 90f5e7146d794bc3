//! In-process document store, used by tests and throwaway runs

use super::store::{validate_identifier, Document, DocumentStore, Filter};
use crate::error::StoreError;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
struct Inner {
    last_id: i64,
    collections: HashMap<String, BTreeMap<i64, Value>>,
}

/// Keeps every collection in memory; nothing survives the process
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, collection: &str) -> usize {
        self.inner
            .lock()
            .collections
            .get(collection)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }
}

impl DocumentStore for MemoryStore {
    fn ensure_collection(&self, name: &str, indices: &[&str]) -> Result<(), StoreError> {
        validate_identifier(name)?;
        for field in indices {
            validate_identifier(field)?;
        }
        self.inner
            .lock()
            .collections
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        let inner = self.inner.lock();
        let docs = match inner.collections.get(collection) {
            Some(docs) => docs,
            None => return Ok(Vec::new()),
        };
        Ok(docs
            .iter()
            .filter(|(_, body)| filter.matches(body))
            .map(|(id, body)| Document {
                id: *id,
                body: body.clone(),
            })
            .collect())
    }

    fn insert(&self, collection: &str, body: Value) -> Result<Document, StoreError> {
        validate_identifier(collection)?;
        if !body.is_object() {
            return Err(StoreError::NotAnObject(collection.to_string()));
        }
        let mut inner = self.inner.lock();
        inner.last_id += 1;
        let id = inner.last_id;
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id, body.clone());
        Ok(Document { id, body })
    }

    fn update(&self, collection: &str, doc: &Document) -> Result<(), StoreError> {
        if !doc.body.is_object() {
            return Err(StoreError::NotAnObject(collection.to_string()));
        }
        let mut inner = self.inner.lock();
        match inner
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(&doc.id))
        {
            Some(slot) => {
                *slot = doc.body.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: doc.id,
            }),
        }
    }

    fn remove(&self, collection: &str, id: i64) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        Ok(inner
            .collections
            .get_mut(collection)
            .map(|docs| docs.remove(&id).is_some())
            .unwrap_or(false))
    }

    fn modify(
        &self,
        collection: &str,
        filter: &Filter,
        seed: Option<Value>,
        change: &mut dyn FnMut(&mut Value) -> Result<(), StoreError>,
    ) -> Result<Option<Document>, StoreError> {
        validate_identifier(collection)?;
        let mut inner = self.inner.lock();

        let existing = inner.collections.get(collection).and_then(|docs| {
            docs.iter()
                .find(|(_, body)| filter.matches(body))
                .map(|(id, body)| (*id, body.clone()))
        });

        let (id, mut body) = match (existing, seed) {
            (Some(found), _) => found,
            (None, Some(seed)) => {
                inner.last_id += 1;
                (inner.last_id, seed)
            }
            (None, None) => return Ok(None),
        };

        change(&mut body)?;
        if !body.is_object() {
            return Err(StoreError::NotAnObject(collection.to_string()));
        }
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id, body.clone());
        Ok(Some(Document { id, body }))
    }
}
