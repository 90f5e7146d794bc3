//! Persistence - the document store and the kernel's collections
//!
//! `Database` is a cheap, cloneable handle over any `DocumentStore`. The
//! collection-specific operations live in `tables/` as `impl Database` blocks.

pub mod memory;
pub mod sqlite;
pub mod store;
mod tables;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::{Document, DocumentStore, Filter};

use crate::error::StoreError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

pub(crate) const CONTEXTS: &str = "contexts";
pub(crate) const TIMERS: &str = "timers";
pub(crate) const FRIENDS: &str = "friends";
pub(crate) const MODULE_DATA: &str = "moduleData";
pub(crate) const META: &str = "meta";

#[derive(Clone)]
pub struct Database {
    store: Arc<dyn DocumentStore>,
}

impl Database {
    pub fn new(store: Arc<dyn DocumentStore>) -> Result<Self, StoreError> {
        let db = Self { store };
        db.init()?;
        Ok(db)
    }

    /// Open the SQLite-backed store at `database_url`
    pub fn open(database_url: &str) -> Result<Self, StoreError> {
        Self::new(Arc::new(SqliteStore::new(database_url)?))
    }

    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
        }
    }

    fn init(&self) -> Result<(), StoreError> {
        self.store.ensure_collection(CONTEXTS, &["module", "correlationId"])?;
        self.store.ensure_collection(TIMERS, &["module"])?;
        self.store.ensure_collection(FRIENDS, &["userId"])?;
        self.store.ensure_collection(MODULE_DATA, &["module"])?;
        self.store.ensure_collection(META, &[])?;
        Ok(())
    }

    /// Open a named collection, declaring its index fields
    pub fn collection(&self, name: &str, indices: &[&str]) -> Result<Collection, StoreError> {
        self.store.ensure_collection(name, indices)?;
        Ok(Collection {
            store: self.store.clone(),
            name: name.to_string(),
        })
    }

    pub(crate) fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }
}

/// Handle to one named collection
#[derive(Clone)]
pub struct Collection {
    store: Arc<dyn DocumentStore>,
    name: String,
}

impl Collection {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn find(&self, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        self.store.find(&self.name, filter)
    }

    pub fn find_one(&self, filter: &Filter) -> Result<Option<Document>, StoreError> {
        self.store.find_one(&self.name, filter)
    }

    /// Decode every matching document as `T`
    pub fn find_as<T: DeserializeOwned>(&self, filter: &Filter) -> Result<Vec<T>, StoreError> {
        self.find(filter)?.iter().map(|d| d.decode()).collect()
    }

    pub fn insert_one(&self, body: Value) -> Result<Document, StoreError> {
        self.store.insert(&self.name, body)
    }

    pub fn insert_as<T: Serialize>(&self, value: &T) -> Result<Document, StoreError> {
        self.insert_one(serde_json::to_value(value)?)
    }

    pub fn update(&self, doc: &Document) -> Result<(), StoreError> {
        self.store.update(&self.name, doc)
    }

    pub fn remove(&self, doc: &Document) -> Result<bool, StoreError> {
        self.store.remove(&self.name, doc.id)
    }

    pub fn remove_where(&self, filter: &Filter) -> Result<usize, StoreError> {
        self.store.remove_where(&self.name, filter)
    }
}
