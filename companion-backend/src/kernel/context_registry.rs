//! Conversations waiting for a reply
//!
//! A subscription is matched by exact (scope, correlation id). Nothing here
//! expires subscriptions; a module that wants a deadline pairs the
//! subscription with a persisted timer whose handler unsubscribes.

use crate::db::Database;
use crate::error::StoreError;
use crate::models::{ContextSubscription, Scope};
use serde_json::Value;

#[derive(Clone)]
pub struct ContextRegistry {
    db: Database,
}

impl ContextRegistry {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Start waiting for a reply. Duplicates are not checked.
    pub fn subscribe(
        &self,
        module: &str,
        key: Option<&str>,
        scope: Scope,
        correlation_id: &str,
        data: Value,
    ) -> Result<ContextSubscription, StoreError> {
        let sub = self
            .db
            .insert_context(module, key, scope, correlation_id, data)?;
        log::info!(
            "[CONTEXT] {} awaiting reply on {}:{} (key={:?})",
            module,
            scope,
            correlation_id,
            key
        );
        Ok(sub)
    }

    /// Stop waiting; `key = None` drops every subscription of the module
    pub fn unsubscribe(&self, module: &str, key: Option<&str>) -> Result<usize, StoreError> {
        let removed = self.db.remove_contexts(module, key)?;
        log::debug!(
            "[CONTEXT] {} released {} subscription(s) (key={:?})",
            module,
            removed,
            key
        );
        Ok(removed)
    }

    /// The subscription an inbound message continues, earliest-created first
    pub fn lookup(
        &self,
        scope: Scope,
        correlation_id: &str,
    ) -> Result<Option<ContextSubscription>, StoreError> {
        self.db.find_context(scope, correlation_id)
    }

    /// Drop one specific subscription
    pub fn release(&self, sub: &ContextSubscription) -> Result<bool, StoreError> {
        self.db.remove_context(sub)
    }

    pub fn list(&self, module: &str) -> Result<Vec<ContextSubscription>, StoreError> {
        self.db.list_contexts(module)
    }
}
