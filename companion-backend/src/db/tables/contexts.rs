//! Context subscription operations

use crate::db::{Database, Document, Filter, CONTEXTS};
use crate::error::StoreError;
use crate::models::{ContextSubscription, Scope};
use serde_json::Value;

fn to_subscription(doc: &Document) -> Result<ContextSubscription, StoreError> {
    let mut sub: ContextSubscription = doc.decode()?;
    sub.doc_id = doc.id;
    Ok(sub)
}

impl Database {
    pub fn insert_context(
        &self,
        module: &str,
        key: Option<&str>,
        scope: Scope,
        correlation_id: &str,
        data: Value,
    ) -> Result<ContextSubscription, StoreError> {
        let mut sub = ContextSubscription {
            doc_id: 0,
            scope,
            correlation_id: correlation_id.to_string(),
            module: module.to_string(),
            key: key.map(|k| k.to_string()),
            data,
        };
        let doc = self.store().insert(CONTEXTS, serde_json::to_value(&sub)?)?;
        sub.doc_id = doc.id;
        Ok(sub)
    }

    /// Earliest-created subscription for exactly this scope and correlation id
    pub fn find_context(
        &self,
        scope: Scope,
        correlation_id: &str,
    ) -> Result<Option<ContextSubscription>, StoreError> {
        let filter = Filter::all()
            .eq("scope", scope.as_ref())
            .eq("correlationId", correlation_id);
        self.store()
            .find_one(CONTEXTS, &filter)?
            .map(|doc| to_subscription(&doc))
            .transpose()
    }

    pub fn list_contexts(&self, module: &str) -> Result<Vec<ContextSubscription>, StoreError> {
        self.store()
            .find(CONTEXTS, &Filter::all().eq("module", module))?
            .iter()
            .map(to_subscription)
            .collect()
    }

    /// Remove a module's subscriptions; `key = None` removes all of them
    pub fn remove_contexts(&self, module: &str, key: Option<&str>) -> Result<usize, StoreError> {
        let mut filter = Filter::all().eq("module", module);
        if let Some(key) = key {
            filter = filter.eq("key", key);
        }
        self.store().remove_where(CONTEXTS, &filter)
    }

    pub fn remove_context(&self, sub: &ContextSubscription) -> Result<bool, StoreError> {
        self.store().remove(CONTEXTS, sub.doc_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_find_context_returns_earliest() {
        let db = Database::in_memory();
        db.insert_context("a", Some("first"), Scope::Chat, "u1", json!(1)).unwrap();
        db.insert_context("b", Some("second"), Scope::Chat, "u1", json!(2)).unwrap();

        let found = db.find_context(Scope::Chat, "u1").unwrap().unwrap();
        assert_eq!(found.module, "a");
        assert_eq!(found.key.as_deref(), Some("first"));
        assert_eq!(found.data, json!(1));
    }

    #[test]
    fn test_remove_contexts_by_key_and_bulk() {
        let db = Database::in_memory();
        db.insert_context("a", Some("k1"), Scope::Note, "n1", Value::Null).unwrap();
        db.insert_context("a", Some("k2"), Scope::Note, "n2", Value::Null).unwrap();
        db.insert_context("a", None, Scope::Chat, "u1", Value::Null).unwrap();
        db.insert_context("b", Some("k1"), Scope::Note, "n3", Value::Null).unwrap();

        assert_eq!(db.remove_contexts("a", Some("k1")).unwrap(), 1);
        assert_eq!(db.list_contexts("a").unwrap().len(), 2);

        assert_eq!(db.remove_contexts("a", None).unwrap(), 2);
        assert!(db.list_contexts("a").unwrap().is_empty());
        assert_eq!(db.list_contexts("b").unwrap().len(), 1);
    }
}
