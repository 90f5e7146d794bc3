//! Process heartbeat

use crate::db::{Database, Filter, META};
use crate::error::StoreError;
use crate::models::Meta;
use serde_json::{json, Value};

impl Database {
    /// Current meta record; the first call stores `now_ms` as the heartbeat
    pub fn get_or_create_meta(&self, now_ms: i64) -> Result<Meta, StoreError> {
        let doc = self
            .store()
            .modify(
                META,
                &Filter::all(),
                Some(json!({ "lastWakingAt": now_ms })),
                &mut |_: &mut Value| Ok(()),
            )?
            .ok_or_else(|| StoreError::NotFound {
                collection: META.to_string(),
                id: 0,
            })?;
        let mut meta: Meta = doc.decode()?;
        meta.doc_id = doc.id;
        Ok(meta)
    }

    pub fn set_last_waking_at(&self, now_ms: i64) -> Result<(), StoreError> {
        self.store().modify(
            META,
            &Filter::all(),
            Some(json!({ "lastWakingAt": now_ms })),
            &mut |body: &mut Value| {
                body["lastWakingAt"] = json!(now_ms);
                Ok(())
            },
        )?;
        Ok(())
    }
}
