//! Persisted timer operations

use crate::db::{Database, Filter, TIMERS};
use crate::error::StoreError;
use crate::models::PersistedTimer;

impl Database {
    pub fn insert_timer(&self, timer: &PersistedTimer) -> Result<i64, StoreError> {
        let doc = self.store().insert(TIMERS, serde_json::to_value(timer)?)?;
        Ok(doc.id)
    }

    /// All live timers in creation order
    pub fn list_timers(&self) -> Result<Vec<PersistedTimer>, StoreError> {
        self.store()
            .find(TIMERS, &Filter::all())?
            .iter()
            .map(|doc| -> Result<PersistedTimer, StoreError> {
                let mut timer: PersistedTimer = doc.decode()?;
                timer.doc_id = doc.id;
                Ok(timer)
            })
            .collect()
    }

    pub fn remove_timer(&self, timer: &PersistedTimer) -> Result<bool, StoreError> {
        self.store().remove(TIMERS, timer.doc_id)
    }

    /// Remove by the timer's own id (not the document id)
    pub fn remove_timer_by_id(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.store().remove_where(TIMERS, &Filter::all().eq("id", id))? > 0)
    }
}
