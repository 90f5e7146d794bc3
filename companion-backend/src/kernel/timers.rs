//! Persisted delayed callbacks
//!
//! Timers are written to the store when scheduled, so a restarted process
//! picks them up again. A due timer is removed before its handler runs: a
//! crash mid-fire may lose the callback, but a callback never runs twice.
//! Due timers fire in deadline order; equal deadlines fire in creation order.

use super::clock::Clock;
use crate::db::Database;
use crate::error::StoreError;
use crate::models::PersistedTimer;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct TimerService {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl TimerService {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Persist a timer that fires `delay_ms` from now; negative delays fire on the next tick
    pub fn schedule(
        &self,
        module: &str,
        delay_ms: i64,
        data: Value,
    ) -> Result<PersistedTimer, StoreError> {
        let mut timer = PersistedTimer {
            doc_id: 0,
            id: Uuid::new_v4().to_string(),
            module: module.to_string(),
            inserted_at: self.clock.now_ms(),
            delay_ms: delay_ms.max(0),
            data,
        };
        timer.doc_id = self.db.insert_timer(&timer)?;
        log::info!("[TIMER] Timer persisted: {} {} {}ms", module, timer.id, timer.delay_ms);
        Ok(timer)
    }

    /// Timers whose deadline has passed, in firing order
    pub fn due(&self) -> Result<Vec<PersistedTimer>, StoreError> {
        let now = self.clock.now_ms();
        let mut due: Vec<PersistedTimer> = self
            .db
            .list_timers()?
            .into_iter()
            .filter(|t| t.is_due(now))
            .collect();
        due.sort_by_key(|t| (t.deadline(), t.doc_id));
        Ok(due)
    }

    /// Remove a timer that is about to fire; false if someone else got it first
    pub fn take(&self, timer: &PersistedTimer) -> Result<bool, StoreError> {
        self.db.remove_timer(timer)
    }

    pub fn cancel(&self, id: &str) -> Result<bool, StoreError> {
        self.db.remove_timer_by_id(id)
    }

    pub fn pending(&self) -> Result<Vec<PersistedTimer>, StoreError> {
        self.db.list_timers()
    }
}
