//! Per-module private data

use crate::db::{Database, Filter, MODULE_DATA};
use crate::error::StoreError;
use crate::models::ModuleRecord;
use serde_json::{json, Value};

impl Database {
    /// Get a module's record, creating an empty one on first access
    pub fn get_or_create_module_record(&self, module: &str) -> Result<ModuleRecord, StoreError> {
        self.modify_module_record(module, &mut |_: &mut Value| Ok(()))
    }

    pub fn save_module_data(&self, module: &str, data: Value) -> Result<(), StoreError> {
        let mut data = Some(data);
        self.modify_module_record(module, &mut |body: &mut Value| {
            if let Some(data) = data.take() {
                body["data"] = data;
            }
            Ok(())
        })?;
        Ok(())
    }

    fn modify_module_record(
        &self,
        module: &str,
        change: &mut dyn FnMut(&mut Value) -> Result<(), StoreError>,
    ) -> Result<ModuleRecord, StoreError> {
        let doc = self
            .store()
            .modify(
                MODULE_DATA,
                &Filter::all().eq("module", module),
                Some(json!({ "module": module, "data": {} })),
                change,
            )?
            .ok_or_else(|| StoreError::NotFound {
                collection: MODULE_DATA.to_string(),
                id: 0,
            })?;
        let mut record: ModuleRecord = doc.decode()?;
        record.doc_id = doc.id;
        Ok(record)
    }
}
