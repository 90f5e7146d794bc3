use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A module's private durable state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleRecord {
    #[serde(skip)]
    pub doc_id: i64,
    pub module: String,
    #[serde(default)]
    pub data: Value,
}
