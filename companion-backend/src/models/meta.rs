use serde::{Deserialize, Serialize};

/// Process-level bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    #[serde(skip)]
    pub doc_id: i64,
    /// Last heartbeat, in milliseconds since the Unix epoch
    pub last_waking_at: i64,
}
