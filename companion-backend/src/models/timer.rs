use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A delayed callback that survives restarts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedTimer {
    #[serde(skip)]
    pub doc_id: i64,
    pub id: String,
    pub module: String,
    /// Milliseconds since the Unix epoch
    pub inserted_at: i64,
    pub delay_ms: i64,
    #[serde(default)]
    pub data: Value,
}

impl PersistedTimer {
    pub fn deadline(&self) -> i64 {
        self.inserted_at.saturating_add(self.delay_ms)
    }

    pub fn is_due(&self, now_ms: i64) -> bool {
        now_ms - self.deadline() >= 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_due_at_exact_deadline() {
        let timer = PersistedTimer {
            doc_id: 1,
            id: "t".to_string(),
            module: "m".to_string(),
            inserted_at: 1_000,
            delay_ms: 500,
            data: Value::Null,
        };
        assert_eq!(timer.deadline(), 1_500);
        assert!(!timer.is_due(1_499));
        assert!(timer.is_due(1_500));
        assert!(timer.is_due(9_999));
    }
}
