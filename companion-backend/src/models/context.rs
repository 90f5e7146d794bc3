use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};

/// What a conversation correlates on
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Scope {
    /// Direct chat, correlated by the chat partner's user id
    Chat,
    /// Public post thread, correlated by the id of the post being replied to
    Note,
}

/// A module waiting for a follow-up message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSubscription {
    #[serde(skip)]
    pub doc_id: i64,
    pub scope: Scope,
    pub correlation_id: String,
    pub module: String,
    pub key: Option<String>,
    #[serde(default)]
    pub data: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn test_scope_strings() {
        assert_eq!(Scope::Chat.as_ref(), "chat");
        assert_eq!(Scope::Note.to_string(), "note");
        assert_eq!(Scope::from_str("chat").unwrap(), Scope::Chat);
        assert!(Scope::from_str("room").is_err());
    }

    #[test]
    fn test_subscription_document_shape() {
        let sub = ContextSubscription {
            doc_id: 9,
            scope: Scope::Chat,
            correlation_id: "u1".to_string(),
            module: "reminder".to_string(),
            key: None,
            data: json!({"step": 1}),
        };
        let body = serde_json::to_value(&sub).unwrap();
        assert_eq!(
            body,
            json!({
                "scope": "chat",
                "correlationId": "u1",
                "module": "reminder",
                "key": null,
                "data": {"step": 1}
            })
        );
    }
}
