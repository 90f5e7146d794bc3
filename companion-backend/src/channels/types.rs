use crate::error::KernelError;
use crate::models::UserRef;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A public post as delivered on the main stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub user: UserRef,
    /// Missing for pure renotes and for some notes the stream delivers truncated
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub reply_id: Option<String>,
    #[serde(default)]
    pub renote_id: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub files: Vec<Value>,
}

/// A direct chat message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub from_user_id: String,
    /// Omitted on follow-up messages of an open chat channel
    #[serde(default)]
    pub from_user: Option<UserRef>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub user: Option<UserRef>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub reaction: Option<String>,
}

/// Inbound events of the main stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "camelCase")]
pub enum StreamEvent {
    Mention(Note),
    Reply(Note),
    Renote(Note),
    Notification(Notification),
    NewChatMessage(ChatMessage),
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Mention(_) => "mention",
            StreamEvent::Reply(_) => "reply",
            StreamEvent::Renote(_) => "renote",
            StreamEvent::Notification(_) => "notification",
            StreamEvent::NewChatMessage(_) => "newChatMessage",
        }
    }
}

/// Parse one relay frame. Accepts both a bare event and the
/// `{"type":"channel","body":{...}}` envelope the streaming API wraps it in.
pub fn parse_frame(raw: &str) -> Result<StreamEvent, KernelError> {
    let value: Value = serde_json::from_str(raw)?;
    let inner = match value.get("type").and_then(|t| t.as_str()) {
        Some("channel") => value.get("body").cloned().unwrap_or(Value::Null),
        _ => value,
    };
    Ok(serde_json::from_value(inner)?)
}

/// Why an inbound event was dropped before reaching any hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    OwnMessage,
    Bot,
    Duplicate,
    /// A mention that does not open with the bot's name, or a reply that does
    NotAddressed,
    EmptyRenote,
    UnknownNotification,
}

/// Outcome of dispatching one stream event
#[derive(Debug)]
pub enum DispatchResult {
    Ignored(IgnoreReason),
    /// No hook took the message; nothing was emitted
    Unhandled,
    Handled {
        module: String,
        reaction: Option<String>,
        via_context: bool,
    },
    /// A context hook faulted; its subscription was removed and nothing emitted
    Consumed { module: String },
    AutoReacted,
    AffinityAdjusted { user_id: String, delta: f64 },
    /// A platform call or store write the event depended on failed
    Failed(KernelError),
}

impl DispatchResult {
    pub fn is_handled(&self) -> bool {
        matches!(self, DispatchResult::Handled { .. })
    }

    pub fn error(&self) -> Option<&KernelError> {
        match self {
            DispatchResult::Failed(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mention_frame() {
        let raw = r#"{"type":"channel","body":{"type":"mention","body":{
            "id":"n1","userId":"u1","user":{"id":"u1","username":"alice"},
            "text":"@ai hello","replyId":null,"visibility":"home"}}}"#;
        match parse_frame(raw).unwrap() {
            StreamEvent::Mention(note) => {
                assert_eq!(note.id, "n1");
                assert_eq!(note.user.username, "alice");
                assert_eq!(note.text.as_deref(), Some("@ai hello"));
                assert_eq!(note.visibility.as_deref(), Some("home"));
                assert!(note.files.is_empty());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_bare_chat_and_notification() {
        let chat = parse_frame(
            r#"{"type":"newChatMessage","body":{"id":"c1","fromUserId":"u2","text":"hi"}}"#,
        )
        .unwrap();
        assert_eq!(chat.kind(), "newChatMessage");

        let notification = parse_frame(
            r#"{"type":"notification","body":{"type":"reaction","userId":"u3","reaction":"👍"}}"#,
        )
        .unwrap();
        match notification {
            StreamEvent::Notification(n) => {
                assert_eq!(n.kind, "reaction");
                assert_eq!(n.user_id.as_deref(), Some("u3"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_kinds() {
        assert!(parse_frame(r#"{"type":"followed","body":{}}"#).is_err());
        assert!(parse_frame("not json").is_err());
    }
}
