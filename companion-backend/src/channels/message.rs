use super::types::{ChatMessage, Note};
use crate::error::KernelError;
use crate::models::{Scope, UserRef};
use regex::Regex;
use std::sync::Arc;

/// Matches the bot's own leading mention, bare or host-qualified
#[derive(Debug)]
pub struct SelfMention {
    username: String,
    pattern: Regex,
}

impl SelfMention {
    pub fn new(username: &str, host: &str) -> Result<Self, KernelError> {
        let pattern = if host.is_empty() {
            format!(r"(?i)^@{}\s", regex::escape(username))
        } else {
            format!(
                r"(?i)^@{}(?:@{})?\s",
                regex::escape(username),
                regex::escape(host)
            )
        };
        let pattern = Regex::new(&pattern)
            .map_err(|e| KernelError::Config(format!("invalid self-mention pattern: {}", e)))?;

        Ok(Self {
            username: username.to_string(),
            pattern,
        })
    }

    /// Remove exactly one leading self-mention, then trim
    pub fn strip(&self, text: &str) -> String {
        self.pattern.replace(text.trim_start(), "").trim().to_string()
    }

    /// Whether a note's text opens by addressing the bot
    pub fn addresses(&self, text: &str) -> bool {
        text.starts_with(&format!("@{}", self.username))
    }
}

/// Normalized view over a note or a chat message
#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub author: UserRef,
    pub text: Option<String>,
    pub reply_id: Option<String>,
    pub quote_id: Option<String>,
    pub visibility: Option<String>,
    pub is_chat: bool,
    mention: Arc<SelfMention>,
}

impl Message {
    pub fn from_note(note: Note, mention: Arc<SelfMention>) -> Self {
        let mut author = note.user;
        if author.id.is_empty() {
            author.id = note.user_id;
        }
        Self {
            id: note.id,
            author,
            text: note.text,
            reply_id: note.reply_id,
            quote_id: note.renote_id,
            visibility: note.visibility,
            is_chat: false,
            mention,
        }
    }

    pub fn from_chat(chat: ChatMessage, mention: Arc<SelfMention>) -> Self {
        let author = chat.from_user.unwrap_or_else(|| UserRef {
            id: chat.from_user_id.clone(),
            ..Default::default()
        });
        Self {
            id: chat.id,
            author,
            text: chat.text,
            reply_id: None,
            quote_id: None,
            visibility: None,
            is_chat: true,
            mention,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.author.id
    }

    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// Body with the leading self-mention removed
    pub fn extracted_text(&self) -> String {
        self.mention.strip(self.text())
    }

    pub fn scope(&self) -> Scope {
        if self.is_chat { Scope::Chat } else { Scope::Note }
    }

    /// Key a continuation is matched on: the chat partner, or the note being replied to.
    /// Notes that reply to nothing never continue a conversation.
    pub fn correlation(&self) -> Option<(Scope, &str)> {
        if self.is_chat {
            Some((Scope::Chat, self.author.id.as_str()))
        } else {
            self.reply_id.as_deref().map(|id| (Scope::Note, id))
        }
    }

    /// Case-insensitive check for any of `words` in the body
    pub fn includes(&self, words: &[&str]) -> bool {
        let text = self.text().to_lowercase();
        words.iter().any(|w| text.contains(&w.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mention() -> Arc<SelfMention> {
        Arc::new(SelfMention::new("ai", "misskey.example").unwrap())
    }

    fn note(text: &str, reply_id: Option<&str>) -> Message {
        Message::from_note(
            Note {
                id: "n1".to_string(),
                user_id: "u1".to_string(),
                text: Some(text.to_string()),
                reply_id: reply_id.map(|s| s.to_string()),
                ..Default::default()
            },
            mention(),
        )
    }

    #[test]
    fn test_strip_bare_and_qualified() {
        let m = mention();
        assert_eq!(m.strip("@ai hello"), "hello");
        assert_eq!(m.strip("@ai@misskey.example   roll 2d6 "), "roll 2d6");
        assert_eq!(m.strip("@AI Hello"), "Hello");
        assert_eq!(m.strip("@ai@MISSKEY.EXAMPLE hi"), "hi");
        assert_eq!(m.strip("  @ai hello"), "hello");
    }

    #[test]
    fn test_strip_only_leading_and_only_self() {
        let m = mention();
        assert_eq!(m.strip("hello @ai "), "hello @ai");
        assert_eq!(m.strip("@aiko hi"), "@aiko hi");
        assert_eq!(m.strip("@ai@other.example hi"), "@ai@other.example hi");
        // The host's dot is literal
        assert_eq!(m.strip("@ai@misskeyXexample hi"), "@ai@misskeyXexample hi");
    }

    #[test]
    fn test_strip_is_idempotent() {
        let m = mention();
        for text in [
            "@ai hello",
            "@Ai@misskey.example  what time is it",
            "plain",
            "  spaced  ",
            "  @ai hello",
            "\n@ai@misskey.example hi",
        ] {
            let once = m.strip(text);
            assert_eq!(m.strip(&once), once);
        }
    }

    #[test]
    fn test_addresses_is_prefix_check() {
        let m = mention();
        assert!(m.addresses("@ai hi"));
        assert!(m.addresses("@ai@misskey.example hi"));
        assert!(!m.addresses("hi @ai"));
    }

    #[test]
    fn test_correlation() {
        assert_eq!(note("hi", None).correlation(), None);
        assert_eq!(note("hi", Some("n0")).correlation(), Some((Scope::Note, "n0")));

        let chat = Message::from_chat(
            ChatMessage {
                id: "c1".to_string(),
                from_user_id: "u9".to_string(),
                from_user: None,
                text: Some("yes".to_string()),
            },
            mention(),
        );
        assert_eq!(chat.author.id, "u9");
        assert_eq!(chat.correlation(), Some((Scope::Chat, "u9")));
        assert_eq!(chat.scope(), Scope::Chat);
    }

    #[test]
    fn test_extracted_text_and_includes() {
        let msg = note("@ai Remind me in 5 minutes", None);
        assert_eq!(msg.extracted_text(), "Remind me in 5 minutes");
        assert!(msg.includes(&["remind"]));
        assert!(!msg.includes(&["dice", "roll"]));
        assert_eq!(msg.author.id, "u1");
    }
}
