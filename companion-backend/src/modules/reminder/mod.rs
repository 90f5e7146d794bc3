//! Reminders that nag every 12 hours until the owner says they're done
//!
//! A reminder subscribes to replies on the mention (and on the quoted note, if
//! any). Each renotification posts a fresh note and waits for replies on it.

pub mod parse;

use crate::channels::Message;
use crate::db::{Collection, Document, Filter};
use crate::error::KernelError;
use crate::kernel::{HookResult, Hooks, Module, ModuleContext};
use crate::models::Scope;
use async_trait::async_trait;
use chrono::{Local, TimeZone, Utc};
use once_cell::sync::OnceCell;
use parse::parse_time_expression;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const NAME: &str = "reminder";

/// Gap between renotifications
pub const NOTIFY_INTERVAL_MS: i64 = 1000 * 60 * 60 * 12;

const DONE_WORDS: &[&str] = &["done", "やった", "やりました", "はい"];
const CANCEL_WORDS: &[&str] = &["cancel", "やめる", "やめた", "キャンセル"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemindRecord {
    /// Id of the message that created the reminder
    pub id: String,
    pub user_id: String,
    pub is_chat: bool,
    pub thing: Option<String>,
    #[serde(default)]
    pub quote_id: Option<String>,
    #[serde(default)]
    pub times: u32,
    pub created_at: i64,
}

impl RemindRecord {
    fn scope(&self) -> Scope {
        if self.is_chat { Scope::Chat } else { Scope::Note }
    }

    /// Note to renote on renotification: the quote when there is nothing else to show
    fn renote_target(&self) -> &str {
        match (&self.thing, &self.quote_id) {
            (None, Some(quote)) => quote,
            _ => &self.id,
        }
    }
}

/// Payload carried by this module's contexts and timers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct RemindRef {
    id: String,
}

pub struct Reminder {
    reminds: OnceCell<Collection>,
}

impl Reminder {
    pub fn new() -> Self {
        Self {
            reminds: OnceCell::new(),
        }
    }

    fn reminds(&self) -> Result<&Collection, KernelError> {
        self.reminds
            .get()
            .ok_or_else(|| KernelError::hook(NAME, "reminds collection not initialised"))
    }

    fn find(&self, id: &str) -> Result<Option<(Document, RemindRecord)>, KernelError> {
        match self.reminds()?.find_one(&Filter::all().eq("id", id))? {
            Some(doc) => {
                let remind = doc.decode()?;
                Ok(Some((doc, remind)))
            }
            None => Ok(None),
        }
    }

    async fn list(&self, ctx: &ModuleContext<'_>, msg: &Message) -> Result<HookResult, KernelError> {
        let reminds: Vec<RemindRecord> = self
            .reminds()?
            .find_as(&Filter::all().eq("userId", msg.user_id()))?;
        let host = &ctx.kernel().config().host_name;

        let lines: Vec<String> = reminds
            .iter()
            .map(|r| match (&r.thing, &r.quote_id) {
                (Some(thing), _) => format!("・{}", thing),
                (None, Some(quote)) => format!("・[{}](https://{}/notes/{})", quote, host, quote),
                (None, None) => "・(empty)".to_string(),
            })
            .collect();

        let text = if lines.is_empty() {
            "You have no reminders.".to_string()
        } else {
            format!("Here are your reminders:\n{}", lines.join("\n"))
        };
        ctx.reply(msg, &text).await?;
        Ok(HookResult::handled())
    }

    async fn create(&self, ctx: &ModuleContext<'_>, msg: &Message, body: &str) -> Result<HookResult, KernelError> {
        let now = ctx.now_ms();
        let local_now = Utc
            .timestamp_millis_opt(now)
            .single()
            .map(|t| t.with_timezone(&Local));

        let (thing, delay_ms) = match local_now.and_then(|t| parse_time_expression(body, &t)) {
            Some(parsed) => (parsed.text, (parsed.when_ms - now).max(0)),
            None => (body.trim().to_string(), NOTIFY_INTERVAL_MS),
        };

        if thing.is_empty() && msg.quote_id.is_none() {
            ctx.reply(msg, "I couldn't tell what to remind you about.").await?;
            return Ok(HookResult::react("🆖").immediate());
        }

        let remind = RemindRecord {
            id: msg.id.clone(),
            user_id: msg.user_id().to_string(),
            is_chat: msg.is_chat,
            thing: (!thing.is_empty()).then_some(thing),
            quote_id: msg.quote_id.clone(),
            times: 0,
            created_at: now,
        };
        self.reminds()?.insert_as(&remind)?;

        let reference = RemindRef {
            id: remind.id.clone(),
        };
        let correlation = if remind.is_chat { remind.user_id.as_str() } else { remind.id.as_str() };
        ctx.subscribe_reply(Some(&remind.id), remind.scope(), correlation, &reference)?;
        if let Some(quote) = &remind.quote_id {
            ctx.subscribe_reply(Some(&remind.id), Scope::Note, quote, &reference)?;
        }
        ctx.schedule_durable(delay_ms, &reference)?;

        log::info!("[{}] Reminder {} set, first notice in {}ms", NAME, remind.id, delay_ms);
        Ok(HookResult::react("🆗").immediate())
    }
}

impl Default for Reminder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Module for Reminder {
    fn name(&self) -> &'static str {
        NAME
    }

    fn init(&self, ctx: &ModuleContext<'_>) -> Result<(), KernelError> {
        self.reminds
            .get_or_try_init(|| ctx.collection("reminds", &["userId", "id"]))?;
        Ok(())
    }

    fn install(&self) -> Hooks {
        Hooks::none().with_mention().with_context().with_timeout()
    }

    async fn mention_hook(
        &self,
        ctx: &ModuleContext<'_>,
        msg: &Message,
    ) -> Result<HookResult, KernelError> {
        let text = msg.extracted_text();
        let lower = text.to_lowercase();
        if !lower.starts_with("remind") && !lower.starts_with("todo") {
            return Ok(HookResult::Pass);
        }
        if lower.starts_with("reminds") || lower.starts_with("todos") {
            return self.list(ctx, msg).await;
        }

        // Drop the command word
        let body = text
            .split_once(char::is_whitespace)
            .map(|(_, rest)| rest)
            .unwrap_or("");
        self.create(ctx, msg, body).await
    }

    async fn context_hook(
        &self,
        ctx: &ModuleContext<'_>,
        key: Option<&str>,
        msg: &Message,
        data: Value,
    ) -> Result<HookResult, KernelError> {
        if msg.text.is_none() {
            return Ok(HookResult::handled());
        }

        let reference: RemindRef = serde_json::from_value(data)?;
        let Some((doc, remind)) = self.find(&reference.id)? else {
            ctx.unsubscribe_reply(key)?;
            return Ok(HookResult::handled());
        };

        let done = msg.includes(DONE_WORDS);
        let cancel = msg.includes(CANCEL_WORDS);
        let is_owner = msg.user_id() == remind.user_id;

        if !is_owner {
            ctx.reply(msg, "Only the person who asked for this reminder can finish it.")
                .await?;
            return Ok(HookResult::handled());
        }

        if done || cancel {
            ctx.unsubscribe_reply(key)?;
            self.reminds()?.remove(&doc)?;
            let text = if done {
                format!("Well done, {}!", msg.author.display_name())
            } else {
                "Okay, I cancelled that reminder.".to_string()
            };
            ctx.reply(msg, &text).await?;
            return Ok(HookResult::handled());
        }

        // In chat any other message ends the wait; in a thread it stays open
        if msg.is_chat {
            ctx.unsubscribe_reply(key)?;
        }
        Ok(HookResult::Pass)
    }

    async fn timeout_handler(&self, ctx: &ModuleContext<'_>, data: Value) -> Result<(), KernelError> {
        let reference: RemindRef = serde_json::from_value(data)?;
        let Some((mut doc, mut remind)) = self.find(&reference.id)? else {
            return Ok(());
        };

        remind.times += 1;
        doc.body = serde_json::to_value(&remind)?;
        self.reminds()?.update(&doc)?;

        let Some(friend) = ctx.lookup_friend(&remind.user_id)? else {
            return Ok(());
        };

        let correlation = if remind.is_chat {
            let thing = remind.thing.as_deref().unwrap_or("the thing you asked about");
            let text = format!("{}, don't forget: {}", friend.name(), thing);
            if let Err(e) = ctx
                .send_direct_message(&friend.user_id, json!({ "text": text }))
                .await
            {
                log::warn!("[{}] Failed to send reminder {}: {}", NAME, remind.id, e);
            }
            remind.user_id.clone()
        } else {
            let params = json!({
                "renoteId": remind.renote_target(),
                "text": format!("{} Did you finish it, {}?", friend.user.acct(), friend.name()),
            });
            match ctx.post(params).await {
                Ok(note) => note
                    .get("id")
                    .and_then(|id| id.as_str())
                    .map(|id| id.to_string())
                    .ok_or_else(|| KernelError::hook(NAME, "created note has no id"))?,
                // The renoted note is gone
                Err(e) if e.status() == Some(400) => {
                    log::info!("[{}] Reminder {} target deleted, dropping it", NAME, remind.id);
                    ctx.unsubscribe_reply(Some(&remind.id))?;
                    self.reminds()?.remove(&doc)?;
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        };

        ctx.subscribe_reply(Some(&remind.id), remind.scope(), &correlation, &reference)?;
        ctx.schedule_durable(NOTIFY_INTERVAL_MS, &reference)?;
        Ok(())
    }
}
