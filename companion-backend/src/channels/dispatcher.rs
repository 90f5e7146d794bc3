use crate::channels::message::Message;
use crate::channels::types::{ChatMessage, DispatchResult, IgnoreReason, Note, Notification, StreamEvent};
use crate::error::KernelError;
use crate::kernel::runtime::guarded;
use crate::kernel::{HandlerResult, HookResult, Kernel};
use crate::models::{ContextSubscription, UserRef};
use serde_json::json;
use std::sync::Arc;

/// Reaction used when the winning hook does not pick one
const DEFAULT_REACTION: &str = "love";

/// Affinity change per notification kind
const REACTION_LOVE: f64 = 0.1;
const UNREACTION_LOVE: f64 = -0.05;

/// Chat has no native reactions, so the reaction is sent as an emoji message
pub fn chat_reaction_emoji(reaction: &str) -> &'static str {
    match reaction {
        "like" => "👍",
        "love" => "❤️",
        "laugh" => "😄",
        "hmm" => "🤔",
        "surprise" => "😲",
        "congrats" => "🎉",
        "angry" => "😠",
        "confused" => "😕",
        "rip" => "😢",
        "pudding" => "🍮",
        "star" => "⭐",
        _ => "👍",
    }
}

/// What running a matched context hook led to
enum ContextStep {
    /// Treat the message as if no context existed
    Fallthrough,
    Finished(HandlerResult),
    /// The hook faulted; its subscription is gone and nothing is emitted
    Consumed,
}

/// Routes stream events to module hooks and applies the resulting reaction
pub struct MessageDispatcher {
    kernel: Arc<Kernel>,
}

impl MessageDispatcher {
    pub fn new(kernel: Arc<Kernel>) -> Self {
        Self { kernel }
    }

    pub async fn dispatch(&self, event: StreamEvent) -> DispatchResult {
        log::debug!("[DISPATCH] {} event", event.kind());
        match event {
            StreamEvent::Mention(note) => self.on_mention(note).await,
            StreamEvent::Reply(note) => self.on_reply(note).await,
            StreamEvent::Renote(note) => self.on_renote(note).await,
            StreamEvent::Notification(notification) => self.on_notification(notification),
            StreamEvent::NewChatMessage(chat) => self.on_chat_message(chat).await,
        }
    }

    fn is_own(&self, user_id: &str) -> bool {
        user_id == self.kernel.account().id
    }

    async fn on_mention(&self, note: Note) -> DispatchResult {
        if self.is_own(&note.user_id) {
            return DispatchResult::Ignored(IgnoreReason::OwnMessage);
        }
        let mention = self.kernel.self_mention();
        match note.text.as_deref() {
            Some(text) if mention.addresses(text) => {}
            _ => return DispatchResult::Ignored(IgnoreReason::NotAddressed),
        }
        self.dispatch_message(Message::from_note(note, mention)).await
    }

    async fn on_reply(&self, note: Note) -> DispatchResult {
        if self.is_own(&note.user_id) {
            return DispatchResult::Ignored(IgnoreReason::OwnMessage);
        }
        let mention = self.kernel.self_mention();
        // Replies that open with the bot's name also arrive as mentions
        if note.text.as_deref().is_some_and(|t| mention.addresses(t)) {
            return DispatchResult::Ignored(IgnoreReason::NotAddressed);
        }

        let note = if note.text.is_none() {
            match self.fetch_note(&note.id).await {
                Ok(full) => full,
                Err(e) => {
                    log::warn!("[DISPATCH] Could not fetch note {}: {}", note.id, e);
                    return DispatchResult::Failed(e);
                }
            }
        } else {
            note
        };
        self.dispatch_message(Message::from_note(note, mention)).await
    }

    async fn fetch_note(&self, note_id: &str) -> Result<Note, KernelError> {
        let value = self
            .kernel
            .call_platform_api("notes/show", json!({ "noteId": note_id }))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn on_renote(&self, note: Note) -> DispatchResult {
        if self.is_own(&note.user_id) {
            return DispatchResult::Ignored(IgnoreReason::OwnMessage);
        }
        if note.text.is_none() && note.files.is_empty() {
            return DispatchResult::Ignored(IgnoreReason::EmptyRenote);
        }

        match self.kernel.react(&note.id, DEFAULT_REACTION).await {
            Ok(()) => DispatchResult::AutoReacted,
            Err(e) => {
                log::warn!("[DISPATCH] Failed to react to renote {}: {}", note.id, e);
                DispatchResult::Failed(e)
            }
        }
    }

    async fn on_chat_message(&self, chat: ChatMessage) -> DispatchResult {
        if self.is_own(&chat.from_user_id) {
            return DispatchResult::Ignored(IgnoreReason::OwnMessage);
        }
        let mention = self.kernel.self_mention();
        self.dispatch_message(Message::from_chat(chat, mention)).await
    }

    /// Notifications never reach a hook; they only move affinity
    fn on_notification(&self, notification: Notification) -> DispatchResult {
        let delta = match notification.kind.as_str() {
            "reaction" => REACTION_LOVE,
            "unreaction" => UNREACTION_LOVE,
            _ => return DispatchResult::Ignored(IgnoreReason::UnknownNotification),
        };

        let user = match (notification.user, notification.user_id) {
            (Some(user), _) => user,
            (None, Some(id)) => UserRef {
                id,
                ..Default::default()
            },
            (None, None) => return DispatchResult::Ignored(IgnoreReason::UnknownNotification),
        };
        if self.is_own(&user.id) {
            return DispatchResult::Ignored(IgnoreReason::OwnMessage);
        }

        match self.kernel.db().inc_love(&user, delta) {
            Ok(friend) => {
                log::debug!("[DISPATCH] love of {} is now {}", friend.user_id, friend.love);
                DispatchResult::AffinityAdjusted {
                    user_id: friend.user_id,
                    delta,
                }
            }
            Err(e) => {
                log::error!("[DISPATCH] Failed to update affinity for {}: {}", user.id, e);
                DispatchResult::Failed(e.into())
            }
        }
    }

    /// Route one normalized message: context first, then the mention chain
    pub async fn dispatch_message(&self, msg: Message) -> DispatchResult {
        if self.is_own(msg.user_id()) {
            return DispatchResult::Ignored(IgnoreReason::OwnMessage);
        }
        // Avoid infinite reply loops with other bots
        if msg.author.is_bot {
            return DispatchResult::Ignored(IgnoreReason::Bot);
        }
        if !self.kernel.dedupe().check_and_mark(&msg.id) {
            log::debug!("[DISPATCH] Already handled {}", msg.id);
            return DispatchResult::Ignored(IgnoreReason::Duplicate);
        }

        log::info!(
            "[DISPATCH] <<< Message received: {} from {} (chat={})",
            msg.id,
            msg.author.acct(),
            msg.is_chat
        );

        if let Err(e) = self.kernel.db().touch_friend(&msg.author) {
            log::warn!("[DISPATCH] Failed to record friend {}: {}", msg.author.id, e);
        }

        let mut winner: Option<(String, HandlerResult, bool)> = None;

        if let Some(sub) = self.find_context(&msg) {
            match self.run_context_hook(&sub, &msg).await {
                ContextStep::Fallthrough => {}
                ContextStep::Finished(result) => winner = Some((sub.module.clone(), result, true)),
                ContextStep::Consumed => return DispatchResult::Consumed { module: sub.module },
            }
        }

        if winner.is_none() {
            winner = self
                .run_mention_chain(&msg)
                .await
                .map(|(module, result)| (module, result, false));
        }

        let Some((module, result, via_context)) = winner else {
            log::debug!("[DISPATCH] No module handled {}", msg.id);
            return DispatchResult::Unhandled;
        };

        let reaction = result
            .reaction
            .clone()
            .unwrap_or_else(|| DEFAULT_REACTION.to_string());

        if !result.immediate {
            let delay = self.kernel.config().thinking_delay;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        self.emit_reaction(&msg, &reaction).await;

        DispatchResult::Handled {
            module,
            reaction: Some(reaction),
            via_context,
        }
    }

    fn find_context(&self, msg: &Message) -> Option<ContextSubscription> {
        let (scope, correlation_id) = msg.correlation()?;
        match self.kernel.contexts().lookup(scope, correlation_id) {
            Ok(sub) => sub,
            Err(e) => {
                log::error!("[CONTEXT] Lookup failed for {}:{}: {}", scope, correlation_id, e);
                None
            }
        }
    }

    async fn run_context_hook(&self, sub: &ContextSubscription, msg: &Message) -> ContextStep {
        let Some(module) = self.kernel.runtime().context_hook(&sub.module) else {
            log::warn!(
                "[CONTEXT] Module {} has no context hook, dropping its subscription",
                sub.module
            );
            self.release(sub);
            return ContextStep::Fallthrough;
        };

        log::info!("[CONTEXT] Continuing {} conversation (key={:?})", sub.module, sub.key);
        let ctx = self.kernel.module_context(module.name());
        let result = guarded(
            &sub.module,
            module.context_hook(&ctx, sub.key.as_deref(), msg, sub.data.clone()),
        )
        .await;

        match result {
            Ok(HookResult::Pass) => ContextStep::Fallthrough,
            Ok(HookResult::Handled(result)) => ContextStep::Finished(result),
            Ok(HookResult::Done(result)) => {
                self.release(sub);
                ContextStep::Finished(result)
            }
            Err(e) => {
                log::error!("[CONTEXT] Context hook failed, conversation dropped: {}", e);
                self.release(sub);
                ContextStep::Consumed
            }
        }
    }

    fn release(&self, sub: &ContextSubscription) {
        if let Err(e) = self.kernel.contexts().release(sub) {
            log::error!("[CONTEXT] Failed to remove subscription of {}: {}", sub.module, e);
        }
    }

    /// First mention hook to handle the message wins
    async fn run_mention_chain(&self, msg: &Message) -> Option<(String, HandlerResult)> {
        for module in self.kernel.runtime().mention_chain() {
            let ctx = self.kernel.module_context(module.name());
            match guarded(module.name(), module.mention_hook(&ctx, msg)).await {
                Ok(HookResult::Pass) => continue,
                Ok(HookResult::Handled(result)) | Ok(HookResult::Done(result)) => {
                    log::info!("[DISPATCH] {} handled {}", module.name(), msg.id);
                    return Some((module.name().to_string(), result));
                }
                Err(e) => {
                    log::warn!("[DISPATCH] Mention hook failed, treating as declined: {}", e);
                }
            }
        }
        None
    }

    async fn emit_reaction(&self, msg: &Message, reaction: &str) {
        let result = if msg.is_chat {
            self.kernel
                .send_direct_message(
                    msg.user_id(),
                    json!({ "text": chat_reaction_emoji(reaction) }),
                )
                .await
                .map(|_| ())
        } else {
            self.kernel.react(&msg.id, reaction).await
        };

        if let Err(e) = result {
            log::warn!("[DISPATCH] Failed to react to {}: {}", msg.id, e);
        }
    }
}
