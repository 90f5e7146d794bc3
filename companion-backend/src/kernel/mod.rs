//! The kernel - shared state behind the dispatcher, the timer loop and every module
//!
//! Owns the bot's identity, the database handle, the platform client, the
//! installed modules, the context registry, the timer service and the dedupe
//! guard. Modules reach it only through a `ModuleContext` passed into each
//! hook call.

pub mod clock;
pub mod context_registry;
pub mod dedupe;
pub mod runtime;
pub mod timers;

pub use clock::{Clock, ManualClock, SystemClock};
pub use context_registry::ContextRegistry;
pub use dedupe::DedupeGuard;
pub use runtime::{HandlerResult, HookResult, Hooks, Module, ModuleRuntime};
pub use timers::TimerService;

use crate::channels::{Message, SelfMention};
use crate::config::Config;
use crate::db::{Collection, Database};
use crate::error::KernelError;
use crate::models::{ContextSubscription, Friend, PersistedTimer, Scope, UserRef};
use crate::platform::PlatformApi;
use runtime::guarded;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Kernel tunables
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// Bare instance host, used to recognise `@bot@host` mentions
    pub host_name: String,
    pub master: Option<String>,
    /// Pause before reacting unless a hook asks for an immediate reaction
    pub thinking_delay: Duration,
    pub timer_interval: Duration,
    pub waking_interval: Duration,
    pub dedupe_capacity: usize,
}

impl KernelConfig {
    pub fn new(host_name: impl Into<String>) -> Self {
        Self {
            host_name: host_name.into(),
            master: None,
            thinking_delay: Duration::from_millis(1000),
            timer_interval: Duration::from_millis(1000),
            waking_interval: Duration::from_secs(10),
            dedupe_capacity: 4096,
        }
    }
}

impl From<&Config> for KernelConfig {
    fn from(config: &Config) -> Self {
        Self {
            host_name: config.host_name(),
            master: config.master.clone(),
            thinking_delay: config.thinking_delay(),
            timer_interval: config.timer_interval(),
            waking_interval: config.waking_interval(),
            dedupe_capacity: config.dedupe_capacity,
        }
    }
}

pub struct Kernel {
    account: UserRef,
    config: KernelConfig,
    db: Database,
    platform: Arc<dyn PlatformApi>,
    clock: Arc<dyn Clock>,
    runtime: ModuleRuntime,
    contexts: ContextRegistry,
    timers: TimerService,
    dedupe: DedupeGuard,
    mention: Arc<SelfMention>,
    last_slept_at: i64,
}

impl Kernel {
    pub fn new(
        account: UserRef,
        config: KernelConfig,
        db: Database,
        platform: Arc<dyn PlatformApi>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, KernelError> {
        let mention = Arc::new(SelfMention::new(&account.username, &config.host_name)?);
        let last_slept_at = db.get_or_create_meta(clock.now_ms())?.last_waking_at;

        Ok(Self {
            contexts: ContextRegistry::new(db.clone()),
            timers: TimerService::new(db.clone(), clock.clone()),
            dedupe: DedupeGuard::new(config.dedupe_capacity),
            runtime: ModuleRuntime::new(),
            account,
            config,
            db,
            platform,
            clock,
            mention,
            last_slept_at,
        })
    }

    /// Install one module. Install order is mention-hook priority.
    pub fn install(&self, module: Arc<dyn Module>) -> Result<(), KernelError> {
        let name = module.name();
        log::info!("Installing {} module...", name);

        module.init(&self.module_context(name))?;
        self.db.get_or_create_module_record(name)?;
        let hooks = module.install();
        self.runtime.register(module, hooks);
        Ok(())
    }

    pub fn install_all(&self, modules: Vec<Arc<dyn Module>>) -> Result<(), KernelError> {
        for module in modules {
            self.install(module)?;
        }
        Ok(())
    }

    pub fn module_context<'a>(&'a self, module: &'a str) -> ModuleContext<'a> {
        ModuleContext {
            kernel: self,
            module,
        }
    }

    pub fn account(&self) -> &UserRef {
        &self.account
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn runtime(&self) -> &ModuleRuntime {
        &self.runtime
    }

    pub fn contexts(&self) -> &ContextRegistry {
        &self.contexts
    }

    pub fn timers(&self) -> &TimerService {
        &self.timers
    }

    pub fn dedupe(&self) -> &DedupeGuard {
        &self.dedupe
    }

    pub fn self_mention(&self) -> Arc<SelfMention> {
        self.mention.clone()
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Heartbeat recorded by the previous process (or boot time on first run)
    pub fn last_slept_at(&self) -> i64 {
        self.last_slept_at
    }

    // ============================================
    // Platform calls
    // ============================================

    /// Raw platform API call. Failures are returned as-is; the kernel never retries.
    pub async fn call_platform_api(&self, endpoint: &str, params: Value) -> Result<Value, KernelError> {
        log::debug!("[API] {}", endpoint);
        self.platform.call(endpoint, params).await
    }

    /// Create a note and return the created note
    pub async fn post(&self, params: Value) -> Result<Value, KernelError> {
        let res = self.call_platform_api("notes/create", params).await?;
        Ok(res.get("createdNote").cloned().unwrap_or(res))
    }

    pub async fn send_direct_message(&self, user_id: &str, params: Value) -> Result<Value, KernelError> {
        let mut body = match params {
            Value::Object(map) => map,
            Value::Null => Default::default(),
            other => return Err(KernelError::InvalidParams(format!("expected an object, got {}", other))),
        };
        body.insert("toUserId".to_string(), Value::String(user_id.to_string()));
        self.call_platform_api("chat/messages/create-to-user", Value::Object(body))
            .await
    }

    pub async fn react(&self, note_id: &str, reaction: &str) -> Result<(), KernelError> {
        self.call_platform_api(
            "notes/reactions/create",
            json!({ "noteId": note_id, "reaction": reaction }),
        )
        .await?;
        Ok(())
    }

    /// Answer a message on the channel it arrived on
    pub async fn reply(&self, msg: &Message, text: &str) -> Result<Value, KernelError> {
        log::info!(">>> Sending reply to {}", msg.id);
        if msg.is_chat {
            self.send_direct_message(&msg.author.id, json!({ "text": text }))
                .await
        } else {
            self.post(json!({ "replyId": msg.id, "text": text })).await
        }
    }

    // ============================================
    // Background work
    // ============================================

    /// Fire every due timer. Returns how many handlers were invoked.
    pub async fn tick_timers(&self) -> usize {
        let due = match self.timers.due() {
            Ok(due) => due,
            Err(e) => {
                log::error!("[TIMER] Failed to scan timers: {}", e);
                return 0;
            }
        };

        let mut fired = 0;
        for timer in due {
            if self.fire_timer(timer).await {
                fired += 1;
            }
        }
        fired
    }

    async fn fire_timer(&self, timer: PersistedTimer) -> bool {
        log::info!("[TIMER] Timer expired: {} {}", timer.module, timer.id);

        match self.timers.take(&timer) {
            Ok(true) => {}
            Ok(false) => {
                log::debug!("[TIMER] Timer {} was already removed", timer.id);
                return false;
            }
            Err(e) => {
                log::error!("[TIMER] Failed to remove timer {}, not firing: {}", timer.id, e);
                return false;
            }
        }

        let Some(module) = self.runtime.timeout_handler(&timer.module) else {
            log::warn!(
                "[TIMER] No timeout handler for module {}, dropping timer {}",
                timer.module,
                timer.id
            );
            return false;
        };

        let ctx = self.module_context(module.name());
        if let Err(e) = guarded(&timer.module, module.timeout_handler(&ctx, timer.data)).await {
            log::error!("[TIMER] Timeout handler failed: {}", e);
        }
        true
    }

    /// Record that the process is alive
    pub fn heartbeat(&self) {
        if let Err(e) = self.db.set_last_waking_at(self.clock.now_ms()) {
            log::warn!("Failed to record heartbeat: {}", e);
        }
    }
}

/// Start the timer loop and the heartbeat; both stop when `cancel` fires
pub fn spawn_background(kernel: Arc<Kernel>, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
    let timer_kernel = kernel.clone();
    let timer_cancel = cancel.clone();
    let timer_loop = tokio::spawn(async move {
        let mut interval = tokio::time::interval(timer_kernel.config.timer_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = timer_cancel.cancelled() => break,
                _ = interval.tick() => {
                    timer_kernel.tick_timers().await;
                }
            }
        }
        log::info!("[TIMER] Timer loop stopped");
    });

    let heartbeat = tokio::spawn(async move {
        let mut interval = tokio::time::interval(kernel.config.waking_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => kernel.heartbeat(),
            }
        }
    });

    vec![timer_loop, heartbeat]
}

/// What a module can do with the kernel, scoped to that module's name
pub struct ModuleContext<'a> {
    kernel: &'a Kernel,
    module: &'a str,
}

impl<'a> ModuleContext<'a> {
    pub fn name(&self) -> &str {
        self.module
    }

    pub fn kernel(&self) -> &'a Kernel {
        self.kernel
    }

    pub fn account(&self) -> &UserRef {
        &self.kernel.account
    }

    pub fn master(&self) -> Option<&str> {
        self.kernel.config.master.as_deref()
    }

    pub fn now_ms(&self) -> i64 {
        self.kernel.now_ms()
    }

    /// Wait for a reply; the context hook later receives `data` unchanged
    pub fn subscribe_reply<T: Serialize + ?Sized>(
        &self,
        key: Option<&str>,
        scope: Scope,
        correlation_id: &str,
        data: &T,
    ) -> Result<ContextSubscription, KernelError> {
        let data = serde_json::to_value(data)?;
        Ok(self
            .kernel
            .contexts
            .subscribe(self.module, key, scope, correlation_id, data)?)
    }

    pub fn unsubscribe_reply(&self, key: Option<&str>) -> Result<usize, KernelError> {
        Ok(self.kernel.contexts.unsubscribe(self.module, key)?)
    }

    /// Call this module's timeout handler with `data` once `delay_ms` has passed,
    /// even across restarts. Returns the timer id.
    pub fn schedule_durable<T: Serialize + ?Sized>(
        &self,
        delay_ms: i64,
        data: &T,
    ) -> Result<String, KernelError> {
        let data = serde_json::to_value(data)?;
        Ok(self.kernel.timers.schedule(self.module, delay_ms, data)?.id)
    }

    pub fn cancel_timer(&self, id: &str) -> Result<bool, KernelError> {
        Ok(self.kernel.timers.cancel(id)?)
    }

    pub fn get_module_data(&self) -> Result<Value, KernelError> {
        Ok(self.kernel.db.get_or_create_module_record(self.module)?.data)
    }

    pub fn set_module_data(&self, data: Value) -> Result<(), KernelError> {
        Ok(self.kernel.db.save_module_data(self.module, data)?)
    }

    /// A module-owned collection, created on first access
    pub fn collection(&self, name: &str, indices: &[&str]) -> Result<Collection, KernelError> {
        Ok(self.kernel.db.collection(name, indices)?)
    }

    pub fn lookup_friend(&self, user_id: &str) -> Result<Option<Friend>, KernelError> {
        Ok(self.kernel.db.get_friend(user_id)?)
    }

    /// Store this module's sub-document on a user's relationship record
    pub fn set_friend_data(&self, user_id: &str, data: Value) -> Result<(), KernelError> {
        Ok(self
            .kernel
            .db
            .set_friend_module_data(user_id, self.module, data)?)
    }

    pub fn is_already_responded(&self, id: &str) -> bool {
        self.kernel.dedupe.contains(id)
    }

    pub fn mark_responded(&self, id: &str) {
        self.kernel.dedupe.check_and_mark(id);
    }

    pub async fn post(&self, params: Value) -> Result<Value, KernelError> {
        self.kernel.post(params).await
    }

    pub async fn send_direct_message(&self, user_id: &str, params: Value) -> Result<Value, KernelError> {
        self.kernel.send_direct_message(user_id, params).await
    }

    pub async fn call_platform_api(&self, endpoint: &str, params: Value) -> Result<Value, KernelError> {
        self.kernel.call_platform_api(endpoint, params).await
    }

    pub async fn reply(&self, msg: &Message, text: &str) -> Result<Value, KernelError> {
        log::debug!("[{}] replying to {}", self.module, msg.id);
        self.kernel.reply(msg, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Filter;
    use crate::testing::{self, Script, StubModule};
    use serde_json::json;

    #[test]
    fn test_install_creates_module_record() {
        let (kernel, _, _) = testing::kernel(vec![]);
        kernel
            .install(Arc::new(StubModule::new("fresh").with_hooks(Hooks::none().with_mention())))
            .unwrap();

        let records = kernel
            .db()
            .collection("moduleData", &[])
            .unwrap()
            .find(&Filter::all().eq("module", "fresh"))
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(kernel.runtime().installed(), vec!["fresh"]);
    }

    #[test]
    fn test_install_propagates_init_failure() {
        let (kernel, _, _) = testing::kernel(vec![]);
        let result = kernel.install(Arc::new(StubModule::new("broken").failing_init()));
        assert!(matches!(result, Err(KernelError::Hook { .. })));
        assert!(kernel.runtime().installed().is_empty());
        // No record is left behind for a module that never came up
        let records = kernel
            .db()
            .collection("moduleData", &[])
            .unwrap()
            .find(&Filter::all().eq("module", "broken"))
            .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_module_data_round_trip() {
        let (kernel, _, _) = testing::kernel(vec![]);
        let ctx = kernel.module_context("fortune");
        assert_eq!(ctx.get_module_data().unwrap(), json!({}));
        ctx.set_module_data(json!({"last": "2026-10-18"})).unwrap();
        assert_eq!(ctx.get_module_data().unwrap()["last"], "2026-10-18");
        // Another module's data is separate
        assert_eq!(kernel.module_context("dice").get_module_data().unwrap(), json!({}));
    }

    #[tokio::test]
    async fn test_timer_fires_once_with_original_payload() {
        let stub = Arc::new(StubModule::new("waiter").with_hooks(Hooks::none().with_timeout()));
        let (kernel, _, clock) = testing::kernel(vec![stub.clone()]);

        let payload = json!({"step": 2, "tags": ["a", "b"], "nested": {"x": null}});
        kernel
            .module_context("waiter")
            .schedule_durable(60_000, &payload)
            .unwrap();

        clock.advance(59_999);
        assert_eq!(kernel.tick_timers().await, 0);
        assert!(stub.timeouts().is_empty());

        clock.advance(1);
        assert_eq!(kernel.tick_timers().await, 1);
        assert_eq!(stub.timeouts(), vec![payload]);
        assert!(kernel.timers().pending().unwrap().is_empty());

        // The following tick must not fire it again
        clock.advance(60_000);
        assert_eq!(kernel.tick_timers().await, 0);
        assert_eq!(stub.timeouts().len(), 1);
    }

    #[tokio::test]
    async fn test_timer_for_unknown_module_is_dropped() {
        let (kernel, _, clock) = testing::kernel(vec![]);
        kernel.module_context("gone").schedule_durable(10, &json!(1)).unwrap();

        clock.advance(10);
        assert_eq!(kernel.tick_timers().await, 0);
        assert!(kernel.timers().pending().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failing_timeout_handler_does_not_stop_tick() {
        let bad = Arc::new(
            StubModule::new("bad")
                .with_hooks(Hooks::none().with_timeout())
                .timeout_script(Script::Panic),
        );
        let good = Arc::new(StubModule::new("good").with_hooks(Hooks::none().with_timeout()));
        let (kernel, _, clock) = testing::kernel(vec![bad.clone(), good.clone()]);

        kernel.module_context("bad").schedule_durable(0, &json!("b")).unwrap();
        kernel.module_context("good").schedule_durable(0, &json!("g")).unwrap();

        clock.advance(1);
        assert_eq!(kernel.tick_timers().await, 2);
        assert_eq!(good.timeouts(), vec![json!("g")]);
        // The faulty timer is gone too
        assert!(kernel.timers().pending().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_timer_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.db");
        let path = path.to_str().unwrap();
        let clock = Arc::new(ManualClock::new(1_000_000));

        {
            let db = Database::open(path).unwrap();
            let stub = Arc::new(StubModule::new("reminder").with_hooks(Hooks::none().with_timeout()));
            let kernel = testing::kernel_with(db, clock.clone(), vec![stub.clone()]).0;
            kernel
                .module_context("reminder")
                .schedule_durable(30_000, &json!({"id": "n1"}))
                .unwrap();
            assert!(stub.timeouts().is_empty());
        }

        // Fresh process image over the same file
        let db = Database::open(path).unwrap();
        let stub = Arc::new(StubModule::new("reminder").with_hooks(Hooks::none().with_timeout()));
        let kernel = testing::kernel_with(db, clock.clone(), vec![stub.clone()]).0;

        clock.advance(45_000);
        assert_eq!(kernel.tick_timers().await, 1);
        assert_eq!(kernel.tick_timers().await, 0);
        assert_eq!(stub.timeouts(), vec![json!({"id": "n1"})]);
    }

    #[test]
    fn test_last_slept_at_comes_from_previous_heartbeat() {
        let db = Database::in_memory();
        db.set_last_waking_at(12_345).unwrap();
        let clock = Arc::new(ManualClock::new(99_999));
        let (kernel, _) = testing::kernel_with(db, clock.clone(), vec![]);
        assert_eq!(kernel.last_slept_at(), 12_345);

        kernel.heartbeat();
        assert_eq!(kernel.db().get_or_create_meta(0).unwrap().last_waking_at, 99_999);
    }

    #[tokio::test]
    async fn test_send_direct_message_merges_recipient() {
        let (kernel, platform, _) = testing::kernel(vec![]);
        kernel
            .send_direct_message("u1", json!({"text": "hi"}))
            .await
            .unwrap();

        let calls = platform.calls_to("chat/messages/create-to-user");
        assert_eq!(calls, vec![json!({"text": "hi", "toUserId": "u1"})]);
        assert!(kernel.send_direct_message("u1", json!("bad")).await.is_err());
    }

    #[tokio::test]
    async fn test_post_unwraps_created_note() {
        let (kernel, platform, _) = testing::kernel(vec![]);
        let note = kernel.post(json!({"text": "hello"})).await.unwrap();
        assert!(note["id"].as_str().unwrap().starts_with("note-"));
        assert_eq!(platform.calls_to("notes/create").len(), 1);
    }

    #[tokio::test]
    async fn test_platform_errors_reach_the_caller() {
        let (kernel, platform, _) = testing::kernel(vec![]);
        platform.fail_with_status("notes/create", 400);
        let err = kernel.post(json!({"text": "x"})).await.unwrap_err();
        assert_eq!(err.status(), Some(400));
    }
}
