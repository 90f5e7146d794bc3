//! Test doubles shared by the unit tests

use crate::channels::{ChatMessage, Message, Note};
use crate::db::Database;
use crate::error::KernelError;
use crate::kernel::{HookResult, Hooks, Kernel, KernelConfig, ManualClock, Module, ModuleContext};
use crate::models::UserRef;
use crate::platform::PlatformApi;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Start of virtual time for test kernels
pub const EPOCH_MS: i64 = 1_700_000_000_000;

/// Records every call; answers `notes/create` with a created note
#[derive(Default)]
pub struct RecordingPlatform {
    calls: Mutex<Vec<(String, Value)>>,
    failures: Mutex<HashMap<String, u16>>,
    responses: Mutex<HashMap<String, Value>>,
    notes: AtomicUsize,
}

impl RecordingPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, endpoint: &str) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter(|(e, _)| e == endpoint)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn fail_with_status(&self, endpoint: &str, status: u16) {
        self.failures.lock().insert(endpoint.to_string(), status);
    }

    pub fn respond_with(&self, endpoint: &str, response: Value) {
        self.responses.lock().insert(endpoint.to_string(), response);
    }
}

#[async_trait]
impl PlatformApi for RecordingPlatform {
    async fn call(&self, endpoint: &str, params: Value) -> Result<Value, KernelError> {
        self.calls.lock().push((endpoint.to_string(), params.clone()));

        if let Some(status) = self.failures.lock().get(endpoint).copied() {
            return Err(KernelError::Api {
                endpoint: endpoint.to_string(),
                status,
                body: "{}".to_string(),
            });
        }
        if let Some(response) = self.responses.lock().get(endpoint).cloned() {
            return Ok(response);
        }
        if endpoint == "notes/create" {
            let n = self.notes.fetch_add(1, Ordering::SeqCst) + 1;
            return Ok(json!({
                "createdNote": { "id": format!("note-{}", n), "text": params.get("text") }
            }));
        }
        Ok(json!({}))
    }
}

/// What a stub hook does when called
#[derive(Debug, Clone)]
pub enum Script {
    Return(HookResult),
    Fail,
    Panic,
}

impl Script {
    fn run(&self, module: &str) -> Result<HookResult, KernelError> {
        match self {
            Script::Return(result) => Ok(result.clone()),
            Script::Fail => Err(KernelError::hook(module, "scripted failure")),
            Script::Panic => panic!("scripted panic in {}", module),
        }
    }
}

/// Module whose hooks follow a script and record how they were called
pub struct StubModule {
    name: &'static str,
    hooks: Hooks,
    mention: Script,
    context: Script,
    timeout: Script,
    init_fails: bool,
    mention_calls: AtomicUsize,
    last_text: Mutex<Option<String>>,
    context_calls: Mutex<Vec<(Option<String>, String, Value)>>,
    timeouts: Mutex<Vec<Value>>,
}

impl StubModule {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            hooks: Hooks::none().with_mention().with_context().with_timeout(),
            mention: Script::Return(HookResult::Pass),
            context: Script::Return(HookResult::Pass),
            timeout: Script::Return(HookResult::Pass),
            init_fails: false,
            mention_calls: AtomicUsize::new(0),
            last_text: Mutex::new(None),
            context_calls: Mutex::new(Vec::new()),
            timeouts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn mention_script(mut self, script: Script) -> Self {
        self.mention = script;
        self
    }

    pub fn context_script(mut self, script: Script) -> Self {
        self.context = script;
        self
    }

    pub fn timeout_script(mut self, script: Script) -> Self {
        self.timeout = script;
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.init_fails = true;
        self
    }

    pub fn mention_calls(&self) -> usize {
        self.mention_calls.load(Ordering::SeqCst)
    }

    pub fn last_text(&self) -> Option<String> {
        self.last_text.lock().clone()
    }

    /// (key, message text, data) per context hook call
    pub fn context_calls(&self) -> Vec<(Option<String>, String, Value)> {
        self.context_calls.lock().clone()
    }

    pub fn timeouts(&self) -> Vec<Value> {
        self.timeouts.lock().clone()
    }
}

#[async_trait]
impl Module for StubModule {
    fn name(&self) -> &'static str {
        self.name
    }

    fn init(&self, _ctx: &ModuleContext<'_>) -> Result<(), KernelError> {
        if self.init_fails {
            return Err(KernelError::hook(self.name, "init failed"));
        }
        Ok(())
    }

    fn install(&self) -> Hooks {
        self.hooks
    }

    async fn mention_hook(
        &self,
        _ctx: &ModuleContext<'_>,
        msg: &Message,
    ) -> Result<HookResult, KernelError> {
        self.mention_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_text.lock() = msg.text.clone();
        self.mention.run(self.name)
    }

    async fn context_hook(
        &self,
        _ctx: &ModuleContext<'_>,
        key: Option<&str>,
        msg: &Message,
        data: Value,
    ) -> Result<HookResult, KernelError> {
        self.context_calls.lock().push((
            key.map(|k| k.to_string()),
            msg.text().to_string(),
            data,
        ));
        self.context.run(self.name)
    }

    async fn timeout_handler(&self, _ctx: &ModuleContext<'_>, data: Value) -> Result<(), KernelError> {
        self.timeouts.lock().push(data);
        self.timeout.run(self.name).map(|_| ())
    }
}

pub fn account() -> UserRef {
    UserRef {
        id: "bot".to_string(),
        username: "ai".to_string(),
        is_bot: true,
        ..Default::default()
    }
}

pub fn user(id: &str, username: &str) -> UserRef {
    UserRef {
        id: id.to_string(),
        username: username.to_string(),
        ..Default::default()
    }
}

pub fn note(id: &str, author: &UserRef, text: &str) -> Note {
    Note {
        id: id.to_string(),
        user_id: author.id.clone(),
        user: author.clone(),
        text: Some(text.to_string()),
        visibility: Some("public".to_string()),
        ..Default::default()
    }
}

pub fn chat(id: &str, author: &UserRef, text: &str) -> ChatMessage {
    ChatMessage {
        id: id.to_string(),
        from_user_id: author.id.clone(),
        from_user: Some(author.clone()),
        text: Some(text.to_string()),
    }
}

pub fn kernel_config() -> KernelConfig {
    KernelConfig {
        thinking_delay: Duration::ZERO,
        ..KernelConfig::new("misskey.example")
    }
}

/// Kernel over an in-memory store and a manual clock, with `stubs` installed in order
pub fn kernel(stubs: Vec<Arc<StubModule>>) -> (Arc<Kernel>, Arc<RecordingPlatform>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(EPOCH_MS));
    let (kernel, platform) = kernel_with(Database::in_memory(), clock.clone(), stubs);
    (kernel, platform, clock)
}

pub fn kernel_with(
    db: Database,
    clock: Arc<ManualClock>,
    stubs: Vec<Arc<StubModule>>,
) -> (Arc<Kernel>, Arc<RecordingPlatform>) {
    kernel_configured(kernel_config(), db, clock, stubs)
}

pub fn kernel_configured(
    config: KernelConfig,
    db: Database,
    clock: Arc<ManualClock>,
    stubs: Vec<Arc<StubModule>>,
) -> (Arc<Kernel>, Arc<RecordingPlatform>) {
    let platform = Arc::new(RecordingPlatform::new());
    let kernel = Kernel::new(account(), config, db, platform.clone(), clock).unwrap();
    for stub in stubs {
        kernel.install(stub).unwrap();
    }
    (Arc::new(kernel), platform)
}
