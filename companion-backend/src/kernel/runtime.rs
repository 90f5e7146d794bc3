//! Module contract and the registry of installed hooks
//!
//! Mention hooks run in install order and the first one that handles a
//! message wins, so install order is the priority ranking. Context hooks and
//! timeout handlers occupy one slot per module name; installing a module with
//! the same name again replaces them.

use crate::channels::Message;
use crate::error::KernelError;
use crate::kernel::ModuleContext;
use async_trait::async_trait;
use futures_util::FutureExt;
use parking_lot::RwLock;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Reaction and pacing requested by a hook
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerResult {
    /// Reaction name; `None` keeps the dispatcher's default
    pub reaction: Option<String>,
    /// Skip the artificial thinking delay
    pub immediate: bool,
}

/// What a mention or context hook decided
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookResult {
    /// Not handled. For a mention hook the next module is tried; for a context
    /// hook the message falls through to the mention chain.
    Pass,
    /// Handled. A matched subscription stays in place.
    Handled(HandlerResult),
    /// Handled and the conversation is over: the kernel drops the matched
    /// subscription. Behaves like `Handled` for mention hooks.
    Done(HandlerResult),
}

impl HookResult {
    pub fn handled() -> Self {
        HookResult::Handled(HandlerResult::default())
    }

    pub fn done() -> Self {
        HookResult::Done(HandlerResult::default())
    }

    pub fn react(reaction: impl Into<String>) -> Self {
        HookResult::Handled(HandlerResult {
            reaction: Some(reaction.into()),
            immediate: false,
        })
    }

    /// Same result, without the thinking delay
    pub fn immediate(self) -> Self {
        match self {
            HookResult::Pass => HookResult::Pass,
            HookResult::Handled(r) => HookResult::Handled(HandlerResult { immediate: true, ..r }),
            HookResult::Done(r) => HookResult::Done(HandlerResult { immediate: true, ..r }),
        }
    }

    /// Finish the conversation with this result
    pub fn finish(self) -> Self {
        match self {
            HookResult::Handled(r) => HookResult::Done(r),
            other => other,
        }
    }

    pub fn outcome(&self) -> Option<&HandlerResult> {
        match self {
            HookResult::Pass => None,
            HookResult::Handled(r) | HookResult::Done(r) => Some(r),
        }
    }
}

impl From<bool> for HookResult {
    fn from(handled: bool) -> Self {
        if handled {
            HookResult::handled()
        } else {
            HookResult::Pass
        }
    }
}

/// Which hooks a module contributes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Hooks {
    pub mention: bool,
    pub context: bool,
    pub timeout: bool,
}

impl Hooks {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_mention(mut self) -> Self {
        self.mention = true;
        self
    }

    pub fn with_context(mut self) -> Self {
        self.context = true;
        self
    }

    pub fn with_timeout(mut self) -> Self {
        self.timeout = true;
        self
    }
}

/// A pluggable conversational feature.
///
/// `init` runs once at install time (after the module's data record exists)
/// and `install` declares which hooks the kernel should route to. The kernel
/// handle is passed into every hook call; modules never hold on to it.
#[async_trait]
pub trait Module: Send + Sync {
    fn name(&self) -> &'static str;

    fn init(&self, _ctx: &ModuleContext<'_>) -> Result<(), KernelError> {
        Ok(())
    }

    fn install(&self) -> Hooks;

    /// A fresh message addressed to the bot
    async fn mention_hook(
        &self,
        _ctx: &ModuleContext<'_>,
        _msg: &Message,
    ) -> Result<HookResult, KernelError> {
        Ok(HookResult::Pass)
    }

    /// A message continuing a conversation this module subscribed to
    async fn context_hook(
        &self,
        _ctx: &ModuleContext<'_>,
        _key: Option<&str>,
        _msg: &Message,
        _data: Value,
    ) -> Result<HookResult, KernelError> {
        Ok(HookResult::Pass)
    }

    /// A persisted timer scheduled by this module came due
    async fn timeout_handler(&self, _ctx: &ModuleContext<'_>, _data: Value) -> Result<(), KernelError> {
        Ok(())
    }
}

#[derive(Default)]
struct Registry {
    installed: Vec<&'static str>,
    mention_hooks: Vec<Arc<dyn Module>>,
    context_hooks: HashMap<String, Arc<dyn Module>>,
    timeout_handlers: HashMap<String, Arc<dyn Module>>,
}

/// Installed modules and their hook slots
#[derive(Default)]
pub struct ModuleRuntime {
    registry: RwLock<Registry>,
}

impl ModuleRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, module: Arc<dyn Module>, hooks: Hooks) {
        let mut registry = self.registry.write();
        let name = module.name();

        if !registry.installed.contains(&name) {
            registry.installed.push(name);
        }
        if hooks.mention {
            registry.mention_hooks.push(module.clone());
        }
        if hooks.context {
            registry.context_hooks.insert(name.to_string(), module.clone());
        }
        if hooks.timeout {
            registry.timeout_handlers.insert(name.to_string(), module);
        }
    }

    /// Mention hooks in priority order
    pub fn mention_chain(&self) -> Vec<Arc<dyn Module>> {
        self.registry.read().mention_hooks.clone()
    }

    pub fn context_hook(&self, module: &str) -> Option<Arc<dyn Module>> {
        self.registry.read().context_hooks.get(module).cloned()
    }

    pub fn timeout_handler(&self, module: &str) -> Option<Arc<dyn Module>> {
        self.registry.read().timeout_handlers.get(module).cloned()
    }

    pub fn installed(&self) -> Vec<&'static str> {
        self.registry.read().installed.clone()
    }
}

/// Run a hook future, turning a panic into a `KernelError::Hook`
pub(crate) async fn guarded<T, F>(module: &str, hook: F) -> Result<T, KernelError>
where
    F: Future<Output = Result<T, KernelError>>,
{
    match AssertUnwindSafe(hook).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(KernelError::hook(module, panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
