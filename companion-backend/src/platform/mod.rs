//! Access to the host platform's REST API

pub mod misskey;

pub use misskey::MisskeyApi;

use crate::error::KernelError;
use async_trait::async_trait;
use serde_json::Value;

/// One authenticated API call: POST `endpoint` with a JSON object, get JSON back
#[async_trait]
pub trait PlatformApi: Send + Sync {
    async fn call(&self, endpoint: &str, params: Value) -> Result<Value, KernelError>;
}
