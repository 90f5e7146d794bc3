use super::PlatformApi;
use crate::config::Config;
use crate::error::KernelError;
use crate::models::UserRef;
use async_trait::async_trait;
use reqwest::{header, Client};
use serde_json::{Map, Value};
use std::time::Duration;

/// Attempts made to resolve the bot account at boot
const ACCOUNT_FETCH_ATTEMPTS: u32 = 3;
const ACCOUNT_FETCH_BACKOFF_MS: u64 = 1000;

#[derive(Clone)]
pub struct MisskeyApi {
    client: Client,
    api_url: String,
    token: String,
}

impl MisskeyApi {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Result<Self, KernelError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| KernelError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, KernelError> {
        Self::new(config.api_url(), config.token.clone())
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.api_url, endpoint.trim_start_matches('/'))
    }

    /// Request body: the caller's params with the token merged in as `i`
    fn build_body(&self, endpoint: &str, params: Value) -> Result<Value, KernelError> {
        let mut body = match params {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(KernelError::InvalidParams(format!(
                    "{} expects an object, got {}",
                    endpoint, other
                )));
            }
        };
        body.insert("i".to_string(), Value::String(self.token.clone()));
        Ok(Value::Object(body))
    }

    /// The account the token belongs to
    pub async fn fetch_account(&self) -> Result<UserRef, KernelError> {
        let me = self.call("i", Value::Null).await?;
        Ok(serde_json::from_value(me)?)
    }

    /// Resolve the bot account, retrying with exponential backoff.
    /// Giving up is a startup failure.
    pub async fn fetch_account_with_retry(&self) -> Result<UserRef, KernelError> {
        let mut delay = Duration::from_millis(ACCOUNT_FETCH_BACKOFF_MS);
        let mut last_error = String::new();

        for attempt in 1..=ACCOUNT_FETCH_ATTEMPTS {
            match self.fetch_account().await {
                Ok(account) => return Ok(account),
                Err(e) => {
                    log::warn!(
                        "Failed to fetch account (attempt {}/{}): {}",
                        attempt,
                        ACCOUNT_FETCH_ATTEMPTS,
                        e
                    );
                    last_error = e.to_string();
                }
            }
            if attempt < ACCOUNT_FETCH_ATTEMPTS {
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }

        Err(KernelError::Startup(format!(
            "could not resolve the bot account: {}",
            last_error
        )))
    }
}

#[async_trait]
impl PlatformApi for MisskeyApi {
    async fn call(&self, endpoint: &str, params: Value) -> Result<Value, KernelError> {
        let body = self.build_body(endpoint, params)?;

        let response = self
            .client
            .post(self.endpoint_url(endpoint))
            .json(&body)
            .send()
            .await
            .map_err(|e| KernelError::Network {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| KernelError::Network {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(KernelError::Api {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }

        // 204 and friends
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}
