//! Error types shared across the kernel
//!
//! `StoreError` covers the document store. `KernelError` is what hooks, the
//! platform client and the boot sequence return. The dispatcher and the timer
//! tick never propagate a `KernelError` out of a hook; they log it and degrade
//! to "no effect".

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("malformed document: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("invalid identifier `{0}` (only ASCII letters, digits and `_` are allowed)")]
    InvalidIdentifier(String),

    #[error("documents must be JSON objects (collection `{0}`)")]
    NotAnObject(String),

    #[error("document {id} not found in `{collection}`")]
    NotFound { collection: String, id: i64 },
}

#[derive(Debug, Error)]
pub enum KernelError {
    /// The platform could not be reached (timeout, connection reset, ...)
    #[error("network error calling {endpoint}: {message}")]
    Network { endpoint: String, message: String },

    /// The platform answered with a non-success status
    #[error("{endpoint} returned {status}: {body}")]
    Api {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// A module hook failed or panicked
    #[error("hook fault in module `{module}`: {message}")]
    Hook { module: String, message: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("startup failed: {0}")]
    Startup(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid request parameters: {0}")]
    InvalidParams(String),

    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl KernelError {
    /// Shorthand for a module-level failure
    pub fn hook(module: impl Into<String>, message: impl Into<String>) -> Self {
        KernelError::Hook {
            module: module.into(),
            message: message.into(),
        }
    }

    /// HTTP status if the platform rejected the call
    pub fn status(&self) -> Option<u16> {
        match self {
            KernelError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            KernelError::Network { .. } => true,
            KernelError::Api { status, .. } => matches!(*status, 429 | 502 | 503 | 504),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_only_for_api_errors() {
        let api = KernelError::Api {
            endpoint: "notes/create".to_string(),
            status: 400,
            body: "NO_SUCH_NOTE".to_string(),
        };
        assert_eq!(api.status(), Some(400));
        assert!(!api.is_transient());

        let net = KernelError::Network {
            endpoint: "notes/create".to_string(),
            message: "timed out".to_string(),
        };
        assert_eq!(net.status(), None);
        assert!(net.is_transient());
    }

    #[test]
    fn test_store_error_converts() {
        let err: KernelError = StoreError::NotAnObject("timers".to_string()).into();
        assert!(matches!(err, KernelError::Store(_)));
        assert!(err.to_string().contains("timers"));
    }
}
