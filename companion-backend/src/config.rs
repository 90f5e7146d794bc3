use crate::error::KernelError;
use std::env;
use std::time::Duration;
use url::Url;

#[derive(Clone, Debug)]
pub struct Config {
    /// Instance base URL, e.g. `https://misskey.example`
    pub host: String,
    /// API token of the bot account
    pub token: String,
    pub database_url: String,
    /// Admin account allowed to issue privileged module commands
    pub master: Option<String>,
    pub thinking_delay_ms: u64,
    pub timer_interval_ms: u64,
    pub waking_interval_secs: u64,
    pub dedupe_capacity: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, KernelError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from any key lookup (the process environment in production)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, KernelError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("MISSKEY_HOST")
            .ok_or_else(|| KernelError::Config("MISSKEY_HOST must be set".to_string()))?;
        let host = host.trim_end_matches('/').to_string();
        Url::parse(&host)
            .map_err(|e| KernelError::Config(format!("MISSKEY_HOST is not a valid URL: {}", e)))?;

        let token = lookup("MISSKEY_TOKEN")
            .ok_or_else(|| KernelError::Config("MISSKEY_TOKEN must be set".to_string()))?;

        Ok(Self {
            host,
            token,
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| "./.db/memory.db".to_string()),
            master: lookup("MASTER").filter(|m| !m.is_empty()),
            thinking_delay_ms: parse_or(&lookup, "THINKING_DELAY_MS", 1000)?,
            timer_interval_ms: parse_or(&lookup, "TIMER_INTERVAL_MS", 1000)?,
            waking_interval_secs: parse_or(&lookup, "WAKING_INTERVAL_SECS", 10)?,
            dedupe_capacity: parse_or(&lookup, "DEDUPE_CAPACITY", 4096)?,
        })
    }

    pub fn api_url(&self) -> String {
        format!("{}/api", self.host)
    }

    /// Bare host name (no scheme or port) used in fully qualified mentions
    pub fn host_name(&self) -> String {
        Url::parse(&self.host)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_default()
    }

    pub fn thinking_delay(&self) -> Duration {
        Duration::from_millis(self.thinking_delay_ms)
    }

    pub fn timer_interval(&self) -> Duration {
        Duration::from_millis(self.timer_interval_ms.max(1))
    }

    pub fn waking_interval(&self) -> Duration {
        Duration::from_secs(self.waking_interval_secs.max(1))
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, KernelError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| KernelError::Config(format!("{} must be a valid number", key))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&[
            ("MISSKEY_HOST", "https://misskey.example/"),
            ("MISSKEY_TOKEN", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.host, "https://misskey.example");
        assert_eq!(config.api_url(), "https://misskey.example/api");
        assert_eq!(config.host_name(), "misskey.example");
        assert_eq!(config.database_url, "./.db/memory.db");
        assert_eq!(config.thinking_delay_ms, 1000);
        assert_eq!(config.timer_interval_ms, 1000);
        assert_eq!(config.dedupe_capacity, 4096);
        assert!(config.master.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("MISSKEY_HOST", "http://localhost:3000"),
            ("MISSKEY_TOKEN", "secret"),
            ("THINKING_DELAY_MS", "0"),
            ("MASTER", "admin"),
        ]))
        .unwrap();

        assert_eq!(config.host_name(), "localhost");
        assert_eq!(config.thinking_delay(), Duration::ZERO);
        assert_eq!(config.master.as_deref(), Some("admin"));
    }

    #[test]
    fn test_missing_required_keys() {
        let err = Config::from_lookup(lookup_from(&[("MISSKEY_TOKEN", "secret")])).unwrap_err();
        assert!(err.to_string().contains("MISSKEY_HOST"));

        let err = Config::from_lookup(lookup_from(&[("MISSKEY_HOST", "https://a.example")]))
            .unwrap_err();
        assert!(err.to_string().contains("MISSKEY_TOKEN"));
    }

    #[test]
    fn test_invalid_number() {
        let err = Config::from_lookup(lookup_from(&[
            ("MISSKEY_HOST", "https://a.example"),
            ("MISSKEY_TOKEN", "secret"),
            ("TIMER_INTERVAL_MS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, KernelError::Config(_)));
    }
}
