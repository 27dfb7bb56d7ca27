//! Client configuration.
//!
//! # Design
//! Every request carries the web service key and the service version, so both
//! live here next to the endpoint. `max_threads` only affects how `run_agent`
//! splits a run. Empty overrides fall back to the defaults, and zero threads
//! means "not configured".

use std::fmt;

use serde::Deserialize;

use crate::error::{ApiError, Result};

pub const DEFAULT_SERVICE: &str = "Mozenda10";
pub const DEFAULT_ENDPOINT: &str = "https://api.mozenda.com/rest";

pub const ENV_WEB_SERVICE_KEY: &str = "MOZENDA_WEB_SERVICE_KEY";
pub const ENV_SERVICE: &str = "MOZENDA_SERVICE";
pub const ENV_ENDPOINT: &str = "MOZENDA_ENDPOINT";
pub const ENV_MAX_THREADS: &str = "MOZENDA_MAX_THREADS";

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    pub web_service_key: String,
    #[serde(default = "default_service")]
    pub service: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub max_threads: Option<u32>,
}

fn default_service() -> String {
    DEFAULT_SERVICE.to_string()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

impl ClientConfig {
    pub fn new(web_service_key: impl Into<String>) -> Self {
        Self {
            web_service_key: web_service_key.into(),
            service: default_service(),
            endpoint: default_endpoint(),
            max_threads: None,
        }
    }

    pub fn with_service(mut self, service: &str) -> Self {
        if !service.is_empty() {
            self.service = service.to_string();
        }
        self
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        if !endpoint.is_empty() {
            self.endpoint = endpoint.to_string();
        }
        self
    }

    pub fn with_max_threads(mut self, max_threads: u32) -> Self {
        self.max_threads = Some(max_threads).filter(|n| *n > 0);
        self
    }

    /// Load from `MOZENDA_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let key = lookup(ENV_WEB_SERVICE_KEY)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ApiError::Config(format!("{ENV_WEB_SERVICE_KEY} is not set")))?;
        let mut config = Self::new(key)
            .with_service(&lookup(ENV_SERVICE).unwrap_or_default())
            .with_endpoint(&lookup(ENV_ENDPOINT).unwrap_or_default());
        if let Some(raw) = lookup(ENV_MAX_THREADS).filter(|v| !v.is_empty()) {
            let threads = raw
                .parse::<u32>()
                .map_err(|e| ApiError::Config(format!("{ENV_MAX_THREADS}={raw:?}: {e}")))?;
            config = config.with_max_threads(threads);
        }
        Ok(config)
    }

    /// Endpoint without a trailing slash.
    pub fn endpoint(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }

    /// Thread limit, with zero treated as unset.
    pub fn max_threads(&self) -> Option<u32> {
        self.max_threads.filter(|n| *n > 0)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("web_service_key", &"<redacted>")
            .field("service", &self.service)
            .field("endpoint", &self.endpoint)
            .field("max_threads", &self.max_threads)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_apply() {
        let config = ClientConfig::new("KEY");
        assert_eq!(config.service, "Mozenda10");
        assert_eq!(config.endpoint(), "https://api.mozenda.com/rest");
        assert_eq!(config.max_threads(), None);
    }

    #[test]
    fn empty_overrides_keep_defaults() {
        let config = ClientConfig::new("KEY")
            .with_service("")
            .with_endpoint("")
            .with_max_threads(0);
        assert_eq!(config.service, DEFAULT_SERVICE);
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.max_threads(), None);
    }

    #[test]
    fn endpoint_trailing_slash_is_stripped() {
        let config = ClientConfig::new("KEY").with_endpoint("http://localhost:3000/rest/");
        assert_eq!(config.endpoint(), "http://localhost:3000/rest");
    }

    #[test]
    fn from_env_reads_all_variables() {
        let config = ClientConfig::from_lookup(lookup(&[
            (ENV_WEB_SERVICE_KEY, "KEY"),
            (ENV_SERVICE, "Mozenda11"),
            (ENV_ENDPOINT, "http://localhost:3000/rest"),
            (ENV_MAX_THREADS, "4"),
        ]))
        .unwrap();
        assert_eq!(config.web_service_key, "KEY");
        assert_eq!(config.service, "Mozenda11");
        assert_eq!(config.endpoint(), "http://localhost:3000/rest");
        assert_eq!(config.max_threads(), Some(4));
    }

    #[test]
    fn from_env_requires_key() {
        let err = ClientConfig::from_lookup(lookup(&[(ENV_SERVICE, "Mozenda10")])).unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));
    }

    #[test]
    fn from_env_rejects_bad_thread_count() {
        let err = ClientConfig::from_lookup(lookup(&[
            (ENV_WEB_SERVICE_KEY, "KEY"),
            (ENV_MAX_THREADS, "many"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"web_service_key":"KEY","max_threads":3}"#).unwrap();
        assert_eq!(config.service, DEFAULT_SERVICE);
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.max_threads(), Some(3));
    }

    #[test]
    fn debug_hides_key() {
        let rendered = format!("{:?}", ClientConfig::new("SECRET-KEY"));
        assert!(!rendered.contains("SECRET-KEY"));
    }
}
