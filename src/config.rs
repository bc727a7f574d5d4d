use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::sync::controller::DEFAULT_RESPONSE_TIMEOUT;

pub const APP_NAME: &str = "chatsync";

const ENV_BACKEND: &str = "CHATSYNC_BACKEND";
const ENV_BASE_URL: &str = "CHATSYNC_BASE_URL";
const ENV_RESPONSE_TIMEOUT: &str = "CHATSYNC_RESPONSE_TIMEOUT_SECS";
const ENV_SIM_LATENCY: &str = "CHATSYNC_SIM_LATENCY_MS";
const ENV_SIM_REPLY_DELAY: &str = "CHATSYNC_SIM_REPLY_DELAY_MS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Live,
    Simulated,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Live => "live",
            Backend::Simulated => "simulated",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" | "http" => Some(Backend::Live),
            "simulated" | "mock" => Some(Backend::Simulated),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub backend: Backend,
    pub base_url: String,
    /// How long to wait for an assistant reply after a send is acknowledged.
    pub response_timeout_secs: u64,
    pub sim_latency_ms: u64,
    pub sim_reply_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: Backend::Simulated,
            base_url: "http://localhost:8080/api".to_string(),
            response_timeout_secs: DEFAULT_RESPONSE_TIMEOUT.as_secs(),
            sim_latency_ms: 300,
            sim_reply_delay_ms: 1500,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();

        if let Some(raw) = lookup(ENV_BACKEND) {
            settings.backend = Backend::from_str(&raw)
                .with_context(|| format!("Unknown backend in {}: {}", ENV_BACKEND, raw))?;
        }
        if let Some(raw) = lookup(ENV_BASE_URL) {
            settings.base_url = raw;
        }
        if let Some(raw) = lookup(ENV_RESPONSE_TIMEOUT) {
            settings.response_timeout_secs = parse_number(ENV_RESPONSE_TIMEOUT, &raw)?;
        }
        if let Some(raw) = lookup(ENV_SIM_LATENCY) {
            settings.sim_latency_ms = parse_number(ENV_SIM_LATENCY, &raw)?;
        }
        if let Some(raw) = lookup(ENV_SIM_REPLY_DELAY) {
            settings.sim_reply_delay_ms = parse_number(ENV_SIM_REPLY_DELAY, &raw)?;
        }

        if settings.backend == Backend::Live {
            settings.base_url()?;
        }
        Ok(settings)
    }

    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.base_url).with_context(|| format!("Invalid base URL: {}", self.base_url))
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    pub fn sim_latency(&self) -> Duration {
        Duration::from_millis(self.sim_latency_ms)
    }

    pub fn sim_reply_delay(&self) -> Duration {
        Duration::from_millis(self.sim_reply_delay_ms)
    }
}

fn parse_number(key: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .with_context(|| format!("{} must be a non-negative integer, got {:?}", key, raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.backend, Backend::Simulated);
        assert_eq!(settings.response_timeout(), Duration::from_secs(10));
        assert_eq!(settings.base_url().unwrap().as_str(), "http://localhost:8080/api");
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            ("CHATSYNC_BACKEND", "live"),
            ("CHATSYNC_BASE_URL", "https://chat.example.com/api"),
            ("CHATSYNC_RESPONSE_TIMEOUT_SECS", "3"),
        ]))
        .unwrap();
        assert_eq!(settings.backend, Backend::Live);
        assert_eq!(settings.response_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Settings::from_lookup(lookup(&[("CHATSYNC_BACKEND", "carrier-pigeon")])).is_err());
        assert!(Settings::from_lookup(lookup(&[("CHATSYNC_SIM_LATENCY_MS", "-5")])).is_err());
        assert!(Settings::from_lookup(lookup(&[
            ("CHATSYNC_BACKEND", "live"),
            ("CHATSYNC_BASE_URL", "not a url"),
        ]))
        .is_err());
    }
}
