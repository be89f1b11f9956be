//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.mission-control/config.json`) and environment.
//! `OPENCLAW_GATEWAY_URL` and `OPENCLAW_GATEWAY_TOKEN` override the file when set.

use crate::gateway::{
    ClientSettings, ReconnectPolicy, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_MAX_RECONNECT_DELAY,
    DEFAULT_RECONNECT_INTERVAL,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const GATEWAY_URL_ENV: &str = "OPENCLAW_GATEWAY_URL";
pub const GATEWAY_TOKEN_ENV: &str = "OPENCLAW_GATEWAY_TOKEN";
pub const CONFIG_PATH_ENV: &str = "MISSION_CONTROL_CONFIG_PATH";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway connection settings.
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Gateway url, auth, and reconnect settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// WebSocket url (default "ws://127.0.0.1:18789").
    #[serde(default = "default_gateway_url")]
    pub url: String,

    /// Bearer token presented at connect. Overridden by OPENCLAW_GATEWAY_TOKEN env.
    pub token: Option<String>,

    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

/// Reconnect backoff: delay = intervalMs × attempt, capped at maxDelayMs, for at most maxAttempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_gateway_url() -> String {
    "ws://127.0.0.1:18789".to_string()
}

fn default_interval_ms() -> u64 {
    DEFAULT_RECONNECT_INTERVAL.as_millis() as u64
}

fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_RECONNECT_DELAY.as_millis() as u64
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_RECONNECT_ATTEMPTS
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            token: None,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl From<ReconnectConfig> for ReconnectPolicy {
    fn from(c: ReconnectConfig) -> Self {
        Self {
            interval: Duration::from_millis(c.interval_ms),
            max_delay: Duration::from_millis(c.max_delay_ms),
            max_attempts: c.max_attempts,
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Resolve the gateway url: env OPENCLAW_GATEWAY_URL overrides config.
pub fn resolve_gateway_url(config: &Config) -> String {
    resolve_gateway_url_from(config, env_var)
}

/// Resolve the gateway token: env OPENCLAW_GATEWAY_TOKEN overrides config. Empty when unset.
pub fn resolve_gateway_token(config: &Config) -> String {
    resolve_gateway_token_from(config, env_var)
}

fn resolve_gateway_url_from(config: &Config, env: impl Fn(&str) -> Option<String>) -> String {
    env(GATEWAY_URL_ENV)
        .and_then(|s| non_empty(&s))
        .or_else(|| non_empty(&config.gateway.url))
        .unwrap_or_else(default_gateway_url)
}

fn resolve_gateway_token_from(config: &Config, env: impl Fn(&str) -> Option<String>) -> String {
    env(GATEWAY_TOKEN_ENV)
        .and_then(|s| non_empty(&s))
        .or_else(|| config.gateway.token.as_deref().and_then(non_empty))
        .unwrap_or_default()
}

/// Build client settings from config plus environment overrides.
pub fn client_settings(config: &Config) -> ClientSettings {
    ClientSettings {
        url: resolve_gateway_url(config),
        token: resolve_gateway_token(config),
        reconnect: config.gateway.reconnect.into(),
    }
}

/// Mask a token for display, keeping only the last four characters.
pub fn redact_token(token: &str) -> String {
    if token.is_empty() {
        return "(none)".to_string();
    }
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var(CONFIG_PATH_ENV).map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".mission-control").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the default path (or MISSION_CONTROL_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn default_gateway_url_and_reconnect() {
        let g = GatewayConfig::default();
        assert_eq!(g.url, "ws://127.0.0.1:18789");
        assert!(g.token.is_none());
        let policy: ReconnectPolicy = g.reconnect.into();
        assert_eq!(policy, ReconnectPolicy::default());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"gateway":{"token":"abc","reconnect":{"maxAttempts":3}}}"#).unwrap();
        assert_eq!(config.gateway.url, "ws://127.0.0.1:18789");
        assert_eq!(config.gateway.reconnect.max_attempts, 3);
        assert_eq!(config.gateway.reconnect.interval_ms, 5000);
        assert_eq!(resolve_gateway_token_from(&config, no_env), "abc");
    }

    #[test]
    fn env_overrides_config() {
        let mut config = Config::default();
        config.gateway.url = "ws://gateway.lan:18789".to_string();
        config.gateway.token = Some("from-file".to_string());
        let env = |k: &str| match k {
            GATEWAY_URL_ENV => Some("ws://10.0.0.5:18789".to_string()),
            GATEWAY_TOKEN_ENV => Some("  from-env ".to_string()),
            _ => None,
        };
        assert_eq!(resolve_gateway_url_from(&config, env), "ws://10.0.0.5:18789");
        assert_eq!(resolve_gateway_token_from(&config, env), "from-env");
        assert_eq!(resolve_gateway_url_from(&config, no_env), "ws://gateway.lan:18789");
    }

    #[test]
    fn blank_values_fall_back() {
        let mut config = Config::default();
        config.gateway.url = "  ".to_string();
        config.gateway.token = Some(" ".to_string());
        let env = |k: &str| (k == GATEWAY_TOKEN_ENV).then(String::new);
        assert_eq!(resolve_gateway_url_from(&config, env), "ws://127.0.0.1:18789");
        assert_eq!(resolve_gateway_token_from(&config, env), "");
    }

    #[test]
    fn load_config_missing_file_is_default() {
        let path = std::env::temp_dir().join("mission-control-missing-config.json");
        let (config, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(config.gateway.url, "ws://127.0.0.1:18789");
    }

    #[test]
    fn redact_token_keeps_tail() {
        assert_eq!(redact_token(""), "(none)");
        assert_eq!(redact_token("abc"), "****");
        assert_eq!(redact_token("secret-1234"), "****1234");
    }
}
