use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use jsonschema::{validator_for, Validator};
use once_cell::sync::Lazy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::host::Origin;
use crate::profile::{ApiProfile, ProfileName, ProfileOverrides};

pub const DEFAULT_CONFIG_PATH: &str = "configs/dashlink.toml";
pub const DEFAULT_ENGINE: &str = "http://127.0.0.1:9999";
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 9090;
pub const DEFAULT_CONCURRENCY: usize = 1024;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the dashboard-facing listener binds to.
    #[serde(default)]
    pub bind: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    /// Maximum in-flight dashboard requests.
    #[serde(default)]
    pub concurrency_limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Engine origin, e.g. <http://127.0.0.1:9999>
    #[serde(default)]
    pub base_url: Option<String>,
    /// Engine API profile: "indexed" or "named" (default).
    #[serde(default)]
    pub profile: Option<ProfileName>,
    /// Rule label shown for every connection.
    #[serde(default)]
    pub rule_label: Option<String>,
    /// Snapshot interval for polled connection feeds.
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    /// Timeout for one-shot engine calls.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub overrides: ProfileOverrides,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

static CONFIG_SCHEMA: Lazy<Validator> = Lazy::new(|| {
    let schema = schemars::schema_for!(Config);
    let schema_value = serde_json::to_value(&schema).expect("schema value");
    validator_for(&schema_value).expect("valid schema")
});

/// Returns the JSON schema describing the configuration file.
pub fn config_schema_json() -> serde_json::Value {
    let schema = schemars::schema_for!(Config);
    serde_json::to_value(&schema).unwrap_or_default()
}

pub fn parse_config(content: &str) -> Result<Config> {
    let raw: toml::Value = toml::from_str(content)?;
    let json_value = serde_json::to_value(&raw)?;
    let validation_errors: Vec<_> = CONFIG_SCHEMA
        .iter_errors(&json_value)
        .map(|e| e.to_string())
        .collect();
    if !validation_errors.is_empty() {
        return Err(anyhow::anyhow!(validation_errors.join(", ")));
    }
    let cfg: Config = toml::from_str(content)?;
    Ok(cfg)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    parse_config(&content).with_context(|| format!("invalid config {}", path.display()))
}

/// `DASHLINK_CONFIG` if set, else the default path when it exists.
pub fn discover_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("DASHLINK_CONFIG") {
        let path = path.trim();
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    let fallback = PathBuf::from(DEFAULT_CONFIG_PATH);
    fallback.exists().then_some(fallback)
}

/// Discovered config file (or defaults) with environment overrides applied.
pub fn load_effective() -> Result<Config> {
    let mut cfg = match discover_config_path() {
        Some(path) => load_config(&path)?,
        None => Config::default(),
    };
    cfg.apply_env_from(|key| std::env::var(key).ok())?;
    Ok(cfg)
}

impl Config {
    /// Overlay `DASHLINK_ENGINE`, `DASHLINK_PROFILE`, `DASHLINK_BIND` and
    /// `DASHLINK_PORT` as returned by `lookup`.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        if let Some(engine) = read("DASHLINK_ENGINE") {
            self.engine.base_url = Some(engine);
        }
        if let Some(profile) = read("DASHLINK_PROFILE") {
            let name = profile
                .parse::<ProfileName>()
                .map_err(|err| anyhow::anyhow!("DASHLINK_PROFILE: {err}"))?;
            self.engine.profile = Some(name);
        }
        if let Some(bind) = read("DASHLINK_BIND") {
            self.server.bind = Some(bind);
        }
        if let Some(port) = read("DASHLINK_PORT") {
            let port = port
                .parse::<u16>()
                .with_context(|| format!("DASHLINK_PORT={port}"))?;
            self.server.port = Some(port);
        }
        Ok(())
    }

    pub fn engine_origin(&self) -> Result<Origin> {
        let raw = self.engine.base_url.as_deref().unwrap_or(DEFAULT_ENGINE);
        Origin::parse(raw).with_context(|| format!("engine base_url {raw}"))
    }

    pub fn profile(&self) -> ApiProfile {
        let mut profile = ApiProfile::preset(self.engine.profile.unwrap_or(ProfileName::Named))
            .with_overrides(&self.engine.overrides);
        if let Some(label) = &self.engine.rule_label {
            profile = profile.with_rule_label(label.clone());
        }
        if let Some(ms) = self.engine.poll_interval_ms {
            profile = profile.with_poll_interval(Duration::from_millis(ms));
        }
        profile
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS).max(1))
    }

    pub fn bind_addr(&self) -> String {
        format!(
            "{}:{}",
            self.server.bind.as_deref().unwrap_or(DEFAULT_BIND),
            self.server.port.unwrap_or(DEFAULT_PORT)
        )
    }

    pub fn concurrency_limit(&self) -> usize {
        self.server
            .concurrency_limit
            .unwrap_or(DEFAULT_CONCURRENCY)
            .max(1)
    }
}
