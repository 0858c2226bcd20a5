//! Configuration loading and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Top-level Inkroom configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rooms: Option<RoomsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    /// Allowed CORS origins. `"*"` allows any origin.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Largest WebSocket frame accepted from a client, in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_message_bytes: Option<usize>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: None,
            cors_origins: default_cors_origins(),
            max_message_bytes: None,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".into()]
}

pub const DEFAULT_PORT: u16 = 8001;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1_048_576;
pub const DEFAULT_MAX_REPLAY_EVENTS: usize = 10_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoomsConfig {
    /// Replay buffer cap per room; the oldest event is evicted past it.
    /// `0` disables the cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_replay_events: Option<usize>,

    /// Close connections that send nothing for this many seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "inkroom_gateway=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static regex");
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(crate::error::InkroomError::Io)?;

        // Substitute ${ENV_VAR} references before parsing
        let substituted = substitute_env_vars(&raw);

        let config: Config = json5::from_str(&substituted)
            .map_err(|e| crate::error::InkroomError::Config(e.to_string()))?;

        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Default config file path.
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    /// Gateway port.
    pub fn gateway_port(&self) -> u16 {
        self.gateway.as_ref().map(|g| g.port).unwrap_or(DEFAULT_PORT)
    }

    /// Address the gateway binds to.
    pub fn bind_addr(&self) -> String {
        self.gateway
            .as_ref()
            .and_then(|g| g.bind.clone())
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
    }

    pub fn cors_origins(&self) -> Vec<String> {
        self.gateway
            .as_ref()
            .map(|g| g.cors_origins.clone())
            .unwrap_or_else(default_cors_origins)
    }

    pub fn max_message_bytes(&self) -> usize {
        self.gateway
            .as_ref()
            .and_then(|g| g.max_message_bytes)
            .unwrap_or(DEFAULT_MAX_MESSAGE_BYTES)
    }

    /// Replay buffer cap per room. `None` means unlimited.
    pub fn max_replay_events(&self) -> Option<usize> {
        let cap = self
            .rooms
            .as_ref()
            .and_then(|r| r.max_replay_events)
            .unwrap_or(DEFAULT_MAX_REPLAY_EVENTS);
        (cap > 0).then_some(cap)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.rooms
            .as_ref()
            .and_then(|r| r.idle_timeout_secs)
            .map(Duration::from_secs)
    }

    /// Get a config value by dotted path (e.g. "gateway.port", "rooms.max_replay_events").
    pub fn get_path(&self, path: &str) -> Option<serde_json::Value> {
        let json = serde_json::to_value(self).ok()?;
        let mut current = &json;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if let Some(gw) = &self.gateway {
            if gw.port == 0 {
                errors.push("Gateway port cannot be 0".to_string());
            }
            if gw.cors_origins.is_empty() {
                warnings.push("No CORS origins configured; browsers on other origins will be rejected".to_string());
            }
            if gw.max_message_bytes == Some(0) {
                errors.push("gateway.max_message_bytes cannot be 0".to_string());
            }
        }

        if let Some(rooms) = &self.rooms {
            if rooms.max_replay_events == Some(0) {
                warnings.push("rooms.max_replay_events is 0; replay buffers are unbounded".to_string());
            }
            if rooms.idle_timeout_secs == Some(0) {
                errors.push("rooms.idle_timeout_secs cannot be 0".to_string());
            }
        }

        if let Some(logging) = &self.logging {
            if logging.format != "plain" && logging.format != "json" {
                errors.push(format!("Unknown logging format: {}", logging.format));
            }
            if logging.output != "stderr" && logging.output != "stdout" {
                errors.push(format!("Unknown logging output: {}", logging.output));
            }
        }

        (warnings, errors)
    }

    /// Save config to a file.
    pub fn save(&self, path: &Path) -> crate::error::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Base directory for Inkroom data: `~/.inkroom/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".inkroom")
}
