//! Configuration loader and validator for the FungiHub service.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    pub auth: Auth,
    pub print: Print,
    pub automation: Automation,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub bind_addr: String,
}

/// Shared-secret session gate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Auth {
    pub password: String,
    pub session_ttl_days: u64,
}

/// Label-print collaborator settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Print {
    pub base_url: String,
    pub timeout_secs: u64,
}

/// Automation sweep settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Automation {
    /// Days of incubation after which a GRAIN batch is auto-promoted to READY.
    pub grain_ready_days: i64,
    /// Interval between background sweep runs.
    pub sweep_interval_secs: u64,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.bind_addr.trim().is_empty() {
        return Err(ConfigError::Invalid("app.bind_addr must be non-empty"));
    }
    if cfg.auth.password.trim().is_empty() {
        return Err(ConfigError::Invalid("auth.password must be non-empty"));
    }
    if cfg.auth.session_ttl_days == 0 {
        return Err(ConfigError::Invalid("auth.session_ttl_days must be > 0"));
    }
    if cfg.print.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("print.base_url must be non-empty"));
    }
    if cfg.print.timeout_secs == 0 {
        return Err(ConfigError::Invalid("print.timeout_secs must be > 0"));
    }
    if cfg.automation.grain_ready_days <= 0 {
        return Err(ConfigError::Invalid(
            "automation.grain_ready_days must be > 0",
        ));
    }
    if cfg.automation.sweep_interval_secs == 0 {
        return Err(ConfigError::Invalid(
            "automation.sweep_interval_secs must be > 0",
        ));
    }
    Ok(())
}

/// Example configuration shipped with the repo.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  bind_addr: "0.0.0.0:3000"

auth:
  password: "CHANGE_ME"
  session_ttl_days: 30

print:
  base_url: "http://localhost:5000"
  timeout_secs: 10

automation:
  grain_ready_days: 12
  sweep_interval_secs: 86400
"#
}
