use std::path::{Path, PathBuf};
use std::str::FromStr;

use loomwright_common::config::SystemConfig;
use loomwright_common::types::MachineType;
use loomwright_common::DeviceId;

use super::validation;

/// Broker connection parameters, read once at startup.
#[derive(Clone, Debug)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub pass: Option<String>,
}

/// Complete agent configuration: per-instance identity, broker
/// connection, and the tunable timing/safety knobs from `agent.toml`.
#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub device_id: DeviceId,
    pub machine_type: MachineType,
    pub broker: BrokerConfig,
    pub system: SystemConfig,
}

/// Load configuration from environment variables (identity, broker) and
/// an optional TOML file (timing/safety knobs), then validate.
///
/// Refuses to start on a malformed `agent.toml` or an invalid
/// `MACHINE_TYPE`/broker port — configuration is read
/// once and is not re-read. A *missing* `agent.toml` is not fatal: the
/// built-in defaults in `SystemConfig::default()` are used, with a
/// warning.
pub fn load_config(config_dir: &Path) -> Result<AgentConfig, ConfigError> {
    tracing::info!(config_dir = %config_dir.display(), "loading agent configuration");

    let machine_type_raw =
        std::env::var("MACHINE_TYPE").map_err(|_| ConfigError::MissingEnv("MACHINE_TYPE"))?;
    let machine_type = MachineType::from_str(&machine_type_raw)
        .map_err(|e| ConfigError::Validation(format!("MACHINE_TYPE: {e}")))?;

    let device_id = std::env::var("DEVICE_ID")
        .map(DeviceId::new)
        .unwrap_or_else(|_| default_device_id(machine_type));

    let broker = load_broker_config()?;
    let system = load_system_config(&config_dir.join("agent.toml"))?;

    let config = AgentConfig {
        device_id,
        machine_type,
        broker,
        system,
    };

    validation::validate(&config)?;

    tracing::info!(
        device_id = %config.device_id,
        machine_type = %config.machine_type,
        broker_host = %config.broker.host,
        "agent configuration loaded"
    );

    Ok(config)
}

fn default_device_id(machine_type: MachineType) -> DeviceId {
    use rand::Rng;
    let suffix: String = rand::rng()
        .sample_iter(rand::distr::Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();
    DeviceId::new(format!("{machine_type}-{}", suffix.to_lowercase()))
}

fn load_broker_config() -> Result<BrokerConfig, ConfigError> {
    let host = std::env::var("LOOM_BROKER_HOST").unwrap_or_else(|_| "localhost".to_string());
    let port = std::env::var("LOOM_BROKER_PORT")
        .ok()
        .map(|p| p.parse::<u16>())
        .transpose()
        .map_err(|e| ConfigError::Validation(format!("LOOM_BROKER_PORT: {e}")))?
        .unwrap_or(1883);
    let user = std::env::var("LOOM_BROKER_USER").ok();
    let pass = std::env::var("LOOM_BROKER_PASS").ok();

    Ok(BrokerConfig {
        host,
        port,
        user,
        pass,
    })
}

fn load_system_config(path: &Path) -> Result<SystemConfig, ConfigError> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "agent.toml not found, using built-in defaults");
        return Ok(SystemConfig::default());
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {detail}")]
    Parse { path: PathBuf, detail: String },

    #[error("validation failed: {0}")]
    Validation(String),
}

impl From<ConfigError> for loomwright_common::LoomError {
    fn from(e: ConfigError) -> Self {
        loomwright_common::LoomError::Config(e.to_string())
    }
}
