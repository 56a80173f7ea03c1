use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::exchanges::ConnectionSettings;
use crate::helpers::{get_env_var_or_default, get_required_env_var};
use crate::reconnect::ReconnectConfig;
use crate::sink::SinkSettings;

const DEFAULT_DATA_SOURCES_PATH: &str = "configs/data_sources.json";
const DEFAULT_QUESTDB_ADDR: &str = "127.0.0.1:9009";
const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_RECONNECT_INITIAL_DELAY_MS: u64 = 1_000;
const DEFAULT_RECONNECT_MAX_DELAY_MS: u64 = 60_000;
const DEFAULT_RECONNECT_MAX_ATTEMPTS: u32 = 0; // unlimited
const DEFAULT_SINK_BATCH_SIZE: usize = 100;
const DEFAULT_SINK_MAX_RETRIES: u32 = 3;
const DEFAULT_QUOTE_BUFFER: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Log,
    QuestDb,
}

impl FromStr for SinkKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "log" => Ok(SinkKind::Log),
            "questdb" => Ok(SinkKind::QuestDb),
            _ => Err(ConfigError::Invalid {
                name: "QUOTE_SINK",
                value: value.to_string(),
            }),
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkKind::Log => write!(f, "log"),
            SinkKind::QuestDb => write!(f, "questdb"),
        }
    }
}

/// Process settings, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Data source id of the exchange to poll.
    pub exchange_id: i64,
    pub data_sources_path: String,
    pub sink: SinkKind,
    pub questdb_addr: String,
    pub quote_buffer: usize,
    pub connection: ConnectionSettings,
    pub reconnect: ReconnectConfig,
    pub sink_settings: SinkSettings,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let exchange_id = get_required_env_var("EXCHANGE_ID")?;

        let handshake_timeout_ms =
            get_env_var_or_default("HANDSHAKE_TIMEOUT_MS", DEFAULT_HANDSHAKE_TIMEOUT_MS);
        let initial_delay_ms = get_env_var_or_default(
            "RECONNECT_INITIAL_DELAY_MS",
            DEFAULT_RECONNECT_INITIAL_DELAY_MS,
        );
        let max_delay_ms =
            get_env_var_or_default("RECONNECT_MAX_DELAY_MS", DEFAULT_RECONNECT_MAX_DELAY_MS);

        let settings = Self {
            exchange_id,
            data_sources_path: get_env_var_or_default(
                "DATA_SOURCES_PATH",
                DEFAULT_DATA_SOURCES_PATH.to_string(),
            ),
            sink: get_env_var_or_default("QUOTE_SINK", SinkKind::Log),
            questdb_addr: get_env_var_or_default("QUESTDB_ADDR", DEFAULT_QUESTDB_ADDR.to_string()),
            quote_buffer: get_env_var_or_default("QUOTE_BUFFER", DEFAULT_QUOTE_BUFFER),
            connection: ConnectionSettings {
                handshake_timeout: Duration::from_millis(handshake_timeout_ms),
                ..ConnectionSettings::default()
            },
            reconnect: ReconnectConfig {
                initial_delay: Duration::from_millis(initial_delay_ms),
                max_delay: Duration::from_millis(max_delay_ms.max(initial_delay_ms)),
                max_attempts: get_env_var_or_default(
                    "RECONNECT_MAX_ATTEMPTS",
                    DEFAULT_RECONNECT_MAX_ATTEMPTS,
                ),
                ..ReconnectConfig::default()
            },
            sink_settings: SinkSettings {
                batch_size: get_env_var_or_default("SINK_BATCH_SIZE", DEFAULT_SINK_BATCH_SIZE),
                max_retries: get_env_var_or_default("SINK_MAX_RETRIES", DEFAULT_SINK_MAX_RETRIES),
                ..SinkSettings::default()
            },
        };

        if settings.quote_buffer == 0 {
            return Err(ConfigError::Invalid {
                name: "QUOTE_BUFFER",
                value: "0".to_string(),
            });
        }

        Ok(settings)
    }
}
