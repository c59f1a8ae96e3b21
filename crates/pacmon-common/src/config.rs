//! ---
//! pac_section: "01-core-functionality"
//! pac_subsection: "module"
//! pac_type: "source"
//! pac_scope: "code"
//! pac_description: "Shared primitives and utilities for the collector runtime."
//! pac_version: "v0.1.0"
//! pac_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_poll_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_pin() -> String {
    "000000".to_owned()
}

fn default_subprotocol() -> Option<String> {
    Some("Lux_WS".to_owned())
}

fn default_channel_capacity() -> usize {
    10
}

fn default_sink_target() -> String {
    "log:".to_owned()
}

fn default_topic() -> String {
    "SWCTemperature".to_owned()
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9898))
}

/// Primary configuration object for the collector daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub source: SourceSettings,
    #[serde(default)]
    pub sink: SinkSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    /// `None` when no file was found and defaults are in use.
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "PACMON_CONFIG";

    /// Load configuration from disk, respecting the `PACMON_CONFIG` override.
    ///
    /// An explicit path must exist. Otherwise the first existing candidate wins, and when
    /// none exists the defaults are returned so command-line flags can fill the gaps.
    pub fn load_with_source<P: AsRef<Path>>(
        explicit: Option<&Path>,
        candidates: &[P],
    ) -> Result<LoadedAppConfig> {
        if let Some(path) = explicit {
            let config = Self::from_path(path)?;
            return Ok(LoadedAppConfig {
                config,
                source: Some(path.to_path_buf()),
            });
        }

        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            let path = candidate.as_ref();
            if path.exists() {
                let config = Self::from_path(path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path.to_path_buf()),
                });
            }
        }

        debug!("no configuration file found; using defaults");
        Ok(LoadedAppConfig {
            config: AppConfig::default(),
            source: None,
        })
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Validate structural invariants once every override has been applied.
    ///
    /// Endpoint scheme checks belong to the source itself; this only rejects settings that
    /// can never work.
    pub fn validate(&self) -> Result<()> {
        if self.source.endpoint.trim().is_empty() {
            return Err(anyhow!("source endpoint must be provided"));
        }
        if self.source.channel_capacity == 0 {
            return Err(anyhow!("source channel_capacity must be greater than zero"));
        }
        if self.sink.target.trim().is_empty() {
            return Err(anyhow!("sink target must be provided"));
        }
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Connection settings for the heat-pump WebSocket endpoint.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSettings {
    /// WebSocket URL of the control unit, e.g. `ws://192.168.1.20:8214/`.
    #[serde(default)]
    pub endpoint: String,
    /// Interval between `REFRESH` commands. Zero falls back to one minute.
    #[serde(default = "default_poll_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub poll_interval: Duration,
    #[serde(default = "default_pin")]
    pub pin: String,
    /// Sub-protocol requested during the WebSocket handshake.
    #[serde(default = "default_subprotocol")]
    pub subprotocol: Option<String>,
    /// Fixed snapshot resource id. When absent it is discovered from the login banner.
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl SourceSettings {
    /// Settings for `endpoint` with every other field at its default.
    pub fn for_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            poll_interval: default_poll_interval(),
            pin: default_pin(),
            subprotocol: default_subprotocol(),
            resource_id: None,
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Destination for collected measurements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkSettings {
    /// Sink URL: `log:`, `memory:` or `file:///path/to/measurements.jsonl`.
    #[serde(default = "default_sink_target")]
    pub target: String,
    #[serde(default = "default_topic")]
    pub topic: String,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            target: default_sink_target(),
            topic: default_topic(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for the rolling JSON log file. Stdout only when unset.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default)]
    pub file_prefix: Option<String>,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            file_prefix: None,
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [source]
        endpoint = "ws://192.168.86.29:8214/"
        poll_interval = 30
        resource_id = "0x46bd50"

        [sink]
        target = "file:///tmp/pacmon.jsonl"

        [logging]
        format = "pretty"

        [metrics]
        enabled = true
        listen = "127.0.0.1:9100"
    "#;

    #[test]
    fn parses_full_document() {
        let config: AppConfig = SAMPLE.parse().expect("sample config parses");
        assert_eq!(config.source.endpoint, "ws://192.168.86.29:8214/");
        assert_eq!(config.source.poll_interval, Duration::from_secs(30));
        assert_eq!(config.source.pin, "000000");
        assert_eq!(config.source.subprotocol.as_deref(), Some("Lux_WS"));
        assert_eq!(config.source.resource_id.as_deref(), Some("0x46bd50"));
        assert_eq!(config.source.channel_capacity, 10);
        assert_eq!(config.sink.topic, "SWCTemperature");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.metrics.enabled);
    }

    #[test]
    fn validation_requires_endpoint() {
        let err = "[sink]\ntarget = \"log:\"\n"
            .parse::<AppConfig>()
            .expect_err("missing endpoint is rejected");
        assert!(err.to_string().contains("endpoint"));
    }

    #[test]
    fn explicit_path_is_loaded() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), SAMPLE).unwrap();
        let loaded =
            AppConfig::load_with_source::<PathBuf>(Some(file.path()), &[]).expect("config loads");
        assert_eq!(loaded.source.as_deref(), Some(file.path()));
        assert_eq!(loaded.config.sink.target, "file:///tmp/pacmon.jsonl");
    }

    #[test]
    fn missing_candidates_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = AppConfig::load_with_source(None, &[dir.path().join("absent.toml")])
            .expect("defaults are returned");
        if std::env::var(AppConfig::ENV_CONFIG_PATH).is_err() {
            assert!(loaded.source.is_none());
            assert_eq!(loaded.config.sink.target, "log:");
        }
    }
}
