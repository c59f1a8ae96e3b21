//! ---
//! pac_section: "01-core-functionality"
//! pac_subsection: "binary"
//! pac_type: "source"
//! pac_scope: "code"
//! pac_description: "Binary entrypoint for the pacmond collector daemon."
//! pac_version: "v0.1.0"
//! pac_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, ValueEnum};
use pacmon_common::config::AppConfig;
use pacmon_common::logging::{init_tracing, LogFormat};
use pacmon_core::{Collector, CollectorMetrics};
use pacmon_metrics::{new_registry, spawn_http_server};
use pacmon_sink::{open_sink, SinkTarget};
use pacmon_swc::{SourceMetrics, SupervisedSource};
use tokio::signal;
use tracing::{info, warn};

const CONFIG_CANDIDATES: [&str; 2] = ["pacmon.toml", "/etc/pacmon/pacmon.toml"];

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Polls an SWC heat pump over WebSocket and publishes its temperatures",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(
        long = "source-url",
        value_name = "URL",
        env = "PACMON_SOURCE_URL",
        help = "WebSocket URL of the heat pump, e.g. ws://192.168.1.20:8214/"
    )]
    source_url: Option<String>,

    #[arg(
        long = "sink-url",
        value_name = "URL",
        env = "PACMON_SINK_URL",
        help = "Where measurements go: log:, memory: or file:///path/to/log.jsonl"
    )]
    sink_url: Option<String>,

    #[arg(long, help = "Topic measurements are published under")]
    topic: Option<String>,

    #[arg(
        long = "polling-interval",
        value_name = "SECONDS",
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Seconds between two REFRESH commands"
    )]
    polling_interval: Option<u64>,

    #[arg(long, help = "PIN sent with the LOGIN command")]
    pin: Option<String>,

    #[arg(long, value_name = "ID", help = "Fixed snapshot resource id instead of discovery")]
    resource_id: Option<String>,

    #[arg(long, value_enum, help = "Stdout log format")]
    log_format: Option<CliLogFormat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CliLogFormat {
    Json,
    Pretty,
}

impl From<CliLogFormat> for LogFormat {
    fn from(value: CliLogFormat) -> Self {
        match value {
            CliLogFormat::Json => LogFormat::StructuredJson,
            CliLogFormat::Pretty => LogFormat::Pretty,
        }
    }
}

impl Cli {
    /// Command-line flags win over file values.
    fn apply(&self, config: &mut AppConfig) {
        if let Some(url) = &self.source_url {
            config.source.endpoint = url.clone();
        }
        if let Some(url) = &self.sink_url {
            config.sink.target = url.clone();
        }
        if let Some(topic) = &self.topic {
            config.sink.topic = topic.clone();
        }
        if let Some(seconds) = self.polling_interval {
            config.source.poll_interval = Duration::from_secs(seconds);
        }
        if let Some(pin) = &self.pin {
            config.source.pin = pin.clone();
        }
        if let Some(id) = &self.resource_id {
            config.source.resource_id = Some(id.clone());
        }
        if let Some(format) = self.log_format {
            config.logging.format = format.into();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = AppConfig::load_with_source(cli.config.as_deref(), &CONFIG_CANDIDATES)?;
    let mut config = loaded.config;
    cli.apply(&mut config);
    if config.source.endpoint.trim().is_empty() {
        Cli::command()
            .error(
                ErrorKind::MissingRequiredArgument,
                "--source-url is required when no [source] endpoint is configured",
            )
            .exit();
    }
    if config.sink.target.trim().is_empty() {
        Cli::command()
            .error(
                ErrorKind::MissingRequiredArgument,
                "--sink-url is required when no [sink] target is configured",
            )
            .exit();
    }
    config.validate()?;

    init_tracing("pacmond", &config.logging)?;
    match &loaded.source {
        Some(path) => info!(config_path = %path.display(), "configuration loaded"),
        None => info!("no configuration file found; running from flags and defaults"),
    }

    run_daemon(config).await
}

async fn run_daemon(config: AppConfig) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "pacmond starting");
    let registry = new_registry();

    let metrics_server = if config.metrics.enabled {
        let server = spawn_http_server(registry.clone(), config.metrics.listen)?;
        info!(address = %server.addr(), "metrics exporter enabled");
        Some(server)
    } else {
        info!("metrics exporter disabled by configuration");
        None
    };

    let source_metrics =
        SourceMetrics::new(&registry).context("failed to register source metrics")?;
    let source = SupervisedSource::with_metrics(&config.source, source_metrics)
        .context("invalid [source] configuration")?;

    let target: SinkTarget = config
        .sink
        .target
        .parse()
        .context("invalid [sink] configuration")?;
    let sink = open_sink(&target, &config.sink.topic)
        .with_context(|| format!("failed to open sink {target}"))?;
    let collector = Collector::new(sink, Some(CollectorMetrics::new(registry.clone())?));

    let handle = source.start();
    info!(
        endpoint = %config.source.endpoint,
        sink = %target,
        topic = %config.sink.topic,
        poll_interval_secs = source.config().poll_interval().as_secs(),
        "collector running; waiting for termination signal"
    );

    let report = collector
        .run_until(handle.stream(), shutdown_signal())
        .await;
    info!(
        delivered = report.delivered,
        failed = report.failed,
        "shutting down"
    );
    handle.shutdown().await;

    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        tokio::select! {
            _ = ctrl_c() => {},
            _ = terminate() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
    }
}

async fn ctrl_c() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(?err, "failed to install Ctrl+C handler");
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
        }
        Err(err) => warn!(?err, "failed to install SIGTERM handler"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_configuration() {
        let cli = Cli::try_parse_from([
            "pacmond",
            "--source-url",
            "ws://10.0.0.5:8214/",
            "--sink-url",
            "file:///var/lib/pacmon/out.jsonl",
            "--topic",
            "heatpump",
            "--polling-interval",
            "5",
            "--pin",
            "123456",
            "--log-format",
            "pretty",
        ])
        .unwrap();
        let mut config = AppConfig::default();
        cli.apply(&mut config);

        assert_eq!(config.source.endpoint, "ws://10.0.0.5:8214/");
        assert_eq!(config.sink.target, "file:///var/lib/pacmon/out.jsonl");
        assert_eq!(config.sink.topic, "heatpump");
        assert_eq!(config.source.poll_interval, Duration::from_secs(5));
        assert_eq!(config.source.pin, "123456");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn polling_interval_must_be_positive() {
        let err = Cli::try_parse_from(["pacmond", "--polling-interval", "0"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn absent_flags_keep_file_values() {
        let cli = Cli::try_parse_from(["pacmond"]).unwrap();
        let mut config: AppConfig = "[source]\nendpoint = \"ws://10.0.0.5:8214/\"\npoll_interval = 30\n"
            .parse()
            .unwrap();
        let before = config.source.clone();
        cli.apply(&mut config);
        if std::env::var_os("PACMON_SOURCE_URL").is_none() {
            assert_eq!(config.source, before);
        }
    }
}
