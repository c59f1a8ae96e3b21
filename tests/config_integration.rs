//! ---
//! pac_section: "09-testing"
//! pac_subsection: "integration-tests"
//! pac_type: "source"
//! pac_scope: "code"
//! pac_description: "Configuration files driving source and sink construction."
//! pac_version: "v0.1.0"
//! pac_owner: "tbd"
//! ---
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use pacmon_common::config::AppConfig;
use pacmon_sink::{open_sink, SinkTarget};
use pacmon_swc::{ConfigError, ResourceSelector, SupervisedSource};

#[test]
fn config_file_builds_source_and_sink() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("out").join("measurements.jsonl");
    let config_path = dir.path().join("pacmon.toml");
    fs::write(
        &config_path,
        format!(
            r#"
[source]
endpoint = "ws://192.168.1.20:8214/"
poll_interval = 30
resource_id = "0x46bd50"

[sink]
target = "file://{}"
topic = "heatpump"
"#,
            log_path.display()
        ),
    )
    .unwrap();

    let loaded = AppConfig::load_with_source(Some(&config_path), &[] as &[PathBuf]).unwrap();
    assert_eq!(loaded.source.as_deref(), Some(config_path.as_path()));
    let config = loaded.config;
    config.validate().unwrap();

    let source = SupervisedSource::new(&config.source).unwrap();
    assert_eq!(source.config().poll_interval(), Duration::from_secs(30));
    assert_eq!(
        source.config().resource(),
        &ResourceSelector::Fixed("0x46bd50".into())
    );

    let target: SinkTarget = config.sink.target.parse().unwrap();
    assert_eq!(target, SinkTarget::EventLog(log_path.clone()));
    let sink = open_sink(&target, &config.sink.topic).unwrap();
    assert_eq!(sink.name(), "event_log");
    assert!(log_path.exists());
}

#[test]
fn non_websocket_endpoint_is_rejected_synchronously() {
    let config: AppConfig = "[source]\nendpoint = \"http://when-it-should-be-ws\"\n"
        .parse()
        .unwrap();
    let err = SupervisedSource::new(&config.source).err().unwrap();
    assert!(matches!(err, ConfigError::UnsupportedScheme { .. }));
}
