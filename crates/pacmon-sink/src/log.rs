//! ---
//! pac_section: "04-sink"
//! pac_subsection: "module"
//! pac_type: "source"
//! pac_scope: "code"
//! pac_description: "Measurement sinks and target selection."
//! pac_version: "v0.1.0"
//! pac_owner: "tbd"
//! ---
use async_trait::async_trait;
use pacmon_msg::Measurement;
use tracing::info;

use crate::{Result, Sink};

/// Prints each measurement through tracing.
#[derive(Debug, Clone)]
pub struct LogSink {
    topic: String,
}

impl LogSink {
    /// Log measurements under `topic`.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl Sink for LogSink {
    async fn put(&self, measurement: &Measurement) -> Result<()> {
        info!(
            target: "pacmon::sink",
            topic = %self.topic,
            key = measurement.measurement_type().as_str(),
            timestamp = %measurement.timestamp().to_rfc3339(),
            payload = %String::from_utf8_lossy(measurement.payload()),
            "measurement",
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
