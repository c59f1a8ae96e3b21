//! ---
//! pac_section: "04-sink"
//! pac_subsection: "module"
//! pac_type: "source"
//! pac_scope: "code"
//! pac_description: "Measurement sinks and target selection."
//! pac_version: "v0.1.0"
//! pac_owner: "tbd"
//! ---
//! Destinations for collected measurements.
//!
//! A [`Sink`] accepts one measurement at a time. Retrying is the sink's own business; the
//! collector only reports what `put` returned.
#![warn(missing_docs)]

use std::sync::Arc;

use async_trait::async_trait;
use pacmon_msg::Measurement;

pub mod event_log;
pub mod log;
pub mod memory;
pub mod target;

pub use event_log::{read_event_log, EventLogEntry, EventLogSink};
pub use log::LogSink;
pub use memory::InMemorySink;
pub use target::SinkTarget;

/// Result alias used throughout the sink crate.
pub type Result<T> = std::result::Result<T, SinkError>;

/// Error type for sink operations.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Wrapper for IO errors while writing sink files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Wrapper for JSON serialization issues.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// The sink target string could not be understood.
    #[error("invalid sink target '{target}': {reason}")]
    InvalidTarget {
        /// Target as configured.
        target: String,
        /// Why it was rejected.
        reason: String,
    },
    /// The sink refused the measurement.
    #[error("sink rejected measurement: {0}")]
    Rejected(String),
}

/// Destination for measurements.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Deliver a single measurement under the topic the sink was opened with.
    async fn put(&self, measurement: &Measurement) -> Result<()>;

    /// Short name used in logs and metrics.
    fn name(&self) -> &'static str;
}

/// Build the sink described by `target`, publishing under `topic`.
pub fn open_sink(target: &SinkTarget, topic: &str) -> Result<Arc<dyn Sink>> {
    let sink: Arc<dyn Sink> = match target {
        SinkTarget::Log => Arc::new(LogSink::new(topic)),
        SinkTarget::Memory => Arc::new(InMemorySink::new()),
        SinkTarget::EventLog(path) => Arc::new(EventLogSink::open(path, topic)?),
    };
    Ok(sink)
}
