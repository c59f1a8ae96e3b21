//! ---
//! pac_section: "03-device-source"
//! pac_subsection: "module"
//! pac_type: "source"
//! pac_scope: "code"
//! pac_description: "SWC heat-pump session, decoder and supervising source."
//! pac_version: "v0.1.0"
//! pac_owner: "tbd"
//! ---
use std::sync::Arc;

use pacmon_msg::MeasurementSender;

use crate::config::SessionConfig;
use crate::metrics::SourceMetrics;
use crate::session::{DeviceSession, SwcSession};

/// Creates a fresh session for every generation the source starts.
pub trait SessionFactory: Send + Sync + 'static {
    /// Build the session for `generation`, emitting onto `measurements`.
    fn create(
        &self,
        config: Arc<SessionConfig>,
        generation: u64,
        measurements: MeasurementSender,
    ) -> Box<dyn DeviceSession>;
}

/// Factory for [`SwcSession`].
#[derive(Clone, Default)]
pub struct SwcSessionFactory {
    metrics: Option<SourceMetrics>,
}

impl SwcSessionFactory {
    /// Factory whose sessions report to `metrics`.
    pub fn with_metrics(metrics: SourceMetrics) -> Self {
        Self {
            metrics: Some(metrics),
        }
    }
}

impl SessionFactory for SwcSessionFactory {
    fn create(
        &self,
        config: Arc<SessionConfig>,
        generation: u64,
        measurements: MeasurementSender,
    ) -> Box<dyn DeviceSession> {
        let session = SwcSession::new(config, generation, measurements);
        match &self.metrics {
            Some(metrics) => Box::new(session.with_metrics(metrics.clone())),
            None => Box::new(session),
        }
    }
}
