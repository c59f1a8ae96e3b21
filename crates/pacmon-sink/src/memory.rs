//! ---
//! pac_section: "04-sink"
//! pac_subsection: "module"
//! pac_type: "source"
//! pac_scope: "code"
//! pac_description: "Measurement sinks and target selection."
//! pac_version: "v0.1.0"
//! pac_owner: "tbd"
//! ---
use std::sync::Arc;

use async_trait::async_trait;
use pacmon_msg::Measurement;
use parking_lot::Mutex;

use crate::{Result, Sink, SinkError};

#[derive(Default)]
struct State {
    values: Vec<Measurement>,
    pending_failures: usize,
}

/// In-memory sink protected by a mutex. Clones share the same buffer.
#[derive(Clone, Default)]
pub struct InMemorySink {
    state: Arc<Mutex<State>>,
}

impl InMemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `count` calls to [`Sink::put`].
    pub fn fail_next(&self, count: usize) {
        self.state.lock().pending_failures = count;
    }

    /// Every accepted measurement, in arrival order.
    pub fn values(&self) -> Vec<Measurement> {
        self.state.lock().values.clone()
    }

    /// Most recently accepted measurement.
    pub fn last_measurement(&self) -> Option<Measurement> {
        self.state.lock().values.last().cloned()
    }

    /// Number of accepted measurements.
    pub fn len(&self) -> usize {
        self.state.lock().values.len()
    }

    /// Whether nothing was accepted yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Sink for InMemorySink {
    async fn put(&self, measurement: &Measurement) -> Result<()> {
        let mut state = self.state.lock();
        if state.pending_failures > 0 {
            state.pending_failures -= 1;
            return Err(SinkError::Rejected("injected failure".into()));
        }
        state.values.push(measurement.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pacmon_msg::MeasurementType;

    fn measurement(payload: &str) -> Measurement {
        Measurement::new(
            MeasurementType::DeviceTemperatureSet,
            Utc::now(),
            payload.as_bytes().to_vec(),
        )
    }

    #[tokio::test]
    async fn keeps_measurements_in_order() {
        let sink = InMemorySink::new();
        assert!(sink.last_measurement().is_none());
        sink.put(&measurement("1")).await.unwrap();
        sink.put(&measurement("2")).await.unwrap();
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.last_measurement().unwrap().payload(), b"2");
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let sink = InMemorySink::new();
        sink.fail_next(1);
        assert!(sink.put(&measurement("1")).await.is_err());
        sink.put(&measurement("2")).await.unwrap();
        assert_eq!(sink.values().len(), 1);
    }
}
