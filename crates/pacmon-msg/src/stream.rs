//! ---
//! pac_section: "02-messaging-data-model"
//! pac_subsection: "module"
//! pac_type: "source"
//! pac_scope: "code"
//! pac_description: "Measurement model and stream primitives."
//! pac_version: "v0.1.0"
//! pac_owner: "tbd"
//! ---
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::Measurement;

/// Default number of measurements buffered between producers and the consumer.
pub const DEFAULT_CAPACITY: usize = 10;

/// Producer half handed to each session generation.
pub type MeasurementSender = mpsc::Sender<Measurement>;

/// Consumer half of the measurement channel.
///
/// Cloning yields another handle on the same underlying queue, so every clone observes one
/// continuous, ordered stream no matter how many producers came and went.
#[derive(Debug, Clone)]
pub struct MeasurementStream {
    inner: Arc<Mutex<mpsc::Receiver<Measurement>>>,
}

impl MeasurementStream {
    fn new(receiver: mpsc::Receiver<Measurement>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(receiver)),
        }
    }

    /// Wait for the next measurement. Returns `None` once every producer is gone and the
    /// buffer is drained.
    pub async fn recv(&self) -> Option<Measurement> {
        self.inner.lock().await.recv().await
    }

    /// Take a measurement if one is already buffered.
    pub fn try_recv(&self) -> Option<Measurement> {
        let mut guard = self.inner.try_lock().ok()?;
        guard.try_recv().ok()
    }
}

/// Create a bounded measurement channel. A capacity of zero is bumped to one.
pub fn measurement_channel(capacity: usize) -> (MeasurementSender, MeasurementStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (tx, MeasurementStream::new(rx))
}
