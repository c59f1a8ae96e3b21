//! ---
//! pac_section: "01-core-functionality"
//! pac_subsection: "module"
//! pac_type: "source"
//! pac_scope: "code"
//! pac_description: "Collector loop and its metrics."
//! pac_version: "v0.1.0"
//! pac_owner: "tbd"
//! ---
use std::future::Future;
use std::sync::Arc;

use pacmon_msg::{Measurement, MeasurementStream};
use pacmon_sink::Sink;
use tracing::{debug, error, info};

use crate::metrics::CollectorMetrics;

/// Totals returned when the collector stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorReport {
    /// Measurements the sink accepted.
    pub delivered: u64,
    /// Measurements the sink rejected.
    pub failed: u64,
}

/// Drains a measurement stream into a sink, one `put` per measurement, in order.
///
/// Sink failures are logged and counted; the measurement is not retried.
pub struct Collector {
    sink: Arc<dyn Sink>,
    metrics: Option<CollectorMetrics>,
}

impl Collector {
    pub fn new(sink: Arc<dyn Sink>, metrics: Option<CollectorMetrics>) -> Self {
        Self { sink, metrics }
    }

    /// Run until every producer of `stream` is gone.
    pub async fn run(&self, stream: MeasurementStream) -> CollectorReport {
        self.run_until(stream, std::future::pending()).await
    }

    /// Run until the stream ends or `shutdown` resolves. Measurements already buffered when
    /// shutdown fires are still delivered.
    pub async fn run_until<F>(&self, stream: MeasurementStream, shutdown: F) -> CollectorReport
    where
        F: Future<Output = ()>,
    {
        let mut report = CollectorReport::default();
        tokio::pin!(shutdown);
        info!(sink = self.sink.name(), "collector started");

        loop {
            tokio::select! {
                next = stream.recv() => match next {
                    Some(measurement) => self.deliver(&measurement, &mut report).await,
                    None => {
                        info!(sink = self.sink.name(), "measurement stream ended");
                        break;
                    }
                },
                _ = &mut shutdown => {
                    while let Some(measurement) = stream.try_recv() {
                        self.deliver(&measurement, &mut report).await;
                    }
                    info!(sink = self.sink.name(), "collector stopping");
                    break;
                }
            }
        }

        info!(
            sink = self.sink.name(),
            delivered = report.delivered,
            failed = report.failed,
            "collector finished"
        );
        report
    }

    async fn deliver(&self, measurement: &Measurement, report: &mut CollectorReport) {
        match self.sink.put(measurement).await {
            Ok(()) => {
                report.delivered += 1;
                if let Some(metrics) = &self.metrics {
                    metrics.record_delivered(measurement.timestamp().timestamp());
                }
                debug!(
                    sink = self.sink.name(),
                    timestamp = %measurement.timestamp(),
                    "measurement delivered"
                );
            }
            Err(err) => {
                report.failed += 1;
                if let Some(metrics) = &self.metrics {
                    metrics.record_failed();
                }
                error!(
                    sink = self.sink.name(),
                    key = measurement.measurement_type().as_str(),
                    error = %err,
                    "failed to deliver measurement"
                );
            }
        }
    }
}
