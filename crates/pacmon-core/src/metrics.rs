//! ---
//! pac_section: "01-core-functionality"
//! pac_subsection: "module"
//! pac_type: "source"
//! pac_scope: "code"
//! pac_description: "Collector loop and its metrics."
//! pac_version: "v0.1.0"
//! pac_owner: "tbd"
//! ---
use anyhow::Result;
use pacmon_metrics::SharedRegistry;
use prometheus::{IntCounterVec, IntGauge, Opts};

const DELIVERED: &str = "delivered";
const FAILED: &str = "failed";

/// Sink write counters and the time of the last delivered reading.
#[derive(Clone, Debug)]
pub struct CollectorMetrics {
    registry: SharedRegistry,
    writes: IntCounterVec,
    last_delivery: IntGauge,
}

impl CollectorMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let writes = IntCounterVec::new(
            Opts::new(
                "pacmon_sink_writes_total",
                "Sink writes by outcome (delivered or failed)",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(writes.clone()))?;

        let last_delivery = IntGauge::with_opts(Opts::new(
            "pacmon_last_delivery_timestamp_seconds",
            "Device timestamp of the last measurement the sink accepted, in Unix seconds",
        ))?;
        registry.register(Box::new(last_delivery.clone()))?;

        Ok(Self {
            registry,
            writes,
            last_delivery,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn record_delivered(&self, unix_seconds: i64) {
        self.writes.with_label_values(&[DELIVERED]).inc();
        self.last_delivery.set(unix_seconds);
    }

    pub fn record_failed(&self) {
        self.writes.with_label_values(&[FAILED]).inc();
    }

    pub fn delivered(&self) -> u64 {
        self.writes.with_label_values(&[DELIVERED]).get()
    }

    pub fn failed(&self) -> u64 {
        self.writes.with_label_values(&[FAILED]).get()
    }

    /// Zero until the first delivery.
    pub fn last_delivery(&self) -> i64 {
        self.last_delivery.get()
    }
}
