//! ---
//! pac_section: "03-device-source"
//! pac_subsection: "module"
//! pac_type: "source"
//! pac_scope: "code"
//! pac_description: "SWC heat-pump session, decoder and supervising source."
//! pac_version: "v0.1.0"
//! pac_owner: "tbd"
//! ---
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

/// Prometheus counters describing session churn and output volume.
#[derive(Clone)]
pub struct SourceMetrics {
    generations: IntCounter,
    failures: IntCounterVec,
    emitted: IntCounter,
    decode_failures: IntCounter,
}

impl SourceMetrics {
    /// Register the source counters on `registry`.
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let generations = IntCounter::with_opts(Opts::new(
            "pacmon_session_generations_total",
            "Number of device sessions started by the supervising source",
        ))?;
        registry.register(Box::new(generations.clone()))?;

        let failures = IntCounterVec::new(
            Opts::new(
                "pacmon_session_failures_total",
                "Fatal session errors reported to the supervising source",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(failures.clone()))?;

        let emitted = IntCounter::with_opts(Opts::new(
            "pacmon_measurements_emitted_total",
            "Measurements pushed onto the output stream",
        ))?;
        registry.register(Box::new(emitted.clone()))?;

        let decode_failures = IntCounter::with_opts(Opts::new(
            "pacmon_decode_failures_total",
            "Snapshot documents dropped because they could not be decoded",
        ))?;
        registry.register(Box::new(decode_failures.clone()))?;

        Ok(Self {
            generations,
            failures,
            emitted,
            decode_failures,
        })
    }

    pub(crate) fn inc_generation(&self) {
        self.generations.inc();
    }

    pub(crate) fn inc_failure(&self, kind: &str) {
        self.failures.with_label_values(&[kind]).inc();
    }

    pub(crate) fn inc_emitted(&self) {
        self.emitted.inc();
    }

    pub(crate) fn inc_decode_failure(&self) {
        self.decode_failures.inc();
    }

    /// Sessions started so far.
    pub fn generations(&self) -> u64 {
        self.generations.get()
    }

    /// Fatal errors recorded for `kind`.
    pub fn failures(&self, kind: &str) -> u64 {
        self.failures.with_label_values(&[kind]).get()
    }

    /// Measurements emitted so far.
    pub fn emitted(&self) -> u64 {
        self.emitted.get()
    }

    /// Documents dropped by the decoder.
    pub fn decode_failures(&self) -> u64 {
        self.decode_failures.get()
    }
}
