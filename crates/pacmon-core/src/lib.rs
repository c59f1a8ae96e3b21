//! ---
//! pac_section: "01-core-functionality"
//! pac_subsection: "module"
//! pac_type: "source"
//! pac_scope: "code"
//! pac_description: "Collector loop and its metrics."
//! pac_version: "v0.1.0"
//! pac_owner: "tbd"
//! ---
//! Glue between the measurement stream and a sink.

pub mod collector;
pub mod metrics;

pub use collector::{Collector, CollectorReport};
pub use metrics::CollectorMetrics;
