//! ---
//! pac_section: "02-messaging-data-model"
//! pac_subsection: "module"
//! pac_type: "source"
//! pac_scope: "code"
//! pac_description: "Measurement model and stream primitives."
//! pac_version: "v0.1.0"
//! pac_owner: "tbd"
//! ---
//! Measurement records produced by device sources and consumed by sinks, plus the
//! bounded stream that carries them between the two.
#![warn(missing_docs)]

pub mod stream;
pub mod types;

pub use stream::{measurement_channel, MeasurementSender, MeasurementStream, DEFAULT_CAPACITY};
pub use types::{Measurement, MeasurementType};
