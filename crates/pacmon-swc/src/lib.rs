//! ---
//! pac_section: "03-device-source"
//! pac_subsection: "module"
//! pac_type: "source"
//! pac_scope: "code"
//! pac_description: "SWC heat-pump session, decoder and supervising source."
//! pac_version: "v0.1.0"
//! pac_owner: "tbd"
//! ---
//! Client side of the SWC (Luxtronik) heat-pump WebSocket protocol.
//!
//! A [`SupervisedSource`] owns one [`DeviceSession`] at a time. Each session connects,
//! logs in, requests the temperature snapshot and then polls with `REFRESH` until its
//! first fatal error, at which point the source discards it and starts a fresh
//! generation. Measurements from every generation land on the same
//! [`pacmon_msg::MeasurementStream`].
#![warn(missing_docs)]

pub mod config;
pub mod decoder;
pub mod error;
pub mod factory;
pub mod metrics;
pub mod mock;
pub mod protocol;
pub mod session;
pub mod source;
mod task;

pub use config::{ResourceSelector, SessionConfig, DEFAULT_POLL_INTERVAL};
pub use decoder::{decode, TemperatureField, TemperatureSnapshot};
pub use error::{
    ConfigError, DecodeError, FieldParseError, ProtocolError, SessionError, TransportError,
};
pub use factory::{SessionFactory, SwcSessionFactory};
pub use metrics::SourceMetrics;
pub use mock::{ScriptedSessionFactory, SessionScript};
pub use session::{DeviceSession, SessionState, SwcSession};
pub use source::{SourceHandle, SupervisedSource};
