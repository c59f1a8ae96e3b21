//! ---
//! pac_section: "01-core-functionality"
//! pac_subsection: "module"
//! pac_type: "source"
//! pac_scope: "code"
//! pac_description: "Shared primitives and utilities for the collector runtime."
//! pac_version: "v0.1.0"
//! pac_owner: "tbd"
//! ---
//! Shared primitives for the pacmon workspace: configuration loading and
//! tracing initialisation.

pub mod config;
pub mod logging;

pub use config::{
    AppConfig, LoadedAppConfig, LoggingConfig, MetricsConfig, SinkSettings, SourceSettings,
};
pub use logging::{init_tracing, LogFormat};
