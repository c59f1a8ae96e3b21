//! ---
//! pac_section: "04-sink"
//! pac_subsection: "module"
//! pac_type: "source"
//! pac_scope: "code"
//! pac_description: "Measurement sinks and target selection."
//! pac_version: "v0.1.0"
//! pac_owner: "tbd"
//! ---
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use url::Url;

use crate::SinkError;

/// Where measurements go, parsed from a URL-like string.
///
/// * `log:` prints every measurement through tracing
/// * `memory:` keeps measurements in process
/// * `file:///var/lib/pacmon/measurements.jsonl` appends to a JSON-lines event log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    /// Tracing output.
    Log,
    /// In-memory buffer.
    Memory,
    /// Append-only JSON-lines file.
    EventLog(PathBuf),
}

impl FromStr for SinkTarget {
    type Err = SinkError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| SinkError::InvalidTarget {
            target: raw.to_owned(),
            reason,
        };
        let url = Url::parse(raw.trim()).map_err(|err| invalid(err.to_string()))?;
        match url.scheme() {
            "log" => Ok(SinkTarget::Log),
            "memory" => Ok(SinkTarget::Memory),
            "file" => url
                .to_file_path()
                .map(SinkTarget::EventLog)
                .map_err(|()| invalid("file target needs an absolute path".into())),
            other => Err(invalid(format!("unsupported scheme '{other}'"))),
        }
    }
}

impl fmt::Display for SinkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkTarget::Log => f.write_str("log:"),
            SinkTarget::Memory => f.write_str("memory:"),
            SinkTarget::EventLog(path) => write!(f, "file://{}", path.display()),
        }
    }
}
