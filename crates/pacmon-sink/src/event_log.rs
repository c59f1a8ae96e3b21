//! ---
//! pac_section: "04-sink"
//! pac_subsection: "module"
//! pac_type: "source"
//! pac_scope: "code"
//! pac_description: "Measurement sinks and target selection."
//! pac_version: "v0.1.0"
//! pac_owner: "tbd"
//! ---
//! Append-only JSON-lines event log.
//!
//! The first line is a header; every following line is one [`EventLogEntry`]. Sequence
//! numbers continue across reopen.
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pacmon_msg::Measurement;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::{Result, Sink};

const EVENT_LOG_VERSION: u16 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EventLogHeader {
    version: u16,
    created_at: DateTime<Utc>,
}

/// One published measurement as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogEntry {
    /// Sequential identifier assigned when appending, starting at 1.
    pub sequence: u64,
    /// Topic the measurement was published under.
    pub topic: String,
    /// Routing key; the measurement type name.
    pub key: String,
    /// Time the reading was received from the device.
    pub timestamp: DateTime<Utc>,
    /// Measurement payload. JSON payloads are embedded as-is, anything else as a string.
    pub payload: serde_json::Value,
}

/// Append target; a failed append is rolled back to the last complete line.
trait LogFile: Write + Send {
    fn commit(&mut self) -> io::Result<()>;
    fn rollback(&mut self, len: u64) -> io::Result<()>;
}

impl LogFile for File {
    fn commit(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn rollback(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

struct Writer {
    file: Box<dyn LogFile>,
    len: u64,
    next_sequence: u64,
}

impl Writer {
    fn append_line(&mut self, line: &[u8]) -> io::Result<()> {
        let written = self.file.write_all(line).and_then(|()| self.file.commit());
        match written {
            Ok(()) => {
                self.len += line.len() as u64;
                Ok(())
            }
            Err(err) => {
                if let Err(rollback) = self.file.rollback(self.len) {
                    error!(
                        %rollback,
                        len = self.len,
                        "failed to truncate event log after a failed append"
                    );
                }
                Err(err)
            }
        }
    }
}

/// Sink appending measurements to a JSON-lines file.
pub struct EventLogSink {
    path: PathBuf,
    topic: String,
    inner: Mutex<Writer>,
}

impl EventLogSink {
    /// Open `path` for appending, writing a header if the file is new or empty.
    pub fn open(path: &Path, topic: impl Into<String>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let fresh = !path.exists() || fs::metadata(path)?.len() == 0;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();
        let mut writer = Writer {
            file: Box::new(file),
            len,
            next_sequence: 0,
        };

        if fresh {
            let header = EventLogHeader {
                version: EVENT_LOG_VERSION,
                created_at: Utc::now(),
            };
            let mut line = serde_json::to_vec(&header)?;
            line.push(b'\n');
            writer.append_line(&line)?;
        } else {
            writer.next_sequence = last_sequence(path)?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            topic: topic.into(),
            inner: Mutex::new(writer),
        })
    }

    /// File backing the sink.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, measurement: &Measurement) -> Result<u64> {
        let payload = serde_json::from_slice(measurement.payload()).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(measurement.payload()).into_owned())
        });

        let mut inner = self.inner.lock();
        let entry = EventLogEntry {
            sequence: inner.next_sequence + 1,
            topic: self.topic.clone(),
            key: measurement.measurement_type().as_str().to_owned(),
            timestamp: measurement.timestamp(),
            payload,
        };
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');
        inner.append_line(&line)?;
        inner.next_sequence = entry.sequence;
        Ok(entry.sequence)
    }
}

#[async_trait]
impl Sink for EventLogSink {
    async fn put(&self, measurement: &Measurement) -> Result<()> {
        self.append(measurement).map(|_| ())
    }

    fn name(&self) -> &'static str {
        "event_log"
    }
}

fn entries(path: &Path) -> Result<impl Iterator<Item = std::io::Result<String>>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(reader
        .lines()
        .skip(1)
        .filter(|line| !matches!(line, Ok(text) if text.trim().is_empty())))
}

fn last_sequence(path: &Path) -> Result<u64> {
    let mut last = 0;
    for line in entries(path)? {
        if let Ok(entry) = serde_json::from_str::<EventLogEntry>(&line?) {
            last = entry.sequence;
        }
    }
    Ok(last)
}

/// Read every entry of an event log, in order.
pub fn read_event_log(path: &Path) -> Result<Vec<EventLogEntry>> {
    entries(path)?
        .map(|line| -> Result<EventLogEntry> { Ok(serde_json::from_str(&line?)?) })
        .collect()
}
