//! ---
//! pac_section: "03-device-source"
//! pac_subsection: "module"
//! pac_type: "source"
//! pac_scope: "code"
//! pac_description: "SWC heat-pump session, decoder and supervising source."
//! pac_version: "v0.1.0"
//! pac_owner: "tbd"
//! ---
//! One connect → login → poll lifecycle against a control unit.
//!
//! After the snapshot request the session splits the connection: a reader task decodes
//! pushed documents and a poller task sends `REFRESH` on a fixed cadence. The first of the
//! two to fail ends the session; the other one is aborted and awaited and the connection
//! dropped, so a generation reports exactly one error and emits nothing after it.
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use pacmon_msg::MeasurementSender;
use tokio::net::TcpStream;
use tokio::task::JoinError;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use crate::config::{ResourceSelector, SessionConfig};
use crate::decoder::decode;
use crate::error::{SessionError, TransportError};
use crate::metrics::SourceMetrics;
use crate::protocol::{self, REFRESH};
use crate::task::TaskGuard;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

/// A session generation that can be driven to its first fatal error.
#[async_trait]
pub trait DeviceSession: Send {
    /// Run until the session dies and hand back the error that killed it.
    async fn start_and_emit(self: Box<Self>) -> SessionError;
}

/// Lifecycle of a session generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Opening the WebSocket.
    Connecting,
    /// `LOGIN` sent, waiting for the banner.
    Authenticating,
    /// Sending the snapshot request.
    Requesting,
    /// Reader and poller running.
    Polling,
    /// Dead; no further I/O.
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Connecting => "connecting",
            SessionState::Authenticating => "authenticating",
            SessionState::Requesting => "requesting",
            SessionState::Polling => "polling",
            SessionState::Terminated => "terminated",
        };
        f.write_str(label)
    }
}

/// Production session speaking the SWC text protocol over WebSocket.
pub struct SwcSession {
    config: Arc<SessionConfig>,
    generation: u64,
    measurements: MeasurementSender,
    metrics: Option<SourceMetrics>,
    state: SessionState,
}

impl SwcSession {
    /// Build a session that emits onto `measurements`.
    pub fn new(config: Arc<SessionConfig>, generation: u64, measurements: MeasurementSender) -> Self {
        Self {
            config,
            generation,
            measurements,
            metrics: None,
            state: SessionState::Connecting,
        }
    }

    /// Record emitted measurements and decode failures on `metrics`.
    pub fn with_metrics(mut self, metrics: SourceMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Generation number assigned by the owning source.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drive the session until its first fatal error.
    pub async fn run(mut self) -> SessionError {
        let err = match self.establish().await {
            Ok((writer, reader)) => self.poll(writer, reader).await,
            Err(err) => err,
        };
        self.transition(SessionState::Terminated);
        err
    }

    async fn establish(&mut self) -> Result<(WsWriter, WsReader), SessionError> {
        self.transition(SessionState::Connecting);
        let stream = self.connect().await?;
        let (mut writer, mut reader) = stream.split();

        self.transition(SessionState::Authenticating);
        send(&mut writer, "LOGIN", protocol::login_command(self.config.pin())).await?;
        let banner = next_text(&mut reader).await?;
        let resource = match self.config.resource() {
            ResourceSelector::Discover => protocol::discover_resource_token(&banner)?,
            ResourceSelector::Fixed(id) => id.clone(),
        };

        self.transition(SessionState::Requesting);
        debug!(generation = self.generation, resource = %resource, "requesting snapshot");
        send(&mut writer, "GET", protocol::get_command(&resource)).await?;

        Ok((writer, reader))
    }

    async fn connect(&self) -> Result<WsStream, SessionError> {
        let endpoint = self.config.endpoint();
        let connect_error = |source: WsError| SessionError::Connect {
            endpoint: endpoint.to_owned(),
            source,
        };
        let mut request = endpoint.into_client_request().map_err(connect_error)?;
        if let Some(protocol) = self.config.subprotocol() {
            request
                .headers_mut()
                .insert(SEC_WEBSOCKET_PROTOCOL, protocol.clone());
        }
        let (stream, _response) = connect_async(request).await.map_err(connect_error)?;
        info!(generation = self.generation, endpoint, "connected to heat pump");
        Ok(stream)
    }

    async fn poll(&mut self, writer: WsWriter, reader: WsReader) -> SessionError {
        self.transition(SessionState::Polling);
        let mut reader = TaskGuard::spawn(read_loop(
            reader,
            self.measurements.clone(),
            self.metrics.clone(),
            self.generation,
        ));
        let mut poller = TaskGuard::spawn(poll_loop(writer, self.config.poll_interval()));

        let error = tokio::select! {
            result = reader.join() => flatten("reader", result),
            result = poller.join() => flatten("poller", result),
        };
        // The survivor must be gone before the error is reported, so nothing is emitted after it.
        reader.stop().await;
        poller.stop().await;
        error
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!(generation = self.generation, from = %self.state, to = %next, "session state change");
            self.state = next;
        }
    }
}

#[async_trait]
impl DeviceSession for SwcSession {
    async fn start_and_emit(self: Box<Self>) -> SessionError {
        self.run().await
    }
}

impl fmt::Debug for SwcSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwcSession")
            .field("config", &self.config)
            .field("generation", &self.generation)
            .field("state", &self.state)
            .finish()
    }
}

fn flatten(activity: &str, result: Result<SessionError, JoinError>) -> SessionError {
    result.unwrap_or_else(|err| SessionError::Aborted(format!("{activity} task: {err}")))
}

async fn send(
    writer: &mut WsWriter,
    command: &'static str,
    text: String,
) -> Result<(), SessionError> {
    writer
        .send(Message::Text(text))
        .await
        .map_err(|source| TransportError::Write { command, source }.into())
}

/// Next data frame as text. Control frames are skipped.
async fn next_text(reader: &mut WsReader) -> Result<String, SessionError> {
    loop {
        match next_message(reader).await? {
            Message::Text(text) => return Ok(text),
            Message::Binary(bytes) => return Ok(String::from_utf8_lossy(&bytes).into_owned()),
            _ => continue,
        }
    }
}

async fn next_message(reader: &mut WsReader) -> Result<Message, TransportError> {
    match reader.next().await {
        Some(Ok(Message::Close(frame))) => {
            debug!(?frame, "device sent close frame");
            Err(TransportError::Closed)
        }
        Some(Ok(message)) => Ok(message),
        Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
            Err(TransportError::Closed)
        }
        Some(Err(err)) => Err(TransportError::Read(err)),
    }
}

async fn read_loop(
    mut reader: WsReader,
    measurements: MeasurementSender,
    metrics: Option<SourceMetrics>,
    generation: u64,
) -> SessionError {
    loop {
        let message = match next_message(&mut reader).await {
            Ok(message) => message,
            Err(err) => return err.into(),
        };
        let payload: &[u8] = match &message {
            Message::Text(text) => text.as_bytes(),
            Message::Binary(bytes) => bytes.as_slice(),
            _ => continue,
        };
        if !protocol::is_snapshot(payload) {
            trace!(generation, len = payload.len(), "ignoring non-snapshot message");
            continue;
        }

        let snapshot = match decode(payload) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(generation, error = %err, "dropping undecodable snapshot");
                if let Some(metrics) = &metrics {
                    metrics.inc_decode_failure();
                }
                continue;
            }
        };
        let measurement = match snapshot.to_measurement(Utc::now()) {
            Ok(measurement) => measurement,
            Err(err) => {
                warn!(generation, error = %err, "failed to encode measurement payload");
                continue;
            }
        };

        if measurements.send(measurement).await.is_err() {
            return SessionError::StreamClosed;
        }
        if let Some(metrics) = &metrics {
            metrics.inc_emitted();
        }
    }
}

async fn poll_loop(mut writer: WsWriter, interval: Duration) -> SessionError {
    loop {
        tokio::time::sleep(interval).await;
        if let Err(source) = writer.send(Message::Text(REFRESH.to_owned())).await {
            return TransportError::Write {
                command: REFRESH,
                source,
            }
            .into();
        }
        trace!("refresh sent");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacmon_common::config::SourceSettings;
    use pacmon_msg::measurement_channel;
    use pacmon_testharness::{HeatPumpScript, MockHeatPump};

    #[test]
    fn new_session_starts_connecting() {
        let config = Arc::new(
            SessionConfig::try_from(&SourceSettings::for_endpoint("ws://127.0.0.1:1/")).unwrap(),
        );
        let (tx, _stream) = measurement_channel(1);
        let session = SwcSession::new(config, 3, tx);
        assert_eq!(session.state(), SessionState::Connecting);
        assert_eq!(session.generation(), 3);
        assert_eq!(SessionState::Terminated.to_string(), "terminated");
    }

    #[tokio::test]
    async fn refused_connection_is_a_connect_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = Arc::new(
            SessionConfig::try_from(&SourceSettings::for_endpoint(format!("ws://{addr}/")))
                .unwrap(),
        );
        let (tx, _stream) = measurement_channel(1);
        let err = SwcSession::new(config, 1, tx).run().await;
        assert!(matches!(err, SessionError::Connect { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn failed_refresh_write_ends_the_poller() {
        let pump = MockHeatPump::spawn(HeatPumpScript::default()).await.unwrap();
        let (stream, _response) = connect_async(pump.url()).await.unwrap();
        let (mut writer, _reader) = stream.split();
        // Once a close frame is out the socket refuses further frames.
        writer.send(Message::Close(None)).await.unwrap();

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            poll_loop(writer, Duration::from_millis(10)),
        )
        .await
        .unwrap();
        assert!(
            matches!(
                err,
                SessionError::Transport(TransportError::Write { command: REFRESH, .. })
            ),
            "{err:?}"
        );
        assert_eq!(err.kind(), "write");
        pump.shutdown().await;
    }
}
