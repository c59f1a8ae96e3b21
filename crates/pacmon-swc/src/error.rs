//! ---
//! pac_section: "03-device-source"
//! pac_subsection: "module"
//! pac_type: "source"
//! pac_scope: "code"
//! pac_description: "SWC heat-pump session, decoder and supervising source."
//! pac_version: "v0.1.0"
//! pac_owner: "tbd"
//! ---
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

/// Invalid source configuration. Fatal at construction and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The endpoint could not be parsed as a URL.
    #[error("endpoint '{endpoint}' is not a valid URL: {reason}")]
    InvalidEndpoint {
        /// Endpoint as supplied.
        endpoint: String,
        /// Parser diagnostic.
        reason: String,
    },
    /// The endpoint parsed but does not use the WebSocket scheme.
    #[error("endpoint '{endpoint}' must be a ws:// WebSocket URL")]
    UnsupportedScheme {
        /// Endpoint as supplied.
        endpoint: String,
    },
    /// The requested sub-protocol cannot be sent as a header value.
    #[error("sub-protocol '{0}' is not a valid header value")]
    InvalidSubprotocol(String),
    /// The measurement channel needs at least one slot.
    #[error("measurement channel capacity must be greater than zero")]
    ZeroCapacity,
}

/// The device answered the login with something the session cannot use.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The login banner did not contain the snapshot resource token.
    #[error("login response does not contain a resource token")]
    UnexpectedLoginResponse,
}

/// Read or write failure on an established connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Receiving the next message failed.
    #[error("error while reading device message: {0}")]
    Read(#[source] WsError),
    /// Sending a command failed.
    #[error("error while sending {command}: {source}")]
    Write {
        /// Command verb that could not be sent.
        command: &'static str,
        /// Underlying WebSocket error.
        #[source]
        source: WsError,
    },
    /// The device closed the connection.
    #[error("connection closed by device")]
    Closed,
}

/// Fatal error ending one session generation.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The WebSocket handshake could not be completed.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        /// Endpoint the session dialled.
        endpoint: String,
        /// Underlying WebSocket error.
        #[source]
        source: WsError,
    },
    /// Login handshake failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The link broke mid-session.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Every consumer of the measurement stream is gone.
    #[error("measurement stream closed by consumer")]
    StreamClosed,
    /// One of the session activities stopped without reporting an error.
    #[error("session activity stopped unexpectedly: {0}")]
    Aborted(String),
}

impl SessionError {
    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::Connect { .. } => "connect",
            SessionError::Protocol(_) => "protocol",
            SessionError::Transport(TransportError::Read(_)) => "read",
            SessionError::Transport(TransportError::Write { .. }) => "write",
            SessionError::Transport(TransportError::Closed) => "closed",
            SessionError::StreamClosed => "stream_closed",
            SessionError::Aborted(_) => "aborted",
        }
    }
}

/// A snapshot document that could not be decoded. The message is dropped and the session
/// continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The document is not well-formed or is not rooted at `<values>`.
    #[error("malformed snapshot document: {0}")]
    MalformedDocument(String),
}

/// A single reading could not be parsed. The field falls back to `0.0`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to convert '{raw}' to a temperature")]
pub struct FieldParseError {
    /// Value as received from the device.
    pub raw: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(
            SessionError::from(ProtocolError::UnexpectedLoginResponse).kind(),
            "protocol"
        );
        assert_eq!(SessionError::from(TransportError::Closed).kind(), "closed");
        assert_eq!(SessionError::StreamClosed.kind(), "stream_closed");
    }

    #[test]
    fn transparent_errors_keep_their_message() {
        let err = SessionError::from(ProtocolError::UnexpectedLoginResponse);
        assert_eq!(
            err.to_string(),
            "login response does not contain a resource token"
        );
    }
}
