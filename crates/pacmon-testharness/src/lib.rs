//! ---
//! pac_section: "09-testing"
//! pac_subsection: "harness"
//! pac_type: "source"
//! pac_scope: "code"
//! pac_description: "Mock heat pump speaking the SWC WebSocket protocol."
//! pac_version: "v0.1.0"
//! pac_owner: "tbd"
//! ---
//! A scriptable stand-in for an SWC control unit.
//!
//! The server answers `LOGIN;<pin>` with a navigation banner, `GET;<id>` and `REFRESH`
//! with a `<values>` document, and records every command it receives. A requested
//! `Sec-WebSocket-Protocol` is echoed back the way the firmware does.
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

/// Resource token advertised by [`LOGIN_BANNER`].
pub const BANNER_RESOURCE: &str = "0x46bd50";

/// Login banner as sent by firmware that expects token discovery.
pub const LOGIN_BANNER: &str = "<Navigation id='0x4c5a88'>\
<item id='0x46a1c0'><name>Informationen</name>\
<item id='0x46bd50'><name>Temperaturen</name></item>\
<item id='0x46c4e8'><name>Eingaenge</name></item>\
<item id='0x46d2a0'><name>Ausgaenge</name></item>\
</item>\
<item id='0x46f1b8'><name>Einstellungen</name></item>\
</Navigation>";

/// Item ids and readings of the reference snapshot, in payload order.
pub const REFERENCE_READINGS: [(&str, &str); 9] = [
    ("0x45e1bc", "33.8"),
    ("0x45e1f4", "34.5"),
    ("0x45e2d4", "4.7"),
    ("0x45e344", "52.3"),
    ("0x45e37c", "52.0"),
    ("0x45e3b4", "11.0"),
    ("0x45e3ec", "11.2"),
    ("0x45e7a4", "21.1"),
    ("0x45e7dc", "21.0"),
];

/// Snapshot document carrying [`REFERENCE_READINGS`], plus an item the decoder ignores.
pub fn snapshot_document() -> String {
    let mut document = String::from("<values>");
    for (id, reading) in REFERENCE_READINGS {
        document.push_str(&format!(
            "<item id='{id}'><name>Temperatur</name><value>{reading}°C</value></item>"
        ));
    }
    document.push_str("<item id='0x45e8c4'><name>Betriebsstunden</name><value>1234h</value></item>");
    document.push_str("</values>");
    document
}

/// Behaviour of the mock for every connection it accepts.
#[derive(Debug, Clone)]
pub struct HeatPumpScript {
    /// Reply to `LOGIN;<pin>`.
    pub login_response: String,
    /// Document pushed after `GET` and each `REFRESH`.
    pub snapshot: String,
    /// Push a snapshot in reply to `GET`.
    pub reply_to_get: bool,
    /// Close the connection as soon as `GET` arrives.
    pub close_after_get: bool,
    /// Drop the socket without a close frame once this many refreshes were served.
    pub refreshes_before_drop: Option<usize>,
}

impl Default for HeatPumpScript {
    fn default() -> Self {
        Self {
            login_response: LOGIN_BANNER.to_owned(),
            snapshot: snapshot_document(),
            reply_to_get: true,
            close_after_get: false,
            refreshes_before_drop: None,
        }
    }
}

#[derive(Default)]
struct Recorder {
    commands: Mutex<Vec<String>>,
    connections: AtomicUsize,
    subprotocols: Mutex<Vec<Option<String>>>,
}

/// Running mock heat pump bound to a local ephemeral port.
pub struct MockHeatPump {
    addr: SocketAddr,
    recorder: Arc<Recorder>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MockHeatPump {
    /// Bind to `127.0.0.1:0` and serve `script` to every client.
    pub async fn spawn(script: HeatPumpScript) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind mock heat pump")?;
        let addr = listener.local_addr()?;
        let recorder = Arc::new(Recorder::default());
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let script = Arc::new(script);
        let task = tokio::spawn({
            let recorder = recorder.clone();
            async move {
                let mut connections = JoinSet::new();
                loop {
                    tokio::select! {
                        accepted = listener.accept() => match accepted {
                            Ok((stream, peer)) => {
                                debug!(%peer, "mock heat pump accepted connection");
                                connections.spawn(serve_connection(
                                    stream,
                                    script.clone(),
                                    recorder.clone(),
                                ));
                            }
                            Err(err) => warn!(error = %err, "mock heat pump accept failed"),
                        },
                        _ = shutdown_rx.changed() => break,
                    }
                }
            }
        });

        Ok(Self {
            addr,
            recorder,
            shutdown,
            task,
        })
    }

    /// `ws://` URL clients should dial.
    pub fn url(&self) -> String {
        format!("ws://{}/", self.addr)
    }

    /// Bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Every text command received so far, across connections.
    pub fn commands(&self) -> Vec<String> {
        self.recorder.commands.lock().clone()
    }

    /// Number of completed WebSocket handshakes.
    pub fn connections(&self) -> usize {
        self.recorder.connections.load(Ordering::SeqCst)
    }

    /// `Sec-WebSocket-Protocol` requested by each client, in connection order.
    pub fn subprotocols(&self) -> Vec<Option<String>> {
        self.recorder.subprotocols.lock().clone()
    }

    /// Wait until at least `count` handshakes completed.
    pub async fn wait_for_connections(&self, count: usize) {
        while self.connections() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Stop accepting and drop every open connection.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

async fn serve_connection(stream: TcpStream, script: Arc<HeatPumpScript>, recorder: Arc<Recorder>) {
    if let Err(err) = converse(stream, &script, &recorder).await {
        debug!(error = %err, "mock heat pump connection ended");
    }
}

async fn converse(stream: TcpStream, script: &HeatPumpScript, recorder: &Recorder) -> Result<()> {
    let mut requested = None;
    let echo_subprotocol = |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
        if let Some(protocol) = request.headers().get(SEC_WEBSOCKET_PROTOCOL) {
            requested = protocol.to_str().ok().map(str::to_owned);
            response
                .headers_mut()
                .insert(SEC_WEBSOCKET_PROTOCOL, protocol.clone());
        }
        Ok(response)
    };
    let mut socket = accept_hdr_async(stream, echo_subprotocol)
        .await
        .context("handshake failed")?;
    recorder.subprotocols.lock().push(requested);
    recorder.connections.fetch_add(1, Ordering::SeqCst);

    let mut refreshes = 0;
    while let Some(message) = socket.next().await {
        let command = match message? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        recorder.commands.lock().push(command.clone());

        if command.starts_with("LOGIN;") {
            socket.send(Message::Text(script.login_response.clone())).await?;
        } else if command.starts_with("GET;") {
            if script.close_after_get {
                socket.close(None).await?;
                break;
            }
            if script.reply_to_get {
                socket.send(Message::Text(script.snapshot.clone())).await?;
            }
        } else if command == "REFRESH" {
            if script.refreshes_before_drop == Some(refreshes) {
                // Abrupt drop: no close frame.
                return Ok(());
            }
            refreshes += 1;
            socket.send(Message::Text(script.snapshot.clone())).await?;
        }
    }
    Ok(())
}
