//! Streaming transport: persistent WebSocket session to the sensor node.
//!
//! The device pushes one telemetry frame per second over a WebSocket server on a fixed
//! port. Opening and closing the session emit connection events to subscribers; each
//! inbound text frame is decoded and normalized into a sample. A frame that fails to
//! decode is logged and dropped; the session itself stays up.
//!
//! The client never re-dials on its own after a close; retry timing belongs to the
//! caller. The one exception is an address change while a session is active, which
//! tears the session down and re-establishes it against the new address exactly once.

use std::sync::{Arc, RwLock};

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{info, warn};

use super::LinkError;
use crate::model::{ConnectionState, DeviceCommand, MonitorEvent};
use crate::validate;

/// Port the device's WebSocket server listens on.
pub const DEVICE_WS_PORT: u16 = 81;

const OUTBOUND_BUFFER: usize = 8;

/// Client owning the one live streaming session to the device.
pub struct StreamClient {
    events: broadcast::Sender<MonitorEvent>,
    state: Arc<RwLock<ConnectionState>>,
    conn: tokio::sync::Mutex<Option<ActiveConnection>>,
    port: u16,
}

struct ActiveConnection {
    address: String,
    outbound: mpsc::Sender<Message>,
    session: JoinHandle<()>,
}

impl ActiveConnection {
    /// Shut the session down and wait for it to emit its disconnect event.
    async fn close(self) {
        drop(self.outbound);
        let _ = self.session.await;
    }
}

impl StreamClient {
    /// Create a client publishing into the given event channel.
    pub fn new(events: broadcast::Sender<MonitorEvent>) -> Self {
        Self::with_port(events, DEVICE_WS_PORT)
    }

    /// Create a client that dials a custom port (for testing).
    pub fn with_port(events: broadcast::Sender<MonitorEvent>, port: u16) -> Self {
        Self {
            events,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            conn: tokio::sync::Mutex::new(None),
            port,
        }
    }

    /// Current link state.
    pub fn state(&self) -> ConnectionState {
        *self
            .state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Address of the active session, if one is up.
    pub async fn connected_address(&self) -> Option<String> {
        self.conn.lock().await.as_ref().map(|c| c.address.clone())
    }

    /// Open a streaming session to the device.
    ///
    /// Any existing session is closed first. On success the state is `Connected` and
    /// a connection event has been published; on failure the state is `Failed` and the
    /// error is returned for the caller to schedule a retry.
    pub async fn connect(&self, address: &str) -> Result<(), LinkError> {
        self.set_state(ConnectionState::Connecting);
        self.establish(address).await
    }

    /// React to a device address change.
    ///
    /// If a session is active, performs one disconnect-then-reconnect cycle against
    /// the new address. With no active session this is a no-op; the next `connect`
    /// picks the new address up from configuration.
    pub async fn change_address(&self, address: &str) -> Result<(), LinkError> {
        if self.state() != ConnectionState::Connected {
            return Ok(());
        }
        self.set_state(ConnectionState::Reconnecting);
        self.establish(address).await
    }

    async fn establish(&self, address: &str) -> Result<(), LinkError> {
        let mut conn = self.conn.lock().await;

        // Emits the disconnect event before the new dial starts.
        if let Some(active) = conn.take() {
            active.close().await;
        }

        let url = format!("ws://{}:{}", address, self.port);
        let (socket, _) = match connect_async(url.as_str()).await {
            Ok(established) => established,
            Err(e) => {
                self.set_state(ConnectionState::Failed);
                warn!(%url, error = %e, "sensor stream dial failed");
                return Err(e.into());
            }
        };

        self.set_state(ConnectionState::Connected);
        let _ = self.events.send(MonitorEvent::ConnectionChanged(true));
        info!(%url, "sensor stream connected");

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let session = tokio::spawn(run_session(
            socket,
            outbound_rx,
            self.events.clone(),
            Arc::clone(&self.state),
        ));

        *conn = Some(ActiveConnection {
            address: address.to_string(),
            outbound: outbound_tx,
            session,
        });

        Ok(())
    }

    /// Close the active session, if any. The disconnect event has been published by
    /// the time this returns.
    pub async fn disconnect(&self) {
        if let Some(active) = self.conn.lock().await.take() {
            active.close().await;
        }
    }

    /// Send a command to the device over the active session.
    pub async fn send_command(&self, command: DeviceCommand) -> Result<(), LinkError> {
        let conn = self.conn.lock().await;
        let active = conn.as_ref().ok_or(LinkError::NotConnected)?;
        active
            .outbound
            .send(Message::text(command.wire_text()))
            .await
            .map_err(|_| LinkError::NotConnected)
    }

    fn set_state(&self, next: ConnectionState) {
        set_state_shared(&self.state, next);
    }
}

async fn run_session(
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut outbound: mpsc::Receiver<Message>,
    events: broadcast::Sender<MonitorEvent>,
    state: Arc<RwLock<ConnectionState>>,
) {
    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            inbound = read.next() => match inbound {
                Some(Ok(Message::Text(text))) => handle_frame(&text, &events),
                Some(Ok(Message::Close(_))) | None => break,
                // Ping/pong is answered by the protocol layer; binary frames carry
                // no telemetry.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "sensor stream read failed");
                    break;
                }
            },
            command = outbound.recv() => match command {
                Some(message) => {
                    if write.send(message).await.is_err() {
                        break;
                    }
                }
                // The client dropped its handle: orderly local shutdown.
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            },
        }
    }

    set_state_shared(&state, ConnectionState::Disconnected);
    let _ = events.send(MonitorEvent::ConnectionChanged(false));
    info!("sensor stream disconnected");
}

/// Decode and publish one inbound frame. Malformed frames are dropped without
/// touching the connection.
fn handle_frame(text: &str, events: &broadcast::Sender<MonitorEvent>) {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(raw) => {
            let sample = validate::normalize(&raw, Utc::now());
            let _ = events.send(MonitorEvent::Sample(sample));
        }
        Err(e) => warn!(error = %e, "discarding malformed telemetry frame"),
    }
}

fn set_state_shared(state: &RwLock<ConnectionState>, next: ConnectionState) {
    *state
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner) = next;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_frame_publishes_normalized_sample() {
        let (events, mut rx) = broadcast::channel(4);

        handle_frame(r#"{"bpm": 72.0, "spo2": -5.0, "temp": 36.4}"#, &events);

        match rx.try_recv().unwrap() {
            MonitorEvent::Sample(sample) => {
                assert_eq!(sample.heart_rate, 72.0);
                assert_eq!(sample.spo2, 0.0);
                assert_eq!(sample.temperature, 36.4);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_handle_frame_drops_malformed_payload() {
        let (events, mut rx) = broadcast::channel(4);

        handle_frame("{not json", &events);

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_new_client_starts_disconnected() {
        let (events, _rx) = broadcast::channel(4);
        let client = StreamClient::new(events);

        assert_eq!(client.state(), ConnectionState::Disconnected);
    }
}
