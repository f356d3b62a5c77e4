//! Transports for talking to the sensor node.
//!
//! The link owns the only live transport to the device and runs in one of two modes:
//!
//! - [`stream`]: persistent WebSocket session for continuous telemetry
//! - [`probe`]: on-demand HTTP requests used as a connectivity fallback
//!
//! Failures stay local. Malformed stream frames are dropped without closing the
//! connection, probe attempts retry up to a fixed cap, and exhausted retries surface
//! as a plain failure value; nothing here aborts the process.

pub mod probe;
pub mod stream;

pub use probe::ProbeClient;
pub use stream::StreamClient;

/// Errors raised inside the link layer.
///
/// These never cross the component boundary as-is on recoverable paths; they are
/// logged and collapsed into sentinel results (`false`, `None`). Callers see a
/// `LinkError` only where they own the retry policy, such as a streaming dial.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// The request could not be completed (timeout, refused, reset).
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// The device answered with something other than 200 OK.
    #[error("unexpected status {0}")]
    UnexpectedStatus(reqwest::StatusCode),

    /// The response body was not a complete telemetry payload.
    #[error("invalid telemetry payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    /// The streaming transport failed to dial or write.
    #[error("websocket failure: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// An operation that needs a live streaming session found none.
    #[error("no active sensor connection")]
    NotConnected,
}
