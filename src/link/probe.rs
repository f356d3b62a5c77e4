//! Probing transport: on-demand HTTP requests against the sensor node.
//!
//! The device exposes two plain HTTP endpoints next to its streaming port:
//! `GET /connect` answers 200 when the node is reachable, and `GET /data` returns one
//! telemetry payload. Both are bounded by a fixed timeout. The reachability probe
//! retries a fixed number of times and is single-flight: a connect attempt that is
//! already running causes concurrent calls to return immediately instead of issuing a
//! duplicate request.

use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

use super::LinkError;
use crate::model::TelemetryFrame;

/// Upper bound for any single probe request.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Retries after the initial reachability attempt before reporting failure.
pub const MAX_CONNECT_RETRIES: u32 = 3;

/// Pause between reachability attempts.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Client for the device's request/response endpoints.
pub struct ProbeClient {
    http: reqwest::Client,
    base_url: RwLock<String>,
    retry_delay: Duration,
    in_flight: AtomicBool,
}

impl ProbeClient {
    /// Create a probe client for a device address (host or host:port).
    pub fn new(address: &str) -> Self {
        Self::with_base_url(&format!("http://{address}"), RETRY_DELAY)
    }

    /// Create a probe client with a custom base URL and retry spacing (for testing).
    pub fn with_base_url(base_url: &str, retry_delay: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: RwLock::new(base_url.to_string()),
            retry_delay,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Point the client at a different device address.
    pub fn set_address(&self, address: &str) {
        *self
            .base_url
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = format!("http://{address}");
    }

    /// The base URL requests are currently issued against.
    pub fn base_url(&self) -> String {
        self.base_url
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Test whether the device is reachable.
    ///
    /// Retries up to [`MAX_CONNECT_RETRIES`] times on failure, then reports `false`;
    /// no further automatic retries happen after that. At most one attempt sequence
    /// runs at a time: while one is in flight, additional calls return `false`
    /// immediately without touching the network.
    pub async fn connect(&self) -> bool {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("reachability probe already in flight");
            return false;
        }

        let reachable = self.connect_with_retries().await;
        self.in_flight.store(false, Ordering::Release);
        reachable
    }

    async fn connect_with_retries(&self) -> bool {
        for attempt in 0..=MAX_CONNECT_RETRIES {
            match self.probe_once().await {
                Ok(()) => return true,
                Err(e) => {
                    warn!(attempt, error = %e, "reachability probe failed");
                    if attempt < MAX_CONNECT_RETRIES {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }
        false
    }

    async fn probe_once(&self) -> Result<(), LinkError> {
        let url = format!("{}/connect", self.base_url());
        let response = self.http.get(&url).timeout(PROBE_TIMEOUT).send().await?;

        if response.status() == reqwest::StatusCode::OK {
            Ok(())
        } else {
            Err(LinkError::UnexpectedStatus(response.status()))
        }
    }

    /// Fetch one telemetry payload on demand.
    ///
    /// Returns `None` on any transport error, non-200 status, or a body missing any of
    /// the three numeric fields. No retries; the caller decides whether to ask again.
    pub async fn fetch_sample(&self) -> Option<TelemetryFrame> {
        match self.fetch_once().await {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!(error = %e, "telemetry fetch failed");
                None
            }
        }
    }

    async fn fetch_once(&self) -> Result<TelemetryFrame, LinkError> {
        let url = format!("{}/data", self.base_url());
        let response = self.http.get(&url).timeout(PROBE_TIMEOUT).send().await?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(LinkError::UnexpectedStatus(response.status()));
        }

        // Decode by hand so an incomplete body is classified as an invalid payload
        // rather than a transport failure.
        let body = response.text().await?;
        let frame: TelemetryFrame = serde_json::from_str(&body)?;
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_from_address() {
        let probe = ProbeClient::new("192.168.42.78");
        assert_eq!(probe.base_url(), "http://192.168.42.78");
    }

    #[test]
    fn test_set_address_rewrites_base_url() {
        let probe = ProbeClient::new("192.168.42.78");
        probe.set_address("10.0.0.9");
        assert_eq!(probe.base_url(), "http://10.0.0.9");
    }
}
