//! Vitallink - resilient vital-sign telemetry core for a wearable sensor node.
//!
//! The binary wires one monitoring session together and logs its events: it probes
//! the device, opens the stream, and re-dials after a fixed delay whenever the link
//! drops. The core never re-dials on its own; reconnect timing lives here, with the
//! application.

use std::env;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use vitallink::config::ConfigStore;
use vitallink::model::MonitorEvent;
use vitallink::session::MonitorSession;

/// Default database path if not specified via environment variable.
const DEFAULT_DB_PATH: &str = "sqlite:vitallink.db?mode=rwc";

/// Pause before re-dialing after the stream drops or a dial fails.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing with environment filter
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("vitallink=info".parse()?))
        .init();

    // Load configuration from environment
    let db_url = env::var("VITALLINK_DATABASE_URL").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());

    let config = ConfigStore::new(&db_url).await?;

    // An address from the environment is persisted, so it survives restarts like one
    // set through the session API.
    if let Ok(address) = env::var("VITALLINK_DEVICE_ADDRESS") {
        config.set_device_address(&address).await?;
    }

    let address = config.device_address().await?;
    info!(db_url = %db_url, device = %address, "Starting Vitallink monitor");

    let session = MonitorSession::new(config).await?;
    let mut events = session.subscribe();

    if session.probe_device().await {
        info!("Device reachable");
    } else {
        warn!("Device unreachable; will keep trying the stream");
    }

    if let Err(e) = session.connect().await {
        warn!(error = %e, "Initial stream connect failed");
        tokio::time::sleep(RECONNECT_DELAY).await;
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(MonitorEvent::ConnectionChanged(true)) => {
                    info!("Connected to device");
                }
                Ok(MonitorEvent::ConnectionChanged(false)) => {
                    warn!(delay_secs = RECONNECT_DELAY.as_secs(), "Stream closed; reconnecting");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    if let Err(e) = session.connect().await {
                        warn!(error = %e, "Reconnect failed");
                    }
                }
                Ok(MonitorEvent::Sample(sample)) => {
                    info!(
                        heart_rate = sample.heart_rate,
                        spo2 = sample.spo2,
                        temperature = sample.temperature,
                        "Sample"
                    );
                }
                Ok(MonitorEvent::WindowFired(sample)) => {
                    info!(
                        heart_rate = sample.heart_rate,
                        spo2 = sample.spo2,
                        temperature = sample.temperature,
                        "Measurement window complete; report payload ready"
                    );
                }
                Ok(MonitorEvent::Alert(alert)) => {
                    warn!(kind = alert.kind.label(), message = %alert.message, "ALERT");
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Event loop lagged");
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    session.close().await;
    Ok(())
}
