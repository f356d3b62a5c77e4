//! Durable configuration and trigger-record storage.
//!
//! Two small pieces of state survive process restarts: the sensor node's network
//! address, and the payload of the most recent report trigger. Both live in a SQLite
//! database so a restarted session reconnects to the right device and can recover the
//! vitals its last report was generated from.

use chrono::DateTime;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::model::VitalSample;

/// Address used when none has been persisted yet.
pub const DEFAULT_DEVICE_ADDRESS: &str = "192.168.42.78";

const DEVICE_ADDRESS_KEY: &str = "device_address";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct ConfigStore {
    pool: SqlitePool,
}

impl ConfigStore {
    /// Create a new store and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:vitallink.db" or "sqlite::memory:")
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let store = Self { pool };
        store.initialize_schema().await?;

        Ok(store)
    }

    /// Create the database schema if it doesn't exist.
    async fn initialize_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS device_config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS report_triggers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                heart_rate REAL NOT NULL,
                spo2 REAL NOT NULL,
                temperature REAL NOT NULL,
                ts INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// The persisted device address, or [`DEFAULT_DEVICE_ADDRESS`] if none is stored.
    pub async fn device_address(&self) -> anyhow::Result<String> {
        let row = sqlx::query(
            r#"
            SELECT value FROM device_config WHERE key = ?
            "#,
        )
        .bind(DEVICE_ADDRESS_KEY)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row
            .map(|r| r.get("value"))
            .unwrap_or_else(|| DEFAULT_DEVICE_ADDRESS.to_string()))
    }

    /// Persist a new device address. No syntax validation is performed here; a
    /// malformed address surfaces as a connection failure in the link layer.
    pub async fn set_device_address(&self, address: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO device_config (key, value)
            VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(DEVICE_ADDRESS_KEY)
        .bind(address)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record the payload a completed measurement window fired with.
    pub async fn record_report_trigger(&self, sample: &VitalSample) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO report_triggers (heart_rate, spo2, temperature, ts)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(sample.heart_rate)
        .bind(sample.spo2)
        .bind(sample.temperature)
        .bind(sample.observed_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// The most recently recorded trigger payload, or `None` if no window has fired.
    pub async fn last_report_trigger(&self) -> anyhow::Result<Option<VitalSample>> {
        let row = sqlx::query(
            r#"
            SELECT heart_rate, spo2, temperature, ts
            FROM report_triggers
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| {
            let ts: i64 = r.get("ts");
            VitalSample {
                heart_rate: r.get("heart_rate"),
                spo2: r.get("spo2"),
                temperature: r.get("temperature"),
                observed_at: DateTime::from_timestamp(ts, 0).unwrap_or_default(),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_address_defaults_when_unset() {
        let store = ConfigStore::new("sqlite::memory:").await.unwrap();

        let address = store.device_address().await.unwrap();
        assert_eq!(address, DEFAULT_DEVICE_ADDRESS);
    }

    #[tokio::test]
    async fn test_address_roundtrip_and_overwrite() {
        let store = ConfigStore::new("sqlite::memory:").await.unwrap();

        store.set_device_address("10.0.0.7").await.unwrap();
        assert_eq!(store.device_address().await.unwrap(), "10.0.0.7");

        store.set_device_address("10.0.0.8").await.unwrap();
        assert_eq!(store.device_address().await.unwrap(), "10.0.0.8");
    }

    #[tokio::test]
    async fn test_report_trigger_roundtrip() {
        let store = ConfigStore::new("sqlite::memory:").await.unwrap();

        assert!(store.last_report_trigger().await.unwrap().is_none());

        let now = Utc::now();
        let sample = VitalSample {
            heart_rate: 71.0,
            spo2: 96.0,
            temperature: 36.4,
            observed_at: now,
        };
        store.record_report_trigger(&sample).await.unwrap();

        let last = store.last_report_trigger().await.unwrap().unwrap();
        assert_eq!(last.heart_rate, 71.0);
        assert_eq!(last.observed_at.timestamp(), now.timestamp());
    }

    #[tokio::test]
    async fn test_last_report_trigger_returns_latest() {
        let store = ConfigStore::new("sqlite::memory:").await.unwrap();

        for bpm in [70.0, 72.0, 74.0] {
            let sample = VitalSample {
                heart_rate: bpm,
                spo2: 96.0,
                temperature: 36.4,
                observed_at: Utc::now(),
            };
            store.record_report_trigger(&sample).await.unwrap();
        }

        let last = store.last_report_trigger().await.unwrap().unwrap();
        assert_eq!(last.heart_rate, 74.0);
    }
}
