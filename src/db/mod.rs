pub mod models;

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    types::Json,
    PgPool,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    ambient::models::{Device, Reading},
    config::DatabaseConfig,
};

use self::models::{InsertedRecord, Measurements, StoredRecord, RAW_PAYLOAD_VERSION};

const MAX_CONNECTIONS: u32 = 10;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(2);
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .database(&config.database)
        .username(&config.user)
        .password(&config.password);

    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .idle_timeout(IDLE_TIMEOUT)
        .connect_with(options)
        .await
        .with_context(|| {
            format!(
                "failed to connect to Postgres at {}:{}/{}",
                config.host, config.port, config.database
            )
        })?;
    Ok(pool)
}

/// Apply the embedded schema. Safe to run on every start.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("failed to apply database schema")?;
    Ok(())
}

pub async fn close(pool: &PgPool) {
    pool.close().await;
    info!("Database connections closed");
}

// ---------------------------------------------------------------------------
// ReadingStore
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid reading: {0}")]
    InvalidReading(String),
}

/// Append-only store of weather readings.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Write one record. Identical input written twice yields two records.
    async fn insert(&self, device: &Device, reading: &Reading)
        -> Result<InsertedRecord, StoreError>;

    /// Record with the newest acquisition timestamp across all devices.
    async fn latest(&self) -> Result<Option<StoredRecord>, StoreError>;

    /// Record with the newest acquisition timestamp for one device.
    async fn latest_for_device(&self, mac_address: &str)
        -> Result<Option<StoredRecord>, StoreError>;
}

#[derive(Debug, Clone)]
pub struct PgReadingStore {
    pool: PgPool,
}

impl PgReadingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SELECT_RECORD: &str = r#"
    SELECT id, mac_address, device_name, device_location,
           dateutc, date, created_at,
           winddir, windspeedmph, windgustmph, maxdailygust, windgustdir,
           winddir_avg2m, windspdmph_avg2m, winddir_avg10m, windspdmph_avg10m,
           tempf, tempinf, feelslike, dewpoint,
           humidity, humidityin,
           baromrelin, baromabsin,
           hourlyrainin, dailyrainin, weeklyrainin, monthlyrainin, yearlyrainin,
           solarradiation, uv,
           payload_version, raw_data
    FROM weather_data
"#;

#[async_trait]
impl ReadingStore for PgReadingStore {
    async fn insert(
        &self,
        device: &Device,
        reading: &Reading,
    ) -> Result<InsertedRecord, StoreError> {
        let dateutc = reading.dateutc().ok_or_else(|| {
            StoreError::InvalidReading(format!(
                "reading for device {} has no numeric dateutc",
                device.mac_address
            ))
        })?;
        let m = Measurements::project(reading);

        let record = sqlx::query_as::<_, InsertedRecord>(
            r#"
            INSERT INTO weather_data (
                mac_address, device_name, device_location,
                dateutc, date,
                winddir, windspeedmph, windgustmph, maxdailygust, windgustdir,
                winddir_avg2m, windspdmph_avg2m, winddir_avg10m, windspdmph_avg10m,
                tempf, tempinf, feelslike, dewpoint,
                humidity, humidityin,
                baromrelin, baromabsin,
                hourlyrainin, dailyrainin, weeklyrainin, monthlyrainin, yearlyrainin,
                solarradiation, uv,
                payload_version, raw_data
            ) VALUES (
                $1, $2, $3,
                $4, $5,
                $6, $7, $8, $9, $10,
                $11, $12, $13, $14,
                $15, $16, $17, $18,
                $19, $20,
                $21, $22,
                $23, $24, $25, $26, $27,
                $28, $29,
                $30, $31
            )
            RETURNING id, created_at
            "#,
        )
        .bind(&device.mac_address)
        .bind(device.name())
        .bind(device.location())
        .bind(dateutc)
        .bind(reading.date())
        .bind(m.winddir)
        .bind(m.windspeedmph)
        .bind(m.windgustmph)
        .bind(m.maxdailygust)
        .bind(m.windgustdir)
        .bind(m.winddir_avg2m)
        .bind(m.windspdmph_avg2m)
        .bind(m.winddir_avg10m)
        .bind(m.windspdmph_avg10m)
        .bind(m.tempf)
        .bind(m.tempinf)
        .bind(m.feelslike)
        .bind(m.dewpoint)
        .bind(m.humidity)
        .bind(m.humidityin)
        .bind(m.baromrelin)
        .bind(m.baromabsin)
        .bind(m.hourlyrainin)
        .bind(m.dailyrainin)
        .bind(m.weeklyrainin)
        .bind(m.monthlyrainin)
        .bind(m.yearlyrainin)
        .bind(m.solarradiation)
        .bind(m.uv)
        .bind(RAW_PAYLOAD_VERSION)
        .bind(Json(reading.fields()))
        .fetch_one(&self.pool)
        .await?;

        debug!(mac_address = %device.mac_address, id = record.id, dateutc, "Inserted weather record");
        Ok(record)
    }

    async fn latest(&self) -> Result<Option<StoredRecord>, StoreError> {
        let query = format!("{SELECT_RECORD} ORDER BY dateutc DESC, id DESC LIMIT 1");
        let row = sqlx::query_as::<_, StoredRecord>(&query)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn latest_for_device(
        &self,
        mac_address: &str,
    ) -> Result<Option<StoredRecord>, StoreError> {
        let query = format!(
            "{SELECT_RECORD} WHERE mac_address = $1 ORDER BY dateutc DESC, id DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, StoredRecord>(&query)
            .bind(mac_address)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}

// ---------------------------------------------------------------------------
// Tests (need a live Postgres: DATABASE_URL + --features integration-tests)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use sqlx::PgPool;

    use super::*;
    use crate::ambient::models::DeviceInfo;

    fn device(mac: &str) -> Device {
        Device {
            mac_address: mac.to_owned(),
            info: Some(DeviceInfo {
                name: Some("Backyard".to_owned()),
                location: Some("Home".to_owned()),
            }),
            last_data: None,
        }
    }

    fn reading(v: Value) -> Reading {
        serde_json::from_value(v).unwrap()
    }

    async fn count(pool: &PgPool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM weather_data")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[sqlx::test(migrations = "./migrations")]
    #[cfg_attr(not(feature = "integration-tests"), ignore)]
    async fn insert_persists_projection_and_raw_payload(pool: PgPool) {
        let store = PgReadingStore::new(pool);
        let raw = json!({
            "dateutc": 1_700_000_000_000_i64,
            "date": "2023-11-14T22:13:20.000Z",
            "tempf": 52.3,
            "uv": 0,
            "feelsLike": 50.1,
            "pm25": 7
        });

        let inserted = store.insert(&device("AA"), &reading(raw.clone())).await.unwrap();
        let stored = store.latest_for_device("AA").await.unwrap().unwrap();

        assert_eq!(stored.id, inserted.id);
        assert_eq!(stored.created_at, inserted.created_at);
        assert_eq!(stored.mac_address, "AA");
        assert_eq!(stored.device_name.as_deref(), Some("Backyard"));
        assert_eq!(stored.device_location.as_deref(), Some("Home"));
        assert_eq!(stored.dateutc, 1_700_000_000_000);
        assert_eq!(stored.date.as_deref(), Some("2023-11-14T22:13:20.000Z"));
        assert_eq!(stored.measurements.tempf, Some(52.3));
        assert_eq!(stored.measurements.uv, Some(0.0));
        assert_eq!(stored.measurements.feelslike, Some(50.1));
        assert_eq!(stored.measurements.humidity, None);
        assert_eq!(stored.payload_version, RAW_PAYLOAD_VERSION);
        assert_eq!(stored.raw_data.0, raw);
        assert_eq!(stored.measurements, Measurements::project(&reading(stored.raw_data.0.clone())));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[cfg_attr(not(feature = "integration-tests"), ignore)]
    async fn identical_inserts_are_not_deduplicated(pool: PgPool) {
        let store = PgReadingStore::new(pool.clone());
        let d = device("AA");
        let r = reading(json!({ "dateutc": 1000, "tempf": 40.0 }));

        let first = store.insert(&d, &r).await.unwrap();
        let second = store.insert(&d, &r).await.unwrap();

        assert!(second.id > first.id);
        assert_eq!(count(&pool).await, 2);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[cfg_attr(not(feature = "integration-tests"), ignore)]
    async fn insert_without_dateutc_is_rejected(pool: PgPool) {
        let store = PgReadingStore::new(pool.clone());

        let err = store
            .insert(&device("AA"), &reading(json!({ "tempf": 40.0 })))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::InvalidReading(_)));
        assert_eq!(count(&pool).await, 0);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[cfg_attr(not(feature = "integration-tests"), ignore)]
    async fn latest_is_none_on_empty_store(pool: PgPool) {
        let store = PgReadingStore::new(pool);
        assert!(store.latest().await.unwrap().is_none());
        assert!(store.latest_for_device("AA").await.unwrap().is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[cfg_attr(not(feature = "integration-tests"), ignore)]
    async fn latest_orders_by_acquisition_time_not_insert_order(pool: PgPool) {
        let store = PgReadingStore::new(pool);
        // t3 arrives first, t1 last.
        for (mac, t) in [("AA", 3000), ("BB", 2000), ("AA", 1000)] {
            store
                .insert(&device(mac), &reading(json!({ "dateutc": t })))
                .await
                .unwrap();
        }

        let latest = store.latest().await.unwrap().unwrap();
        assert_eq!(latest.dateutc, 3000);
        assert_eq!(latest.mac_address, "AA");
    }

    #[sqlx::test(migrations = "./migrations")]
    #[cfg_attr(not(feature = "integration-tests"), ignore)]
    async fn latest_for_device_only_considers_that_device(pool: PgPool) {
        let store = PgReadingStore::new(pool);
        for (mac, t) in [("AA", 1000), ("AA", 2000), ("BB", 9000)] {
            store
                .insert(&device(mac), &reading(json!({ "dateutc": t })))
                .await
                .unwrap();
        }

        let aa = store.latest_for_device("AA").await.unwrap().unwrap();
        assert_eq!(aa.dateutc, 2000);
        assert_eq!(aa.mac_address, "AA");

        assert!(store.latest_for_device("CC").await.unwrap().is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[cfg_attr(not(feature = "integration-tests"), ignore)]
    async fn ids_increase_monotonically(pool: PgPool) {
        let store = PgReadingStore::new(pool);
        let mut last = 0;
        for t in 0..5 {
            let rec = store
                .insert(&device("AA"), &reading(json!({ "dateutc": t })))
                .await
                .unwrap();
            assert!(rec.id > last);
            last = rec.id;
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    #[cfg_attr(not(feature = "integration-tests"), ignore)]
    async fn schema_initialization_is_idempotent(pool: PgPool) {
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        // The schema file itself must also tolerate re-application.
        sqlx::raw_sql(include_str!(
            "../../migrations/20240601000000_create_weather_data.sql"
        ))
        .execute(&pool)
        .await
        .unwrap();

        assert_eq!(count(&pool).await, 0);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[cfg_attr(not(feature = "integration-tests"), ignore)]
    async fn device_without_info_stores_null_identity_fields(pool: PgPool) {
        let store = PgReadingStore::new(pool);
        let bare = Device {
            mac_address: "AA".to_owned(),
            info: None,
            last_data: None,
        };

        store.insert(&bare, &reading(json!({ "dateutc": 1 }))).await.unwrap();
        let stored = store.latest().await.unwrap().unwrap();

        assert_eq!(stored.device_name, None);
        assert_eq!(stored.device_location, None);
        assert_eq!(stored.date, None);
    }
}
