//! PostgreSQL-backed stores. Tables are created by [`crate::schema`].

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::warn;

use super::{record_key, ActuatorStore, TelemetryStore};
use crate::error::{EngineError, EngineResult};
use crate::models::{Actuator, Commands, SensorReading};

// ---

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SensorLogRow {
    timestamp_ms: Option<i64>,
    temperature: Option<f64>,
    humidity: Option<f64>,
    light_received: Option<f64>,
    soil_moisture: Option<f64>,
}

impl From<SensorLogRow> for SensorReading {
    fn from(row: SensorLogRow) -> Self {
        SensorReading {
            timestamp: row.timestamp_ms,
            temperature: row.temperature,
            humidity: row.humidity,
            light_received: row.light_received,
            soil_moisture: row.soil_moisture,
        }
    }
}

#[async_trait]
impl TelemetryStore for PgStore {
    async fn get_latest(&self, device_id: &str, count: usize) -> EngineResult<Vec<SensorReading>> {
        // ---
        let limit = i64::try_from(count).unwrap_or(i64::MAX);

        let rows: Vec<SensorLogRow> = sqlx::query_as(
            r#"
            SELECT timestamp_ms, temperature, humidity, light_received, soil_moisture
            FROM (
                SELECT record_key, timestamp_ms, temperature, humidity,
                       light_received, soil_moisture
                FROM sensor_logs
                WHERE device_id = $1
                ORDER BY record_key DESC
                LIMIT $2
            ) latest
            ORDER BY record_key ASC
            "#,
        )
        .bind(device_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EngineError::Telemetry(e.to_string()))?;

        Ok(rows.into_iter().map(SensorReading::from).collect())
    }

    async fn append(&self, device_id: &str, reading: &SensorReading) -> EngineResult<String> {
        // ---
        let key = record_key(reading);

        sqlx::query(
            r#"
            INSERT INTO sensor_logs (
                device_id, record_key, timestamp_ms,
                temperature, humidity, light_received, soil_moisture
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(device_id)
        .bind(&key)
        .bind(reading.timestamp)
        .bind(reading.temperature)
        .bind(reading.humidity)
        .bind(reading.light_received)
        .bind(reading.soil_moisture)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Persistence(e.to_string()))?;

        Ok(key)
    }
}

#[async_trait]
impl ActuatorStore for PgStore {
    /// All keys are upserted in one transaction, so a decision lands whole
    /// or not at all.
    async fn update(&self, device_id: &str, commands: &Commands) -> EngineResult<()> {
        // ---
        let persistence = |e: sqlx::Error| EngineError::Persistence(e.to_string());

        let mut tx = self.pool.begin().await.map_err(persistence)?;

        for (actuator, state) in commands {
            sqlx::query(
                r#"
                INSERT INTO actuator_controls (device_id, actuator, state, updated_at)
                VALUES ($1, $2, $3, now())
                ON CONFLICT (device_id, actuator) DO UPDATE SET
                    state = EXCLUDED.state,
                    updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(device_id)
            .bind(actuator.as_str())
            .bind(*state)
            .execute(&mut *tx)
            .await
            .map_err(persistence)?;
        }

        tx.commit().await.map_err(persistence)?;
        Ok(())
    }

    async fn current(&self, device_id: &str) -> EngineResult<Commands> {
        // ---
        let rows: Vec<(String, bool)> = sqlx::query_as(
            "SELECT actuator, state FROM actuator_controls WHERE device_id = $1",
        )
        .bind(device_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EngineError::Persistence(e.to_string()))?;

        let mut commands = Commands::new();
        for (name, state) in rows {
            match name.parse::<Actuator>() {
                Ok(actuator) => {
                    commands.insert(actuator, state);
                }
                Err(e) => warn!(device_id, "skipping stored actuator row: {}", e),
            }
        }
        Ok(commands)
    }
}
