//! Database schema management for `codemetal-agrocontrol`.
//!
//! Ensures the telemetry and actuator tables exist before serving requests.
//! Applied once on startup from `main.rs` when the PostgreSQL backend is
//! selected.

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates the `sensor_logs` table read by the control loop and the
/// `actuator_controls` table it writes decisions into. Safe to call on every
/// startup; no-op if objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    // Raw readings; every measurement column is nullable because devices
    // report whatever sensors they carry.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensor_logs (
            device_id         TEXT             NOT NULL,
            record_key        TEXT             NOT NULL,
            timestamp_ms      BIGINT,
            temperature       DOUBLE PRECISION,
            humidity          DOUBLE PRECISION,
            light_received    DOUBLE PRECISION,
            soil_moisture     DOUBLE PRECISION,
            PRIMARY KEY (device_id, record_key)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // One row per (device, actuator); decisions upsert into it.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS actuator_controls (
            device_id         TEXT        NOT NULL,
            actuator          TEXT        NOT NULL,
            state             BOOLEAN     NOT NULL,
            updated_at        TIMESTAMPTZ NOT NULL DEFAULT now(),
            PRIMARY KEY (device_id, actuator)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
