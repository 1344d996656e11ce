//! Telemetry and actuator stores.
//!
//! The control loop only sees the two capability traits below; concrete
//! backends are chosen at startup and shared as `Arc<dyn …>`.
//!
//! | Backend    | Telemetry source          | Actuator sink                  |
//! |------------|---------------------------|--------------------------------|
//! | `postgres` | `sensor_logs` table       | `actuator_controls` table      |
//! | `firebase` | RTDB `sensor_logs/{id}`   | RTDB `actuator_controls/{id}`  |
//! | `memory`   | in-process map            | in-process map                 |

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::EngineResult;
use crate::models::{Commands, SensorReading};

mod firebase;
mod memory;
mod postgres;

pub use firebase::FirebaseStore;
pub use memory::MemoryStore;
pub use postgres::PgStore;

// ---

/// Read side: the most recent readings per device.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Up to `count` most recent readings, oldest first. Unknown devices
    /// yield an empty vector.
    async fn get_latest(&self, device_id: &str, count: usize) -> EngineResult<Vec<SensorReading>>;

    /// Append a reading and return the key it was stored under.
    async fn append(&self, device_id: &str, reading: &SensorReading) -> EngineResult<String>;
}

/// Write side: persisted actuator state per device.
#[async_trait]
pub trait ActuatorStore: Send + Sync {
    /// Merge `commands` into the device's state. Keys not present are left
    /// untouched.
    async fn update(&self, device_id: &str, commands: &Commands) -> EngineResult<()>;

    /// Current persisted state for the device; empty if never written.
    async fn current(&self, device_id: &str) -> EngineResult<Commands>;
}

/// Sortable record key: zero-padded milliseconds plus a random suffix, so
/// string order follows time and concurrent writers never collide.
pub fn record_key(reading: &SensorReading) -> String {
    // ---
    let millis = reading
        .timestamp
        .unwrap_or_else(|| Utc::now().timestamp_millis())
        .max(0);
    format!("{millis:013}-{}", Uuid::new_v4().simple())
}
