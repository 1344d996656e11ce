//! In-process store used by tests and `STORE_BACKEND=memory`.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use super::{record_key, ActuatorStore, TelemetryStore};
use crate::error::{EngineError, EngineResult};
use crate::models::{Commands, SensorReading};

// ---

#[derive(Debug, Default)]
pub struct MemoryStore {
    logs: RwLock<HashMap<String, BTreeMap<String, SensorReading>>>,
    actuators: RwLock<HashMap<String, Commands>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a reading under an explicit key.
    pub fn insert(&self, device_id: &str, key: &str, reading: SensorReading) -> EngineResult<()> {
        // ---
        let mut logs = self
            .logs
            .write()
            .map_err(|_| EngineError::Persistence("telemetry lock poisoned".into()))?;
        logs.entry(device_id.to_string())
            .or_default()
            .insert(key.to_string(), reading);
        Ok(())
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn get_latest(&self, device_id: &str, count: usize) -> EngineResult<Vec<SensorReading>> {
        // ---
        let logs = self
            .logs
            .read()
            .map_err(|_| EngineError::Telemetry("telemetry lock poisoned".into()))?;

        let Some(series) = logs.get(device_id) else {
            return Ok(Vec::new());
        };

        let mut latest: Vec<SensorReading> = series.values().rev().take(count).cloned().collect();
        latest.reverse();
        Ok(latest)
    }

    async fn append(&self, device_id: &str, reading: &SensorReading) -> EngineResult<String> {
        let key = record_key(reading);
        self.insert(device_id, &key, reading.clone())?;
        Ok(key)
    }
}

#[async_trait]
impl ActuatorStore for MemoryStore {
    async fn update(&self, device_id: &str, commands: &Commands) -> EngineResult<()> {
        // ---
        let mut actuators = self
            .actuators
            .write()
            .map_err(|_| EngineError::Persistence("actuator lock poisoned".into()))?;
        actuators
            .entry(device_id.to_string())
            .or_default()
            .extend(commands.iter().map(|(a, s)| (*a, *s)));
        Ok(())
    }

    async fn current(&self, device_id: &str) -> EngineResult<Commands> {
        let actuators = self
            .actuators
            .read()
            .map_err(|_| EngineError::Persistence("actuator lock poisoned".into()))?;
        Ok(actuators.get(device_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::Actuator;

    fn create_test_reading(ts: i64, temp: f64) -> SensorReading {
        SensorReading {
            timestamp: Some(ts),
            temperature: Some(temp),
            ..SensorReading::default()
        }
    }

    #[test]
    fn test_latest_is_ascending_and_bounded() {
        // ---
        let store = MemoryStore::new();
        store.insert("dev-1", "003", create_test_reading(3, 23.0)).unwrap();
        store.insert("dev-1", "001", create_test_reading(1, 21.0)).unwrap();
        store.insert("dev-1", "002", create_test_reading(2, 22.0)).unwrap();

        let latest = tokio_test::block_on(store.get_latest("dev-1", 2)).unwrap();
        let temps: Vec<_> = latest.iter().map(|r| r.temperature.unwrap()).collect();
        assert_eq!(temps, vec![22.0, 23.0]);

        let all = tokio_test::block_on(store.get_latest("dev-1", 10)).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_unknown_device_is_empty() {
        // ---
        let store = MemoryStore::new();
        let latest = tokio_test::block_on(store.get_latest("ghost", 1)).unwrap();
        assert!(latest.is_empty());
    }

    #[tokio::test]
    async fn test_append_orders_by_timestamp() {
        // ---
        let store = MemoryStore::new();
        store.append("dev-1", &create_test_reading(2_000, 20.0)).await.unwrap();
        store.append("dev-1", &create_test_reading(1_000, 10.0)).await.unwrap();

        let latest = store.get_latest("dev-1", 1).await.unwrap();
        assert_eq!(latest[0].temperature, Some(20.0));
    }

    #[tokio::test]
    async fn test_update_merges_sparse_commands() {
        // ---
        let store = MemoryStore::new();

        let first: Commands = [(Actuator::Irrigation, true), (Actuator::Fan, true)].into();
        store.update("dev-1", &first).await.unwrap();

        let second: Commands = [(Actuator::Fan, false), (Actuator::Heater, false)].into();
        store.update("dev-1", &second).await.unwrap();

        let state = store.current("dev-1").await.unwrap();
        assert_eq!(
            state,
            Commands::from([
                (Actuator::Fan, false),
                (Actuator::Heater, false),
                (Actuator::Irrigation, true),
            ])
        );
        assert!(store.current("dev-2").await.unwrap().is_empty());
    }
}
