//! Firebase Realtime Database stores over the REST API.
//!
//! Layout matches what the greenhouse devices and dashboard already use:
//! readings are pushed under `sensor_logs/{device_id}` (push keys sort by
//! time) and actuator state lives in `actuator_controls/{device_id}`.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use super::{ActuatorStore, TelemetryStore};
use crate::error::{EngineError, EngineResult};
use crate::models::{Actuator, Commands, SensorReading};

// ---

const SENSOR_LOGS: &str = "sensor_logs";
const ACTUATOR_CONTROLS: &str = "actuator_controls";

/// Upper bound on a whole RTDB request, so a stalled call fails the cycle
/// instead of hanging it.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct FirebaseStore {
    client: reqwest::Client,
    base_url: Url,
    auth_token: String,
}

/// Body returned by a push (`POST`).
#[derive(Debug, Deserialize)]
struct PushResponse {
    name: String,
}

impl FirebaseStore {
    pub fn new(base_url: &str, auth_token: &str) -> EngineResult<Self> {
        Self::with_timeouts(base_url, auth_token, REQUEST_TIMEOUT, CONNECT_TIMEOUT)
    }

    pub fn with_timeouts(
        base_url: &str,
        auth_token: &str,
        request_timeout: Duration,
        connect_timeout: Duration,
    ) -> EngineResult<Self> {
        // ---
        let base_url = Url::parse(base_url)
            .map_err(|e| EngineError::Configuration(format!("invalid FIREBASE_DB_URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(EngineError::Configuration(format!(
                "invalid FIREBASE_DB_URL: '{base_url}' cannot carry a path"
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| EngineError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            auth_token: auth_token.to_string(),
        })
    }

    /// `{base}/{root}/{device_id}.json`, with the device id encoded as a
    /// single path segment.
    fn url(&self, root: &str, device_id: &str) -> Url {
        // ---
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push(root)
                .push(&format!("{device_id}.json"));
        }
        url
    }
}

/// Decode a `{push_key: record}` snapshot into readings ordered by key.
/// A record that does not parse fails the whole read, so the caller never
/// mistakes a malformed latest record for a device without data.
fn readings_from_snapshot(
    snapshot: BTreeMap<String, serde_json::Value>,
) -> EngineResult<Vec<SensorReading>> {
    // ---
    snapshot
        .into_iter()
        .map(|(key, value)| {
            serde_json::from_value::<SensorReading>(value).map_err(|e| {
                debug!("Failed to parse record {}: {}", key, e);
                EngineError::Telemetry(format!("malformed sensor record '{key}': {e}"))
            })
        })
        .collect()
}

/// Keep only known actuator keys with boolean values.
fn commands_from_snapshot(snapshot: BTreeMap<String, serde_json::Value>) -> Commands {
    // ---
    snapshot
        .into_iter()
        .filter_map(|(name, value)| {
            let actuator = name.parse::<Actuator>().ok()?;
            Some((actuator, value.as_bool()?))
        })
        .collect()
}

#[async_trait]
impl TelemetryStore for FirebaseStore {
    async fn get_latest(&self, device_id: &str, count: usize) -> EngineResult<Vec<SensorReading>> {
        // ---
        let telemetry = |e: reqwest::Error| EngineError::Telemetry(e.to_string());
        let url = self.url(SENSOR_LOGS, device_id);
        let limit = count.to_string();
        debug!("Fetching latest {} records from: {}", count, url);

        let snapshot: Option<BTreeMap<String, serde_json::Value>> = self
            .client
            .get(url)
            .query(&[
                ("orderBy", "\"$key\""),
                ("limitToLast", limit.as_str()),
                ("auth", self.auth_token.as_str()),
            ])
            .send()
            .await
            .map_err(telemetry)?
            .error_for_status()
            .map_err(telemetry)?
            .json()
            .await
            .map_err(telemetry)?;

        snapshot.map_or_else(|| Ok(Vec::new()), readings_from_snapshot)
    }

    async fn append(&self, device_id: &str, reading: &SensorReading) -> EngineResult<String> {
        // ---
        let persistence = |e: reqwest::Error| EngineError::Persistence(e.to_string());

        let pushed: PushResponse = self
            .client
            .post(self.url(SENSOR_LOGS, device_id))
            .query(&[("auth", self.auth_token.as_str())])
            .json(reading)
            .send()
            .await
            .map_err(persistence)?
            .error_for_status()
            .map_err(persistence)?
            .json()
            .await
            .map_err(persistence)?;

        Ok(pushed.name)
    }
}

#[async_trait]
impl ActuatorStore for FirebaseStore {
    /// `PATCH` merges children server-side and is applied atomically.
    async fn update(&self, device_id: &str, commands: &Commands) -> EngineResult<()> {
        // ---
        let persistence = |e: reqwest::Error| EngineError::Persistence(e.to_string());

        self.client
            .patch(self.url(ACTUATOR_CONTROLS, device_id))
            .query(&[("auth", self.auth_token.as_str())])
            .json(commands)
            .send()
            .await
            .map_err(persistence)?
            .error_for_status()
            .map_err(persistence)?;
        Ok(())
    }

    async fn current(&self, device_id: &str) -> EngineResult<Commands> {
        // ---
        let persistence = |e: reqwest::Error| EngineError::Persistence(e.to_string());

        let snapshot: Option<BTreeMap<String, serde_json::Value>> = self
            .client
            .get(self.url(ACTUATOR_CONTROLS, device_id))
            .query(&[("auth", self.auth_token.as_str())])
            .send()
            .await
            .map_err(persistence)?
            .error_for_status()
            .map_err(persistence)?
            .json()
            .await
            .map_err(persistence)?;

        Ok(snapshot.map(commands_from_snapshot).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_orders_by_push_key() {
        // ---
        let snapshot: BTreeMap<String, serde_json::Value> = serde_json::from_value(json!({
            "-Nq2": {"timestamp": 2000, "temperature": 23.5, "humidity": 51},
            "-Nq1": {"timestamp": 1000, "temperature": 22.0, "humidity": 50}
        }))
        .unwrap();

        let readings = readings_from_snapshot(snapshot).unwrap();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].timestamp, Some(1000));
        assert_eq!(readings[1].temperature, Some(23.5));
        assert_eq!(readings[1].soil_moisture, None);
    }

    #[test]
    fn test_snapshot_coerces_numeric_strings() {
        // ---
        let snapshot: BTreeMap<String, serde_json::Value> = serde_json::from_value(json!({
            "-Nq9": {"timestamp": "1700000000000", "temperature": "23.5", "humidity": "51",
                     "light_received": 1200, "soil_moisture": "2800"}
        }))
        .unwrap();

        let readings = readings_from_snapshot(snapshot).unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].temperature, Some(23.5));
        assert_eq!(readings[0].soil_moisture, Some(2800.0));
    }

    #[test]
    fn test_malformed_record_fails_the_read() {
        // ---
        let snapshot: BTreeMap<String, serde_json::Value> = serde_json::from_value(json!({
            "-Nq1": {"timestamp": 1000, "temperature": 22.0},
            "-Nq2": "corrupt"
        }))
        .unwrap();

        let err = readings_from_snapshot(snapshot).unwrap_err();
        assert!(matches!(err, EngineError::Telemetry(msg) if msg.contains("-Nq2")));
    }

    #[test]
    fn test_actuator_snapshot_keeps_known_booleans() {
        // ---
        let snapshot: BTreeMap<String, serde_json::Value> = serde_json::from_value(json!({
            "fan": true,
            "heater": false,
            "irrigation": "yes",
            "mister": true
        }))
        .unwrap();

        let commands = commands_from_snapshot(snapshot);
        assert_eq!(
            commands,
            Commands::from([(Actuator::Fan, true), (Actuator::Heater, false)])
        );
    }

    #[test]
    fn test_url_layout() {
        // ---
        let store = FirebaseStore::new("https://greenhouse.firebaseio.com/", "secret").unwrap();
        assert_eq!(
            store.url(SENSOR_LOGS, "esp32-01").as_str(),
            "https://greenhouse.firebaseio.com/sensor_logs/esp32-01.json"
        );
    }

    #[test]
    fn test_device_id_stays_one_path_segment() {
        // ---
        let store = FirebaseStore::new("https://greenhouse.firebaseio.com", "secret").unwrap();

        let url = store.url(ACTUATOR_CONTROLS, "gh-1?x");
        assert_eq!(url.path(), "/actuator_controls/gh-1%3Fx.json");
        assert_eq!(url.query(), None);

        let url = store.url(ACTUATOR_CONTROLS, "gh-1/other");
        assert_eq!(url.path(), "/actuator_controls/gh-1%2Fother.json");
    }

    #[test]
    fn test_rejects_unusable_base_url() {
        // ---
        assert!(matches!(
            FirebaseStore::new("not a url", "secret"),
            Err(EngineError::Configuration(_))
        ));
        assert!(matches!(
            FirebaseStore::new("mailto:ops@greenhouse.example", "secret"),
            Err(EngineError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_stalled_server_times_out() {
        // ---
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let store = FirebaseStore::with_timeouts(
            &format!("http://{addr}"),
            "secret",
            Duration::from_millis(200),
            Duration::from_millis(200),
        )
        .unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), store.get_latest("gh-1", 1))
            .await
            .expect("request was not bounded by the client timeout");
        assert!(matches!(result, Err(EngineError::Telemetry(_))));
    }
}
