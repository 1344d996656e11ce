//! Configuration loader for the `codemetal-agrocontrol` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). By consolidating configuration logic here, we
//! avoid scattering `env::var` calls throughout the codebase.
//!
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse an optional boolean environment variable with a default value.
macro_rules! parse_env_bool {
    ($var_name:expr, $default:expr) => {
        match env::var($var_name).ok().as_deref().map(str::to_ascii_lowercase).as_deref() {
            None => $default,
            Some("1") | Some("true") | Some("yes") => true,
            Some("0") | Some("false") | Some("no") => false,
            Some(other) => bail!("Invalid {}: '{}' is not a boolean", $var_name, other),
        }
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Where telemetry is read from and decisions are written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// PostgreSQL tables `sensor_logs` / `actuator_controls`.
    Postgres { db_url: String, db_pool_max: u32 },
    /// Firebase Realtime Database REST API.
    Firebase { db_url: String, auth_token: String },
    /// In-process maps; nothing survives a restart.
    Memory,
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    pub backend: StoreBackend,

    /// Directory holding `model_{temp,hum,light,soil}.json`.
    pub model_dir: PathBuf,

    /// Lag-feature temperature model for the legacy `/predict` route.
    pub legacy_model_file: PathBuf,

    /// Device used by `/predict` when the request names none.
    pub legacy_device_id: Option<String>,

    /// Devices driven by the periodic loop; empty disables it.
    pub control_devices: Vec<String>,

    pub control_interval: Duration,

    /// Enforce one in-flight cycle per device.
    pub single_flight: bool,

    pub listen_addr: SocketAddr,
}

/// Load configuration from environment variables with defaults.
///
/// Backend (`STORE_BACKEND`, default `postgres`):
/// - `postgres` – requires `DATABASE_URL`; optional `DB_POOL_MAX` (default: 5)
/// - `firebase` – requires `FIREBASE_DB_URL` and `FIREBASE_AUTH_TOKEN`
/// - `memory`   – no further settings
///
/// Optional:
/// - `MODEL_DIR` – model artifact directory (default: `./models`)
/// - `LEGACY_MODEL_FILE` – legacy model (default: `$MODEL_DIR/temperature_model.json`)
/// - `LEGACY_DEVICE_ID` – default device for `/predict`
/// - `CONTROL_DEVICES` – comma separated device ids for the periodic loop
/// - `CONTROL_INTERVAL_SECS` – periodic interval (default: 60)
/// - `SINGLE_FLIGHT` – one in-flight cycle per device (default: false)
/// - `LISTEN_ADDR` – HTTP bind address (default: `0.0.0.0:8080`)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let backend = match env::var("STORE_BACKEND")
        .unwrap_or_else(|_| "postgres".to_string())
        .to_ascii_lowercase()
        .as_str()
    {
        "postgres" => StoreBackend::Postgres {
            db_url: require_env!("DATABASE_URL"),
            db_pool_max: parse_env_u32!("DB_POOL_MAX", 5),
        },
        "firebase" => StoreBackend::Firebase {
            db_url: require_env!("FIREBASE_DB_URL"),
            auth_token: require_env!("FIREBASE_AUTH_TOKEN"),
        },
        "memory" => StoreBackend::Memory,
        other => bail!("Invalid STORE_BACKEND: '{}' (expected postgres, firebase or memory)", other),
    };

    let model_dir = PathBuf::from(env::var("MODEL_DIR").unwrap_or_else(|_| "./models".to_string()));
    let legacy_model_file = env::var("LEGACY_MODEL_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| model_dir.join("temperature_model.json"));
    let legacy_device_id = env::var("LEGACY_DEVICE_ID").ok().filter(|d| !d.trim().is_empty());

    let control_devices = parse_device_list(&env::var("CONTROL_DEVICES").unwrap_or_default());
    let control_interval_secs = parse_env_u32!("CONTROL_INTERVAL_SECS", 60);
    if control_interval_secs == 0 {
        bail!("Invalid CONTROL_INTERVAL_SECS: must be greater than zero");
    }
    let single_flight = parse_env_bool!("SINGLE_FLIGHT", false);

    let listen_addr = env::var("LISTEN_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse::<SocketAddr>()
        .map_err(|e| anyhow!("Invalid LISTEN_ADDR: {}", e))?;

    Ok(Config {
        backend,
        model_dir,
        legacy_model_file,
        legacy_device_id,
        control_devices,
        control_interval: Duration::from_secs(u64::from(control_interval_secs)),
        single_flight,
        listen_addr,
    })
}

fn parse_device_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(String::from)
        .collect()
}

/// Mask the password portion of a connection URL (`user:****@host`).
fn mask_db_url(db_url: &str) -> String {
    // ---
    if let Some(at_pos) = db_url.rfind('@') {
        if let Some(colon_pos) = db_url[..at_pos].rfind(':') {
            return format!("{}:****{}", &db_url[..colon_pos], &db_url[at_pos..]);
        }
    }
    db_url.to_string()
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks sensitive information like database passwords and auth tokens
    /// while showing all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        match &self.backend {
            StoreBackend::Postgres { db_url, db_pool_max } => {
                tracing::info!("  STORE_BACKEND         : postgres");
                tracing::info!("  DATABASE_URL          : {}", mask_db_url(db_url));
                tracing::info!("  DB_POOL_MAX           : {}", db_pool_max);
            }
            StoreBackend::Firebase { db_url, .. } => {
                tracing::info!("  STORE_BACKEND         : firebase");
                tracing::info!("  FIREBASE_DB_URL       : {}", db_url);
                tracing::info!("  FIREBASE_AUTH_TOKEN   : ****");
            }
            StoreBackend::Memory => {
                tracing::info!("  STORE_BACKEND         : memory");
            }
        }
        tracing::info!("  MODEL_DIR             : {}", self.model_dir.display());
        tracing::info!("  LEGACY_MODEL_FILE     : {}", self.legacy_model_file.display());
        tracing::info!("  LEGACY_DEVICE_ID      : {:?}", self.legacy_device_id);
        tracing::info!("  CONTROL_DEVICES       : {:?}", self.control_devices);
        tracing::info!("  CONTROL_INTERVAL_SECS : {}", self.control_interval.as_secs());
        tracing::info!("  SINGLE_FLIGHT         : {}", self.single_flight);
        tracing::info!("  LISTEN_ADDR           : {}", self.listen_addr);
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_mask_db_url() {
        // ---
        assert_eq!(
            mask_db_url("postgres://agro:hunter2@db:5432/greenhouse"),
            "postgres://agro:****@db:5432/greenhouse"
        );
        assert_eq!(mask_db_url("postgres://db/greenhouse"), "postgres://db/greenhouse");
    }

    #[test]
    fn test_parse_device_list() {
        // ---
        assert_eq!(
            parse_device_list(" esp32-01, ,esp32-02 ,"),
            vec!["esp32-01".to_string(), "esp32-02".to_string()]
        );
        assert!(parse_device_list("").is_empty());
    }
}
