//! Control loop driver.
//!
//! One cycle walks a fixed, strictly sequential pipeline:
//!
//! ```text
//! FETCH_READING → EXTRACT_FEATURES → FORECAST → DECIDE → PERSIST_COMMANDS → RESPOND
//! ```
//!
//! Any stage error ends the cycle before anything is written. Cycles run
//! on demand (one per HTTP request) or from [`ControlLoop::run_periodic`],
//! which logs failures and keeps going.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::OwnedMutexGuard;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::decision::{decide, Decision};
use crate::error::{EngineError, EngineResult};
use crate::features::{extract, FeatureMode};
use crate::forecast::{Ensemble, LinearModel, Predictor};
use crate::messages::Lang;
use crate::models::{Commands, ForecastVector, Limits};
use crate::store::{ActuatorStore, TelemetryStore};

// ---

/// Outcome of one completed cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub device_id: String,
    pub forecast: ForecastVector,
    pub decision: Decision,
    /// Soft failures (predictors dropped for this cycle).
    pub warnings: Vec<EngineError>,
}

type LockMap = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

/// Serialises cycles per device while leaving different devices concurrent.
/// Entries live only while a cycle holds or waits on them.
#[derive(Debug, Clone, Default)]
pub struct DeviceGate {
    locks: LockMap,
}

impl DeviceGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other cycle holds `device_id`.
    pub async fn acquire(&self, device_id: &str) -> DevicePermit {
        // ---
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(device_id.to_string()).or_default())
        };
        let mut permit = DevicePermit {
            locks: Arc::clone(&self.locks),
            device_id: device_id.to_string(),
            guard: None,
        };
        // A permit dropped while still waiting prunes the entry too.
        permit.guard = Some(lock.lock_owned().await);
        permit
    }

    /// Devices with a cycle currently holding or waiting on the gate.
    pub fn tracked_devices(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Held for the duration of one cycle. Dropping it releases the device and
/// removes its entry once nobody else references it.
#[derive(Debug)]
pub struct DevicePermit {
    locks: LockMap,
    device_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for DevicePermit {
    fn drop(&mut self) {
        // ---
        // The guard owns a reference to the lock; release it before counting.
        self.guard.take();

        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.device_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.device_id);
        }
    }
}

#[derive(Clone)]
pub struct ControlLoop {
    telemetry: Arc<dyn TelemetryStore>,
    actuators: Arc<dyn ActuatorStore>,
    ensemble: Arc<Ensemble>,
    gate: Option<DeviceGate>,
}

impl ControlLoop {
    pub fn new(
        telemetry: Arc<dyn TelemetryStore>,
        actuators: Arc<dyn ActuatorStore>,
        ensemble: Arc<Ensemble>,
    ) -> Self {
        Self {
            telemetry,
            actuators,
            ensemble,
            gate: None,
        }
    }

    /// Allow at most one in-flight cycle per device.
    pub fn with_single_flight(mut self) -> Self {
        self.gate = Some(DeviceGate::new());
        self
    }

    pub fn telemetry(&self) -> &Arc<dyn TelemetryStore> {
        &self.telemetry
    }

    pub fn actuators(&self) -> &Arc<dyn ActuatorStore> {
        &self.actuators
    }

    pub fn mode(&self) -> FeatureMode {
        self.ensemble.mode()
    }

    /// Run one full cycle for `device_id`.
    pub async fn run_cycle(
        &self,
        device_id: &str,
        limits: &Limits,
        lang: Lang,
    ) -> EngineResult<CycleReport> {
        // ---
        let span = info_span!("control_cycle", device_id);
        async {
            let _permit = match &self.gate {
                Some(gate) => Some(gate.acquire(device_id).await),
                None => None,
            };
            self.run_stages(device_id, limits, lang).await
        }
        .instrument(span)
        .await
    }

    async fn run_stages(
        &self,
        device_id: &str,
        limits: &Limits,
        lang: Lang,
    ) -> EngineResult<CycleReport> {
        // ---
        let mode = self.ensemble.mode();

        debug!(%mode, "FETCH_READING");
        let readings = self
            .telemetry
            .get_latest(device_id, mode.required_readings())
            .await?;
        if readings.is_empty() {
            return Err(EngineError::DeviceNotFound(device_id.to_string()));
        }

        debug!(readings = readings.len(), "EXTRACT_FEATURES");
        let features = extract(&readings, mode)?;

        debug!(features = ?features.named().collect::<Vec<_>>(), "FORECAST");
        let forecast = self.ensemble.forecast(&features);

        debug!(forecast = ?forecast.vector, "DECIDE");
        let decision = decide(&forecast.vector, limits, lang);

        debug!(commands = ?decision.commands, "PERSIST_COMMANDS");
        self.persist(device_id, &decision.commands).await?;

        info!(
            status = ?decision.status,
            commands = ?decision.commands,
            reasoning = %decision.message,
            "control cycle complete"
        );

        Ok(CycleReport {
            device_id: device_id.to_string(),
            forecast: forecast.vector,
            decision,
            warnings: forecast.warnings,
        })
    }

    /// The write runs on its own task: if the caller abandons the cycle
    /// mid-write, the write still completes.
    async fn persist(&self, device_id: &str, commands: &Commands) -> EngineResult<()> {
        // ---
        if commands.is_empty() {
            return Ok(());
        }

        let actuators = Arc::clone(&self.actuators);
        let device_id = device_id.to_string();
        let commands = commands.clone();

        tokio::spawn(async move { actuators.update(&device_id, &commands).await })
            .await
            .map_err(|e| EngineError::Persistence(format!("actuator write task failed: {e}")))?
    }

    /// Run one cycle per device every `every`, with default limits and
    /// English messages, until `cancel` fires. Cycle errors are logged and
    /// never stop the loop. A cycle still running after `every` is abandoned
    /// so one stalled device cannot starve the others; an actuator write
    /// already under way still completes.
    pub async fn run_periodic(
        &self,
        devices: Vec<String>,
        every: Duration,
        cancel: CancellationToken,
    ) {
        // ---
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            devices = ?devices,
            interval_secs = every.as_secs_f64(),
            "periodic control loop started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for device_id in &devices {
                        let limits = Limits::default();
                        let cycle = tokio::time::timeout(
                            every,
                            self.run_cycle(device_id, &limits, Lang::En),
                        );
                        tokio::select! {
                            outcome = cycle => match outcome {
                                Ok(Ok(_)) => {}
                                Ok(Err(e)) => warn!(device_id = %device_id, "control cycle failed: {}", e),
                                Err(_) => warn!(
                                    device_id = %device_id,
                                    "control cycle abandoned after {:?}",
                                    every
                                ),
                            },
                            _ = cancel.cancelled() => {
                                info!("periodic control loop shutting down");
                                return;
                            }
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    info!("periodic control loop shutting down");
                    break;
                }
            }
        }
    }
}

// ---

/// Single temperature forecast from the legacy lag-feature model. Reads
/// the two latest readings and writes nothing.
pub async fn legacy_temperature_forecast(
    telemetry: &dyn TelemetryStore,
    model: &LinearModel,
    device_id: &str,
) -> EngineResult<f64> {
    // ---
    let mode = model.mode();
    let readings = telemetry
        .get_latest(device_id, mode.required_readings())
        .await?;
    let features = extract(&readings, mode)?;

    model
        .predict(&features)
        .map_err(|reason| EngineError::ModelUnavailable {
            metric: crate::models::Metric::Temp,
            reason,
        })
}
