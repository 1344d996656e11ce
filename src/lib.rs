//! Predictive greenhouse control engine.
//!
//! Each cycle reads the latest telemetry for a device, forecasts the next
//! value of every tracked metric, applies user thresholds and writes the
//! resulting actuator commands back to the store.
//!
//! Modules are split along the pipeline: `features` → `forecast` →
//! `decision`, driven by `control` against the `store` ports, with
//! `routes` as the HTTP surface.

pub mod config;
pub mod control;
pub mod decision;
pub mod error;
pub mod features;
pub mod forecast;
pub mod messages;
pub mod models;
pub mod routes;
pub mod schema;
pub mod store;

pub use config::Config;
pub use control::{ControlLoop, CycleReport};
pub use error::{EngineError, EngineResult};
