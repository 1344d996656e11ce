//! Threshold rules that turn a forecast into actuator commands.
//!
//! Rules run in a fixed order (temperature, humidity, soil, light) and are
//! not mutually exclusive: each may add a reason, and a later rule may
//! overwrite an actuator an earlier one set. A metric with no forecast never
//! fires its rule. `decide` is pure.

use serde::Serialize;

use crate::messages::{render, Lang, ReasonCode};
use crate::models::{Actuator, Commands, ForecastVector, Limits};

// ---

/// Raw LDR reading above which the greenhouse counts as dark.
pub const LOW_LIGHT_RAW: f64 = 3000.0;

/// Joins rendered reasons for display.
const REASON_SEPARATOR: &str = " | ";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Optimal,
    Warning,
}

/// One fired rule and the forecast value that triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reason {
    pub code: ReasonCode,
    pub value: Option<f64>,
}

impl Reason {
    fn new(code: ReasonCode, value: Option<f64>) -> Self {
        Self { code, value }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    // ---
    pub commands: Commands,
    pub status: Status,
    /// Fired reasons in rule order, or a single `Stable` when none fired.
    pub reasons: Vec<Reason>,
    /// Reasons rendered in the requested language.
    pub message: String,
}

impl Decision {
    pub fn reason_codes(&self) -> Vec<ReasonCode> {
        self.reasons.iter().map(|r| r.code).collect()
    }
}

pub fn decide(forecast: &ForecastVector, limits: &Limits, lang: Lang) -> Decision {
    // ---
    let mut commands = Commands::new();
    let mut reasons = Vec::new();

    // 1. Temperature always sets a fan/heater baseline.
    match forecast.temp {
        Some(temp) if temp > limits.max_temp => {
            reasons.push(Reason::new(ReasonCode::Heat, Some(temp)));
            commands.insert(Actuator::Fan, true);
            commands.insert(Actuator::Heater, false);
        }
        Some(temp) if temp < limits.min_temp => {
            reasons.push(Reason::new(ReasonCode::Cold, Some(temp)));
            commands.insert(Actuator::Fan, false);
            commands.insert(Actuator::Heater, true);
        }
        _ => {
            commands.insert(Actuator::Fan, false);
            commands.insert(Actuator::Heater, false);
        }
    }

    // 2. Humidity
    if let Some(hum) = forecast.hum.filter(|h| *h > limits.max_hum) {
        reasons.push(Reason::new(ReasonCode::HighHum, Some(hum)));
        commands.insert(Actuator::Fan, true);
    }

    // 3. Soil: higher raw value means drier.
    if let Some(soil) = forecast.soil.filter(|s| *s > limits.soil_dry_limit) {
        reasons.push(Reason::new(ReasonCode::DrySoil, Some(soil)));
        commands.insert(Actuator::Irrigation, true);
    }

    // 4. Light: evaluated but never actuated.
    if let Some(light) = forecast.light.filter(|l| *l > LOW_LIGHT_RAW) {
        tracing::trace!(light, "low light forecast, lights rule inactive");
    }

    let status = if reasons.is_empty() {
        reasons.push(Reason::new(ReasonCode::Stable, None));
        Status::Optimal
    } else {
        Status::Warning
    };

    let message = reasons
        .iter()
        .map(|r| render(r.code, r.value, lang))
        .collect::<Vec<_>>()
        .join(REASON_SEPARATOR);

    Decision {
        commands,
        status,
        reasons,
        message,
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn create_test_forecast(temp: f64, hum: f64, light: f64, soil: f64) -> ForecastVector {
        // ---
        ForecastVector {
            temp: Some(temp),
            hum: Some(hum),
            light: Some(light),
            soil: Some(soil),
        }
    }

    fn commands(pairs: &[(Actuator, bool)]) -> Commands {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_stable_forecast() {
        // ---
        let forecast = create_test_forecast(22.0, 50.0, 1000.0, 1500.0);
        let decision = decide(&forecast, &Limits::default(), Lang::En);

        assert_eq!(decision.status, Status::Optimal);
        assert_eq!(
            decision.commands,
            commands(&[(Actuator::Fan, false), (Actuator::Heater, false)])
        );
        assert_eq!(decision.reason_codes(), vec![ReasonCode::Stable]);
        assert_eq!(decision.message, "✅ Forecast Stable");
    }

    #[test]
    fn test_stable_band_is_inclusive_at_limits() {
        // ---
        let limits = Limits::default();
        for temp in [limits.min_temp, 23.0, limits.max_temp] {
            let forecast = create_test_forecast(temp, limits.max_hum, 0.0, limits.soil_dry_limit);
            let decision = decide(&forecast, &limits, Lang::En);
            assert_eq!(decision.status, Status::Optimal, "temp {temp}");
            assert_eq!(decision.reason_codes(), vec![ReasonCode::Stable]);
        }
    }

    #[test]
    fn test_heat_spike() {
        // ---
        let forecast = create_test_forecast(31.4, 50.0, 1000.0, 1500.0);
        let decision = decide(&forecast, &Limits::default(), Lang::En);

        assert_eq!(decision.status, Status::Warning);
        assert_eq!(decision.commands[&Actuator::Fan], true);
        assert_eq!(decision.commands[&Actuator::Heater], false);
        assert_eq!(decision.message, "🔥 Heat spike forecast (31.4°C)");

        let decision = decide(&forecast, &Limits::default(), Lang::Es);
        assert_eq!(decision.message, "🔥 Calor futuro (31.4°C)");
    }

    #[test]
    fn test_cold_drop() {
        // ---
        let forecast = create_test_forecast(12.0, 50.0, 1000.0, 1500.0);
        let decision = decide(&forecast, &Limits::default(), Lang::En);

        assert_eq!(decision.status, Status::Warning);
        assert_eq!(
            decision.commands,
            commands(&[(Actuator::Fan, false), (Actuator::Heater, true)])
        );
        assert_eq!(decision.reason_codes(), vec![ReasonCode::Cold]);
    }

    #[test]
    fn test_temperature_monotonicity() {
        // ---
        let limits = Limits::default();
        let mut temp = 20.0;
        while temp < 35.0 {
            let decision = decide(&create_test_forecast(temp, 50.0, 0.0, 0.0), &limits, Lang::En);
            let fan = decision.commands[&Actuator::Fan];
            let heater = decision.commands[&Actuator::Heater];
            assert_eq!(fan, temp > limits.max_temp, "temp {temp}");
            assert!(!heater);
            assert!(!(fan && heater));
            temp += 0.5;
        }

        let mut temp = 20.0;
        while temp > 5.0 {
            let decision = decide(&create_test_forecast(temp, 50.0, 0.0, 0.0), &limits, Lang::En);
            assert_eq!(decision.commands[&Actuator::Heater], temp < limits.min_temp);
            assert!(!decision.commands[&Actuator::Fan]);
            temp -= 0.5;
        }
    }

    #[test]
    fn test_heat_and_humidity_compose() {
        // ---
        let forecast = create_test_forecast(30.0, 85.0, 1000.0, 1500.0);
        let decision = decide(&forecast, &Limits::default(), Lang::En);

        assert_eq!(decision.commands[&Actuator::Fan], true);
        assert_eq!(
            decision.reason_codes(),
            vec![ReasonCode::Heat, ReasonCode::HighHum]
        );
        assert_eq!(
            decision.message,
            "🔥 Heat spike forecast (30.0°C) | 💧 High humidity (85%)"
        );
    }

    #[test]
    fn test_humidity_overrides_cold_fan_off() {
        // ---
        let forecast = create_test_forecast(10.0, 90.0, 0.0, 0.0);
        let decision = decide(&forecast, &Limits::default(), Lang::En);

        // Humidity runs after temperature and wins the fan key.
        assert_eq!(
            decision.commands,
            commands(&[(Actuator::Fan, true), (Actuator::Heater, true)])
        );
        assert_eq!(
            decision.reason_codes(),
            vec![ReasonCode::Cold, ReasonCode::HighHum]
        );
    }

    #[test]
    fn test_drought_regardless_of_other_metrics() {
        // ---
        let limits = Limits::default();
        for (temp, hum) in [(22.0, 50.0), (35.0, 90.0), (5.0, 10.0)] {
            let forecast = create_test_forecast(temp, hum, 0.0, 3500.0);
            let decision = decide(&forecast, &limits, Lang::En);
            assert_eq!(decision.commands.get(&Actuator::Irrigation), Some(&true));
            assert!(decision.reason_codes().contains(&ReasonCode::DrySoil));
            assert_eq!(decision.status, Status::Warning);
        }
    }

    #[test]
    fn test_absent_soil_never_irrigates() {
        // ---
        let forecast = ForecastVector {
            temp: Some(22.0),
            hum: Some(50.0),
            light: Some(1000.0),
            soil: None,
        };
        let limits = Limits {
            soil_dry_limit: -1.0,
            ..Limits::default()
        };
        let decision = decide(&forecast, &limits, Lang::En);
        assert_eq!(decision.commands.get(&Actuator::Irrigation), None);
        assert_eq!(decision.status, Status::Optimal);
    }

    #[test]
    fn test_absent_temperature_keeps_baseline() {
        // ---
        let forecast = ForecastVector {
            temp: None,
            hum: Some(50.0),
            ..ForecastVector::default()
        };
        let decision = decide(&forecast, &Limits::default(), Lang::En);

        assert_eq!(
            decision.commands,
            commands(&[(Actuator::Fan, false), (Actuator::Heater, false)])
        );
        assert_eq!(decision.reason_codes(), vec![ReasonCode::Stable]);
    }

    #[test]
    fn test_empty_forecast_is_stable() {
        // ---
        let decision = decide(&ForecastVector::default(), &Limits::default(), Lang::Es);
        assert_eq!(decision.status, Status::Optimal);
        assert_eq!(decision.message, "✅ Pronóstico Estable");
    }

    #[test]
    fn test_low_light_is_a_no_op() {
        // ---
        let forecast = create_test_forecast(22.0, 50.0, 4000.0, 1500.0);
        let decision = decide(&forecast, &Limits::default(), Lang::En);

        assert_eq!(decision.status, Status::Optimal);
        assert_eq!(decision.commands.get(&Actuator::Lights), None);
        assert_eq!(decision.reason_codes(), vec![ReasonCode::Stable]);
    }

    #[test]
    fn test_decide_is_deterministic() {
        // ---
        let forecast = create_test_forecast(29.3, 72.0, 3100.0, 3300.0);
        let limits = Limits::default();
        let first = decide(&forecast, &limits, Lang::Es);
        let second = decide(&forecast, &limits, Lang::Es);
        assert_eq!(first, second);
    }

    #[test]
    fn test_custom_limits() {
        // ---
        let limits = Limits {
            max_temp: 35.0,
            min_temp: 10.0,
            max_hum: 95.0,
            soil_dry_limit: 4000.0,
        };
        let forecast = create_test_forecast(31.4, 85.0, 0.0, 3500.0);
        let decision = decide(&forecast, &limits, Lang::En);
        assert_eq!(decision.status, Status::Optimal);
    }
}
