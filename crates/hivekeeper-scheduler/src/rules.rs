//! Rule evaluator: pure threshold logic.
//!
//! Given a hive's rule, the latest climate readings and the last-known
//! state of its actuators, computes the state each actuator should move to.
//! Only changes are returned; an actuator already at its target produces no
//! decision.

use tracing::warn;

use hivekeeper_dispatch::ActuatorResource;
use hivekeeper_state::{
    ActuatorState, CombineMode, LevelThresholds, Measurement, MeasurementKind, Rule, STATE_OFF,
    TemperatureRule, VentilationLevel, VentilationRule,
};

/// Measurement kinds the evaluator reads.
pub const CLIMATE_KINDS: [MeasurementKind; 3] = [
    MeasurementKind::Temperature,
    MeasurementKind::Humidity,
    MeasurementKind::Co2,
];

/// Latest climate readings of a hive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readings {
    pub temperature: Option<i32>,
    pub humidity: Option<i32>,
    pub co2: Option<i32>,
}

impl Readings {
    /// Keep the newest value of each climate kind.
    pub fn from_measurements(measurements: &[Measurement]) -> Self {
        let mut readings = Self::default();
        let mut newest = [0u64; 3];
        for m in measurements {
            let (slot, value) = match m.kind {
                MeasurementKind::Temperature => (0, &mut readings.temperature),
                MeasurementKind::Humidity => (1, &mut readings.humidity),
                MeasurementKind::Co2 => (2, &mut readings.co2),
                _ => continue,
            };
            if value.is_none() || m.timestamp >= newest[slot] {
                *value = Some(m.value);
                newest[slot] = m.timestamp;
            }
        }
        readings
    }
}

/// Last-known state of each actuator kind linked to the hive. `None` means
/// the hive has no such actuator, so nothing is decided for it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActuatorStates {
    pub temperature: Option<ActuatorState>,
    pub ventilation: Option<ActuatorState>,
}

/// A state change for one actuator kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub resource: ActuatorResource,
    pub state: ActuatorState,
}

/// Result of matching readings against a sub-rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Matched(ActuatorState),
    /// No branch matched; the actuator falls back to off.
    Unhandled,
}

impl Target {
    pub fn state(self) -> ActuatorState {
        match self {
            Self::Matched(state) => state,
            Self::Unhandled => STATE_OFF,
        }
    }
}

/// Heater target for temperature `t`.
pub fn temperature_target(rule: &TemperatureRule, t: i32) -> Target {
    if t < rule.min_threshold {
        Target::Matched(rule.target)
    } else if t >= rule.target {
        Target::Matched(STATE_OFF)
    } else {
        Target::Unhandled
    }
}

/// Ventilation level for the given readings. Levels are tried from high to
/// low; the first that triggers wins.
pub fn ventilation_target(rule: &VentilationRule, temperature: i32, humidity: i32, co2: i32) -> Target {
    for level in [
        VentilationLevel::High,
        VentilationLevel::Medium,
        VentilationLevel::Low,
    ] {
        if let Some(thresholds) = rule.level(level) {
            if exceeds(thresholds, temperature, humidity, co2) {
                return Target::Matched(level.code());
            }
        }
    }

    if let Some(off) = rule.level(VentilationLevel::Off) {
        let below = temperature < off.max_temperature
            || humidity < off.max_humidity
            || co2 < off.max_co2;
        if below {
            return Target::Matched(VentilationLevel::Off.code());
        }
    }

    Target::Unhandled
}

fn exceeds(thresholds: &LevelThresholds, temperature: i32, humidity: i32, co2: i32) -> bool {
    let above = [
        temperature > thresholds.max_temperature,
        humidity > thresholds.max_humidity,
        co2 > thresholds.max_co2,
    ];
    match thresholds.combine {
        CombineMode::And => above.iter().all(|&a| a),
        CombineMode::Or => above.iter().any(|&a| a),
    }
}

/// Decide which actuators of the hive must change state.
pub fn evaluate(rule: &Rule, readings: &Readings, current: &ActuatorStates) -> Vec<Decision> {
    let mut decisions = Vec::new();

    if let (Some(temp_rule), Some(t), Some(state)) =
        (&rule.temperature, readings.temperature, current.temperature)
    {
        let target = temperature_target(temp_rule, t);
        if target == Target::Unhandled {
            warn!(
                hive_id = rule.hive_id,
                temperature = t,
                min_threshold = temp_rule.min_threshold,
                target = temp_rule.target,
                "no temperature rule branch matched, defaulting to off"
            );
        }
        if target.state() != state {
            decisions.push(Decision {
                resource: ActuatorResource::Temperature,
                state: target.state(),
            });
        }
    }

    if let (true, Some(t), Some(h), Some(c), Some(state)) = (
        rule.has_ventilation_rule(),
        readings.temperature,
        readings.humidity,
        readings.co2,
        current.ventilation,
    ) {
        let target = ventilation_target(&rule.ventilation, t, h, c);
        if target == Target::Unhandled {
            warn!(
                hive_id = rule.hive_id,
                temperature = t,
                humidity = h,
                co2 = c,
                "no ventilation level matched, defaulting to off"
            );
        }
        if target.state() != state {
            decisions.push(Decision {
                resource: ActuatorResource::Ventilation,
                state: target.state(),
            });
        }
    }

    decisions
}
