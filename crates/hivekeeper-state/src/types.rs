//! Domain types for the hivekeeper state store.
//!
//! These types represent areas, hives, their polling rules, the nodes
//! attached to them, actuator records and sensor measurements. All types
//! are serializable to/from JSON for storage in redb tables.

use serde::{Deserialize, Serialize};

/// Unique identifier for a hive.
pub type HiveId = u32;

/// Stable identifier of a physical node.
pub type NodeId = String;

/// Discrete actuator level code.
pub type ActuatorState = i32;

/// Level shared by every actuator kind meaning "off / safe".
pub const STATE_OFF: ActuatorState = 1;

// ── Area / Hive ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Area {
    pub name: String,
    pub city: String,
    pub region: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Hive {
    pub id: HiveId,
    /// Name of the owning area.
    pub area: String,
}

// ── Rules ──────────────────────────────────────────────────────────

/// Heater rule: drive towards `target` when colder than `min_threshold`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemperatureRule {
    pub min_threshold: i32,
    pub target: i32,
}

/// How the three thresholds of a ventilation level combine.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CombineMode {
    And,
    #[default]
    Or,
}

/// Ventilation levels, numbered the way actuators encode them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum VentilationLevel {
    Off = 1,
    Low = 2,
    Medium = 3,
    High = 4,
}

impl VentilationLevel {
    pub const ALL: [VentilationLevel; 4] = [Self::Off, Self::Low, Self::Medium, Self::High];

    /// Actuator state code for this level.
    pub fn code(self) -> ActuatorState {
        self as ActuatorState
    }

    fn slot(self) -> usize {
        self as usize - 1
    }
}

/// Thresholds for one ventilation level.
///
/// `combine` is ignored for [`VentilationLevel::Off`], which always
/// triggers when any reading falls below its maximum.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LevelThresholds {
    pub max_temperature: i32,
    pub max_humidity: i32,
    pub max_co2: i32,
    #[serde(default)]
    pub combine: CombineMode,
}

/// Fixed four-slot ventilation rule, indexed by [`VentilationLevel`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VentilationRule {
    levels: [Option<LevelThresholds>; 4],
}

impl VentilationRule {
    pub fn level(&self, level: VentilationLevel) -> Option<&LevelThresholds> {
        self.levels[level.slot()].as_ref()
    }

    pub fn set_level(&mut self, level: VentilationLevel, thresholds: Option<LevelThresholds>) {
        self.levels[level.slot()] = thresholds;
    }

    pub fn with_level(mut self, level: VentilationLevel, thresholds: LevelThresholds) -> Self {
        self.set_level(level, Some(thresholds));
        self
    }

    pub fn is_defined(&self) -> bool {
        self.levels.iter().any(Option::is_some)
    }
}

/// Polling rule owned by exactly one hive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rule {
    pub hive_id: HiveId,
    /// Polling interval in scheduler interval units. Always positive.
    pub polling_interval: u32,
    pub temperature: Option<TemperatureRule>,
    #[serde(default)]
    pub ventilation: VentilationRule,
}

impl Rule {
    /// A rule with no sub-rule defined.
    pub fn inert(hive_id: HiveId, polling_interval: u32) -> Self {
        Self {
            hive_id,
            polling_interval,
            temperature: None,
            ventilation: VentilationRule::default(),
        }
    }

    pub fn has_temperature_rule(&self) -> bool {
        self.temperature.is_some()
    }

    pub fn has_ventilation_rule(&self) -> bool {
        self.ventilation.is_defined()
    }

    /// Whether the rule has nothing to evaluate and must not be scheduled.
    pub fn is_inert(&self) -> bool {
        !self.has_temperature_rule() && !self.has_ventilation_rule()
    }

    /// Drop every sub-rule, keeping the polling interval.
    pub fn clear(&mut self) {
        self.temperature = None;
        self.ventilation = VentilationRule::default();
    }
}

// ── Nodes ──────────────────────────────────────────────────────────

/// Role tag announced by a node on registration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Temperature / humidity / CO2 sensor.
    #[serde(rename = "thc")]
    ClimateSensor,
    /// Frequency / noise sensor.
    #[serde(rename = "fn")]
    SoundSensor,
    #[serde(rename = "w")]
    WeightSensor,
    /// Bee traffic counter.
    #[serde(rename = "c")]
    CounterSensor,
    #[serde(rename = "ta")]
    TemperatureActuator,
    #[serde(rename = "va")]
    VentilationActuator,
}

impl NodeKind {
    pub fn is_actuator(self) -> bool {
        matches!(self, Self::TemperatureActuator | Self::VentilationActuator)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Declared keep-alive period in seconds.
    pub keep_alive_secs: u32,
    /// Unix timestamp (seconds) of the last message received from the node.
    pub last_seen: u64,
    pub hive_id: Option<HiveId>,
}

/// Network address and last-known level of an actuator node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActuatorRecord {
    pub node_id: NodeId,
    pub address: String,
    pub state: ActuatorState,
}

// ── Measurements ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementKind {
    Temperature,
    Humidity,
    Co2,
    Frequency,
    Noise,
    Weight,
    CounterIn,
    CounterOut,
}

impl MeasurementKind {
    /// Stable name used in storage keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Co2 => "co2",
            Self::Frequency => "frequency",
            Self::Noise => "noise",
            Self::Weight => "weight",
            Self::CounterIn => "counter_in",
            Self::CounterOut => "counter_out",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Measurement {
    pub node_id: NodeId,
    pub kind: MeasurementKind,
    pub value: i32,
    /// Unix timestamp (seconds).
    pub timestamp: u64,
}

impl Measurement {
    /// Storage key: `{node_id}/{kind}/{timestamp}` with a zero-padded
    /// timestamp so keys sort chronologically within a kind.
    pub fn table_key(&self) -> String {
        format!("{}/{}/{:020}", self.node_id, self.kind.as_str(), self.timestamp)
    }
}
