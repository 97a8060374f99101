//! hivekeeper-scheduler: hive polling and rule evaluation.
//!
//! Multiplexes every hive's polling interval onto a single timer. When the
//! timer fires, the hives that are due have their threshold rules evaluated
//! against the latest sensor readings, and any actuator that must change
//! state gets a command on the dispatcher's queue.
//!
//! # Architecture
//!
//! ```text
//! Controller (async mutex)
//!   ├── DeltaQueue   countdown → [HiveId]
//!   ├── PollingClock one-shot timer + stopwatch, generation-checked ticks
//!   ├── HiveRepository (rules, nodes, measurements, actuator records)
//!   └── rules::evaluate() ──▶ CommandSender ──▶ hivekeeper-dispatch
//! ```
//!
//! Polling intervals are stored as integers and scaled by the configured
//! interval unit.

pub mod clock;
pub mod controller;
pub mod error;
pub mod queue;
pub mod rules;

pub use clock::{PollingClock, Tick};
pub use controller::Controller;
pub use error::{SchedulerError, SchedulerResult};
pub use queue::DeltaQueue;
pub use rules::{ActuatorStates, Decision, Readings, Target, evaluate};
