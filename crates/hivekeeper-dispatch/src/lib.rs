//! hivekeeper-dispatch: failure-aware delivery of actuator commands.
//!
//! The scheduler pushes [`ActuatorCommand`]s into an unbounded FIFO; a
//! single [`CommandDispatcher`] worker drains it, performs the network
//! round trip through an [`ActuatorTransport`] and records the outcome in
//! the state store.
//!
//! # Architecture
//!
//! ```text
//! Controller ──push──▶ CommandSender ══ mpsc (unbounded) ══▶ CommandDispatcher
//!                                                              ├── ActuatorTransport::put()
//!                                                              │     └── tokio::time::timeout
//!                                                              ├── ReplyStatus → set_actuator_state
//!                                                              └── no reply → is_unreachable()
//! ```
//!
//! # Reachability
//!
//! An actuator that does not answer is declared unreachable once it has
//! been silent for longer than `keep_alive × max_failed_keepalive`; its
//! state is then reset to `1` (off) so the next evaluation re-issues the
//! desired level when it comes back.

pub mod command;
pub mod dispatcher;
pub mod reachability;
pub mod transport;

pub use command::{
    ActuatorCommand, ActuatorPayload, ActuatorResource, CommandReceiver, CommandSender,
    command_channel,
};
pub use dispatcher::{CommandDispatcher, DispatchOutcome};
pub use reachability::is_unreachable;
pub use transport::{
    ActuatorTransport, HttpActuatorTransport, ReplyStatus, TransportError, TransportResult,
};
