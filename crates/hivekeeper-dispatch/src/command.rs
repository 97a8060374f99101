//! Actuator commands and the FIFO that carries them to the dispatcher.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use hivekeeper_state::{ActuatorState, NodeId, NodeKind};

/// Resource exposed by an actuator node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActuatorResource {
    Temperature,
    Ventilation,
}

impl ActuatorResource {
    pub fn path(self) -> &'static str {
        match self {
            Self::Temperature => "/temperature",
            Self::Ventilation => "/ventilation",
        }
    }

    /// Resource served by an actuator of the given kind; `None` for sensors.
    pub fn for_kind(kind: NodeKind) -> Option<Self> {
        match kind {
            NodeKind::TemperatureActuator => Some(Self::Temperature),
            NodeKind::VentilationActuator => Some(Self::Ventilation),
            _ => None,
        }
    }
}

/// Wire payload: a JSON object with a single key, `t` or `v`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActuatorPayload {
    #[serde(rename = "t")]
    Temperature(ActuatorState),
    #[serde(rename = "v")]
    Ventilation(ActuatorState),
}

impl ActuatorPayload {
    pub fn new(resource: ActuatorResource, state: ActuatorState) -> Self {
        match resource {
            ActuatorResource::Temperature => Self::Temperature(state),
            ActuatorResource::Ventilation => Self::Ventilation(state),
        }
    }

    pub fn resource(self) -> ActuatorResource {
        match self {
            Self::Temperature(_) => ActuatorResource::Temperature,
            Self::Ventilation(_) => ActuatorResource::Ventilation,
        }
    }

    pub fn state(self) -> ActuatorState {
        match self {
            Self::Temperature(state) | Self::Ventilation(state) => state,
        }
    }
}

/// One outbound state change for one actuator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuatorCommand {
    pub actuator: NodeId,
    pub address: String,
    pub payload: ActuatorPayload,
}

impl ActuatorCommand {
    pub fn new(
        actuator: impl Into<NodeId>,
        address: impl Into<String>,
        resource: ActuatorResource,
        state: ActuatorState,
    ) -> Self {
        Self {
            actuator: actuator.into(),
            address: address.into(),
            payload: ActuatorPayload::new(resource, state),
        }
    }

    pub fn resource(&self) -> ActuatorResource {
        self.payload.resource()
    }

    pub fn state(&self) -> ActuatorState {
        self.payload.state()
    }

    /// JSON request body.
    pub fn body(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&self.payload)
    }
}

pub type CommandReceiver = mpsc::UnboundedReceiver<ActuatorCommand>;

/// Producer half of the command FIFO. Cloneable; pushing never blocks.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<ActuatorCommand>,
}

impl CommandSender {
    /// Enqueue a command. Returns false if the dispatcher has gone away.
    pub fn push(&self, command: ActuatorCommand) -> bool {
        match self.tx.send(command) {
            Ok(()) => true,
            Err(mpsc::error::SendError(command)) => {
                warn!(
                    actuator = %command.actuator,
                    path = command.resource().path(),
                    "dispatcher closed, command dropped"
                );
                false
            }
        }
    }
}

/// Create the unbounded command FIFO.
pub fn command_channel() -> (CommandSender, CommandReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CommandSender { tx }, rx)
}
