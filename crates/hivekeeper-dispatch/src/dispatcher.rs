//! Command dispatcher: single worker draining the command FIFO.
//!
//! Every command is one network round trip. The outcome decides whether
//! the actuator's persisted state moves:
//!
//! - success reply: persist the commanded state;
//! - failure reply: log, nothing persisted, no retry;
//! - no reply: consult the node's keep-alive budget and, when it is
//!   exhausted, persist the safe state `1`.
//!
//! The dispatcher is the only writer of actuator state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use hivekeeper_state::{HiveRepository, STATE_OFF, StateError, StateResult};

use crate::command::{ActuatorCommand, CommandReceiver};
use crate::reachability::{DEFAULT_MAX_FAILED_KEEPALIVE, epoch_secs, is_unreachable};
use crate::transport::{ActuatorTransport, ReplyStatus, TransportError};

/// Default deadline for one request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// What happened to one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The actuator accepted the change; its state was persisted.
    Applied,
    /// The actuator answered with a failure status.
    Rejected(u16),
    /// No answer, but the node is still within its keep-alive budget.
    TransientMiss,
    /// No answer and the keep-alive budget is exhausted; state reset to off.
    Unreachable,
}

pub struct CommandDispatcher<T> {
    store: Arc<dyn HiveRepository>,
    transport: T,
    request_timeout: Duration,
    max_failed_keepalive: u32,
}

impl<T: ActuatorTransport> CommandDispatcher<T> {
    pub fn new(store: Arc<dyn HiveRepository>, transport: T) -> Self {
        Self {
            store,
            transport,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_failed_keepalive: DEFAULT_MAX_FAILED_KEEPALIVE,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_failed_keepalive(mut self, max: u32) -> Self {
        self.max_failed_keepalive = max;
        self
    }

    /// Drain commands until shutdown is signalled or every sender is gone.
    ///
    /// A command already taken from the queue runs to completion (or to its
    /// timeout) before the shutdown signal is observed.
    pub async fn run(self, mut commands: CommandReceiver, mut shutdown: watch::Receiver<bool>) {
        info!(
            timeout_ms = self.request_timeout.as_millis() as u64,
            max_failed_keepalive = self.max_failed_keepalive,
            "command dispatcher started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    debug!("command dispatcher shutting down");
                    break;
                }
                next = commands.recv() => {
                    let Some(command) = next else {
                        debug!("command channel closed");
                        break;
                    };
                    if let Err(e) = self.handle(&command).await {
                        error!(
                            actuator = %command.actuator,
                            error = %e,
                            "failed to record dispatch outcome"
                        );
                    }
                }
            }
        }

        info!("command dispatcher stopped");
    }

    /// Send one command and persist whatever its outcome implies.
    pub async fn handle(&self, command: &ActuatorCommand) -> StateResult<DispatchOutcome> {
        let body = command.body().map_err(|e| StateError::Serialize(e.to_string()))?;
        let resource = command.resource();

        let reply = match tokio::time::timeout(
            self.request_timeout,
            self.transport.put(&command.address, resource, body),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        };

        match reply {
            Ok(status @ (ReplyStatus::Changed | ReplyStatus::Content)) => {
                self.store
                    .set_actuator_state(&command.actuator, command.state())?;
                info!(
                    actuator = %command.actuator,
                    path = resource.path(),
                    state = command.state(),
                    ?status,
                    "actuator state applied"
                );
                Ok(DispatchOutcome::Applied)
            }
            Ok(ReplyStatus::Failed(code)) => {
                warn!(
                    actuator = %command.actuator,
                    path = resource.path(),
                    code,
                    "actuator rejected command"
                );
                Ok(DispatchOutcome::Rejected(code))
            }
            Err(e) => self.on_no_reply(command, &e),
        }
    }

    fn on_no_reply(
        &self,
        command: &ActuatorCommand,
        cause: &TransportError,
    ) -> StateResult<DispatchOutcome> {
        let Some(node) = self.store.get_node(&command.actuator)? else {
            warn!(actuator = %command.actuator, error = %cause, "no reply from unknown node");
            return Ok(DispatchOutcome::TransientMiss);
        };

        let now = epoch_secs();
        if is_unreachable(&node, now, self.max_failed_keepalive) {
            self.store.set_actuator_state(&command.actuator, STATE_OFF)?;
            warn!(
                actuator = %command.actuator,
                silent_secs = now.saturating_sub(node.last_seen),
                keep_alive = node.keep_alive_secs,
                error = %cause,
                "actuator unreachable, state reset to off"
            );
            Ok(DispatchOutcome::Unreachable)
        } else {
            warn!(
                actuator = %command.actuator,
                error = %cause,
                "no reply from actuator"
            );
            Ok(DispatchOutcome::TransientMiss)
        }
    }
}
