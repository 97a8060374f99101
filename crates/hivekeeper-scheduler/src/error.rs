//! Scheduler error types.

use hivekeeper_state::{HiveId, StateError};
use thiserror::Error;

/// Errors that can occur during scheduling operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("event queue is empty")]
    EmptyQueue,

    #[error("hive {0} is already scheduled")]
    AlreadyScheduled(HiveId),

    #[error("rule belongs to hive {rule}, not hive {hive}")]
    RuleMismatch { hive: HiveId, rule: HiveId },

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
