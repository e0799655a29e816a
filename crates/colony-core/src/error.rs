//! The error taxonomy: typed categories instead of prose.
//!
//! `Fatal` is not a distinct type here — durable-store failures propagate
//! as `anyhow::Error` via `?`, per the crash-safety rule that a tick
//! aborts before its terminal state write rather than trying to recover.

use uuid::Uuid;

use crate::model::TaskStatus;
use crate::validator::PlanValidationError;

/// Non-retryable input rejected before any state was mutated.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("planner output invalid: {0}")]
    Planner(#[from] PlanValidationError),

    #[error("message envelope invalid: {reason}")]
    Envelope { reason: String },
}

/// An operation that violates a task-graph precondition. Non-retryable;
/// logged and surfaced to the caller verbatim.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BusinessRuleViolation {
    #[error("task {task_id} cannot be assigned: expected status pending, found {actual}")]
    AssignNonPending { task_id: Uuid, actual: TaskStatus },

    #[error(
        "task {task_id} cannot be completed: expected status assigned or running, found {actual}"
    )]
    CompleteUnassigned { task_id: Uuid, actual: TaskStatus },

    #[error("task {task_id} cannot be failed: expected status assigned or running, found {actual}")]
    FailUnassigned { task_id: Uuid, actual: TaskStatus },

    #[error("task {task_id} is already completed")]
    DoubleComplete { task_id: Uuid },

    #[error("task {task_id} cannot go from {from} to {to}")]
    InvalidTransition {
        task_id: Uuid,
        from: TaskStatus,
        to: TaskStatus,
    },
}

/// A failed attempt that is still within its retry budget. Carries the
/// attempt count so callers can decide whether to surface or retry again;
/// produced by the messaging layer's outbound send and by any other
/// bounded-backoff operation.
#[derive(Debug, thiserror::Error)]
#[error("operation failed after {attempts} attempt(s): {source}")]
pub struct TransientError {
    pub attempts: u32,
    #[source]
    pub source: anyhow::Error,
}

impl TransientError {
    pub fn new(attempts: u32, source: anyhow::Error) -> Self {
        Self { attempts, source }
    }
}
