//! Persisted state of the orchestrator FSM.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A phase of the orchestrator FSM. See `orchestrator` module docs for the
/// transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Classifying,
    Planning,
    PlanReview,
    Executing,
    Replanning,
    Complete,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Classifying => "classifying",
            Self::Planning => "planning",
            Self::PlanReview => "plan_review",
            Self::Executing => "executing",
            Self::Replanning => "replanning",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for Phase {
    type Err = PhaseParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "classifying" => Ok(Self::Classifying),
            "planning" => Ok(Self::Planning),
            "plan_review" => Ok(Self::PlanReview),
            "executing" => Ok(Self::Executing),
            "replanning" => Ok(Self::Replanning),
            "complete" => Ok(Self::Complete),
            "failed" => Ok(Self::Failed),
            other => Err(PhaseParseError(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PhaseParseError(pub String);

impl fmt::Display for PhaseParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid orchestrator phase: {:?}", self.0)
    }
}

impl std::error::Error for PhaseParseError {}

/// The orchestrator's full persisted state for one goal in flight. A
/// fresh `OrchestratorState::new` sits in `Idle` until `tick` is first
/// called with a goal assigned to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorState {
    pub phase: Phase,
    pub goal_id: Option<Uuid>,
    pub replan_count: i32,
    pub failed_task_id: Option<Uuid>,
    pub failed_error: Option<String>,
}

impl OrchestratorState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            goal_id: None,
            replan_count: 0,
            failed_task_id: None,
            failed_error: None,
        }
    }
}

impl Default for OrchestratorState {
    fn default() -> Self {
        Self::new()
    }
}
