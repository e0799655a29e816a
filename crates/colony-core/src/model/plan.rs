//! Validated planner output: the typed shape a raw planner JSON document
//! is converted into once it passes the planner validator.

use serde::{Deserialize, Serialize};

/// A single task as proposed by the planner, before it has been assigned
/// an id or inserted into a goal's graph. `dependencies` are indices into
/// the enclosing `PlannerOutput::tasks` vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTask {
    pub title: String,
    pub description: String,
    pub agent_role: String,
    pub dependencies: Vec<usize>,
    pub estimated_cost_cents: i64,
    pub priority: i32,
    pub timeout_ms: i64,
}

/// Spending ceilings the planner wants a custom role held to, enforced by
/// the funding contract rather than by the planner itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreasuryLimits {
    pub max_single_transfer: f64,
    pub max_daily_spend: f64,
}

/// A role the planner wants instantiated that has no preset definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomRole {
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    pub allowed_tools: Vec<String>,
    pub model: String,
    pub rationale: String,
    pub treasury_limits: Option<TreasuryLimits>,
}

/// The full, validated output of a planning pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerOutput {
    pub analysis: String,
    pub strategy: String,
    pub tasks: Vec<PlanTask>,
    #[serde(default)]
    pub custom_roles: Vec<CustomRole>,
    #[serde(default)]
    pub risks: Vec<String>,
    pub estimated_total_cost_cents: i64,
    pub estimated_time_minutes: i64,
}
