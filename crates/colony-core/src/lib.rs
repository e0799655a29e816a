//! Goal lifecycle FSM, task graph, planner validator, messaging layer, and
//! health monitor for the colony orchestrator.
//!
//! This crate is the core described in `spec.md`/`SPEC_FULL.md`: it never
//! invokes an LLM, never opens a socket, and never touches a disk directly.
//! Every external effect goes through one of the five traits in
//! [`contracts`], so a caller assembles an `Orchestrator` and a
//! `HealthMonitor` from `Arc<dyn Trait>` parameters rather than reaching
//! for module-level singletons.

pub mod contracts;
pub mod error;
pub mod graph;
pub mod health;
pub mod messaging;
pub mod model;
pub mod orchestrator;
pub mod validator;

pub use error::{BusinessRuleViolation, TransientError, ValidationError};
pub use health::{HealAction, HealActionKind, HealthIssue, HealthMonitor, HealthMonitorConfig};
pub use messaging::{HandlerRegistry, MessageHandler};
pub use orchestrator::{Orchestrator, OrchestratorConfig, TickSummary};
