//! Prompt assembly and the classifier's typed response shape.
//!
//! The core treats LLM content as opaque beyond the `chat` contract
//! (`spec.md` §1's non-goal), so these prompts are deliberately plain —
//! they exist to hand the LLM enough context to produce the JSON the
//! classifier/planner validator expects, not to encode prompt-engineering
//! policy.

use serde::{Deserialize, Serialize};

use crate::model::{ChildAgent, Goal, Task};

pub const CLASSIFIER_SYSTEM_PROMPT: &str = "You are the classification stage of a goal orchestrator. \
Given a goal, respond with a JSON object {\"estimatedSteps\": integer, \"reason\": string, \
\"stepOutline\": [string, ...]} describing how many independent steps completing it would take. \
Respond with JSON only.";

pub const PLANNER_SYSTEM_PROMPT: &str = "You are the planning stage of a goal orchestrator. \
Given a goal and the current colony context, respond with a JSON object matching: \
{\"analysis\": string, \"strategy\": string, \"tasks\": [{\"title\": string, \"description\": string, \
\"agentRole\": string, \"dependencies\": [integer, ...], \"estimatedCostCents\": integer, \
\"priority\": integer, \"timeoutMs\": integer}, ...], \"customRoles\": [...], \"risks\": [string, ...], \
\"estimatedTotalCostCents\": integer, \"estimatedTimeMinutes\": integer}. \
`dependencies` are indices into `tasks`. Respond with JSON only.";

/// The classifier's typed response, per `spec.md` §4.4's `classifying`
/// phase contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierOutput {
    pub estimated_steps: i64,
    pub reason: String,
    #[serde(default)]
    pub step_outline: Vec<String>,
}

pub fn classifier_prompt(goal: &Goal) -> String {
    format!(
        "Goal title: {}\nGoal description: {}\n",
        goal.title, goal.description
    )
}

fn agent_availability_block(idle: &[ChildAgent]) -> String {
    if idle.is_empty() {
        return "No idle agents currently available; the planner should still produce roles, \
            spawning/funding is handled outside this call.".to_string();
    }
    let lines: Vec<String> = idle
        .iter()
        .map(|agent| format!("- {} ({}) at {}", agent.name, agent.role, agent.address))
        .collect();
    format!("Idle agents available now:\n{}", lines.join("\n"))
}

pub fn planner_prompt(goal: &Goal, tier: Option<&str>, idle: &[ChildAgent]) -> String {
    format!(
        "Goal title: {}\nGoal description: {}\nSurvival tier: {}\n{}\n",
        goal.title,
        goal.description,
        tier.unwrap_or("normal"),
        agent_availability_block(idle),
    )
}

pub fn replan_prompt(goal: &Goal, failed_task: &Task, failed_error: &str, tier: Option<&str>, idle: &[ChildAgent]) -> String {
    format!(
        "Goal title: {}\nGoal description: {}\nSurvival tier: {}\n\
         A previous plan's task \"{}\" failed permanently with: {}\n\
         Produce a replacement plan for the remaining work.\n{}\n",
        goal.title,
        goal.description,
        tier.unwrap_or("normal"),
        failed_task.title,
        failed_error,
        agent_availability_block(idle),
    )
}
