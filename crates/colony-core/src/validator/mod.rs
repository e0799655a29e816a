//! Planner validator: turns an arbitrary `serde_json::Value` — the
//! decoded JSON an LLM planner call returned — into a strongly typed
//! [`PlannerOutput`], or a precise error naming the failing field.
//!
//! Validation is fail-fast: the first violated rule, in the order below,
//! is the one returned. No partial `PlannerOutput` is ever produced.
//!
//! 1. top-level value is a non-null object
//! 2. `analysis`/`strategy` present and non-empty
//! 3. `tasks` present, an array, non-empty
//! 4. each task has its required fields, with `estimatedCostCents >= 0`,
//!    `timeoutMs > 0`, `dependencies` an array of integers
//! 5. each dependency index is in range and not a self-reference
//! 6. the dependency graph as a whole has no cycles
//! 7. `customRoles` names are unique and each has its required fields

use serde_json::Value;

use crate::model::{CustomRole, PlanTask, PlannerOutput, TreasuryLimits};

/// Why a planner document was rejected. `Display` always embeds the
/// offending field name so callers (and tests) can assert on substrings.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlanValidationError {
    #[error("planner output must be an object")]
    NotAnObject,

    #[error("field `{field}` is required and must be a non-empty string")]
    MissingOrEmptyField { field: &'static str },

    #[error("field `tasks` is required and must be a non-empty array")]
    TasksMissingOrEmpty,

    #[error("task[{index}].{field} is required")]
    TaskFieldMissing { index: usize, field: &'static str },

    #[error("task[{index}].estimatedCostCents must be >= 0")]
    NegativeCost { index: usize },

    #[error("task[{index}].timeoutMs must be > 0")]
    NonPositiveTimeout { index: usize },

    #[error("task[{index}].dependencies must be an array of integers")]
    DependenciesNotIntegerArray { index: usize },

    #[error("task[{index}].dependencies[{dep_pos}] = {dep} is out-of-range for {task_count} tasks")]
    DependencyOutOfRange {
        index: usize,
        dep_pos: usize,
        dep: i64,
        task_count: usize,
    },

    #[error("task[{index}] depends on itself")]
    SelfDependency { index: usize },

    #[error("dependency graph contains a cycle: {0:?}")]
    Cycle(Vec<usize>),

    #[error("customRoles[{index}].name `{name}` is a duplicate")]
    DuplicateRoleName { index: usize, name: String },

    #[error("customRoles[{index}].{field} is required")]
    RoleFieldMissing { index: usize, field: &'static str },

    #[error("customRoles[{index}].treasuryLimits must be an object with non-negative maxSingleTransfer and maxDailySpend")]
    InvalidTreasuryLimits { index: usize },
}

type Result<T> = std::result::Result<T, PlanValidationError>;

/// Validate and convert. See module docs for the exact rule order.
pub fn validate_planner_output(value: &Value) -> Result<PlannerOutput> {
    let obj = value.as_object().ok_or(PlanValidationError::NotAnObject)?;

    let analysis = non_empty_string(obj, "analysis")?;
    let strategy = non_empty_string(obj, "strategy")?;

    let tasks_value = obj
        .get("tasks")
        .and_then(Value::as_array)
        .filter(|a| !a.is_empty())
        .ok_or(PlanValidationError::TasksMissingOrEmpty)?;

    let mut tasks = Vec::with_capacity(tasks_value.len());
    for (index, raw) in tasks_value.iter().enumerate() {
        tasks.push(validate_task(index, raw)?);
    }

    for (index, task) in tasks.iter().enumerate() {
        for (dep_pos, &dep) in task.dependencies.iter().enumerate() {
            if dep == index {
                return Err(PlanValidationError::SelfDependency { index });
            }
            if dep >= tasks.len() {
                return Err(PlanValidationError::DependencyOutOfRange {
                    index,
                    dep_pos,
                    dep: dep as i64,
                    task_count: tasks.len(),
                });
            }
        }
    }

    check_for_cycles(&tasks)?;

    let custom_roles = match obj.get("customRoles") {
        Some(Value::Array(roles)) => validate_custom_roles(roles)?,
        Some(Value::Null) | None => Vec::new(),
        Some(_) => Vec::new(),
    };

    let risks = obj
        .get("risks")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();

    let estimated_total_cost_cents = obj
        .get("estimatedTotalCostCents")
        .and_then(Value::as_i64)
        .unwrap_or_else(|| tasks.iter().map(|t| t.estimated_cost_cents).sum());

    let estimated_time_minutes = obj
        .get("estimatedTimeMinutes")
        .and_then(Value::as_i64)
        .unwrap_or(0);

    Ok(PlannerOutput {
        analysis,
        strategy,
        tasks,
        custom_roles,
        risks,
        estimated_total_cost_cents,
        estimated_time_minutes,
    })
}

fn non_empty_string(obj: &serde_json::Map<String, Value>, field: &'static str) -> Result<String> {
    obj.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .ok_or(PlanValidationError::MissingOrEmptyField { field })
}

fn validate_task(index: usize, raw: &Value) -> Result<PlanTask> {
    let obj = raw
        .as_object()
        .ok_or(PlanValidationError::TaskFieldMissing { index, field: "task" })?;

    let title = obj
        .get("title")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(PlanValidationError::TaskFieldMissing { index, field: "title" })?
        .to_owned();

    let description = obj
        .get("description")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(PlanValidationError::TaskFieldMissing {
            index,
            field: "description",
        })?
        .to_owned();

    let agent_role = obj
        .get("agentRole")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(PlanValidationError::TaskFieldMissing {
            index,
            field: "agentRole",
        })?
        .to_owned();

    let estimated_cost_cents = obj
        .get("estimatedCostCents")
        .and_then(Value::as_i64)
        .ok_or(PlanValidationError::TaskFieldMissing {
            index,
            field: "estimatedCostCents",
        })?;
    if estimated_cost_cents < 0 {
        return Err(PlanValidationError::NegativeCost { index });
    }

    let timeout_ms = obj
        .get("timeoutMs")
        .and_then(Value::as_i64)
        .ok_or(PlanValidationError::TaskFieldMissing {
            index,
            field: "timeoutMs",
        })?;
    if timeout_ms <= 0 {
        return Err(PlanValidationError::NonPositiveTimeout { index });
    }

    let priority = obj.get("priority").and_then(Value::as_i64).unwrap_or(0) as i32;

    let dependencies = match obj.get("dependencies") {
        Some(Value::Array(arr)) => {
            let mut deps = Vec::with_capacity(arr.len());
            for v in arr {
                let n = v
                    .as_i64()
                    .filter(|n| *n >= 0)
                    .ok_or(PlanValidationError::DependenciesNotIntegerArray { index })?;
                deps.push(n as usize);
            }
            deps
        }
        Some(Value::Null) | None => Vec::new(),
        Some(_) => return Err(PlanValidationError::DependenciesNotIntegerArray { index }),
    };

    Ok(PlanTask {
        title,
        description,
        agent_role,
        dependencies,
        estimated_cost_cents,
        priority,
        timeout_ms,
    })
}

/// Kahn's algorithm over the dependency-index adjacency list: repeatedly
/// remove zero-in-degree nodes; if any node is never removed, it sits on
/// a cycle. `dependencies[i]` are edges `i -> dep`, so in-degree here
/// counts how many other tasks depend on a given task.
fn check_for_cycles(tasks: &[PlanTask]) -> Result<()> {
    let n = tasks.len();
    let mut in_degree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

    for (i, task) in tasks.iter().enumerate() {
        for &dep in &task.dependencies {
            dependents[dep].push(i);
            in_degree[i] += 1;
        }
    }

    let mut queue: std::collections::VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut visited = 0usize;

    while let Some(node) = queue.pop_front() {
        visited += 1;
        for &dependent in &dependents[node] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if visited != n {
        let remaining: Vec<usize> = (0..n).filter(|&i| in_degree[i] > 0).collect();
        return Err(PlanValidationError::Cycle(remaining));
    }

    Ok(())
}

fn validate_custom_roles(roles: &[Value]) -> Result<Vec<CustomRole>> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(roles.len());

    for (index, raw) in roles.iter().enumerate() {
        let obj = raw.as_object().ok_or(PlanValidationError::RoleFieldMissing {
            index,
            field: "role",
        })?;

        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or(PlanValidationError::RoleFieldMissing { index, field: "name" })?
            .to_owned();

        if !seen.insert(name.clone()) {
            return Err(PlanValidationError::DuplicateRoleName { index, name });
        }

        let description = required_role_str(obj, index, "description")?;
        let system_prompt = required_role_str(obj, index, "systemPrompt")?;
        let model = required_role_str(obj, index, "model")?;
        let rationale = required_role_str(obj, index, "rationale")?;

        let allowed_tools = obj
            .get("allowedTools")
            .and_then(Value::as_array)
            .ok_or(PlanValidationError::RoleFieldMissing {
                index,
                field: "allowedTools",
            })?
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect();

        let treasury_limits = match obj.get("treasuryLimits") {
            None | Some(Value::Null) => None,
            Some(Value::Object(limits)) => {
                let max_single_transfer = limits
                    .get("maxSingleTransfer")
                    .and_then(Value::as_f64)
                    .filter(|n| *n >= 0.0)
                    .ok_or(PlanValidationError::InvalidTreasuryLimits { index })?;
                let max_daily_spend = limits
                    .get("maxDailySpend")
                    .and_then(Value::as_f64)
                    .filter(|n| *n >= 0.0)
                    .ok_or(PlanValidationError::InvalidTreasuryLimits { index })?;
                Some(TreasuryLimits {
                    max_single_transfer,
                    max_daily_spend,
                })
            }
            Some(_) => return Err(PlanValidationError::InvalidTreasuryLimits { index }),
        };

        out.push(CustomRole {
            name,
            description,
            system_prompt,
            allowed_tools,
            model,
            rationale,
            treasury_limits,
        });
    }

    Ok(out)
}

fn required_role_str(
    obj: &serde_json::Map<String, Value>,
    index: usize,
    field: &'static str,
) -> Result<String> {
    obj.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .ok_or(PlanValidationError::RoleFieldMissing { index, field })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_task(deps: Vec<i64>) -> Value {
        json!({
            "title": "do thing",
            "description": "do the thing",
            "agentRole": "generalist",
            "dependencies": deps,
            "estimatedCostCents": 100,
            "priority": 1,
            "timeoutMs": 60_000,
        })
    }

    #[test]
    fn rejects_non_object() {
        let err = validate_planner_output(&json!("nope")).unwrap_err();
        assert!(matches!(err, PlanValidationError::NotAnObject));
    }

    #[test]
    fn rejects_empty_analysis() {
        let doc = json!({
            "analysis": "",
            "strategy": "x",
            "tasks": [minimal_task(vec![])],
        });
        let err = validate_planner_output(&doc).unwrap_err();
        assert!(err.to_string().contains("analysis"));
    }

    #[test]
    fn rejects_empty_tasks() {
        let doc = json!({"analysis": "a", "strategy": "s", "tasks": []});
        let err = validate_planner_output(&doc).unwrap_err();
        assert!(matches!(err, PlanValidationError::TasksMissingOrEmpty));
    }

    #[test]
    fn rejects_negative_cost() {
        let mut task = minimal_task(vec![]);
        task["estimatedCostCents"] = json!(-1);
        let doc = json!({"analysis": "a", "strategy": "s", "tasks": [task]});
        let err = validate_planner_output(&doc).unwrap_err();
        assert!(matches!(err, PlanValidationError::NegativeCost { index: 0 }));
    }

    #[test]
    fn rejects_non_positive_timeout() {
        let mut task = minimal_task(vec![]);
        task["timeoutMs"] = json!(0);
        let doc = json!({"analysis": "a", "strategy": "s", "tasks": [task]});
        let err = validate_planner_output(&doc).unwrap_err();
        assert!(matches!(
            err,
            PlanValidationError::NonPositiveTimeout { index: 0 }
        ));
    }

    #[test]
    fn rejects_out_of_range_dependency() {
        let doc = json!({"analysis": "a", "strategy": "s", "tasks": [minimal_task(vec![5])]});
        let err = validate_planner_output(&doc).unwrap_err();
        assert!(matches!(
            err,
            PlanValidationError::DependencyOutOfRange { index: 0, .. }
        ));
    }

    #[test]
    fn rejects_self_dependency() {
        let doc = json!({"analysis": "a", "strategy": "s", "tasks": [minimal_task(vec![0])]});
        let err = validate_planner_output(&doc).unwrap_err();
        assert!(matches!(err, PlanValidationError::SelfDependency { index: 0 }));
    }

    #[test]
    fn rejects_cycles() {
        let a = minimal_task(vec![1]);
        let b = minimal_task(vec![0]);
        let doc = json!({"analysis": "a", "strategy": "s", "tasks": [a, b]});
        let err = validate_planner_output(&doc).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn accepts_linear_chain() {
        let a = minimal_task(vec![]);
        let b = minimal_task(vec![0]);
        let c = minimal_task(vec![1]);
        let doc = json!({
            "analysis": "a", "strategy": "s",
            "tasks": [a, b, c],
            "estimatedTimeMinutes": 30,
        });
        let out = validate_planner_output(&doc).unwrap();
        assert_eq!(out.tasks.len(), 3);
        assert_eq!(out.estimated_total_cost_cents, 300);
    }

    #[test]
    fn rejects_duplicate_role_names() {
        let role = json!({
            "name": "dup",
            "description": "d",
            "systemPrompt": "p",
            "allowedTools": [],
            "model": "m",
            "rationale": "r",
        });
        let doc = json!({
            "analysis": "a", "strategy": "s",
            "tasks": [minimal_task(vec![])],
            "customRoles": [role.clone(), role],
        });
        let err = validate_planner_output(&doc).unwrap_err();
        assert!(matches!(
            err,
            PlanValidationError::DuplicateRoleName { index: 1, .. }
        ));
    }

    #[test]
    fn rejects_invalid_treasury_limits() {
        let role = json!({
            "name": "r",
            "description": "d",
            "systemPrompt": "p",
            "allowedTools": [],
            "model": "m",
            "rationale": "r",
            "treasuryLimits": {"maxSingleTransfer": -1, "maxDailySpend": 10},
        });
        let doc = json!({
            "analysis": "a", "strategy": "s",
            "tasks": [minimal_task(vec![])],
            "customRoles": [role],
        });
        let err = validate_planner_output(&doc).unwrap_err();
        assert!(matches!(
            err,
            PlanValidationError::InvalidTreasuryLimits { index: 0 }
        ));
    }
}
