//! `colony goal` subcommands: create a goal and inspect its progress.

use anyhow::{Context, Result};
use colony_core::contracts::DurableStore;
use colony_core::graph;
use uuid::Uuid;

use crate::runtime::Session;

pub async fn run_create(title: String, description: String) -> Result<()> {
    let session = Session::load()?;
    let goal = session.store.create_goal(title, description).await?;
    session.persist().await?;

    println!("Created goal {} ({})", goal.id, goal.title);
    Ok(())
}

pub async fn run_list() -> Result<()> {
    let session = Session::load()?;
    let goals = session.store.get_active_goals().await?;

    if goals.is_empty() {
        println!("No active goals.");
        return Ok(());
    }

    for goal in goals {
        let progress = graph::get_goal_progress(session.store.as_ref(), goal.id).await?;
        println!(
            "{} [{}] {}/{} tasks complete - {}",
            goal.id, goal.status, progress.completed, progress.total, goal.title
        );
    }
    Ok(())
}

pub async fn run_show(goal_id: &str) -> Result<()> {
    let goal_id = Uuid::parse_str(goal_id).with_context(|| format!("invalid goal id: {goal_id}"))?;
    let session = Session::load()?;

    let goal = session
        .store
        .get_goal_by_id(goal_id)
        .await?
        .with_context(|| format!("goal {goal_id} not found"))?;

    println!("Goal: {} ({})", goal.title, goal.id);
    println!("Status: {}", goal.status);
    if let Some(strategy) = &goal.strategy {
        println!("Strategy: {strategy}");
    }
    println!();

    let progress = graph::get_goal_progress(session.store.as_ref(), goal_id).await?;
    println!("Progress: {}/{} complete", progress.completed, progress.total);
    println!(
        "  pending={} blocked={} assigned={} running={} completed={} failed={} cancelled={}",
        progress.pending,
        progress.blocked,
        progress.assigned,
        progress.running,
        progress.completed,
        progress.failed,
        progress.cancelled,
    );

    let tasks = session.store.get_tasks_by_goal(goal_id).await?;
    println!();
    for task in tasks {
        println!("  [{}] {} - {}", task.status, task.title, task.id);
    }
    Ok(())
}

pub async fn run_approve(goal_id: &str) -> Result<()> {
    let goal_id = Uuid::parse_str(goal_id).with_context(|| format!("invalid goal id: {goal_id}"))?;
    let session = Session::load()?;
    session
        .store
        .set_kv(&colony_core::orchestrator::approval_key(goal_id), "true".to_string())
        .await?;
    session.persist().await?;

    println!("Goal {goal_id} plan approved.");
    Ok(())
}
