//! `colony tick`, `colony heal`, and `colony run`: the commands that
//! actually drive the orchestrator FSM and health monitor forward.

use std::time::Duration;

use anyhow::Result;

use crate::runtime::Session;

pub async fn run_tick() -> Result<()> {
    let session = Session::load()?;
    let summary = session.orchestrator.tick().await?;
    session.persist().await?;

    println!(
        "phase={} assigned={} completed={} failed={} goals_active={} agents_active={}",
        summary.phase, summary.tasks_assigned, summary.tasks_completed, summary.tasks_failed,
        summary.goals_active, summary.agents_active,
    );
    Ok(())
}

pub async fn run_heal() -> Result<()> {
    let session = Session::load()?;
    let actions = session.health.auto_heal().await?;
    session.persist().await?;

    if actions.is_empty() {
        println!("No unhealthy agents found.");
        return Ok(());
    }
    for action in actions {
        println!(
            "{:?} -> {} ({}) [{}]",
            action.kind,
            action.agent_address,
            action.reason,
            if action.success { "ok" } else { "failed" },
        );
    }
    Ok(())
}

/// Repeatedly ticks and heals until every active goal reaches a terminal
/// phase or the process is interrupted. Mirrors the corpus's
/// `dispatch_cmd` polling loop, but drives one in-process FSM instead of
/// supervising a pool of spawned child processes.
pub async fn run_loop(max_ticks: Option<u64>, interval_secs: u64) -> Result<()> {
    let mut ticks = 0u64;
    loop {
        let session = Session::load()?;
        let summary = session.orchestrator.tick().await?;
        session.health.auto_heal().await?;
        session.persist().await?;

        println!(
            "tick {ticks}: phase={} completed={} failed={} goals_active={}",
            summary.phase, summary.tasks_completed, summary.tasks_failed, summary.goals_active,
        );

        if summary.goals_active == 0 {
            println!("No active goals remain; stopping.");
            break;
        }
        ticks += 1;
        if let Some(max) = max_ticks {
            if ticks >= max {
                println!("Reached max-ticks ({max}); stopping.");
                break;
            }
        }
        tokio::time::sleep(Duration::from_secs(interval_secs)).await;
    }
    Ok(())
}
