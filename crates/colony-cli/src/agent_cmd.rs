//! `colony agent` subcommands: register a worker and list the fleet.

use anyhow::Result;
use colony_core::contracts::{AgentTracker, DurableStore, NewChild};

use crate::local::StoreBackedTracker;
use crate::runtime::Session;

pub async fn run_add(address: String, name: String, role: String) -> Result<()> {
    let session = Session::load()?;
    let tracker = StoreBackedTracker::new(session.store.clone() as std::sync::Arc<dyn DurableStore>);
    let child = tracker
        .register(NewChild {
            address,
            name,
            role,
            sandbox_id: None,
        })
        .await?;
    session.persist().await?;

    println!("Registered agent {} ({}) as {}", child.name, child.address, child.role);
    Ok(())
}

pub async fn run_list() -> Result<()> {
    let session = Session::load()?;
    let children = session.store.get_children().await?;

    if children.is_empty() {
        println!("No registered agents.");
        return Ok(());
    }

    for child in children {
        println!("{} [{}] role={} address={}", child.name, child.status, child.role, child.address);
    }
    Ok(())
}
