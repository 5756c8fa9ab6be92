//! Start command - start a saved port-forward.

use anyhow::Result;
use portpilot_core::ForwardStatus;

use super::{Store, TargetArgs};

pub async fn run(store: &Store, target: TargetArgs, json: bool) -> Result<()> {
    let _watch = store.watch();
    store.restore().await?;

    let item = store.start(&target.descriptor()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&item)?);
        return Ok(());
    }

    match item.status {
        ForwardStatus::Active => println!(
            "Forwarding {} on 127.0.0.1:{}",
            item.id(),
            item.forward_port
        ),
        ForwardStatus::Disabled => println!("Could not start {}.", item.id()),
    }

    Ok(())
}
