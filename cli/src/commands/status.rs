//! Status command - query the live state of a port-forward.

use anyhow::Result;

use super::{Store, TargetArgs};

pub async fn run(store: &Store, target: TargetArgs, json: bool) -> Result<()> {
    store.restore().await?;

    let live = store.get_port_forward(&target.descriptor()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&live)?);
        return Ok(());
    }

    match live {
        Some(item) => println!(
            "{} is active on 127.0.0.1:{}",
            item.id(),
            item.forward_port
        ),
        None => println!("{} is not running.", target.descriptor().target()),
    }

    Ok(())
}
