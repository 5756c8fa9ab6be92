//! Modify command - move a port-forward to a new local port.

use anyhow::Result;
use portpilot_core::ForwardStatus;

use super::{ProtocolArg, Store, TargetArgs};

pub async fn run(
    store: &Store,
    target: TargetArgs,
    local_port: u16,
    protocol: Option<ProtocolArg>,
    json: bool,
) -> Result<()> {
    let _watch = store.watch();
    store.restore().await?;

    let item = store
        .modify(&target.descriptor(), local_port, protocol.map(Into::into))
        .await?;

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
        ForwardStatus::Disabled => println!(
            "Updated {} to local port {} (disabled)",
            item.id(),
            item.forward_port
        ),
    }

    Ok(())
}
