//! Add command - register (and usually start) a port-forward.

use anyhow::Result;
use portpilot_core::ForwardStatus;

use super::{ProtocolArg, Store, TargetArgs};

pub async fn run(
    store: &Store,
    target: TargetArgs,
    local_port: u16,
    protocol: ProtocolArg,
    disabled: bool,
    json: bool,
) -> Result<()> {
    let _watch = store.watch();
    store.restore().await?;

    let mut descriptor = target.descriptor();
    descriptor.forward_port = local_port;
    descriptor.protocol = protocol.into();
    if disabled {
        descriptor.status = ForwardStatus::Disabled;
    }

    let item = store.add(&descriptor).await?;

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
        ForwardStatus::Disabled if disabled => println!("Registered {} (disabled)", item.id()),
        ForwardStatus::Disabled => println!("Could not start {}; saved as disabled.", item.id()),
    }

    Ok(())
}
