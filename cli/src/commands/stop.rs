//! Stop command - stop a port-forward.

use anyhow::Result;

use super::{Store, TargetArgs};

pub async fn run(store: &Store, target: TargetArgs) -> Result<()> {
    let _watch = store.watch();
    store.restore().await?;

    let descriptor = target.descriptor();
    store.stop(&descriptor).await?;
    println!("Stopped {}", descriptor.target());

    Ok(())
}
