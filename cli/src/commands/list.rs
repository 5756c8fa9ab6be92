//! List command - show saved port-forwards.

use anyhow::Result;

use super::{truncate, Store};

pub async fn run(store: &Store, json: bool) -> Result<()> {
    store.restore().await?;
    let items = store.items();

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("No port-forwards saved.");
        return Ok(());
    }

    // Table header
    println!(
        "{:<10} {:<16} {:<24} {:<7} {:<7} {:<6} STATUS",
        "KIND", "NAMESPACE", "NAME", "PORT", "LOCAL", "PROTO"
    );
    println!("{}", "-".repeat(80));

    for item in &items {
        println!(
            "{:<10} {:<16} {:<24} {:<7} {:<7} {:<6} {}",
            truncate(&item.kind, 10),
            truncate(&item.namespace, 16),
            truncate(&item.name, 24),
            item.port,
            item.forward_port,
            item.protocol.as_str(),
            item.status.as_str()
        );
    }

    println!("\nTotal: {} port-forwards", items.len());
    Ok(())
}
