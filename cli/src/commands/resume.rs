//! Resume command - start saved port-forwards.

use anyhow::Result;

use super::Store;

pub async fn run(store: &Store, json: bool) -> Result<()> {
    let _watch = store.watch();
    store.init().await?;

    let items = store.items();
    for notification in store.take_notifications() {
        eprintln!("warning: {}", notification.message());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("No port-forwards saved.");
        return Ok(());
    }

    let active = items.iter().filter(|i| i.is_active()).count();
    println!("Resumed {} of {} port-forwards.", active, items.len());
    for item in &items {
        println!(
            "  {} -> 127.0.0.1:{} [{}]",
            item.id(),
            item.forward_port,
            item.status.as_str()
        );
    }

    Ok(())
}
