//! Several navigations before the child is ready: only the last one lands,
//! and only the events sent after it are delivered.
//!
//! Run with:
//!   cargo run --example fast-navigation --features peer

use framebridge::peer::{listener, BridgeConfig, Direction, Endpoint, Loopback};
use serde_json::json;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let session = Loopback::new("https://shop.example.com/", BridgeConfig::default())?
        .with_child_setup(|child| {
            for event in ["filters:changed", "scroll:restore"] {
                child.on(event, listener(|_, name, _| eprintln!("child got {name}")));
            }
        });
    let bridge = session.bridge();

    bridge.navigate("/men")?;
    bridge.trigger("filters:changed", json!({ "size": "M" }))?;
    bridge.navigate("/women")?;
    bridge.trigger("scroll:restore", json!({ "y": 480 }))?;

    session.settle().await;

    for entry in session.transcript() {
        let arrow = match entry.direction {
            Direction::ParentToChild => "->",
            Direction::ChildToParent => "<-",
        };
        println!(
            "{arrow} {} {}",
            entry.event_name.as_deref().unwrap_or("<foreign>"),
            entry.outcome.label()
        );
    }
    println!("child is at {}", session.child_href().unwrap_or_default());
    Ok(())
}
