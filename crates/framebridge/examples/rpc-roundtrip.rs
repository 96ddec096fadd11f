//! Parent calls a method the child registers, over an in-memory session.
//!
//! Run with:
//!   cargo run --example rpc-roundtrip --features peer

use framebridge::peer::{arg, BridgeConfig, Loopback};
use serde_json::json;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let session = Loopback::new("https://shop.example.com/checkout", BridgeConfig::default())?
        .with_child_setup(|child| {
            child.register_method("cartTotal", |args| {
                let prices: Vec<f64> = arg(&args, 0)?;
                Ok(json!(prices.iter().sum::<f64>()))
            });
        });

    // Sent before the child exists; delivered once it reports ready.
    let pending = session
        .bridge()
        .call_method("cartTotal", vec![json!([19.5, 5.25, 3.0])])?;
    eprintln!("call #{} queued", pending.uid());

    session.settle().await;

    let response = pending.await?;
    println!("{} => {}", response.event_name, response.data);
    Ok(())
}
