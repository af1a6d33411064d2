//! Batch request example
//!
//! Run with: cargo run --example batch

use jrh::JrhClient;
use serde::Serialize;
use std::time::Instant;

#[derive(Serialize)]
struct AddParams {
    a: i32,
    b: i32,
}

#[derive(Serialize)]
struct LogParams {
    message: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let client = JrhClient::new("http://127.0.0.1:8080/rpc")?;

    // Build a batch request
    let mut batch = client.new_batch();
    let id1 = batch.add_typed_call::<i32, _>("add", AddParams { a: 1, b: 2 });
    let id2 = batch.add_typed_call::<i32, _>("multiply", AddParams { a: 3, b: 4 });
    let id3 = batch.add_call("echo", serde_json::json!({"text": "hello"}));
    batch.add_notification(
        "log",
        LogParams {
            message: "Batch sent".to_string(),
        },
    );

    println!("Sending batch with {} items", batch.len());
    let start = Instant::now();
    let mut responses = client.batch(batch).await?;
    println!("Batch completed in {:?}\n", start.elapsed());

    let sum: i32 = responses.take(&id1)?;
    println!("add(1, 2) = {}", sum);

    let product: i32 = responses.take(&id2)?;
    println!("multiply(3, 4) = {}", product);

    match responses.take::<serde_json::Value>(&id3) {
        Ok(value) => println!("echo = {}", value),
        Err(e) => println!("echo failed: {}", e),
    }

    Ok(())
}
