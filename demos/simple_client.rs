//! Simple JSON-RPC over HTTP client example
//!
//! Run with: cargo run --example simple_client

use jrh::JrhClient;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct AddParams {
    a: i32,
    b: i32,
}

#[derive(Deserialize)]
struct AddResult {
    sum: i32,
}

#[derive(Serialize)]
struct GreetParams {
    name: String,
}

#[derive(Deserialize)]
struct GreetResult {
    message: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("Sending requests to http://127.0.0.1:8080/rpc\n");

    let client = JrhClient::new("http://127.0.0.1:8080/rpc")?;

    // Call the add method
    let add_result: AddResult = client.invoke_with("add", AddParams { a: 5, b: 3 }).await?;
    println!("add(5, 3) = {}", add_result.sum);

    // Call the greet method with an explicit id
    let greet_result: GreetResult = client
        .call("greet")
        .id("greet-1")
        .params(GreetParams {
            name: "Alice".to_string(),
        })
        .invoke()
        .await?;
    println!("greet('Alice') = {}", greet_result.message);

    // Service errors carry the code, message and data sent by the server
    match client.invoke::<serde_json::Value>("missing").await {
        Ok(value) => println!("missing() = {}", value),
        Err(jrh::Error::Service(error)) => println!("missing() failed: {}", error),
        Err(e) => return Err(e.into()),
    }

    // Send a notification (no response expected)
    println!("\nSending notification...");
    client
        .notify_with(
            "log",
            serde_json::json!({"level": "info", "message": "Test log"}),
        )
        .await?;

    println!("\nAll requests completed successfully!");

    Ok(())
}
