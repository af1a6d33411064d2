//! Observability client example
//!
//! Demonstrates OpenTelemetry integration with traces and metrics for every
//! call. Calls go through a custom invoker that logs each exchange.
//!
//! Run with: cargo run --example observability_client

use async_trait::async_trait;
use jrh::client::{HttpInvoker, HttpRequest, HttpResponse, ReqwestInvoker};
use jrh::core::ObservabilityConfig;
use jrh::ClientBuilder;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Serialize)]
struct AddParams {
    a: i32,
    b: i32,
}

#[derive(Deserialize)]
struct AddResult {
    sum: i32,
}

/// Invoker that logs every exchange before handing it to reqwest
struct LoggingInvoker {
    inner: ReqwestInvoker,
}

#[async_trait]
impl HttpInvoker for LoggingInvoker {
    async fn send(&self, request: HttpRequest) -> jrh::Result<HttpResponse> {
        tracing::info!(uri = %request.uri, bytes = request.body.len(), "POST");
        let response = self.inner.send(request).await?;
        tracing::info!(status = %response.status, "Answered");
        Ok(response)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Configure observability
    let otel_config = ObservabilityConfig::new("jrh-observability-client")
        .with_endpoint("http://localhost:4317")
        .with_log_level("debug");

    let client = ClientBuilder::new("http://127.0.0.1:9010/rpc")
        .invoker(Arc::new(LoggingInvoker {
            inner: ReqwestInvoker::new()?,
        }))
        .with_observability(otel_config)
        .service_name("observability-client")
        .build()?;

    println!("Sending requests with distributed tracing...\n");

    for i in 1..=5 {
        tracing::info!(iteration = i, "Starting iteration");

        let add_result: AddResult = client
            .invoke_with("add", AddParams { a: i * 10, b: i * 5 })
            .await?;
        println!("Iteration {}: {} + {} = {}", i, i * 10, i * 5, add_result.sum);
    }

    println!("\nDone. Check your collector for traces and metrics.");
    jrh::core::shutdown_observability();

    Ok(())
}
