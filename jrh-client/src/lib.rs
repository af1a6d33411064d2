//! JSON-RPC 2.0 client implementation over HTTP
//!
//! This crate provides a JSON-RPC 2.0 client that sends every call or batch
//! as one HTTP POST. Results are decoded into caller-chosen Rust types, and
//! every answer is checked against the request that produced it.
//!
//! # Core Features
//!
//! - **Calls and Notifications**: typed results, explicit or generated ids
//! - **Batch Requests**: many calls in one POST, reconciled by id
//! - **Content Negotiation**: media type, charset whitelist, content codings
//! - **Cancellation**: any call can be aborted with a `CancellationToken`
//! - **Pluggable Transport**: reqwest by default, or any [`HttpInvoker`]
//! - **Observability**: OpenTelemetry integration for traces and metrics
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use jrh_client::JrhClient;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = JrhClient::new("http://localhost:8080/rpc")?;
//!
//!     // Make a call
//!     let sum: i64 = client.invoke_with("add", json!([1, 2])).await?;
//!     println!("Result: {}", sum);
//!
//!     // Send a notification
//!     client.notify_with("log", json!({"line": "added"})).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Batches
//!
//! ```rust,no_run
//! use jrh_client::JrhClient;
//! use serde_json::json;
//!
//! # async fn example(client: &JrhClient) -> jrh_core::Result<()> {
//! let mut batch = client.new_batch();
//! let first = batch.add_typed_call::<i64, _>("add", json!([1, 2]));
//! let second = batch.add_typed_call::<i64, _>("add", json!([3, 4]));
//! batch.add_notification("log", json!(["two sums"]));
//!
//! let mut responses = client.batch(batch).await?;
//! let a: i64 = responses.take(&first)?;
//! let b: i64 = responses.take(&second)?;
//! # Ok(())
//! # }
//! ```

mod batch;
mod call;
mod client;
mod client_builder;
mod config;
mod content;
mod metrics;
mod transport;

pub use batch::{BatchRequest, BatchResponse};
pub use call::MethodCall;
pub use client::JrhClient;
pub use client_builder::ClientBuilder;
pub use config::ClientConfig;
pub use content::{ContentDecoder, ContentDecoders, ContentNegotiation, DEFAULT_MEDIA_TYPE, IDENTITY};
pub use metrics::ClientMetrics;
pub use transport::{HttpInvoker, HttpRequest, HttpResponse, ReqwestInvoker};
