//! JRH - JSON-RPC 2.0 over HTTP
//!
//! This is the main convenience crate that re-exports all JRH sub-crates.
//! Use this crate if you want a single dependency for the whole client.
//!
//! # Architecture
//!
//! JRH is organized into modular crates:
//!
//! - **jrh-core**: Core types, codec, contracts, error handling, observability
//! - **jrh-client**: HTTP JSON-RPC client with batches and content negotiation
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use jrh::JrhClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = JrhClient::new("http://localhost:8080/rpc")?;
//!
//!     let result: serde_json::Value = client
//!         .invoke_with("add", serde_json::json!({"a": 5, "b": 3}))
//!         .await?;
//!     println!("Result: {}", result);
//!
//!     Ok(())
//! }
//! ```

pub use jrh_client as client;
pub use jrh_core as core;

pub use jrh_client::{ClientBuilder, JrhClient};
pub use jrh_core::{Error, Id, Result};
