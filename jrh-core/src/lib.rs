//! Core JSON-RPC 2.0 client types and codec for jrh
//!
//! This crate holds everything about JSON-RPC over HTTP that does not touch
//! the network:
//!
//! - **Ids**: request identifiers and id generation strategies
//! - **Types**: requests, notifications and decoded responses
//! - **Contracts**: the expected result/error-data types of a call, kept in a
//!   registry while the call is in flight
//! - **Codec**: encoding requests and decoding responses in a given charset
//! - **Errors**: the client/protocol/service error taxonomy
//! - **Observability**: OpenTelemetry and log output setup
//!
//! The `jrh-client` crate builds the HTTP request and batch engines on top.
//!
//! # Example
//!
//! ```rust
//! use jrh_core::{codec, Charset, Contract, ContractRegistry, Id, Params, Request, ResponseItem};
//! use serde_json::json;
//!
//! let registry = ContractRegistry::new();
//! let request = Request::new("add", Params::Named(json!({"a": 5, "b": 3}).as_object().unwrap().clone()), Id::Number(1)).unwrap();
//! let _registration = registry.register(request.id().clone(), Contract::of::<i64>()).unwrap();
//!
//! let _body = codec::encode_request(&request, Charset::Utf8).unwrap();
//! let answer = br#"{"jsonrpc":"2.0","id":1,"result":8}"#;
//! let item = codec::decode_response(answer, |id| registry.lookup(id), Charset::Utf8).unwrap();
//! assert!(matches!(item, ResponseItem::Valid(ref r) if r.result::<i64>() == Some(&8)));
//! ```

pub mod charset;
pub mod codec;
pub mod contract;
pub mod error;
pub mod id;
pub mod observability;
pub mod types;

pub use charset::Charset;
pub use contract::{Contract, ContractKey, ContractRegistration, ContractRegistry, Payload};
pub use error::{codes, ClientErrorKind, Error, ProtocolErrorKind, Result, ServiceError};
pub use id::{Id, IdGenerator, SequentialIdGenerator, UuidIdGenerator};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use types::{
    validate_method, InvalidResponse, Outcome, Params, Request, Response, ResponseData,
    ResponseItem,
};
