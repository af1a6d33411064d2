//! Common test utilities for jrh-client integration tests
//!
//! This module provides a scripted HTTP invoker and helpers for building
//! JSON-RPC answers, so client behavior can be tested without a server.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{CONTENT_ENCODING, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, StatusCode};
use jrh_client::{HttpInvoker, HttpRequest, HttpResponse, JrhClient};
use jrh_core::{Error, Result, SequentialIdGenerator};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const URI: &str = "http://localhost:8080/rpc";

/// One scripted answer of the mock invoker
pub enum Reply {
    /// Answer with this response
    Respond(HttpResponse),
    /// Fail the exchange with a transport error
    Fail(String),
    /// Never answer
    Hang,
}

/// HTTP invoker that plays back queued replies and records every request
#[derive(Clone, Default)]
pub struct MockInvoker {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
    calls: Arc<AtomicUsize>,
}

impl MockInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply
    pub fn push(&self, reply: Reply) -> &Self {
        self.replies.lock().push_back(reply);
        self
    }

    /// Queue a `200` with a JSON body and the default content type
    pub fn push_json(&self, body: Value) -> &Self {
        self.push(Reply::Respond(json_response(&body)))
    }

    /// Queue a bodiless answer with this status
    pub fn push_status(&self, status: u16) -> &Self {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.push(Reply::Respond(HttpResponse::empty(status)))
    }

    /// Number of exchanges attempted
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Body of the `n`th request, parsed as JSON
    pub fn request_json(&self, n: usize) -> Value {
        let requests = self.requests.lock();
        serde_json::from_slice(&requests[n].body).unwrap()
    }

    /// Build a client that talks to this invoker with sequential numeric ids
    pub fn client(&self) -> JrhClient {
        JrhClient::builder(URI)
            .invoker(Arc::new(self.clone()))
            .id_generator(Arc::new(SequentialIdGenerator::new()))
            .build()
            .unwrap()
    }
}

#[async_trait]
impl HttpInvoker for MockInvoker {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request);

        let reply = self.replies.lock().pop_front();
        match reply {
            Some(Reply::Respond(response)) => Ok(response),
            Some(Reply::Fail(message)) => Err(Error::Transport(message)),
            Some(Reply::Hang) => std::future::pending().await,
            None => Err(Error::Transport("no reply scripted".to_string())),
        }
    }
}

/// Headers of a JSON-RPC answer with the default media type
pub fn json_headers() -> HeaderMap {
    content_type_headers("application/json-rpc; charset=utf-8")
}

pub fn content_type_headers(content_type: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
    headers
}

/// A `200` answer carrying `body`
pub fn json_response(body: &Value) -> HttpResponse {
    HttpResponse::from_bytes(StatusCode::OK, json_headers(), body.to_string())
}

/// A `200` answer whose body stream fails after the first chunk
pub fn broken_response(content_type: &str) -> HttpResponse {
    let chunks = vec![
        Ok(Bytes::from_static(b"<html>")),
        Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
    ];
    HttpResponse::new(
        StatusCode::OK,
        content_type_headers(content_type),
        futures::stream::iter(chunks),
    )
}

/// A `200` answer whose body went through the named content coding
pub fn encoded_response(body: Bytes, coding: &str) -> HttpResponse {
    let mut headers = json_headers();
    headers.insert(CONTENT_ENCODING, HeaderValue::from_str(coding).unwrap());
    HttpResponse::from_bytes(StatusCode::OK, headers, body)
}

/// Successful response object
pub fn success(id: Value, result: Value) -> Value {
    serde_json::json!({"jsonrpc": "2.0", "id": id, "result": result})
}

/// Error response object
pub fn failure(id: Value, code: i64, message: &str) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {"code": code, "message": message}
    })
}

/// Error response object with a `data` member
pub fn failure_with_data(id: Value, code: i64, message: &str, data: Value) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {"code": code, "message": message, "data": data}
    })
}
