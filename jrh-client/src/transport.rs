//! HTTP transport seam
//!
//! The engines never talk to the network directly. They hand a fully built
//! [`HttpRequest`] (target URI, headers, encoded body) to an [`HttpInvoker`]
//! and get back an [`HttpResponse`] whose body is a byte stream, which they
//! read to the end themselves.
//!
//! [`ReqwestInvoker`] is the production implementation. Tests and embedders
//! can plug in anything else (in-memory servers, recording proxies) by
//! implementing the trait.
//!
//! Timeouts belong to the invoker: the engines have no clock of their own.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use http::{HeaderMap, StatusCode};
use jrh_core::{Error, Result};
use std::fmt;
use std::time::Duration;
use url::Url;

/// An outgoing HTTP POST
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Absolute target URI
    pub uri: Url,
    /// Request headers
    pub headers: HeaderMap,
    /// Encoded JSON-RPC payload
    pub body: Bytes,
}

/// An HTTP response with a streamed body
pub struct HttpResponse {
    /// Status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Body chunks
    pub body: BoxStream<'static, std::io::Result<Bytes>>,
}

impl HttpResponse {
    /// Build a response around a chunk stream
    pub fn new<S>(status: StatusCode, headers: HeaderMap, body: S) -> Self
    where
        S: Stream<Item = std::io::Result<Bytes>> + Send + 'static,
    {
        Self {
            status,
            headers,
            body: body.boxed(),
        }
    }

    /// Build a response from an in-memory body
    pub fn from_bytes(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        if body.is_empty() {
            return Self::new(status, headers, stream::empty());
        }
        Self::new(status, headers, stream::once(async move { Ok(body) }))
    }

    /// Build a response without a body
    pub fn empty(status: StatusCode) -> Self {
        Self::new(status, HeaderMap::new(), stream::empty())
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Performs one HTTP exchange
#[async_trait]
pub trait HttpInvoker: Send + Sync {
    /// POST the request and return the response head with its body stream
    ///
    /// Failing to complete the exchange (connection refused, timeout, TLS
    /// failure) is an [`Error::Transport`]. Any HTTP status, including error
    /// statuses, is a successful exchange.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// [`HttpInvoker`] backed by a `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ReqwestInvoker {
    client: reqwest::Client,
}

impl ReqwestInvoker {
    /// Create an invoker without a request timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(None)
    }

    /// Create an invoker whose exchanges fail after `timeout`
    pub fn with_timeout(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Wrap an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpInvoker for ReqwestInvoker {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = self
            .client
            .post(request.uri)
            .headers(request.headers)
            .body(request.body)
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other));

        Ok(HttpResponse::new(status, headers, body))
    }
}
