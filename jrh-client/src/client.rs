//! JSON-RPC client over HTTP
//!
//! [`JrhClient`] turns one call into one HTTP POST and walks the result
//! through a fixed sequence of checks:
//!
//! 1. **Build**: validate the method name and parameters, assign an id
//! 2. **Register**: put the call's contract in the registry under its id
//! 3. **Encode and send**: hand the body and headers to the invoker
//! 4. **Status**: `200` needs a body (unless the call is a notification),
//!    `204` is only valid for notifications, anything else is refused
//! 5. **Decode**: check the content type before reading the body, undo the
//!    content codings, decode the body with the registered contract, and
//!    check that the answer is a single response for this id
//! 6. **Outcome**: an error object becomes [`Error::Service`], a result is
//!    handed to the caller
//!
//! The contract registration is a guard, released however the call ends
//! (including when the future is dropped mid-flight).
//!
//! # Cloning
//!
//! `JrhClient` is cheaply cloneable; clones share the invoker, settings and
//! contract registry, so concurrent calls from many tasks are fine.

use crate::call::MethodCall;
use crate::content::ContentNegotiation;
use crate::transport::{HttpInvoker, HttpRequest, HttpResponse};
use crate::{ClientBuilder, ClientMetrics};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use http::StatusCode;
use jrh_core::{
    codec, Charset, ClientErrorKind, Contract, ContractKey, ContractRegistry, Error, Id,
    IdGenerator, ProtocolErrorKind, Request, Response, ResponseData, ResponseItem, Result,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

/// JSON-RPC 2.0 client over HTTP
#[derive(Clone)]
pub struct JrhClient {
    /// Absolute http/https endpoint
    pub(crate) uri: Url,
    /// Performs the HTTP exchanges
    pub(crate) invoker: Arc<dyn HttpInvoker>,
    /// Media type, charset, headers and content decoders
    pub(crate) content: ContentNegotiation,
    /// Contracts of in-flight calls and per-method contracts
    pub(crate) contracts: ContractRegistry,
    /// Source of ids for calls made without one
    pub(crate) id_generator: Arc<dyn IdGenerator>,
    /// Metrics for observability
    pub(crate) metrics: Option<Arc<ClientMetrics>>,
}

/// Response head and complete body of a `200` exchange
pub(crate) struct Exchange {
    pub(crate) status: StatusCode,
    pub(crate) headers: http::HeaderMap,
    pub(crate) charset: Charset,
    pub(crate) body: Bytes,
}

impl JrhClient {
    /// Start configuring a client for `uri`
    pub fn builder(uri: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(uri)
    }

    /// Create a client with default settings
    pub fn new(uri: impl Into<String>) -> Result<Self> {
        ClientBuilder::new(uri).build()
    }

    /// The endpoint every call is posted to
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    /// Content settings of this client
    pub fn content(&self) -> &ContentNegotiation {
        &self.content
    }

    /// The contract registry shared by all clones of this client
    pub fn contracts(&self) -> &ContractRegistry {
        &self.contracts
    }

    /// Draw an id from the client's generator
    pub fn next_id(&self) -> Id {
        self.id_generator.next_id()
    }

    /// Start building a call to `method`
    pub fn call(&self, method: impl Into<String>) -> MethodCall<'_> {
        MethodCall::new(self, method.into())
    }

    /// Send a notification without parameters
    pub async fn notify(&self, method: impl Into<String>) -> Result<()> {
        self.call(method).notify().await
    }

    /// Send a notification with positional (array) or named (object)
    /// parameters
    pub async fn notify_with<P>(&self, method: impl Into<String>, params: P) -> Result<()>
    where
        P: Serialize,
    {
        self.call(method).params(params).notify().await
    }

    /// Call a method without parameters and decode its result as `R`
    pub async fn invoke<R>(&self, method: impl Into<String>) -> Result<R>
    where
        R: DeserializeOwned + Send + Sync + 'static,
    {
        self.call(method).invoke::<R>().await
    }

    /// Call a method with parameters and decode its result as `R`
    pub async fn invoke_with<P, R>(&self, method: impl Into<String>, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned + Send + Sync + 'static,
    {
        self.call(method).params(params).invoke::<R>().await
    }

    /// Declare the result and error-data types of every call to `method`
    ///
    /// Used by batch items and [`MethodCall::send`] that do not name their
    /// own types. Returns `true` if a contract was already registered.
    pub fn register_method_contract<R, E>(&self, method: impl Into<String>) -> bool
    where
        R: DeserializeOwned + Send + Sync + 'static,
        E: DeserializeOwned + Send + Sync + 'static,
    {
        self.contracts
            .add(
                ContractKey::Method(method.into()),
                Contract::with_error_data::<R, E>(),
            )
            .is_some()
    }

    /// Remove the contract registered for `method`
    pub fn unregister_method_contract(&self, method: &str) -> bool {
        self.contracts
            .remove(&ContractKey::Method(method.to_string()))
            .is_some()
    }

    /// Run one request through the engine
    ///
    /// `contract` must be given for calls and omitted for notifications.
    /// Returns the successful response of a call, or `None` for a
    /// notification.
    #[tracing::instrument(
        name = "jrh.call",
        skip(self, request, contract, cancel),
        fields(method = %request.method(), id = %request.id())
    )]
    pub(crate) async fn execute(
        &self,
        request: Request,
        contract: Option<Contract>,
        cancel: Option<CancellationToken>,
    ) -> Result<Option<Response>> {
        let start = Instant::now();
        let method = request.method().to_string();
        let notification = request.is_notification();

        let result = self.run(request, contract, cancel.as_ref()).await;
        let duration = start.elapsed().as_secs_f64();

        match &result {
            Ok(_) => {
                tracing::debug!(duration_secs = duration, "Call completed");
            }
            Err(e) if e.is_cancelled() => {
                tracing::debug!("Call cancelled");
            }
            Err(e) => {
                tracing::warn!(error = %e, duration_secs = duration, "Call failed");
            }
        }

        if let Some(ref m) = self.metrics {
            if notification && result.is_ok() {
                m.record_notification(&method);
            }
            match &result {
                Ok(_) => m.record_request(&method, "success", duration),
                Err(e) => {
                    m.record_request(&method, "error", duration);
                    m.record_error(e.label());
                }
            }
        }

        result
    }

    async fn run(
        &self,
        request: Request,
        contract: Option<Contract>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Option<Response>> {
        let id = request.id().clone();

        let _registration = contract
            .map(|contract| self.contracts.register(id.clone(), contract))
            .transpose()?;

        let body = codec::encode_request(&request, self.content.charset())?;
        let response = self.send(body, cancel).await?;

        match response.status {
            StatusCode::OK => {
                if id.is_none() {
                    return Err(Error::protocol(
                        ProtocolErrorKind::UnexpectedContent,
                        StatusCode::OK.as_u16(),
                        None,
                    ));
                }

                let exchange = self
                    .read(response, cancel)
                    .await
                    .map_err(|e| e.attach_id(&id))?;
                let decoded = self.decode(&exchange, |response_id| {
                    if response_id == &id {
                        self.contracts.lookup(response_id)
                    } else {
                        None
                    }
                });
                let data = decoded.map_err(|e| e.attach_id(&id))?;

                let response = match data {
                    ResponseData::Batch(_) => {
                        return Err(Error::protocol(
                            ProtocolErrorKind::BatchValue,
                            exchange.status.as_u16(),
                            Some(id),
                        ))
                    }
                    ResponseData::Single(ResponseItem::Invalid(invalid)) => {
                        return Err(Error::client_detail(
                            ClientErrorKind::InvalidValue,
                            Some(id),
                            invalid.to_string(),
                        ))
                    }
                    ResponseData::Single(ResponseItem::Valid(response)) => response,
                };

                ensure_not_cancelled(cancel)?;

                response.into_success().map(Some)
            }
            StatusCode::NO_CONTENT => {
                if id.is_none() {
                    ensure_not_cancelled(cancel)?;
                    Ok(None)
                } else {
                    Err(Error::protocol(
                        ProtocolErrorKind::UnexpectedBlank,
                        StatusCode::NO_CONTENT.as_u16(),
                        Some(id),
                    ))
                }
            }
            status => Err(Error::protocol(
                ProtocolErrorKind::InvalidStatusCode,
                status.as_u16(),
                None,
            )),
        }
    }

    /// Post an encoded body, racing the exchange against cancellation
    pub(crate) async fn send(
        &self,
        body: Vec<u8>,
        cancel: Option<&CancellationToken>,
    ) -> Result<HttpResponse> {
        let request = HttpRequest {
            uri: self.uri.clone(),
            headers: self.content.request_headers(),
            body: Bytes::from(body),
        };

        tracing::trace!(bytes = request.body.len(), "Sending request");
        let response = cancellable(cancel, self.invoker.send(request)).await?;
        tracing::debug!(status = %response.status, "Response received");
        Ok(response)
    }

    /// Check the content type of a `200` response, then read its whole body
    ///
    /// A wrong content type is refused before any of the body is read.
    pub(crate) async fn read(
        &self,
        response: HttpResponse,
        cancel: Option<&CancellationToken>,
    ) -> Result<Exchange> {
        let HttpResponse {
            status,
            headers,
            mut body,
        } = response;

        let charset = self.content.response_charset(&headers)?;

        let collect = async move {
            let mut buffer = BytesMut::new();
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|e| Error::Transport(format!("Stream error: {}", e)))?;
                buffer.extend_from_slice(&chunk);
            }
            Ok::<_, Error>(buffer.freeze())
        };
        let body = cancellable(cancel, collect).await?;

        Ok(Exchange {
            status,
            headers,
            charset,
            body,
        })
    }

    /// Undo the content codings of a `200` body and decode it
    pub(crate) fn decode<F>(&self, exchange: &Exchange, lookup: F) -> Result<ResponseData>
    where
        F: Fn(&Id) -> Option<Contract>,
    {
        let body = self
            .content
            .decode_body(&exchange.headers, exchange.body.clone())?;
        codec::decode_batch(&body, lookup, exchange.charset)
    }
}

/// Await `future` unless the token fires first
async fn cancellable<F, T>(cancel: Option<&CancellationToken>, future: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match cancel {
        None => future.await,
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(Error::Cancelled),
                result = future => result,
            }
        }
    }
}

pub(crate) fn ensure_not_cancelled(cancel: Option<&CancellationToken>) -> Result<()> {
    match cancel {
        Some(token) if token.is_cancelled() => Err(Error::Cancelled),
        _ => Ok(()),
    }
}

impl std::fmt::Debug for JrhClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JrhClient")
            .field("uri", &self.uri.as_str())
            .field("content", &self.content)
            .field("contracts", &self.contracts)
            .finish_non_exhaustive()
    }
}
