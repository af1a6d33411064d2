//! Builder for a single call
//!
//! [`MethodCall`] collects the optional parts of a call (explicit id,
//! parameters, cancellation token) and then runs it in one of three ways:
//!
//! - [`notify`](MethodCall::notify): send as a notification, expect `204`
//! - [`invoke`](MethodCall::invoke) /
//!   [`invoke_with_error`](MethodCall::invoke_with_error): expect a result of
//!   a given type
//! - [`send`](MethodCall::send): expect a result shaped by the contract
//!   registered for the method, and hand back the whole response
//!
//! # Examples
//!
//! ```rust,no_run
//! use jrh_client::JrhClient;
//! use serde_json::json;
//!
//! # async fn example(client: &JrhClient) -> jrh_core::Result<()> {
//! let sum: i64 = client
//!     .call("add")
//!     .id(7)
//!     .params(json!([1, 2]))
//!     .invoke()
//!     .await?;
//!
//! client.call("log").params(json!({"line": "done"})).notify().await?;
//! # Ok(())
//! # }
//! ```

use crate::JrhClient;
use jrh_core::{
    validate_method, ClientErrorKind, Contract, Error, Id, Outcome, Params, ProtocolErrorKind,
    Request, Response, Result,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Parameters as serialized by the caller, checked once the id is known
pub(crate) type PendingParams = Option<std::result::Result<serde_json::Value, serde_json::Error>>;

/// A call being prepared
#[must_use = "a call does nothing until it is notified, invoked or sent"]
pub struct MethodCall<'a> {
    client: &'a JrhClient,
    method: String,
    id: Option<Id>,
    params: PendingParams,
    cancel: Option<CancellationToken>,
}

impl<'a> MethodCall<'a> {
    pub(crate) fn new(client: &'a JrhClient, method: String) -> Self {
        Self {
            client,
            method,
            id: None,
            params: None,
            cancel: None,
        }
    }

    /// Use an explicit id instead of one from the client's generator
    ///
    /// Ignored by [`notify`](Self::notify).
    pub fn id(mut self, id: impl Into<Id>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the parameters; they must serialize to a JSON array or object
    pub fn params<P: Serialize>(mut self, params: P) -> Self {
        self.params = Some(serde_json::to_value(params));
        self
    }

    /// Abort the call when `token` is cancelled
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Send the call as a notification
    ///
    /// Succeeds on `204 No Content`. A `200` answer is a protocol error,
    /// since no response may be sent for a notification.
    pub async fn notify(self) -> Result<()> {
        let request = build_request(self.method, self.params, Id::None)?;
        self.client.execute(request, None, self.cancel).await?;
        Ok(())
    }

    /// Call the method and decode its result as `R`
    ///
    /// Error data, if the method fails, is kept as a raw JSON value.
    pub async fn invoke<R>(self) -> Result<R>
    where
        R: DeserializeOwned + Send + Sync + 'static,
    {
        let response = self.dispatch(Some(Contract::of::<R>())).await?;
        into_result(response)
    }

    /// Call the method, decoding its result as `R` and error data as `E`
    pub async fn invoke_with_error<R, E>(self) -> Result<R>
    where
        R: DeserializeOwned + Send + Sync + 'static,
        E: DeserializeOwned + Send + Sync + 'static,
    {
        let response = self.dispatch(Some(Contract::with_error_data::<R, E>())).await?;
        into_result(response)
    }

    /// Call the method and return the successful response
    ///
    /// The result is decoded with the contract registered for the method
    /// (see [`JrhClient::register_method_contract`]), or kept as a raw JSON
    /// value when there is none.
    pub async fn send(self) -> Result<Response> {
        self.dispatch(None).await
    }

    async fn dispatch(self, contract: Option<Contract>) -> Result<Response> {
        let id = match self.id {
            Some(Id::None) => {
                return Err(Error::client_detail(
                    ClientErrorKind::InvalidIdentifier,
                    None,
                    "a call that expects a result needs an id",
                ))
            }
            Some(id) => id,
            None => self.client.next_id(),
        };

        let contract = contract
            .or_else(|| self.client.contracts.method_contract(&self.method))
            .unwrap_or_else(Contract::dynamic);

        let request = build_request(self.method, self.params, id.clone())?;
        self.client
            .execute(request, Some(contract), self.cancel)
            .await?
            .ok_or_else(|| Error::protocol(ProtocolErrorKind::UnexpectedBlank, 204, Some(id)))
    }
}

/// Validate a method name and its parameters into a request
pub(crate) fn build_request(method: String, params: PendingParams, id: Id) -> Result<Request> {
    validate_method(&method).map_err(|e| e.attach_id(&id))?;

    let params = match params {
        None => Params::None,
        Some(Ok(value)) => Params::from_value(value, &id)?,
        Some(Err(e)) => {
            return Err(Error::client_detail(
                ClientErrorKind::InvalidParams,
                None,
                e.to_string(),
            )
            .attach_id(&id))
        }
    };

    Request::new(method, params, id)
}

/// Take the typed result out of a successful response
pub(crate) fn into_result<R: 'static>(response: Response) -> Result<R> {
    let (id, outcome) = response.into_parts();
    match outcome {
        Outcome::Success(payload) => payload.into_inner::<R>().map_err(|payload| {
            Error::client_detail(
                ClientErrorKind::InvalidValue,
                Some(id),
                format!(
                    "result was decoded as {}, not {}",
                    payload.type_name(),
                    std::any::type_name::<R>()
                ),
            )
        }),
        Outcome::Failure(error) => Err(Error::Service(error)),
    }
}
