//! JSON-RPC 2.0 message types used by the client
//!
//! Outgoing traffic is made of [`Request`]s (a request whose id is
//! [`Id::None`] is a notification). Incoming traffic is made of
//! [`Response`]s, which only the codec constructs: each decode attempt
//! yields a [`ResponseItem`] that is either a valid response or a diagnostic,
//! so that one malformed element of a batch answer does not hide the others.

use crate::contract::Payload;
use crate::error::{ClientErrorKind, Error, Result, ServiceError};
use crate::id::Id;
use serde::Serialize;
use std::fmt;

/// Method name prefix reserved for rpc-internal methods and extensions
pub const RESERVED_METHOD_PREFIX: &str = "rpc.";

/// Parameters of a request
///
/// JSON-RPC 2.0 allows positional parameters (an array) or named parameters
/// (an object); a request may also carry no parameters, in which case the
/// `params` member is omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Params {
    /// No `params` member
    #[default]
    None,
    /// By-position parameters
    Positional(Vec<serde_json::Value>),
    /// By-name parameters
    Named(serde_json::Map<String, serde_json::Value>),
}

impl Params {
    /// Whether the `params` member is omitted
    pub fn is_none(&self) -> bool {
        matches!(self, Params::None)
    }

    /// Build parameters from an already-serialized value
    ///
    /// Arrays become positional and objects named parameters. Anything else
    /// (including `null`) fails with [`ClientErrorKind::InvalidParams`],
    /// tagged with `id` unless it is [`Id::None`].
    pub fn from_value(value: serde_json::Value, id: &Id) -> Result<Params> {
        match value {
            serde_json::Value::Array(items) => Ok(Params::Positional(items)),
            serde_json::Value::Object(map) => Ok(Params::Named(map)),
            other => Err(Error::client_detail(
                ClientErrorKind::InvalidParams,
                (!id.is_none()).then(|| id.clone()),
                format!("params must be a JSON array or object, got {}", json_kind(&other)),
            )),
        }
    }
}

pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Check a method name before any request is built around it
///
/// # Errors
///
/// - [`ClientErrorKind::InvalidMethod`] for an empty name
/// - [`ClientErrorKind::ReservedMethod`] for names starting with `rpc.`
pub fn validate_method(method: &str) -> Result<()> {
    if method.is_empty() {
        return Err(Error::client_detail(
            ClientErrorKind::InvalidMethod,
            None,
            "method name is empty",
        ));
    }
    if method.starts_with(RESERVED_METHOD_PREFIX) {
        return Err(Error::client_detail(
            ClientErrorKind::ReservedMethod,
            None,
            format!("'{}' uses the reserved '{}' prefix", method, RESERVED_METHOD_PREFIX),
        ));
    }
    Ok(())
}

/// JSON-RPC 2.0 request (or notification, when `id` is [`Id::None`])
///
/// Only [`Request::new`] and [`Request::notification`] build one, so every
/// request carries a valid method name. Serializes as `{"jsonrpc":"2.0","method":...,"params"?:...,"id"?:...}`,
/// leaving out `params` when there are none and `id` for notifications.
///
/// # Examples
///
/// ```rust
/// use jrh_core::{Id, Params, Request};
/// use serde_json::json;
///
/// let request = Request::new("subtract", Params::Positional(vec![json!(42), json!(23)]), Id::Number(1)).unwrap();
/// assert_eq!(
///     serde_json::to_string(&request).unwrap(),
///     r#"{"jsonrpc":"2.0","method":"subtract","params":[42,23],"id":1}"#
/// );
///
/// let notification = Request::notification("update", Params::None).unwrap();
/// assert_eq!(
///     serde_json::to_string(&notification).unwrap(),
///     r#"{"jsonrpc":"2.0","method":"update"}"#
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    jsonrpc: &'static str,
    method: String,
    #[serde(skip_serializing_if = "Params::is_none")]
    params: Params,
    #[serde(skip_serializing_if = "Id::is_none")]
    id: Id,
}

impl Request {
    /// Create a request, validating the method name
    pub fn new(method: impl Into<String>, params: Params, id: Id) -> Result<Self> {
        let method = method.into();
        validate_method(&method).map_err(|e| e.attach_id(&id))?;
        Ok(Self {
            jsonrpc: "2.0",
            method,
            params,
            id,
        })
    }

    /// Create a notification (a request without id)
    pub fn notification(method: impl Into<String>, params: Params) -> Result<Self> {
        Self::new(method, params, Id::None)
    }

    /// Name of the remote method
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Parameters of the call
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Request id; [`Id::None`] for notifications
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Whether no response is expected for this request
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// What a response says about the call
#[derive(Debug)]
pub enum Outcome {
    /// The `result` member, decoded with the call's contract
    Success(Payload),
    /// The `error` member
    Failure(ServiceError),
}

/// JSON-RPC 2.0 response, produced by the codec from wire bytes
#[derive(Debug)]
pub struct Response {
    pub(crate) id: Id,
    pub(crate) outcome: Outcome,
}

impl Response {
    /// Id of the request this answers ([`Id::None`] if the server could not
    /// determine it)
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Result or error
    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    /// Split into id and outcome
    pub fn into_parts(self) -> (Id, Outcome) {
        (self.id, self.outcome)
    }

    /// Pass a success through, turn an error object into [`Error::Service`]
    pub fn into_success(self) -> Result<Self> {
        match self.outcome {
            Outcome::Failure(error) => Err(Error::Service(error)),
            outcome => Ok(Self {
                id: self.id,
                outcome,
            }),
        }
    }

    /// Whether the call succeeded
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success(_))
    }

    /// Whether the remote method reported an error
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, Outcome::Failure(_))
    }

    /// Borrow the decoded result as `T`
    pub fn result<T: 'static>(&self) -> Option<&T> {
        match &self.outcome {
            Outcome::Success(payload) => payload.downcast_ref::<T>(),
            Outcome::Failure(_) => None,
        }
    }

    /// Borrow the error object, if any
    pub fn error(&self) -> Option<&ServiceError> {
        match &self.outcome {
            Outcome::Success(_) => None,
            Outcome::Failure(error) => Some(error),
        }
    }
}

/// Diagnostic for a response that could not be accepted
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidResponse {
    /// The response id, if it could be read
    pub id: Option<Id>,
    /// Why the response was rejected
    pub reason: String,
}

impl InvalidResponse {
    pub(crate) fn new(id: Option<Id>, reason: impl Into<String>) -> Self {
        Self {
            id,
            reason: reason.into(),
        }
    }

    /// Turn the diagnostic into a [`ClientErrorKind::InvalidValue`] error
    pub fn into_error(self) -> Error {
        Error::client_detail(ClientErrorKind::InvalidValue, self.id, self.reason)
    }
}

impl fmt::Display for InvalidResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{} (id: {})", self.reason, id),
            None => f.write_str(&self.reason),
        }
    }
}

/// Result of decoding one response object
#[derive(Debug)]
pub enum ResponseItem {
    /// A well-formed response
    Valid(Response),
    /// A malformed response
    Invalid(InvalidResponse),
}

impl ResponseItem {
    /// Whether the item is a well-formed response
    pub fn is_valid(&self) -> bool {
        matches!(self, ResponseItem::Valid(_))
    }
}

/// Result of decoding a whole response body
#[derive(Debug)]
pub enum ResponseData {
    /// The body was a single response object (or not a usable batch)
    Single(ResponseItem),
    /// The body was a non-empty JSON array of responses
    Batch(Vec<ResponseItem>),
}

impl ResponseData {
    /// Whether the body was batch-shaped
    pub fn is_batch(&self) -> bool {
        matches!(self, ResponseData::Batch(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let req = Request::new("test", Params::None, Id::Number(1)).unwrap();
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"jsonrpc":"2.0","method":"test","id":1}"#);
    }

    #[test]
    fn test_named_params_serialization() {
        let mut map = serde_json::Map::new();
        map.insert("a".to_string(), json!(1));
        let req = Request::new("test", Params::Named(map), Id::from("x")).unwrap();
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            json!({"jsonrpc": "2.0", "method": "test", "params": {"a": 1}, "id": "x"})
        );
    }

    #[test]
    fn test_notification_serialization() {
        let notif = Request::notification("notify", Params::Positional(vec![json!(1)])).unwrap();
        assert!(notif.is_notification());
        let json = serde_json::to_string(&notif).unwrap();
        assert!(!json.contains("\"id\""));
        assert!(json.contains("\"params\":[1]"));
    }

    #[test]
    fn test_reserved_method_rejected() {
        let err = Request::new("rpc.discover", Params::None, Id::Number(3)).unwrap_err();
        assert_eq!(err.client_kind(), Some(ClientErrorKind::ReservedMethod));
        assert_eq!(err.id(), Some(&Id::Number(3)));

        let err = Request::notification("", Params::None).unwrap_err();
        assert_eq!(err.client_kind(), Some(ClientErrorKind::InvalidMethod));
        assert!(err.id().is_none());
    }

    #[test]
    fn test_request_accessors() {
        let req = Request::new("sum", Params::Positional(vec![json!(1)]), Id::Number(4)).unwrap();
        assert_eq!(req.method(), "sum");
        assert_eq!(req.params(), &Params::Positional(vec![json!(1)]));
        assert_eq!(req.id(), &Id::Number(4));
        assert!(!req.is_notification());
    }

    #[test]
    fn test_method_with_rpc_in_the_middle_is_allowed() {
        assert!(validate_method("my.rpc.call").is_ok());
        assert!(validate_method("rpcx").is_ok());
    }

    #[test]
    fn test_params_from_value() {
        assert_eq!(
            Params::from_value(json!([1, 2]), &Id::Number(1)).unwrap(),
            Params::Positional(vec![json!(1), json!(2)])
        );
        assert!(matches!(
            Params::from_value(json!({"k": "v"}), &Id::Number(1)).unwrap(),
            Params::Named(_)
        ));

        let err = Params::from_value(json!(null), &Id::Number(9)).unwrap_err();
        assert_eq!(err.client_kind(), Some(ClientErrorKind::InvalidParams));
        assert_eq!(err.id(), Some(&Id::Number(9)));

        let err = Params::from_value(json!(5), &Id::None).unwrap_err();
        assert!(err.id().is_none());
    }

    #[test]
    fn test_invalid_response_into_error() {
        let invalid = InvalidResponse::new(Some(Id::Number(2)), "missing jsonrpc member");
        assert_eq!(invalid.to_string(), "missing jsonrpc member (id: 2)");

        let err = invalid.into_error();
        assert_eq!(err.client_kind(), Some(ClientErrorKind::InvalidValue));
        assert_eq!(err.id(), Some(&Id::Number(2)));
    }
}
