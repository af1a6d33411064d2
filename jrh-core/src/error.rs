//! Error types for jrh
//!
//! Every failure a call can produce is one variant of [`Error`]. The variants
//! follow the classification a JSON-RPC client has to make about *who* broke
//! the exchange:
//!
//! - **Client**: local processing failed (parameters could not be encoded,
//!   the response body could not be parsed, duplicate ids in a batch, ...)
//! - **Protocol**: the remote side violated the HTTP/JSON-RPC contract
//!   (wrong status, wrong content type, id set mismatch, ...)
//! - **Service**: the remote method ran and answered with a JSON-RPC `error`
//!   object
//! - **Aggregate**: several malformed items in one batch answer
//! - **Cancelled**: the caller's cancellation token fired
//!
//! # Examples
//!
//! ```rust
//! use jrh_core::{ClientErrorKind, Error, Id};
//!
//! let error = Error::client(ClientErrorKind::InvalidParams, Some(Id::Number(7)));
//! assert_eq!(error.id(), Some(&Id::Number(7)));
//! assert_eq!(error.to_string(), "Client error: invalid params (id: 7)");
//! ```

use crate::contract::Payload;
use crate::id::Id;
use std::fmt;
use thiserror::Error;

/// Result type for jrh operations
pub type Result<T> = std::result::Result<T, Error>;

/// Standard JSON-RPC 2.0 error codes
///
/// Servers report these in the `code` member of an error object. They are
/// exposed so callers can match on [`ServiceError::code`].
pub mod codes {
    /// Invalid JSON was received by the server
    pub const PARSE_ERROR: i64 = -32700;
    /// The JSON sent is not a valid Request object
    pub const INVALID_REQUEST: i64 = -32600;
    /// The method does not exist / is not available
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid method parameter(s)
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal JSON-RPC error
    pub const INTERNAL_ERROR: i64 = -32603;
    /// Lower bound of the range reserved for pre-defined errors
    pub const RESERVED_MIN: i64 = -32768;
    /// Upper bound of the range reserved for pre-defined errors
    pub const RESERVED_MAX: i64 = -32000;
}

/// Application-level error type for jrh operations
#[derive(Debug, Error)]
pub enum Error {
    /// Local processing failure
    ///
    /// Raised before the request leaves the process (bad method name, bad
    /// parameters, duplicate batch ids) or while making sense of a response
    /// body that could not be parsed.
    #[error("Client error: {kind}{}", context(.id.as_ref(), .detail.as_deref()))]
    Client {
        /// What went wrong
        kind: ClientErrorKind,
        /// The request id, when known
        id: Option<Id>,
        /// Parser or validation diagnostic
        detail: Option<String>,
    },

    /// The remote side violated the HTTP/JSON-RPC contract
    #[error("Protocol error: {kind} (HTTP {status}){}", context(.id.as_ref(), None))]
    Protocol {
        /// What went wrong
        kind: ProtocolErrorKind,
        /// HTTP status code of the exchange
        status: u16,
        /// The request id, when determinable
        id: Option<Id>,
    },

    /// The remote method answered with a JSON-RPC error object
    #[error("Service error: {0}")]
    Service(ServiceError),

    /// Several malformed items in an otherwise batch-shaped answer
    ///
    /// Every inner error is a [`Error::Client`] with
    /// [`ClientErrorKind::InvalidValue`].
    #[error("Aggregate error: {} invalid response item(s)", .0.len())]
    Aggregate(Vec<Error>),

    /// The call was cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// The HTTP invoker failed to complete the exchange
    #[error("Transport error: {0}")]
    Transport(String),

    /// The client was configured with invalid settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A charset token outside the supported whitelist
    #[error("Unsupported charset: {0}")]
    UnsupportedCharset(String),
}

fn context(id: Option<&Id>, detail: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(id) = id {
        out.push_str(&format!(" (id: {})", id));
    }
    if let Some(detail) = detail {
        out.push_str(&format!(": {}", detail));
    }
    out
}

impl Error {
    /// Create a client error without a diagnostic
    pub fn client(kind: ClientErrorKind, id: Option<Id>) -> Self {
        Error::Client {
            kind,
            id,
            detail: None,
        }
    }

    /// Create a client error carrying a diagnostic message
    pub fn client_detail(kind: ClientErrorKind, id: Option<Id>, detail: impl Into<String>) -> Self {
        Error::Client {
            kind,
            id,
            detail: Some(detail.into()),
        }
    }

    /// Create a protocol error
    pub fn protocol(kind: ProtocolErrorKind, status: u16, id: Option<Id>) -> Self {
        Error::Protocol { kind, status, id }
    }

    /// Fill in the request id of a client or protocol error that has none
    ///
    /// [`Id::None`] is never attached.
    pub fn attach_id(mut self, request_id: &Id) -> Self {
        if let Error::Client { id, .. } | Error::Protocol { id, .. } = &mut self {
            if id.is_none() && !request_id.is_none() {
                *id = Some(request_id.clone());
            }
        }
        self
    }

    /// The request id associated with this error, if any
    pub fn id(&self) -> Option<&Id> {
        match self {
            Error::Client { id, .. } | Error::Protocol { id, .. } => id.as_ref(),
            _ => None,
        }
    }

    /// The HTTP status code carried by protocol errors
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Protocol { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The client error kind, if this is a client error
    pub fn client_kind(&self) -> Option<ClientErrorKind> {
        match self {
            Error::Client { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// The protocol error kind, if this is a protocol error
    pub fn protocol_kind(&self) -> Option<ProtocolErrorKind> {
        match self {
            Error::Protocol { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether the call was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Short, stable label used for metrics and logs
    pub fn label(&self) -> &'static str {
        match self {
            Error::Client { .. } => "client",
            Error::Protocol { .. } => "protocol",
            Error::Service(_) => "service",
            Error::Aggregate(_) => "aggregate",
            Error::Cancelled => "cancelled",
            Error::Transport(_) => "transport",
            Error::Configuration(_) => "configuration",
            Error::UnsupportedCharset(_) => "charset",
        }
    }
}

impl From<ServiceError> for Error {
    fn from(err: ServiceError) -> Self {
        Error::Service(err)
    }
}

/// Kinds of local processing failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientErrorKind {
    /// The method name is empty
    InvalidMethod,
    /// The method name uses the reserved `rpc.` prefix
    ReservedMethod,
    /// Parameters could not be encoded as a JSON array or object
    InvalidParams,
    /// A call that expects a response was given no id
    InvalidIdentifier,
    /// Two calls in one batch share an id
    DuplicateIdentifiers,
    /// The id is already used by another call in flight on this client
    IdentifierInUse,
    /// A batch without any calls
    EmptyBatch,
    /// The response body is not parseable JSON text
    InvalidResponse,
    /// The response body parsed but is not a valid response for this call
    InvalidValue,
}

impl fmt::Display for ClientErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ClientErrorKind::InvalidMethod => "invalid method",
            ClientErrorKind::ReservedMethod => "reserved method",
            ClientErrorKind::InvalidParams => "invalid params",
            ClientErrorKind::InvalidIdentifier => "invalid identifier",
            ClientErrorKind::DuplicateIdentifiers => "duplicate identifiers",
            ClientErrorKind::IdentifierInUse => "identifier in use",
            ClientErrorKind::EmptyBatch => "empty batch",
            ClientErrorKind::InvalidResponse => "invalid response",
            ClientErrorKind::InvalidValue => "invalid value",
        };
        f.write_str(text)
    }
}

/// Kinds of HTTP/JSON-RPC contract violations by the remote side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolErrorKind {
    /// A body arrived where none was expected
    UnexpectedContent,
    /// No body arrived where one was required
    UnexpectedBlank,
    /// The HTTP status is neither 200 nor 204
    InvalidStatusCode,
    /// Media type or charset of the response is not acceptable
    InvalidContentType,
    /// The response uses a content coding that was not advertised
    InvalidContentEncoding,
    /// A batch answer to a single call
    BatchValue,
    /// A single answer to a batch
    SingleValue,
    /// Two responses in one batch answer share an id
    DuplicateIdentifiers,
    /// The set of answered ids differs from the set of requested ids
    InvalidValues,
}

impl fmt::Display for ProtocolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ProtocolErrorKind::UnexpectedContent => "unexpected content",
            ProtocolErrorKind::UnexpectedBlank => "unexpected blank",
            ProtocolErrorKind::InvalidStatusCode => "invalid status code",
            ProtocolErrorKind::InvalidContentType => "invalid content-type",
            ProtocolErrorKind::InvalidContentEncoding => "invalid content-encoding",
            ProtocolErrorKind::BatchValue => "batch value",
            ProtocolErrorKind::SingleValue => "single value",
            ProtocolErrorKind::DuplicateIdentifiers => "duplicate identifiers",
            ProtocolErrorKind::InvalidValues => "invalid values",
        };
        f.write_str(text)
    }
}

/// A JSON-RPC error object returned by the remote method
///
/// `has_data` separates an absent `data` member from one that is present but
/// `null`: `{"code":1,"message":"e"}` has no data, while
/// `{"code":1,"message":"e","data":null}` has data that decoded from `null`.
///
/// The data is decoded with the error-data type of the call's contract, or
/// kept as a raw [`serde_json::Value`] when the call declared none. A `null`
/// that the contract's type cannot hold leaves `data` empty with `has_data`
/// still set.
#[derive(Debug)]
pub struct ServiceError {
    /// Numeric error code
    pub code: i64,
    /// Short description of the error
    pub message: String,
    /// Decoded `data` member
    pub data: Option<Payload>,
    /// Whether the `data` member was present on the wire
    pub has_data: bool,
}

impl ServiceError {
    /// Borrow the error data as `E`
    ///
    /// Returns `None` if there is no data or it was decoded as another type.
    pub fn data<E: 'static>(&self) -> Option<&E> {
        self.data.as_ref().and_then(|d| d.downcast_ref::<E>())
    }

    /// Take the error data as `E`
    pub fn into_data<E: 'static>(self) -> Option<E> {
        self.data.and_then(|d| d.into_inner::<E>().ok())
    }

    /// Whether the code lies in the range reserved by JSON-RPC 2.0
    pub fn is_reserved_code(&self) -> bool {
        (codes::RESERVED_MIN..=codes::RESERVED_MAX).contains(&self.code)
    }
}

impl fmt::Display for ServiceError {
    /// Formats as "[code] message"
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ServiceError {}
