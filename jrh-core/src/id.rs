//! JSON-RPC 2.0 request identifiers
//!
//! A request id correlates a call with its response. JSON-RPC allows strings,
//! numbers and null; a request without an id is a *notification* and gets no
//! response at all, which [`Id::None`] models.
//!
//! The enum derives `Hash` and `Eq` so ids can be put straight into a
//! `HashSet`, which the batch engine relies on to reconcile the ids it sent
//! with the ids that came back. The variants are distinct for hashing and
//! equality: `Id::String("1")` is not `Id::Number(1)`.
//!
//! # Examples
//!
//! ```rust
//! use jrh_core::Id;
//! use std::collections::HashSet;
//!
//! let ids: HashSet<Id> = [Id::from(1i64), Id::from("1")].into_iter().collect();
//! assert_eq!(ids.len(), 2);
//!
//! assert_eq!(Id::from("req-1").to_string(), "\"req-1\"");
//! assert!(Id::default().is_none());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// JSON-RPC 2.0 request id
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    /// No id: the request is a notification (serialized as `null`)
    #[default]
    None,
    /// Numeric identifier
    Number(i64),
    /// String identifier
    String(String),
}

impl Id {
    /// Whether this is the notification id
    pub fn is_none(&self) -> bool {
        matches!(self, Id::None)
    }

    /// Read an id from a JSON value
    ///
    /// Integral numbers (including floats such as `2.0` that fit in an
    /// `i64`) become [`Id::Number`], strings [`Id::String`] and `null`
    /// [`Id::None`]. Fractional numbers and other JSON types are not ids.
    pub fn from_json(value: &serde_json::Value) -> Option<Id> {
        match value {
            serde_json::Value::Null => Some(Id::None),
            serde_json::Value::String(s) => Some(Id::String(s.clone())),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return Some(Id::Number(i));
                }
                let f = n.as_f64()?;
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
                    Some(Id::Number(f as i64))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Convert an unsigned number, rejecting values above `i64::MAX`
    pub fn try_from_u64(n: u64) -> Option<Id> {
        i64::try_from(n).ok().map(Id::Number)
    }
}

impl fmt::Display for Id {
    /// Strings are quoted, numbers printed as-is, `None` prints `null`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::None => write!(f, "null"),
            Id::Number(n) => write!(f, "{}", n),
            Id::String(s) => write!(f, "\"{}\"", s),
        }
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id::String(s)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::String(s.to_string())
    }
}

impl From<i64> for Id {
    fn from(n: i64) -> Self {
        Id::Number(n)
    }
}

impl From<i32> for Id {
    fn from(n: i32) -> Self {
        Id::Number(n as i64)
    }
}

/// Strategy for assigning ids to outgoing calls
///
/// The client asks its generator for an id whenever a call is made without
/// an explicit one. Generated ids should be unique for the lifetime of the
/// client; globally unique ids keep a late response from ever matching an
/// unrelated call.
pub trait IdGenerator: Send + Sync {
    /// Produce the id for the next call
    fn next_id(&self) -> Id;
}

/// Random version 4 UUID string ids (the default)
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn next_id(&self) -> Id {
        Id::String(uuid::Uuid::new_v4().to_string())
    }
}

/// Numeric ids from an atomic counter starting at 1
#[derive(Debug)]
pub struct SequentialIdGenerator {
    counter: AtomicI64,
}

impl SequentialIdGenerator {
    /// Create a generator whose first id is 1
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Create a generator whose first id is `start`
    pub fn starting_at(start: i64) -> Self {
        Self {
            counter: AtomicI64::new(start),
        }
    }
}

impl Default for SequentialIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> Id {
        Id::Number(self.counter.fetch_add(1, Ordering::SeqCst))
    }
}
