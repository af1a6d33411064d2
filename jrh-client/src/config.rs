//! Serializable client configuration
//!
//! [`ClientConfig`] holds the settings of a client that can live in a
//! configuration file. Settings that are code (custom invokers, content
//! decoders, id generators) are added on the [`ClientBuilder`] it seeds.
//!
//! ```rust
//! use jrh_client::{ClientBuilder, ClientConfig};
//!
//! let config: ClientConfig = serde_json::from_str(r#"{
//!     "uri": "https://rpc.example.com/v1",
//!     "user_agent": "billing/2.1",
//!     "headers": {"authorization": "Bearer token"},
//!     "timeout_ms": 5000
//! }"#).unwrap();
//!
//! let client = ClientBuilder::from_config(&config).unwrap().build().unwrap();
//! assert_eq!(client.content().media_type(), "application/json-rpc");
//! ```
//!
//! [`ClientBuilder`]: crate::ClientBuilder

use crate::content::DEFAULT_MEDIA_TYPE;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Client settings, with defaults for every field but `uri`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Absolute http/https endpoint
    pub uri: String,
    /// Media type of request and response bodies
    pub media_type: String,
    /// Charset of request bodies
    pub charset: String,
    /// `User-Agent` header value
    pub user_agent: Option<String>,
    /// Extra headers sent with every request
    pub headers: BTreeMap<String, String>,
    /// Exchange timeout of the default HTTP invoker, in milliseconds
    pub timeout_ms: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            uri: String::new(),
            media_type: DEFAULT_MEDIA_TYPE.to_string(),
            charset: "utf-8".to_string(),
            user_agent: None,
            headers: BTreeMap::new(),
            timeout_ms: None,
        }
    }
}

impl ClientConfig {
    /// Defaults with the given endpoint
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: ClientConfig = serde_json::from_str(r#"{"uri": "http://localhost/rpc"}"#).unwrap();
        assert_eq!(config, ClientConfig::new("http://localhost/rpc"));
        assert_eq!(config.media_type, "application/json-rpc");
        assert_eq!(config.charset, "utf-8");
        assert!(config.headers.is_empty());
    }

    #[test]
    fn test_round_trip_through_json() {
        let mut config = ClientConfig::new("https://example.com/rpc");
        config.headers.insert("x-api-key".to_string(), "k".to_string());
        config.timeout_ms = Some(250);

        let text = serde_json::to_string(&config).unwrap();
        let parsed: ClientConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
