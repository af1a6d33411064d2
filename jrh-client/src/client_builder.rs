//! Client builder for configuring the endpoint, content settings and
//! observability
//!
//! The `ClientBuilder` provides a fluent API for configuring a client before
//! it is built. It allows you to:
//! - Set the media type, charset, user agent and custom headers
//! - Register content decoders for compressed responses
//! - Plug in a custom HTTP invoker or id generator
//! - Configure observability (OpenTelemetry)
//!
//! # Examples
//!
//! ```rust,no_run
//! use jrh_client::ClientBuilder;
//! use jrh_core::{Charset, SequentialIdGenerator};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn example() -> jrh_core::Result<()> {
//! let client = ClientBuilder::new("https://rpc.example.com/v1")
//!     .charset(Charset::Utf8)
//!     .user_agent("billing/2.1")
//!     .header("authorization", "Bearer token")
//!     .timeout(Duration::from_secs(10))
//!     .id_generator(Arc::new(SequentialIdGenerator::new()))
//!     .build()?;
//!
//! // With observability
//! let client2 = ClientBuilder::new("https://rpc.example.com/v1")
//!     .with_default_observability()
//!     .service_name("billing")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use crate::config::ClientConfig;
use crate::content::{parse_header, ContentDecoder, ContentDecoders, ContentNegotiation, DEFAULT_MEDIA_TYPE};
use crate::transport::{HttpInvoker, ReqwestInvoker};
use crate::{ClientMetrics, JrhClient};
use http::HeaderMap;
use jrh_core::{Charset, ContractRegistry, Error, IdGenerator, Result, UuidIdGenerator};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Builder for configuring and creating a JrhClient
pub struct ClientBuilder {
    uri: String,
    media_type: String,
    charset: Charset,
    user_agent: Option<String>,
    headers: Vec<(String, String)>,
    decoders: ContentDecoders,
    id_generator: Option<Arc<dyn IdGenerator>>,
    invoker: Option<Arc<dyn HttpInvoker>>,
    timeout: Option<Duration>,
    observability_config: Option<jrh_core::ObservabilityConfig>,
    service_name: Option<String>,
}

impl ClientBuilder {
    /// Create a new client builder
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            media_type: DEFAULT_MEDIA_TYPE.to_string(),
            charset: Charset::Utf8,
            user_agent: None,
            headers: Vec::new(),
            decoders: ContentDecoders::new(),
            id_generator: None,
            invoker: None,
            timeout: None,
            observability_config: None,
            service_name: None,
        }
    }

    /// Seed a builder from serializable settings
    ///
    /// # Errors
    ///
    /// `Error::UnsupportedCharset` if the configured charset is not
    /// supported.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let mut builder = Self::new(config.uri.clone())
            .media_type(config.media_type.clone())
            .charset(Charset::parse(&config.charset)?);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        for (name, value) in &config.headers {
            builder = builder.header(name.clone(), value.clone());
        }
        if let Some(timeout_ms) = config.timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }
        Ok(builder)
    }

    /// Set the media type (default `application/json-rpc`)
    pub fn media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = media_type.into();
        self
    }

    /// Set the charset request bodies are encoded in (default utf-8)
    pub fn charset(mut self, charset: Charset) -> Self {
        self.charset = charset;
        self
    }

    /// Send a `User-Agent` header
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Send a custom header with every request
    ///
    /// Repeating a name sends every value. A custom header replaces a
    /// built-in one of the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Accept a content coding and decode it with `decoder`
    pub fn content_decoder(mut self, decoder: Arc<dyn ContentDecoder>) -> Self {
        self.decoders.register(decoder);
        self
    }

    /// Draw ids for calls made without one from `generator` (default: random
    /// UUIDs)
    pub fn id_generator(mut self, generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = Some(generator);
        self
    }

    /// Perform exchanges with `invoker` instead of the default reqwest client
    pub fn invoker(mut self, invoker: Arc<dyn HttpInvoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    /// Time limit of one exchange with the default invoker
    ///
    /// A custom [`invoker`](Self::invoker) enforces its own limits, so
    /// setting both fails at [`build`](Self::build).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Enable OpenTelemetry observability with custom configuration
    pub fn with_observability(mut self, config: jrh_core::ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    /// Enable OpenTelemetry observability with default configuration
    pub fn with_default_observability(mut self) -> Self {
        self.observability_config = Some(jrh_core::ObservabilityConfig::default());
        self
    }

    /// Set service name for observability (used if observability is enabled)
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Build the client
    ///
    /// # Errors
    ///
    /// `Error::Configuration` if the URI is not an absolute http/https URI,
    /// a header or the media type is malformed, a timeout is combined with a
    /// custom invoker, the HTTP client cannot be created, or observability
    /// fails to initialize.
    pub fn build(self) -> Result<JrhClient> {
        let uri = Url::parse(&self.uri)
            .map_err(|e| Error::Configuration(format!("Invalid URI '{}': {}", self.uri, e)))?;
        if !matches!(uri.scheme(), "http" | "https") {
            return Err(Error::Configuration(format!(
                "Unsupported URI scheme: {}",
                uri.scheme()
            )));
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let (name, value) = parse_header(name, value)?;
            headers.append(name, value);
        }

        let content = ContentNegotiation::new(
            self.media_type,
            self.charset,
            self.user_agent,
            headers,
            self.decoders,
        )?;

        let invoker: Arc<dyn HttpInvoker> = match (self.invoker, self.timeout) {
            (Some(_), Some(_)) => {
                return Err(Error::Configuration(
                    "A timeout cannot be applied to a custom invoker".to_string(),
                ))
            }
            (Some(invoker), None) => invoker,
            (None, timeout) => Arc::new(ReqwestInvoker::with_timeout(timeout)?),
        };

        // Initialize observability if configured
        let metrics = if let Some(mut config) = self.observability_config {
            if let Some(name) = self.service_name {
                config.service_name = name;
            }

            jrh_core::init_observability(config.clone()).map_err(|e| {
                Error::Configuration(format!("Failed to initialize observability: {}", e))
            })?;

            Some(Arc::new(ClientMetrics::new(config.service_name)))
        } else {
            None
        };

        tracing::debug!(uri = %uri, media_type = %content.media_type(), charset = %content.charset(), "Client built");

        Ok(JrhClient {
            uri,
            invoker,
            content,
            contracts: ContractRegistry::new(),
            id_generator: self
                .id_generator
                .unwrap_or_else(|| Arc::new(UuidIdGenerator)),
            metrics,
        })
    }
}
