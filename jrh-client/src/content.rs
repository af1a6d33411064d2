//! Content negotiation: request headers, response content type and content
//! codings
//!
//! Every request carries the configured media type and charset, the accepted
//! media type and charset, a `Date`, the optional `User-Agent`, an
//! `Accept-Encoding` listing the registered [`ContentDecoder`]s, and any
//! custom headers (e.g. `Authorization`).
//!
//! A `200` response must declare the same media type. Its `charset`
//! parameter must be on the whitelist and defaults to utf-8 when absent.
//! A `Content-Encoding` header selects decoders, undone in reverse order of
//! application before the body reaches the JSON parser.

use bytes::Bytes;
use http::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_CHARSET, ACCEPT_ENCODING,
    CONTENT_ENCODING, CONTENT_TYPE, DATE, USER_AGENT,
};
use jrh_core::{Charset, ClientErrorKind, Error, ProtocolErrorKind, Result};
use std::fmt;
use std::sync::Arc;

/// Media type used when none is configured
pub const DEFAULT_MEDIA_TYPE: &str = "application/json-rpc";

/// Content coding that is always accepted and never needs decoding
pub const IDENTITY: &str = "identity";

/// Undoes one content coding (e.g. `gzip`, `br`)
pub trait ContentDecoder: Send + Sync {
    /// The `Content-Encoding` token this decoder handles
    fn token(&self) -> &str;

    /// Decode a complete body
    fn decode(&self, body: Bytes) -> std::io::Result<Bytes>;
}

/// Registered content decoders, in registration order
#[derive(Clone, Default)]
pub struct ContentDecoders {
    decoders: Vec<Arc<dyn ContentDecoder>>,
}

impl ContentDecoders {
    /// Create an empty set; only `identity` is accepted
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a decoder, replacing any decoder for the same token
    pub fn register(&mut self, decoder: Arc<dyn ContentDecoder>) {
        self.decoders
            .retain(|existing| !existing.token().eq_ignore_ascii_case(decoder.token()));
        self.decoders.push(decoder);
    }

    /// Find the decoder for a token
    pub fn get(&self, token: &str) -> Option<&Arc<dyn ContentDecoder>> {
        self.decoders
            .iter()
            .find(|decoder| decoder.token().eq_ignore_ascii_case(token))
    }

    /// Registered tokens, in registration order
    pub fn tokens(&self) -> Vec<&str> {
        self.decoders.iter().map(|decoder| decoder.token()).collect()
    }

    /// Whether no decoder is registered
    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// `Accept-Encoding` value advertising the registered decoders
    pub fn accept_encoding(&self) -> Option<String> {
        (!self.is_empty()).then(|| self.tokens().join(", "))
    }

    /// Undo the codings listed in a `Content-Encoding` header value
    ///
    /// Codings are listed in the order they were applied, so they are undone
    /// from last to first.
    pub fn decode(&self, content_encoding: &str, mut body: Bytes) -> Result<Bytes> {
        let tokens: Vec<&str> = content_encoding
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .collect();

        for token in tokens.into_iter().rev() {
            if token.eq_ignore_ascii_case(IDENTITY) {
                continue;
            }
            let decoder = self.get(token).ok_or_else(|| {
                tracing::debug!(coding = %token, "Response uses an unsupported content coding");
                Error::protocol(ProtocolErrorKind::InvalidContentEncoding, 200, None)
            })?;
            body = decoder.decode(body).map_err(|e| {
                Error::client_detail(
                    ClientErrorKind::InvalidResponse,
                    None,
                    format!("{} decoding failed: {}", token, e),
                )
            })?;
        }
        Ok(body)
    }
}

impl fmt::Debug for ContentDecoders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.tokens()).finish()
    }
}

/// Negotiated content settings of a client
#[derive(Debug, Clone)]
pub struct ContentNegotiation {
    media_type: String,
    charset: Charset,
    content_type: HeaderValue,
    accept: HeaderValue,
    user_agent: Option<HeaderValue>,
    custom_headers: HeaderMap,
    decoders: ContentDecoders,
}

impl ContentNegotiation {
    /// Validate the settings and prepare the static header values
    ///
    /// # Errors
    ///
    /// `Error::Configuration` if the media type is not a `type/subtype` pair
    /// or a value cannot be sent as an HTTP header.
    pub fn new(
        media_type: impl Into<String>,
        charset: Charset,
        user_agent: Option<String>,
        custom_headers: HeaderMap,
        decoders: ContentDecoders,
    ) -> Result<Self> {
        let media_type = media_type.into().trim().to_ascii_lowercase();
        let valid_media_type = matches!(
            media_type.split_once('/'),
            Some((kind, subtype)) if !kind.is_empty() && !subtype.is_empty() && !subtype.contains(';')
        );
        if !valid_media_type {
            return Err(Error::Configuration(format!(
                "Invalid media type: '{}'",
                media_type
            )));
        }

        let content_type = header_value(&format!("{}; charset={}", media_type, charset.token()))?;
        let accept = header_value(&media_type)?;
        let user_agent = user_agent.as_deref().map(header_value).transpose()?;

        Ok(Self {
            media_type,
            charset,
            content_type,
            accept,
            user_agent,
            custom_headers,
            decoders,
        })
    }

    /// The media type sent and expected
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// The charset request bodies are encoded in
    pub fn charset(&self) -> Charset {
        self.charset
    }

    /// Registered content decoders
    pub fn decoders(&self) -> &ContentDecoders {
        &self.decoders
    }

    /// Headers for one outgoing request
    pub fn request_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, self.content_type.clone());
        headers.insert(ACCEPT, self.accept.clone());
        headers.insert(ACCEPT_CHARSET, HeaderValue::from_static("utf-8"));

        let date = chrono::Utc::now()
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string();
        if let Ok(date) = HeaderValue::from_str(&date) {
            headers.insert(DATE, date);
        }

        if let Some(user_agent) = &self.user_agent {
            headers.insert(USER_AGENT, user_agent.clone());
        }
        if let Some(accept_encoding) = self.decoders.accept_encoding() {
            if let Ok(value) = HeaderValue::from_str(&accept_encoding) {
                headers.insert(ACCEPT_ENCODING, value);
            }
        }
        // Custom headers replace fixed ones of the same name and keep every
        // value of a repeated name
        for name in self.custom_headers.keys() {
            headers.remove(name);
        }
        for (name, value) in &self.custom_headers {
            headers.append(name.clone(), value.clone());
        }
        headers
    }

    /// Check the `Content-Type` of a `200` response and pick its charset
    ///
    /// # Errors
    ///
    /// [`ProtocolErrorKind::InvalidContentType`] when the header is missing,
    /// names another media type, or declares a charset off the whitelist.
    pub fn response_charset(&self, headers: &HeaderMap) -> Result<Charset> {
        let invalid = || Error::protocol(ProtocolErrorKind::InvalidContentType, 200, None);

        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(invalid)?;

        let mut parts = content_type.split(';');
        let media_type = parts.next().unwrap_or_default().trim();
        if !media_type.eq_ignore_ascii_case(&self.media_type) {
            tracing::debug!(
                expected = %self.media_type,
                actual = %media_type,
                "Response media type mismatch"
            );
            return Err(invalid());
        }

        for parameter in parts {
            if let Some((name, value)) = parameter.split_once('=') {
                if name.trim().eq_ignore_ascii_case("charset") {
                    return Charset::parse(value).map_err(|e| {
                        tracing::debug!(error = %e, "Response charset rejected");
                        invalid()
                    });
                }
            }
        }
        Ok(Charset::Utf8)
    }

    /// Undo the response's content codings, if any
    pub fn decode_body(&self, headers: &HeaderMap, body: Bytes) -> Result<Bytes> {
        match headers.get(CONTENT_ENCODING) {
            None => Ok(body),
            Some(value) => {
                let value = value.to_str().map_err(|_| {
                    Error::protocol(ProtocolErrorKind::InvalidContentEncoding, 200, None)
                })?;
                self.decoders.decode(value, body)
            }
        }
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| Error::Configuration(format!("Invalid header value: '{}'", value)))
}

/// Parse a custom header pair
pub(crate) fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| Error::Configuration(format!("Invalid header name: '{}'", name)))?;
    Ok((header_name, header_value(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Reverse;

    impl ContentDecoder for Reverse {
        fn token(&self) -> &str {
            "reverse"
        }

        fn decode(&self, body: Bytes) -> std::io::Result<Bytes> {
            let mut bytes = body.to_vec();
            bytes.reverse();
            Ok(Bytes::from(bytes))
        }
    }

    struct Strip(&'static str);

    impl ContentDecoder for Strip {
        fn token(&self) -> &str {
            self.0
        }

        fn decode(&self, body: Bytes) -> std::io::Result<Bytes> {
            body.strip_prefix(b"#")
                .map(Bytes::copy_from_slice)
                .ok_or_else(|| std::io::Error::other("missing marker"))
        }
    }

    fn negotiation(decoders: ContentDecoders) -> ContentNegotiation {
        ContentNegotiation::new(
            DEFAULT_MEDIA_TYPE,
            Charset::Utf8,
            Some("jrh-test/1.0".to_string()),
            HeaderMap::new(),
            decoders,
        )
        .unwrap()
    }

    fn with_content_type(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_request_headers() {
        let mut custom = HeaderMap::new();
        custom.insert("authorization", HeaderValue::from_static("Bearer t"));
        let mut decoders = ContentDecoders::new();
        decoders.register(Arc::new(Reverse));

        let content = ContentNegotiation::new(
            "application/json",
            Charset::Utf16Le,
            None,
            custom,
            decoders,
        )
        .unwrap();
        let headers = content.request_headers();

        assert_eq!(headers[CONTENT_TYPE], "application/json; charset=utf-16le");
        assert_eq!(headers[ACCEPT], "application/json");
        assert_eq!(headers[ACCEPT_CHARSET], "utf-8");
        assert_eq!(headers[ACCEPT_ENCODING], "reverse");
        assert_eq!(headers["authorization"], "Bearer t");
        assert!(headers[DATE].to_str().unwrap().ends_with(" GMT"));
        assert!(!headers.contains_key(USER_AGENT));
    }

    #[test]
    fn test_invalid_media_type_rejected() {
        for media_type in ["", "json", "application/", "/json"] {
            let result = ContentNegotiation::new(
                media_type,
                Charset::Utf8,
                None,
                HeaderMap::new(),
                ContentDecoders::new(),
            );
            assert!(matches!(result, Err(Error::Configuration(_))), "{}", media_type);
        }
    }

    #[test]
    fn test_response_charset() {
        let content = negotiation(ContentDecoders::new());

        assert_eq!(
            content.response_charset(&with_content_type("application/json-rpc")).unwrap(),
            Charset::Utf8
        );
        assert_eq!(
            content
                .response_charset(&with_content_type("Application/JSON-RPC; charset=\"UTF-16LE\""))
                .unwrap(),
            Charset::Utf16Le
        );
    }

    #[test]
    fn test_response_content_type_mismatch() {
        let content = negotiation(ContentDecoders::new());

        for headers in [
            HeaderMap::new(),
            with_content_type("text/html"),
            with_content_type("application/json-rpc; charset=latin1"),
        ] {
            let err = content.response_charset(&headers).unwrap_err();
            assert_eq!(err.protocol_kind(), Some(ProtocolErrorKind::InvalidContentType));
            assert_eq!(err.status(), Some(200));
        }
    }

    #[test]
    fn test_codings_undone_in_reverse_order() {
        let mut decoders = ContentDecoders::new();
        decoders.register(Arc::new(Reverse));
        decoders.register(Arc::new(Strip("mark")));

        // "mark" was applied first, then "reverse"
        let body = Bytes::from_static(b"}{#");
        let decoded = decoders.decode("mark, identity, reverse", body).unwrap();
        assert_eq!(decoded, Bytes::from_static(b"{}"));
    }

    #[test]
    fn test_unknown_coding_rejected() {
        let decoders = ContentDecoders::new();
        let err = decoders.decode("br", Bytes::from_static(b"x")).unwrap_err();
        assert_eq!(err.protocol_kind(), Some(ProtocolErrorKind::InvalidContentEncoding));

        assert_eq!(
            decoders.decode("identity", Bytes::from_static(b"x")).unwrap(),
            Bytes::from_static(b"x")
        );
    }

    #[test]
    fn test_decoder_failure_is_client_error() {
        let mut decoders = ContentDecoders::new();
        decoders.register(Arc::new(Strip("mark")));
        let err = decoders.decode("mark", Bytes::from_static(b"{}")).unwrap_err();
        assert_eq!(err.client_kind(), Some(ClientErrorKind::InvalidResponse));
    }

    #[test]
    fn test_register_replaces_same_token() {
        let mut decoders = ContentDecoders::new();
        decoders.register(Arc::new(Strip("gzip")));
        decoders.register(Arc::new(Strip("GZIP")));
        assert_eq!(decoders.tokens(), vec!["GZIP"]);
        assert_eq!(decoders.accept_encoding().as_deref(), Some("GZIP"));
    }

    #[test]
    fn test_parse_header() {
        assert!(parse_header("x-api-key", "secret").is_ok());
        assert!(matches!(
            parse_header("bad header", "v"),
            Err(Error::Configuration(_))
        ));
    }
}
