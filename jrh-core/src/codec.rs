//! Codec for JSON-RPC message serialization and deserialization
//!
//! Requests go out as bytes in the negotiated [`Charset`]; responses come
//! back as bytes and are turned into [`ResponseItem`]s.
//!
//! Decoding is driven by a *contract lookup*: a closure mapping a response id
//! to the [`Contract`] of the call that owns it. The envelope is checked
//! first, then the `result` (or error `data`) member is decoded with the
//! contract's types in the same pass.
//!
//! Decoding fails softly. A body that is not JSON text at all is an
//! [`Error::Client`] with [`ClientErrorKind::InvalidResponse`], but a JSON
//! value that is not a valid response object becomes
//! [`ResponseItem::Invalid`] with a diagnostic, so that one broken element of
//! a batch answer does not hide the others.
//!
//! # Examples
//!
//! ```rust
//! use jrh_core::{codec, Charset, Contract, Id, Params, Request, ResponseItem};
//!
//! let request = Request::new("add", Params::None, Id::Number(1)).unwrap();
//! let bytes = codec::encode_request(&request, Charset::Utf8).unwrap();
//! assert_eq!(bytes, br#"{"jsonrpc":"2.0","method":"add","id":1}"#);
//!
//! let body = br#"{"jsonrpc":"2.0","id":1,"result":3}"#;
//! let item = codec::decode_response(body, |_| Some(Contract::of::<i64>()), Charset::Utf8).unwrap();
//! match item {
//!     ResponseItem::Valid(response) => assert_eq!(response.result::<i64>(), Some(&3)),
//!     ResponseItem::Invalid(invalid) => panic!("{}", invalid),
//! }
//! ```

use crate::charset::Charset;
use crate::contract::Contract;
use crate::error::{ClientErrorKind, Error, Result, ServiceError};
use crate::id::Id;
use crate::types::{
    json_kind, InvalidResponse, Outcome, Request, Response, ResponseData, ResponseItem,
};
use serde_json::{Map, Value};

/// Encode one request (or notification)
///
/// # Errors
///
/// Returns [`ClientErrorKind::InvalidParams`], tagged with the request id,
/// if the request cannot be represented as JSON text.
pub fn encode_request(request: &Request, charset: Charset) -> Result<Vec<u8>> {
    let text = serde_json::to_string(request).map_err(|e| encoding_error(request, e))?;
    Ok(charset.encode(&text))
}

/// Encode several requests as one JSON array
///
/// Notifications keep their shape inside the array: no `id` member.
pub fn encode_batch(requests: &[Request], charset: Charset) -> Result<Vec<u8>> {
    let values = requests
        .iter()
        .map(|request| serde_json::to_value(request).map_err(|e| encoding_error(request, e)))
        .collect::<Result<Vec<Value>>>()?;
    let text = serde_json::to_string(&values)
        .map_err(|e| Error::client_detail(ClientErrorKind::InvalidParams, None, e.to_string()))?;
    Ok(charset.encode(&text))
}

fn encoding_error(request: &Request, error: serde_json::Error) -> Error {
    Error::client_detail(
        ClientErrorKind::InvalidParams,
        (!request.is_notification()).then(|| request.id().clone()),
        error.to_string(),
    )
}

/// Decode a body holding one response object
///
/// A batch-shaped body is reported as [`ResponseItem::Invalid`]; use
/// [`decode_batch`] when the shape is not known in advance.
pub fn decode_response<F>(bytes: &[u8], lookup: F, charset: Charset) -> Result<ResponseItem>
where
    F: Fn(&Id) -> Option<Contract>,
{
    let value = parse(bytes, charset)?;
    Ok(decode_value(value, &lookup))
}

/// Decode a body holding either one response object or an array of them
///
/// - a non-empty array yields [`ResponseData::Batch`], every element decoded
///   on its own
/// - an object yields [`ResponseData::Single`]
/// - an empty array or any other JSON value yields a single
///   [`ResponseItem::Invalid`]
pub fn decode_batch<F>(bytes: &[u8], lookup: F, charset: Charset) -> Result<ResponseData>
where
    F: Fn(&Id) -> Option<Contract>,
{
    match parse(bytes, charset)? {
        Value::Array(items) if items.is_empty() => Ok(ResponseData::Single(invalid(
            None,
            "empty array is not a valid batch response",
        ))),
        Value::Array(items) => Ok(ResponseData::Batch(
            items
                .into_iter()
                .map(|item| decode_value(item, &lookup))
                .collect(),
        )),
        other => Ok(ResponseData::Single(decode_value(other, &lookup))),
    }
}

fn parse(bytes: &[u8], charset: Charset) -> Result<Value> {
    let text = charset.decode(bytes)?;
    serde_json::from_str(&text).map_err(|e| {
        Error::client_detail(ClientErrorKind::InvalidResponse, None, e.to_string())
    })
}

fn invalid(id: Option<Id>, reason: impl Into<String>) -> ResponseItem {
    ResponseItem::Invalid(InvalidResponse::new(id, reason))
}

/// Validate one response object and decode its payload
fn decode_value<F>(value: Value, lookup: &F) -> ResponseItem
where
    F: Fn(&Id) -> Option<Contract>,
{
    let mut object = match value {
        Value::Object(object) => object,
        other => {
            return invalid(
                None,
                format!("response must be a JSON object, got {}", json_kind(&other)),
            )
        }
    };

    let id = match object.get("id") {
        None => return invalid(None, "missing id member"),
        Some(raw) => match Id::from_json(raw) {
            Some(id) => id,
            None => {
                return invalid(
                    None,
                    format!("id must be a number, string or null, got {}", json_kind(raw)),
                )
            }
        },
    };

    match object.get("jsonrpc") {
        None => return invalid(Some(id), "missing jsonrpc member"),
        Some(Value::String(version)) if version == "2.0" => {}
        Some(other) => {
            return invalid(Some(id), format!("unsupported jsonrpc version {}", other))
        }
    }

    let result = object.remove("result");
    let error = object.remove("error");

    match (result, error) {
        (Some(_), Some(_)) => invalid(Some(id), "both result and error members are present"),
        (None, None) => invalid(Some(id), "neither result nor error member is present"),
        (Some(result), None) => {
            let Some(contract) = lookup(&id) else {
                return invalid(Some(id), "no pending call matches this id");
            };
            match contract.decode_result(result) {
                Ok(payload) => ResponseItem::Valid(Response {
                    id,
                    outcome: Outcome::Success(payload),
                }),
                Err(e) => invalid(
                    Some(id),
                    format!("result is not a valid {}: {}", contract.result_type(), e),
                ),
            }
        }
        (None, Some(error)) => {
            // The server could not tell which call failed (e.g. a parse error)
            let contract = match lookup(&id) {
                Some(contract) => contract,
                None if id.is_none() => Contract::dynamic(),
                None => return invalid(Some(id), "no pending call matches this id"),
            };
            match decode_error_object(error, &contract) {
                Ok(error) => ResponseItem::Valid(Response {
                    id,
                    outcome: Outcome::Failure(error),
                }),
                Err(reason) => invalid(Some(id), reason),
            }
        }
    }
}

fn decode_error_object(value: Value, contract: &Contract) -> std::result::Result<ServiceError, String> {
    let mut object: Map<String, Value> = match value {
        Value::Object(object) => object,
        other => return Err(format!("error must be a JSON object, got {}", json_kind(&other))),
    };

    let code = match object.get("code") {
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| format!("error code {} is not an integer", n))?,
        Some(other) => return Err(format!("error code must be a number, got {}", json_kind(other))),
        None => return Err("error object is missing its code".to_string()),
    };

    let message = match object.remove("message") {
        Some(Value::String(message)) => message,
        Some(other) => {
            return Err(format!(
                "error message must be a string, got {}",
                json_kind(&other)
            ))
        }
        None => return Err("error object is missing its message".to_string()),
    };

    let (data, has_data) = match object.remove("data") {
        Some(raw) => {
            let null = raw.is_null();
            match contract.decode_error_data(raw) {
                Ok(data) => (Some(data), true),
                // Null data the contract cannot hold is kept as present but empty
                Err(_) if null => (None, true),
                Err(e) => {
                    return Err(format!(
                        "error data is not a valid {}: {}",
                        contract.error_data_type(),
                        e
                    ))
                }
            }
        }
        None => (None, false),
    };

    Ok(ServiceError {
        code,
        message,
        data,
        has_data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Params;
    use serde::Deserialize;
    use serde_json::json;

    fn int_contract(_: &Id) -> Option<Contract> {
        Some(Contract::of::<i64>())
    }

    fn no_contract(_: &Id) -> Option<Contract> {
        None
    }

    fn expect_valid(item: ResponseItem) -> Response {
        match item {
            ResponseItem::Valid(response) => response,
            ResponseItem::Invalid(invalid) => panic!("Expected valid response, got {}", invalid),
        }
    }

    fn expect_invalid(item: ResponseItem) -> InvalidResponse {
        match item {
            ResponseItem::Invalid(invalid) => invalid,
            ResponseItem::Valid(response) => panic!("Expected invalid response, got {:?}", response),
        }
    }

    #[test]
    fn test_encode_batch_keeps_notifications_bare() {
        let requests = vec![
            Request::new("a", Params::Positional(vec![json!(1)]), Id::Number(1)).unwrap(),
            Request::notification("b", Params::None).unwrap(),
        ];
        let bytes = encode_batch(&requests, Charset::Utf8).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            value,
            json!([
                {"jsonrpc": "2.0", "method": "a", "params": [1], "id": 1},
                {"jsonrpc": "2.0", "method": "b"}
            ])
        );
    }

    #[test]
    fn test_encode_in_utf16() {
        let request = Request::notification("n", Params::None).unwrap();
        let bytes = encode_request(&request, Charset::Utf16Le).unwrap();
        assert_eq!(
            Charset::Utf16Le.decode(&bytes).unwrap(),
            r#"{"jsonrpc":"2.0","method":"n"}"#
        );
    }

    #[test]
    fn test_echo_preserves_id() {
        for id in [Id::Number(7), Id::from("abc")] {
            let request = Request::new("echo", Params::None, id.clone()).unwrap();
            let sent: Value =
                serde_json::from_slice(&encode_request(&request, Charset::Utf8).unwrap()).unwrap();
            let echo = json!({"jsonrpc": "2.0", "id": sent["id"], "result": 5});
            let bytes = serde_json::to_vec(&echo).unwrap();

            let response = expect_valid(decode_response(&bytes, int_contract, Charset::Utf8).unwrap());
            assert_eq!(response.id(), &id);
            assert_eq!(response.result::<i64>(), Some(&5));
        }
    }

    #[test]
    fn test_decode_failure_with_typed_data() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Detail {
            field: String,
        }

        let body = br#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"bad","data":{"field":"x"}}}"#;
        let response = expect_valid(
            decode_response(
                body,
                |_| Some(Contract::with_error_data::<i64, Detail>()),
                Charset::Utf8,
            )
            .unwrap(),
        );
        let error = response.error().unwrap();
        assert_eq!(error.code, -32602);
        assert_eq!(error.message, "bad");
        assert!(error.has_data);
        assert_eq!(
            error.data::<Detail>(),
            Some(&Detail {
                field: "x".to_string()
            })
        );
    }

    #[test]
    fn test_absent_and_null_error_data_differ() {
        let absent = br#"{"jsonrpc":"2.0","id":1,"error":{"code":1,"message":"e"}}"#;
        let response = expect_valid(decode_response(absent, int_contract, Charset::Utf8).unwrap());
        let error = response.error().unwrap();
        assert!(!error.has_data);
        assert!(error.data.is_none());

        let null = br#"{"jsonrpc":"2.0","id":1,"error":{"code":1,"message":"e","data":null}}"#;
        let response = expect_valid(decode_response(null, int_contract, Charset::Utf8).unwrap());
        let error = response.error().unwrap();
        assert!(error.has_data);
        assert_eq!(error.data::<Value>(), Some(&Value::Null));
    }

    #[test]
    fn test_null_error_data_with_typed_contract() {
        #[derive(Debug, Deserialize)]
        struct Detail {
            #[allow(dead_code)]
            field: String,
        }

        let null = br#"{"jsonrpc":"2.0","id":1,"error":{"code":1,"message":"e","data":null}}"#;
        let response = expect_valid(
            decode_response(
                null,
                |_| Some(Contract::with_error_data::<i64, Detail>()),
                Charset::Utf8,
            )
            .unwrap(),
        );
        let error = response.error().unwrap();
        assert_eq!(error.code, 1);
        assert!(error.has_data);
        assert!(error.data::<Detail>().is_none());
    }

    #[test]
    fn test_malformed_envelopes_are_invalid() {
        let cases: [&[u8]; 7] = [
            br#"{"id":1,"result":1}"#,
            br#"{"jsonrpc":"1.0","id":1,"result":1}"#,
            br#"{"jsonrpc":"2.0","id":1}"#,
            br#"{"jsonrpc":"2.0","id":1,"result":1,"error":{"code":1,"message":"e"}}"#,
            br#"{"jsonrpc":"2.0","id":true,"result":1}"#,
            br#"{"jsonrpc":"2.0","result":1}"#,
            br#"{"jsonrpc":"2.0","id":1,"error":{"message":"e"}}"#,
        ];
        for body in cases {
            let item = decode_response(body, int_contract, Charset::Utf8).unwrap();
            assert!(!item.is_valid(), "{}", String::from_utf8_lossy(body));
        }
    }

    #[test]
    fn test_invalid_item_keeps_id() {
        let body = br#"{"jsonrpc":"2.0","id":3,"result":"three"}"#;
        let invalid = expect_invalid(decode_response(body, int_contract, Charset::Utf8).unwrap());
        assert_eq!(invalid.id, Some(Id::Number(3)));
        assert!(invalid.reason.contains("i64"));
    }

    #[test]
    fn test_unknown_id_is_invalid() {
        let body = br#"{"jsonrpc":"2.0","id":9,"result":1}"#;
        let invalid = expect_invalid(decode_response(body, no_contract, Charset::Utf8).unwrap());
        assert_eq!(invalid.id, Some(Id::Number(9)));
    }

    #[test]
    fn test_null_id_error_without_contract() {
        let body = br#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"Parse error","data":"at 1:1"}}"#;
        let response = expect_valid(decode_response(body, no_contract, Charset::Utf8).unwrap());
        assert!(response.id().is_none());
        assert_eq!(response.error().unwrap().data::<Value>(), Some(&json!("at 1:1")));
    }

    #[test]
    fn test_unparseable_body_is_client_error() {
        let err = decode_response(b"{not json", int_contract, Charset::Utf8).unwrap_err();
        assert_eq!(err.client_kind(), Some(ClientErrorKind::InvalidResponse));

        let err = decode_batch(b"", int_contract, Charset::Utf8).unwrap_err();
        assert_eq!(err.client_kind(), Some(ClientErrorKind::InvalidResponse));
    }

    #[test]
    fn test_decode_batch_shapes() {
        let single = br#"{"jsonrpc":"2.0","id":1,"result":1}"#;
        let data = decode_batch(single, int_contract, Charset::Utf8).unwrap();
        assert!(!data.is_batch());

        let batch = br#"[{"jsonrpc":"2.0","id":1,"result":1},{"jsonrpc":"2.0","id":2}]"#;
        match decode_batch(batch, int_contract, Charset::Utf8).unwrap() {
            ResponseData::Batch(items) => {
                assert_eq!(items.len(), 2);
                assert!(items[0].is_valid());
                assert!(!items[1].is_valid());
            }
            ResponseData::Single(_) => panic!("Expected batch"),
        }

        match decode_batch(b"[]", int_contract, Charset::Utf8).unwrap() {
            ResponseData::Single(item) => assert!(!item.is_valid()),
            ResponseData::Batch(_) => panic!("Empty array is not a batch"),
        }

        match decode_batch(b"42", int_contract, Charset::Utf8).unwrap() {
            ResponseData::Single(item) => assert!(!item.is_valid()),
            ResponseData::Batch(_) => panic!("Expected single"),
        }
    }

    #[test]
    fn test_decode_utf32_body() {
        let body = Charset::Utf32Be.encode(r#"{"jsonrpc":"2.0","id":"x","result":10}"#);
        let response = expect_valid(decode_response(&body, int_contract, Charset::Utf32Be).unwrap());
        assert_eq!(response.id(), &Id::from("x"));
    }
}
