//! Batch request building and response handling
//!
//! JSON-RPC 2.0 allows sending several requests as one JSON array in a
//! single HTTP exchange. A batch succeeds only as a whole:
//!
//! - ids are checked for duplicates before anything is sent
//! - a `204` answer is only valid when every item was a notification
//! - a `200` answer must be an array; every element is decoded on its own,
//!   malformed elements are collected into one [`Error::Aggregate`], and the
//!   set of answered ids must equal the set of requested ids
//!
//! Responses come back in the order the server sent them; correlate by id.
//!
//! # Examples
//!
//! ```rust,no_run
//! use jrh_client::{BatchRequest, JrhClient};
//! use serde_json::json;
//!
//! # async fn example(client: &JrhClient) -> jrh_core::Result<()> {
//! let mut batch = client.new_batch();
//! let sum = batch.add_typed_call::<i64, _>("add", json!([1, 2]));
//! let echo = batch.add_call("echo", json!({"text": "hi"}));
//! batch.add_notification("log", json!({"line": "batch sent"}));
//!
//! let mut responses = client.batch(batch).await?;
//! let sum: i64 = responses.take(&sum)?;
//! let echo: serde_json::Value = responses.take(&echo)?;
//! # Ok(())
//! # }
//! ```

use crate::call::{build_request, into_result, PendingParams};
use crate::client::ensure_not_cancelled;
use crate::JrhClient;
use http::StatusCode;
use jrh_core::{
    codec, ClientErrorKind, Contract, ContractRegistration, Error, Id, IdGenerator,
    ProtocolErrorKind, Request, Response, ResponseData, ResponseItem, Result, ServiceError,
    UuidIdGenerator,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// One item of a batch
enum BatchEntry {
    Call {
        method: String,
        id: Id,
        params: PendingParams,
        contract: Option<Contract>,
    },
    Notification {
        method: String,
        params: PendingParams,
    },
}

/// Builder for a batch of calls and notifications
pub struct BatchRequest {
    entries: Vec<BatchEntry>,
    id_generator: Arc<dyn IdGenerator>,
    cancel: Option<CancellationToken>,
}

impl BatchRequest {
    /// Create an empty batch drawing ids from random UUIDs
    pub fn new() -> Self {
        Self::with_id_generator(Arc::new(UuidIdGenerator))
    }

    /// Create an empty batch drawing ids from `id_generator`
    pub fn with_id_generator(id_generator: Arc<dyn IdGenerator>) -> Self {
        Self {
            entries: Vec::new(),
            id_generator,
            cancel: None,
        }
    }

    /// Add a call with a generated id; returns the id
    pub fn add_call<P: Serialize>(&mut self, method: impl Into<String>, params: P) -> Id {
        let id = self.id_generator.next_id();
        self.push_call(method.into(), id, Some(serde_json::to_value(params)), None)
    }

    /// Add a call with an explicit id; returns the id
    ///
    /// Duplicate ids are reported when the batch is sent.
    pub fn add_call_with_id<P: Serialize>(
        &mut self,
        method: impl Into<String>,
        id: impl Into<Id>,
        params: P,
    ) -> Id {
        self.push_call(method.into(), id.into(), Some(serde_json::to_value(params)), None)
    }

    /// Add a call whose result is decoded as `R`; returns the id
    pub fn add_typed_call<R, P>(&mut self, method: impl Into<String>, params: P) -> Id
    where
        R: DeserializeOwned + Send + Sync + 'static,
        P: Serialize,
    {
        let id = self.id_generator.next_id();
        self.push_call(
            method.into(),
            id,
            Some(serde_json::to_value(params)),
            Some(Contract::of::<R>()),
        )
    }

    /// Add a call without parameters; returns the id
    pub fn add_bare_call(&mut self, method: impl Into<String>) -> Id {
        let id = self.id_generator.next_id();
        self.push_call(method.into(), id, None, None)
    }

    /// Add a notification (no response expected)
    pub fn add_notification<P: Serialize>(&mut self, method: impl Into<String>, params: P) {
        self.entries.push(BatchEntry::Notification {
            method: method.into(),
            params: Some(serde_json::to_value(params)),
        });
    }

    /// Add a notification without parameters
    pub fn add_bare_notification(&mut self, method: impl Into<String>) {
        self.entries.push(BatchEntry::Notification {
            method: method.into(),
            params: None,
        });
    }

    /// Abort the batch when `token` is cancelled
    pub fn cancel_on(&mut self, token: CancellationToken) -> &mut Self {
        self.cancel = Some(token);
        self
    }

    /// Number of items in the batch
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the batch has no items
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids of the calls, in insertion order
    pub fn ids(&self) -> Vec<Id> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                BatchEntry::Call { id, .. } => Some(id.clone()),
                BatchEntry::Notification { .. } => None,
            })
            .collect()
    }

    fn push_call(
        &mut self,
        method: String,
        id: Id,
        params: PendingParams,
        contract: Option<Contract>,
    ) -> Id {
        self.entries.push(BatchEntry::Call {
            method,
            id: id.clone(),
            params,
            contract,
        });
        id
    }
}

impl Default for BatchRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BatchRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchRequest")
            .field("len", &self.len())
            .field("ids", &self.ids())
            .finish_non_exhaustive()
    }
}

/// Responses of a successful batch
#[derive(Debug, Default)]
pub struct BatchResponse {
    responses: Vec<Option<Response>>,
    index: HashMap<Id, usize>,
}

impl BatchResponse {
    fn new(responses: Vec<Response>) -> Self {
        let index = responses
            .iter()
            .enumerate()
            .map(|(position, response)| (response.id().clone(), position))
            .collect();
        Self {
            responses: responses.into_iter().map(Some).collect(),
            index,
        }
    }

    /// Take the result of the call with this id, decoded as `R`
    ///
    /// A failed call yields its [`Error::Service`]. Each response can be
    /// taken once; a second take (or an unknown id) is
    /// [`ClientErrorKind::InvalidIdentifier`].
    pub fn take<R: 'static>(&mut self, id: &Id) -> Result<R> {
        let response = self
            .index
            .get(id)
            .and_then(|&position| self.responses[position].take())
            .ok_or_else(|| Error::client(ClientErrorKind::InvalidIdentifier, Some(id.clone())))?;
        into_result(response)
    }

    /// Borrow the result of the call with this id as `R`
    pub fn result<R: 'static>(&self, id: &Id) -> Option<&R> {
        self.response(id).and_then(|response| response.result::<R>())
    }

    /// Borrow the error object of the call with this id
    pub fn error(&self, id: &Id) -> Option<&ServiceError> {
        self.response(id).and_then(Response::error)
    }

    /// Borrow the response to the call with this id
    pub fn response(&self, id: &Id) -> Option<&Response> {
        self.index
            .get(id)
            .and_then(|&position| self.responses[position].as_ref())
    }

    /// Ids of the responses not yet taken, in order of arrival
    pub fn ids(&self) -> Vec<Id> {
        self.iter().map(|response| response.id().clone()).collect()
    }

    /// Iterate the responses not yet taken, in order of arrival
    pub fn iter(&self) -> impl Iterator<Item = &Response> {
        self.responses.iter().flatten()
    }

    /// Number of responses not yet taken
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Whether every response was taken, or there were none
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether every remaining response is a success
    pub fn all_success(&self) -> bool {
        self.iter().all(Response::is_success)
    }

    /// Consume into the remaining responses, in order of arrival
    pub fn into_responses(self) -> Vec<Response> {
        self.responses.into_iter().flatten().collect()
    }
}

impl JrhClient {
    /// Create an empty batch drawing ids from this client's generator
    pub fn new_batch(&self) -> BatchRequest {
        BatchRequest::with_id_generator(self.id_generator.clone())
    }

    /// Send a batch and reconcile its responses
    #[tracing::instrument(name = "jrh.batch", skip(self, batch), fields(size = batch.len()))]
    pub async fn batch(&self, batch: BatchRequest) -> Result<BatchResponse> {
        let start = Instant::now();
        let size = batch.len();

        let result = self.run_batch(batch).await;
        let duration = start.elapsed().as_secs_f64();

        match &result {
            Ok(responses) => {
                tracing::debug!(responses = responses.len(), duration_secs = duration, "Batch completed")
            }
            Err(e) if e.is_cancelled() => tracing::debug!("Batch cancelled"),
            Err(e) => tracing::warn!(error = %e, duration_secs = duration, "Batch failed"),
        }

        if let Some(ref m) = self.metrics {
            m.record_batch(size as u64);
            match &result {
                Ok(_) => m.record_request("batch", "success", duration),
                Err(e) => {
                    m.record_request("batch", "error", duration);
                    m.record_error(e.label());
                }
            }
        }

        result
    }

    async fn run_batch(&self, batch: BatchRequest) -> Result<BatchResponse> {
        if batch.is_empty() {
            return Err(Error::client(ClientErrorKind::EmptyBatch, None));
        }

        let cancel = batch.cancel;
        let mut requests = Vec::with_capacity(batch.entries.len());
        let mut call_contracts = Vec::new();
        let mut sent_ids = HashSet::new();

        for entry in batch.entries {
            match entry {
                BatchEntry::Call {
                    method,
                    id,
                    params,
                    contract,
                } => {
                    if id.is_none() {
                        return Err(Error::client_detail(
                            ClientErrorKind::InvalidIdentifier,
                            None,
                            format!("call to '{}' has no id", method),
                        ));
                    }
                    if !sent_ids.insert(id.clone()) {
                        return Err(Error::client(
                            ClientErrorKind::DuplicateIdentifiers,
                            Some(id),
                        ));
                    }
                    let contract = contract
                        .or_else(|| self.contracts.method_contract(&method))
                        .unwrap_or_else(Contract::dynamic);
                    call_contracts.push((id.clone(), contract));
                    requests.push(build_request(method, params, id)?);
                }
                BatchEntry::Notification { method, params } => {
                    requests.push(build_request(method, params, Id::None)?);
                }
            }
        }

        let _registrations = call_contracts
            .into_iter()
            .map(|(id, contract)| self.contracts.register(id, contract))
            .collect::<Result<Vec<ContractRegistration>>>()?;

        let body = codec::encode_batch(&requests, self.content.charset())?;
        let response = self.send(body, cancel.as_ref()).await?;

        match response.status {
            StatusCode::NO_CONTENT => {
                if sent_ids.is_empty() {
                    ensure_not_cancelled(cancel.as_ref())?;
                    Ok(BatchResponse::default())
                } else {
                    Err(Error::protocol(
                        ProtocolErrorKind::InvalidValues,
                        StatusCode::NO_CONTENT.as_u16(),
                        None,
                    ))
                }
            }
            StatusCode::OK => {
                if sent_ids.is_empty() {
                    return Err(Error::protocol(
                        ProtocolErrorKind::UnexpectedContent,
                        StatusCode::OK.as_u16(),
                        None,
                    ));
                }

                let exchange = self.read(response, cancel.as_ref()).await?;
                let status = exchange.status.as_u16();
                // Ids nobody asked for still decode, so the id set check can
                // report them
                let data = self.decode(&exchange, |id| {
                    if sent_ids.contains(id) {
                        self.contracts.lookup(id)
                    } else {
                        Some(Contract::dynamic())
                    }
                })?;

                let responses = reconcile(data, &sent_ids, status, &requests)?;
                ensure_not_cancelled(cancel.as_ref())?;
                Ok(BatchResponse::new(responses))
            }
            status => Err(Error::protocol(
                ProtocolErrorKind::InvalidStatusCode,
                status.as_u16(),
                None,
            )),
        }
    }
}

/// Check a decoded batch answer against the ids that were sent
fn reconcile(
    data: ResponseData,
    sent_ids: &HashSet<Id>,
    status: u16,
    requests: &[Request],
) -> Result<Vec<Response>> {
    let items = match data {
        ResponseData::Batch(items) => items,
        ResponseData::Single(item) => {
            // A lone error object means the server rejected the whole batch
            if let ResponseItem::Valid(response) = item {
                response.into_success()?;
            }
            return Err(Error::protocol(ProtocolErrorKind::SingleValue, status, None));
        }
    };

    let mut invalid = Vec::new();
    let mut received = HashSet::with_capacity(items.len());
    let mut responses = Vec::with_capacity(items.len());

    for item in items {
        match item {
            ResponseItem::Invalid(diagnostic) => invalid.push(diagnostic.into_error()),
            ResponseItem::Valid(response) => {
                if !received.insert(response.id().clone()) {
                    return Err(Error::protocol(
                        ProtocolErrorKind::DuplicateIdentifiers,
                        status,
                        Some(response.id().clone()),
                    ));
                }
                responses.push(response);
            }
        }
    }

    if !invalid.is_empty() {
        return Err(Error::Aggregate(invalid));
    }

    if &received != sent_ids {
        let missing: Vec<String> = requests
            .iter()
            .filter(|request| !request.is_notification() && !received.contains(request.id()))
            .map(|request| request.id().to_string())
            .collect();
        let unexpected: Vec<String> = received
            .difference(sent_ids)
            .map(Id::to_string)
            .collect();
        tracing::debug!(?missing, ?unexpected, "Batch response ids do not match");
        return Err(Error::protocol(ProtocolErrorKind::InvalidValues, status, None));
    }

    Ok(responses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jrh_core::{Charset, SequentialIdGenerator};
    use serde_json::json;

    fn decoded(body: serde_json::Value) -> Response {
        let bytes = body.to_string();
        let item = codec::decode_response(
            bytes.as_bytes(),
            |_| Some(Contract::of::<i64>()),
            Charset::Utf8,
        );
        match item.unwrap() {
            ResponseItem::Valid(response) => response,
            ResponseItem::Invalid(invalid) => panic!("Expected valid response, got {}", invalid),
        }
    }

    fn success(id: i64, value: i64) -> Response {
        decoded(json!({"jsonrpc": "2.0", "id": id, "result": value}))
    }

    #[test]
    fn test_batch_request_builder() {
        let mut batch = BatchRequest::with_id_generator(Arc::new(SequentialIdGenerator::new()));

        let id1 = batch.add_call("method1", json!({"a": 1}));
        let id2 = batch.add_typed_call::<i64, _>("method2", json!([2]));
        batch.add_notification("notify", json!({"c": 3}));
        let id3 = batch.add_call_with_id("method3", "custom", json!([]));
        let id4 = batch.add_bare_call("method4");
        batch.add_bare_notification("tick");

        assert_eq!(batch.len(), 6);
        assert_eq!(id1, Id::Number(1));
        assert_eq!(id2, Id::Number(2));
        assert_eq!(id3, Id::from("custom"));
        assert_eq!(id4, Id::Number(3));
        assert_eq!(batch.ids(), vec![id1, id2, id3, id4]);
    }

    #[test]
    fn test_default_batch_uses_uuids() {
        let mut batch = BatchRequest::default();
        let id = batch.add_bare_call("m");
        assert!(matches!(id, Id::String(ref s) if s.len() == 36));
    }

    #[test]
    fn test_batch_response_take() {
        let mut responses = BatchResponse::new(vec![success(2, 20), success(1, 10)]);

        assert_eq!(responses.ids(), vec![Id::Number(2), Id::Number(1)]);
        assert_eq!(responses.result::<i64>(&Id::Number(1)), Some(&10));
        assert_eq!(responses.take::<i64>(&Id::Number(1)).unwrap(), 10);
        assert_eq!(responses.len(), 1);

        let err = responses.take::<i64>(&Id::Number(1)).unwrap_err();
        assert_eq!(err.client_kind(), Some(ClientErrorKind::InvalidIdentifier));

        let err = responses.take::<String>(&Id::Number(2)).unwrap_err();
        assert_eq!(err.client_kind(), Some(ClientErrorKind::InvalidValue));
        assert!(responses.is_empty());
    }

    #[test]
    fn test_batch_response_with_error() {
        let failure = decoded(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "error": {"code": -32601, "message": "Method not found"}
        }));
        let mut responses = BatchResponse::new(vec![success(1, 42), failure]);

        assert!(!responses.all_success());
        assert_eq!(responses.error(&Id::Number(2)).map(|e| e.code), Some(-32601));
        match responses.take::<i64>(&Id::Number(2)) {
            Err(Error::Service(error)) => assert_eq!(error.message, "Method not found"),
            other => panic!("Expected service error, got {:?}", other),
        }
        assert!(responses.all_success());
    }

    fn sent(ids: &[i64]) -> (HashSet<Id>, Vec<Request>) {
        let requests: Vec<Request> = ids
            .iter()
            .map(|&id| build_request("m".to_string(), None, Id::Number(id)).unwrap())
            .collect();
        let set = requests.iter().map(|r| r.id().clone()).collect();
        (set, requests)
    }

    #[test]
    fn test_reconcile_accepts_any_order() {
        let (ids, requests) = sent(&[1, 2]);
        let data = ResponseData::Batch(vec![
            ResponseItem::Valid(success(2, 2)),
            ResponseItem::Valid(success(1, 1)),
        ]);
        let responses = reconcile(data, &ids, 200, &requests).unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].id(), &Id::Number(2));
    }

    #[test]
    fn test_reconcile_missing_id() {
        let (ids, requests) = sent(&[1, 2]);
        let data = ResponseData::Batch(vec![ResponseItem::Valid(success(1, 1))]);
        let err = reconcile(data, &ids, 200, &requests).unwrap_err();
        assert_eq!(err.protocol_kind(), Some(ProtocolErrorKind::InvalidValues));
    }

    #[test]
    fn test_reconcile_single_answer() {
        let (ids, requests) = sent(&[1, 2]);
        let data = ResponseData::Single(ResponseItem::Valid(success(1, 1)));
        let err = reconcile(data, &ids, 200, &requests).unwrap_err();
        assert_eq!(err.protocol_kind(), Some(ProtocolErrorKind::SingleValue));
    }
}
