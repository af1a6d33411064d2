//! Response contracts and the contract registry
//!
//! A JSON-RPC response is self-describing only as far as the envelope goes:
//! nothing on the wire says what Rust type the `result` (or the error `data`)
//! should become. A [`Contract`] carries that knowledge for one call, as a pair
//! of decoding functions, and the codec consults it while it parses each
//! response.
//!
//! Contracts live in a [`ContractRegistry`] keyed by request id for the
//! duration of a call (or by method name for long-lived registrations).
//! [`ContractRegistry::register`] hands back a [`ContractRegistration`] guard
//! which removes the entry when dropped, so a contract is released exactly
//! once whether the call succeeds, fails, or its future is dropped.
//!
//! # Examples
//!
//! ```rust
//! use jrh_core::{Contract, ContractRegistry, Id};
//! use serde_json::json;
//!
//! let registry = ContractRegistry::new();
//! {
//!     let _registration = registry.register(Id::Number(1), Contract::of::<i64>()).unwrap();
//!     let contract = registry.lookup(&Id::Number(1)).unwrap();
//!     let payload = contract.decode_result(json!(41)).unwrap();
//!     assert_eq!(payload.downcast_ref::<i64>(), Some(&41));
//! }
//! assert!(registry.lookup(&Id::Number(1)).is_none());
//! ```

use crate::error::{ClientErrorKind, Error, Result};
use crate::id::Id;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A decoded `result` or error `data` value of a statically unknown type
///
/// The concrete type is the one named by the contract that decoded it.
pub struct Payload {
    value: Box<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Payload {
    /// Wrap a decoded value
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Box::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Borrow the value as `T`
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Take the value as `T`, handing the payload back on a type mismatch
    pub fn into_inner<T: 'static>(self) -> std::result::Result<T, Payload> {
        let type_name = self.type_name;
        match self.value.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(value) => Err(Payload { value, type_name }),
        }
    }

    /// Name of the Rust type the value was decoded as
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Payload").field(&self.type_name).finish()
    }
}

/// Function decoding a JSON value into a [`Payload`]
pub type DecodeFn = fn(serde_json::Value) -> std::result::Result<Payload, serde_json::Error>;

fn decode_as<T>(value: serde_json::Value) -> std::result::Result<Payload, serde_json::Error>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    serde_json::from_value::<T>(value).map(Payload::new)
}

/// Expected result type and error-data type of one call
#[derive(Debug, Clone, Copy)]
pub struct Contract {
    result: DecodeFn,
    error_data: DecodeFn,
    result_type: &'static str,
    error_data_type: &'static str,
}

impl Contract {
    /// Decode results as `R`; error data is kept as a raw JSON value
    pub fn of<R>() -> Self
    where
        R: DeserializeOwned + Send + Sync + 'static,
    {
        Self::with_error_data::<R, serde_json::Value>()
    }

    /// Decode results as `R` and error data as `E`
    pub fn with_error_data<R, E>() -> Self
    where
        R: DeserializeOwned + Send + Sync + 'static,
        E: DeserializeOwned + Send + Sync + 'static,
    {
        Self {
            result: decode_as::<R>,
            error_data: decode_as::<E>,
            result_type: std::any::type_name::<R>(),
            error_data_type: std::any::type_name::<E>(),
        }
    }

    /// Decode both results and error data as raw JSON values
    pub fn dynamic() -> Self {
        Self::of::<serde_json::Value>()
    }

    /// Decode a `result` member
    pub fn decode_result(
        &self,
        value: serde_json::Value,
    ) -> std::result::Result<Payload, serde_json::Error> {
        (self.result)(value)
    }

    /// Decode an error `data` member
    pub fn decode_error_data(
        &self,
        value: serde_json::Value,
    ) -> std::result::Result<Payload, serde_json::Error> {
        (self.error_data)(value)
    }

    /// Rust type name of the result
    pub fn result_type(&self) -> &'static str {
        self.result_type
    }

    /// Rust type name of the error data
    pub fn error_data_type(&self) -> &'static str {
        self.error_data_type
    }
}

/// Registry key: a request id for in-flight calls, or a method name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContractKey {
    /// Contract of one in-flight call
    Id(Id),
    /// Contract shared by every call to a method
    Method(String),
}

/// Shared map from keys to contracts
///
/// Cloning is cheap; clones share the same map. The map is synchronized as a
/// whole, so concurrent calls can register and release their own ids
/// independently.
#[derive(Clone, Default)]
pub struct ContractRegistry {
    entries: Arc<RwLock<HashMap<ContractKey, Contract>>>,
}

impl ContractRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a contract, returning the previous one
    pub fn add(&self, key: ContractKey, contract: Contract) -> Option<Contract> {
        self.entries.write().insert(key, contract)
    }

    /// Remove a contract
    pub fn remove(&self, key: &ContractKey) -> Option<Contract> {
        self.entries.write().remove(key)
    }

    /// Get the contract stored under a key
    pub fn get(&self, key: &ContractKey) -> Option<Contract> {
        self.entries.read().get(key).copied()
    }

    /// Get the contract of the in-flight call with this id
    pub fn lookup(&self, id: &Id) -> Option<Contract> {
        self.get(&ContractKey::Id(id.clone()))
    }

    /// Get the contract registered for a method name
    pub fn method_contract(&self, method: &str) -> Option<Contract> {
        self.get(&ContractKey::Method(method.to_string()))
    }

    /// Register the contract of an in-flight call
    ///
    /// The entry lives as long as the returned guard. Fails with
    /// [`ClientErrorKind::InvalidIdentifier`] for [`Id::None`] (notifications
    /// have no response to decode) and with [`ClientErrorKind::IdentifierInUse`]
    /// when another call already holds the id.
    pub fn register(&self, id: Id, contract: Contract) -> Result<ContractRegistration> {
        if id.is_none() {
            return Err(Error::client(ClientErrorKind::InvalidIdentifier, None));
        }

        let key = ContractKey::Id(id.clone());
        let mut entries = self.entries.write();
        if entries.contains_key(&key) {
            return Err(Error::client(ClientErrorKind::IdentifierInUse, Some(id)));
        }
        entries.insert(key.clone(), contract);
        drop(entries);

        tracing::trace!(key = ?key, "Contract registered");
        Ok(ContractRegistration {
            registry: self.clone(),
            key,
        })
    }

    /// Number of stored contracts
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the registry holds no contracts
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl fmt::Debug for ContractRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractRegistry")
            .field("len", &self.len())
            .finish()
    }
}

/// Guard releasing a registered contract on drop
#[derive(Debug)]
#[must_use = "the contract is released as soon as the registration is dropped"]
pub struct ContractRegistration {
    registry: ContractRegistry,
    key: ContractKey,
}

impl ContractRegistration {
    /// The key this registration holds
    pub fn key(&self) -> &ContractKey {
        &self.key
    }
}

impl Drop for ContractRegistration {
    fn drop(&mut self) {
        self.registry.remove(&self.key);
        tracing::trace!(key = ?self.key, "Contract released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sum {
        total: i32,
    }

    #[test]
    fn test_typed_contract_decoding() {
        let contract = Contract::with_error_data::<Sum, String>();

        let payload = contract.decode_result(json!({"total": 3})).unwrap();
        assert_eq!(payload.downcast_ref::<Sum>(), Some(&Sum { total: 3 }));

        let data = contract.decode_error_data(json!("boom")).unwrap();
        assert_eq!(data.into_inner::<String>().unwrap(), "boom");

        assert!(contract.decode_result(json!("not a sum")).is_err());
    }

    #[test]
    fn test_default_error_data_is_raw_json() {
        let contract = Contract::of::<i64>();
        let data = contract.decode_error_data(json!({"any": [1, 2]})).unwrap();
        assert_eq!(
            data.downcast_ref::<serde_json::Value>(),
            Some(&json!({"any": [1, 2]}))
        );
    }

    #[test]
    fn test_payload_type_mismatch_returns_payload() {
        let payload = Payload::new(5i64);
        let payload = payload.into_inner::<String>().unwrap_err();
        assert_eq!(payload.type_name(), "i64");
        assert_eq!(payload.into_inner::<i64>().unwrap(), 5);
    }

    #[test]
    fn test_registration_released_on_drop() {
        let registry = ContractRegistry::new();
        let registration = registry
            .register(Id::Number(1), Contract::of::<i64>())
            .unwrap();
        assert_eq!(registration.key(), &ContractKey::Id(Id::Number(1)));
        assert_eq!(registry.len(), 1);

        drop(registration);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_rejects_in_flight_id() {
        let registry = ContractRegistry::new();
        let _first = registry
            .register(Id::from("a"), Contract::dynamic())
            .unwrap();

        let second = registry.register(Id::from("a"), Contract::dynamic());
        let err = second.unwrap_err();
        assert_eq!(err.client_kind(), Some(ClientErrorKind::IdentifierInUse));
        assert_eq!(err.id(), Some(&Id::from("a")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_rejects_notification_id() {
        let registry = ContractRegistry::new();
        let err = registry.register(Id::None, Contract::dynamic()).unwrap_err();
        assert_eq!(err.client_kind(), Some(ClientErrorKind::InvalidIdentifier));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_method_contracts() {
        let registry = ContractRegistry::new();
        assert!(registry
            .add(ContractKey::Method("sum".into()), Contract::of::<Sum>())
            .is_none());

        let contract = registry.method_contract("sum").unwrap();
        assert!(contract.result_type().ends_with("Sum"));
        assert!(registry.method_contract("other").is_none());

        assert!(registry
            .remove(&ContractKey::Method("sum".into()))
            .is_some());
        assert!(registry.method_contract("sum").is_none());
    }

    #[test]
    fn test_registrations_are_independent() {
        let registry = ContractRegistry::new();
        let one = registry.register(Id::Number(1), Contract::dynamic()).unwrap();
        let two = registry.register(Id::Number(2), Contract::dynamic()).unwrap();

        drop(one);
        assert!(registry.lookup(&Id::Number(1)).is_none());
        assert!(registry.lookup(&Id::Number(2)).is_some());
        drop(two);
        assert!(registry.is_empty());
    }
}
