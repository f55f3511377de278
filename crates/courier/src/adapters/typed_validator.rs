//! Validator that checks payloads against a `serde` type.
//!
//! The payload must deserialize into `T`; the handler then receives `T`
//! serialized back, so defaults are filled in and unknown fields dropped
//! (unless `T` denies them).

use crate::ports::inbound::Validator;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use shared_types::RpcError;
use std::marker::PhantomData;

/// Message of every rejection.
pub const INVALID_DATA: &str = "VALIDATION_ERROR: Invalid data";

pub struct TypedValidator<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedValidator<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for TypedValidator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Validator for TypedValidator<T>
where
    T: DeserializeOwned + Serialize + 'static,
{
    fn validate(&self, data: Value) -> Result<Value, RpcError> {
        let typed: T = serde_json::from_value(data)
            .map_err(|e| RpcError::validation(INVALID_DATA, json!({ "error": e.to_string() })))?;
        serde_json::to_value(typed).map_err(RpcError::from)
    }
}
