//! JSON value helpers: deep merge and typed decoding.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Result, StateStoreError};

/// Recursively merge `src` into `dst`.
///
/// Objects merge key by key; any other value in `src` replaces the
/// corresponding value in `dst`. Keys present in `dst` but absent from `src`
/// are left untouched, which is what makes partial record updates possible.
pub fn merge_values(dst: &mut Value, src: &Value) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (key, src_val) in src_map {
                match dst_map.get_mut(key) {
                    Some(dst_val) => merge_values(dst_val, src_val),
                    None => {
                        dst_map.insert(key.clone(), src_val.clone());
                    }
                }
            }
        }
        (dst, src) => *dst = src.clone(),
    }
}

/// Lazily decodes a stored document into a caller-provided shape.
pub struct ValueDecoder<'a> {
    key: &'a str,
    value: &'a Value,
}

impl<'a> ValueDecoder<'a> {
    pub(crate) fn new(key: &'a str, value: &'a Value) -> Self {
        Self { key, value }
    }

    /// Deserialize the document into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.value.clone()).map_err(|e| StateStoreError::Decode {
            key: self.key.to_string(),
            message: e.to_string(),
        })
    }

    /// Borrow the raw JSON document.
    pub fn raw(&self) -> &Value {
        self.value
    }
}
