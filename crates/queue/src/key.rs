//! Key derivation for entries.
//!
//! Uniqueness in the queue is decided by a derived string key, not by
//! structural equality. Two entries whose keys are equal are "the same"
//! entry; a lossy key function can therefore merge distinct entries, which
//! is the caller's responsibility.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

/// Function deriving the uniqueness key of an entry.
pub type KeyFn<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;

/// Default key derivation for serializable entries.
///
/// - strings map to their own text
/// - numbers and booleans map to their natural text form
/// - null (`None`, `()`) maps to the empty string
/// - anything else maps to compact JSON
///
/// Object keys come out sorted, so equal structs always collide and maps
/// holding the same pairs collide regardless of insertion order.
pub fn json_key<T: Serialize + ?Sized>(entry: &T) -> String {
    match serde_json::to_value(entry) {
        Ok(Value::String(s)) => s,
        Ok(Value::Null) => String::new(),
        Ok(Value::Bool(b)) => b.to_string(),
        Ok(Value::Number(n)) => n.to_string(),
        Ok(other) => other.to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "entry could not be serialized, using empty key");
            String::new()
        }
    }
}

/// Wrap [`json_key`] as a [`KeyFn`].
pub fn json_key_fn<T: Serialize + 'static>() -> KeyFn<T> {
    Arc::new(|entry: &T| json_key(entry))
}
