//! Values exchanged with interception hooks
//!
//! Hooks see parameters and return values as [`Value`] snapshots. Generated
//! forwarding code takes those snapshots through [`Probe`] and turns hook
//! values back into Rust values through [`Restore`]. Both pick the serde path
//! when the type supports it and fall back to an opaque form otherwise, so
//! a target whose types are not serializable can still be proxied.
//!
//! ```ignore
//! use interpose_core::value::{OpaqueProbe as _, Probe, SerializeProbe as _};
//!
//! let snapshot = (&Probe(&argument)).snapshot();
//! ```

use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::RestoreError;

/// Dynamic value seen by hooks
pub use serde_json::Value;

/// Key of the marker object standing in for values without a serde form
pub const OPAQUE_KEY: &str = "$opaque";

/// Marker value for a type that has no serde representation
pub fn opaque(type_name: &str) -> Value {
    let mut marker = serde_json::Map::new();
    marker.insert(OPAQUE_KEY.to_string(), Value::String(type_name.to_string()));
    Value::Object(marker)
}

/// Whether `value` is an opaque marker
pub fn is_opaque(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|map| map.len() == 1 && map.contains_key(OPAQUE_KEY))
}

/// Call parameters by name, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(IndexMap<String, Value>);

impl Params {
    /// Empty parameter map
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty parameter map sized for `capacity` parameters
    pub fn with_capacity(capacity: usize) -> Self {
        Self(IndexMap::with_capacity(capacity))
    }

    /// Record a parameter
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    /// Builder form of [`Params::insert`]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value.into());
        self
    }

    /// Value of a parameter
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no parameters were recorded
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parameter names in declaration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Parameters in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (index, (name, value)) in self.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        f.write_str(")")
    }
}

/// Borrowed value about to be snapshotted
pub struct Probe<'a, T: ?Sized>(pub &'a T);

/// Snapshot through serde; selected when `T: Serialize`
pub trait SerializeProbe {
    /// Snapshot, opaque when serialization fails at runtime
    fn snapshot(&self) -> Value;

    /// Snapshot, `None` when the value has no serde form
    fn try_snapshot(&self) -> Option<Value>;
}

impl<T: Serialize + ?Sized> SerializeProbe for Probe<'_, T> {
    fn snapshot(&self) -> Value {
        self.try_snapshot().unwrap_or_else(|| opaque(type_name::<T>()))
    }

    fn try_snapshot(&self) -> Option<Value> {
        serde_json::to_value(self.0).ok()
    }
}

/// Fallback snapshot for types without `Serialize`
pub trait OpaqueProbe {
    /// Opaque marker naming the type
    fn snapshot(&self) -> Value;

    /// Always `None`
    fn try_snapshot(&self) -> Option<Value>;
}

impl<T: ?Sized> OpaqueProbe for &Probe<'_, T> {
    fn snapshot(&self) -> Value {
        opaque(type_name::<T>())
    }

    fn try_snapshot(&self) -> Option<Value> {
        None
    }
}

/// Conversion target for a hook-supplied value
pub struct Restore<T>(PhantomData<fn() -> T>);

impl<T> Restore<T> {
    /// Conversion into `T`
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for Restore<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Restore through serde; selected when `T: DeserializeOwned`
pub trait DeserializeRestore {
    /// Target type
    type Output;

    /// Decode `value`
    fn restore(&self, value: Value) -> Result<Self::Output, RestoreError>;
}

impl<T: DeserializeOwned> DeserializeRestore for Restore<T> {
    type Output = T;

    fn restore(&self, value: Value) -> Result<T, RestoreError> {
        serde_json::from_value(value).map_err(|e| RestoreError::Mismatch {
            type_name: type_name::<T>(),
            reason: e.to_string(),
        })
    }
}

/// Fallback for types without `Deserialize`
pub trait OpaqueRestore {
    /// Target type
    type Output;

    /// Always fails
    fn restore(&self, value: Value) -> Result<Self::Output, RestoreError>;
}

impl<T> OpaqueRestore for &Restore<T> {
    type Output = T;

    fn restore(&self, _value: Value) -> Result<T, RestoreError> {
        Err(RestoreError::NotDeserializable {
            type_name: type_name::<T>(),
        })
    }
}

/// Snapshot and restore functions for one return type
pub struct ReturnCodec<R> {
    observe: fn(&R) -> Value,
    restore: fn(Value) -> Result<R, RestoreError>,
}

impl<R> ReturnCodec<R> {
    /// Codec from explicit functions
    pub fn new(observe: fn(&R) -> Value, restore: fn(Value) -> Result<R, RestoreError>) -> Self {
        Self { observe, restore }
    }

    /// Snapshot a real return value for suffix hooks
    pub fn observe(&self, value: &R) -> Value {
        (self.observe)(value)
    }

    /// Turn a hook-supplied value into the return type
    pub fn restore(&self, value: Value) -> Result<R, RestoreError> {
        (self.restore)(value)
    }
}

impl<R: Serialize + DeserializeOwned> ReturnCodec<R> {
    /// Codec for serde-capable return types
    pub fn serde() -> Self {
        Self::new(
            |value| (&Probe(value)).snapshot(),
            |value| (&Restore::<R>::new()).restore(value),
        )
    }
}

impl ReturnCodec<()> {
    /// Codec for void methods: hook values are ignored, an early return
    /// simply skips the call
    pub fn void() -> Self {
        Self::new(|_| Value::Null, |_| Ok(()))
    }
}

impl<R> Clone for ReturnCodec<R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for ReturnCodec<R> {}

impl<R> fmt::Debug for ReturnCodec<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReturnCodec")
            .field("type", &type_name::<R>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoSerde;

    #[test]
    fn probe_prefers_serde() {
        let number = 42_i64;
        assert_eq!((&Probe(&number)).snapshot(), Value::from(42));

        let text = "abc";
        assert_eq!((&Probe(&text)).snapshot(), Value::from("abc"));
    }

    #[test]
    fn probe_falls_back_to_opaque() {
        let value = NoSerde;
        let snapshot = (&Probe(&value)).snapshot();
        assert!(is_opaque(&snapshot));
        assert_eq!((&Probe(&value)).try_snapshot(), None);
    }

    #[test]
    fn restore_prefers_serde() {
        let restored: Result<Vec<String>, _> = (&Restore::<Vec<String>>::new()).restore(serde_json::json!(["a"]));
        assert_eq!(restored, Ok(vec!["a".to_string()]));

        let mismatch = (&Restore::<i64>::new()).restore(Value::from("x"));
        assert!(matches!(mismatch, Err(RestoreError::Mismatch { .. })));
    }

    #[test]
    fn restore_falls_back_to_not_deserializable() {
        let restored = (&Restore::<NoSerde>::new()).restore(Value::Null);
        assert!(matches!(restored, Err(RestoreError::NotDeserializable { .. })));
    }

    #[test]
    fn void_codec_ignores_values() {
        let codec = ReturnCodec::void();
        assert_eq!(codec.observe(&()), Value::Null);
        assert_eq!(codec.restore(Value::from("ignored")), Ok(()));
    }

    #[test]
    fn params_keep_declaration_order() {
        let params = Params::new().with("b", 1).with("a", 2);
        assert_eq!(params.names().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(params.get("a"), Some(&Value::from(2)));
        assert_eq!(params.to_string(), "(b: 1, a: 2)");
    }
}
