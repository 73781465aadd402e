//! Airport status records
//!
//! The upstream authority and the cache store both hand back an untyped
//! attribute map. `StatusRecord` wraps that map without interpreting it; the
//! resolver only moves it between the two.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An opaque attribute map describing one airport's current status
///
/// Values can be any JSON shape (null, bool, number, string, array, map).
/// Only the driver ever looks inside, to print it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusRecord(Map<String, Value>);

impl StatusRecord {
    /// Creates an empty record
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builds a record from a decoded JSON value
    ///
    /// Returns `None` unless the value is a JSON object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Looks up a top-level attribute
    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.0.get(attribute)
    }

    /// Number of top-level attributes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the record has no attributes
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrows the underlying attribute map
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consumes the record, returning it as a JSON value
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for StatusRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Formats the record as compact JSON
impl fmt::Display for StatusRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(&self.0).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}
