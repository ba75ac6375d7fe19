//! Runtime values and the mutable execution context.
//!
//! All numeric values use `rust_decimal::Decimal` or `i64` -- never `f64`.
//! JSON numbers become `Int` when they fit an `i64` and `Decimal` otherwise;
//! JSON strings stay `Text` and are never coerced by the evaluator.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::error::EvalError;

// ──────────────────────────────────────────────
// Runtime values
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Decimal(Decimal),
    Text(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Returns a human-readable type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Decimal(_) => "Decimal",
            Value::Text(_) => "Text",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn text(s: impl Into<String>) -> Value {
        Value::Text(s.into())
    }

    /// Convert from JSON. Numbers that fit `i64` become `Int`; other numbers
    /// are parsed from their textual form into `Decimal`.
    pub fn from_json(v: &serde_json::Value) -> Value {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    let text = n.to_string();
                    text.parse::<Decimal>()
                        .or_else(|_| Decimal::from_scientific(&text))
                        .map(Value::Decimal)
                        .unwrap_or(Value::Null)
                }
            }
            serde_json::Value::String(s) => Value::Text(s.clone()),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(obj) => Value::Map(
                obj.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to JSON. Decimals are emitted as strings so no precision is
    /// lost at the boundary.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Decimal(d) => serde_json::Value::String(d.to_string()),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Look up a dotted path. Numeric segments index into lists.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        if path.is_empty() {
            return Some(self);
        }
        let mut current = self;
        for segment in path.split('.') {
            current = match current {
                Value::Map(m) => m.get(segment)?,
                Value::List(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Write `value` at a dotted path, creating intermediate maps where a
    /// segment is missing or null. List elements can be addressed by index
    /// but lists are never extended.
    pub fn set_path(&mut self, path: &str, value: Value) -> Result<(), PathError> {
        let segments: Vec<&str> = path.split('.').collect();
        if path.is_empty() || segments.iter().any(|s| s.is_empty()) {
            return Err(PathError::Invalid {
                path: path.to_string(),
            });
        }
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| PathError::Invalid {
                path: path.to_string(),
            })?;

        let mut current = self;
        for (depth, segment) in parents.iter().enumerate() {
            if current.is_null() {
                *current = Value::Map(BTreeMap::new());
            }
            current = match current {
                Value::Map(m) => m
                    .entry(segment.to_string())
                    .or_insert_with(|| Value::Map(BTreeMap::new())),
                Value::List(items) => segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get_mut(i))
                    .ok_or_else(|| PathError::Conflict {
                        path: path.to_string(),
                        segment: segments[..=depth].join("."),
                    })?,
                _ => {
                    return Err(PathError::Conflict {
                        path: path.to_string(),
                        segment: segments[..depth].join("."),
                    })
                }
            };
        }

        if current.is_null() {
            *current = Value::Map(BTreeMap::new());
        }
        match current {
            Value::Map(m) => {
                m.insert(last.to_string(), value);
                Ok(())
            }
            Value::List(items) => {
                let slot = last
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get_mut(i))
                    .ok_or_else(|| PathError::Conflict {
                        path: path.to_string(),
                        segment: path.to_string(),
                    })?;
                *slot = value;
                Ok(())
            }
            _ => Err(PathError::Conflict {
                path: path.to_string(),
                segment: parents.join("."),
            }),
        }
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Decimal(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Decimal(d) => serializer.serialize_str(&d.to_string()),
            Value::Text(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(m) => {
                let mut map = serializer.serialize_map(Some(m.len()))?;
                for (k, v) in m {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{}", s),
            Value::Decimal(d) => write!(f, "{}", d),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

/// A write to a context path that could not be performed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("invalid path '{path}'")]
    Invalid { path: String },
    /// An intermediate segment exists but is not a map (or an in-range list index).
    #[error("cannot write '{path}': '{segment}' is not a mapping")]
    Conflict { path: String, segment: String },
}

// ──────────────────────────────────────────────
// Execution context
// ──────────────────────────────────────────────

/// The mutable mapping threaded through one engine call.
///
/// Owned by exactly one call; conditions read it, actions read and write it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    root: Value,
}

impl ExecutionContext {
    pub fn new() -> Self {
        ExecutionContext {
            root: Value::Map(BTreeMap::new()),
        }
    }

    /// Build a context from a JSON object.
    pub fn from_json(v: &serde_json::Value) -> Result<Self, EvalError> {
        if !v.is_object() {
            return Err(EvalError::MalformedContext {
                message: "context must be a JSON object".to_string(),
            });
        }
        Ok(ExecutionContext {
            root: Value::from_json(v),
        })
    }

    pub fn from_map(map: BTreeMap<String, Value>) -> Self {
        ExecutionContext {
            root: Value::Map(map),
        }
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.root.get_path(path)
    }

    /// Dotted-path lookup where a missing path reads as `Null`.
    pub fn lookup(&self, path: &str) -> Value {
        self.get(path).cloned().unwrap_or(Value::Null)
    }

    pub fn set(&mut self, path: &str, value: Value) -> Result<(), PathError> {
        self.root.set_path(path, value)
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn to_json(&self) -> serde_json::Value {
        self.root.to_json()
    }
}

impl Serialize for ExecutionContext {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.root.serialize(serializer)
    }
}
