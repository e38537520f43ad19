//! Session values
//!
//! Values are a tagged variant so heterogeneous data survives the
//! serialization boundary of persistent providers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A value stored under a session key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "value")]
pub enum SessionValue {
    Integer(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    /// Arbitrary structured data
    Json(serde_json::Value),
}

impl SessionValue {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            SessionValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            SessionValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SessionValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SessionValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            SessionValue::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            SessionValue::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            SessionValue::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Variant name, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            SessionValue::Integer(_) => "integer",
            SessionValue::Float(_) => "float",
            SessionValue::Bool(_) => "bool",
            SessionValue::Text(_) => "text",
            SessionValue::Bytes(_) => "bytes",
            SessionValue::Timestamp(_) => "timestamp",
            SessionValue::Json(_) => "json",
        }
    }
}

impl From<i64> for SessionValue {
    fn from(v: i64) -> Self {
        SessionValue::Integer(v)
    }
}

impl From<i32> for SessionValue {
    fn from(v: i32) -> Self {
        SessionValue::Integer(v as i64)
    }
}

impl From<f64> for SessionValue {
    fn from(v: f64) -> Self {
        SessionValue::Float(v)
    }
}

impl From<bool> for SessionValue {
    fn from(v: bool) -> Self {
        SessionValue::Bool(v)
    }
}

impl From<String> for SessionValue {
    fn from(v: String) -> Self {
        SessionValue::Text(v)
    }
}

impl From<&str> for SessionValue {
    fn from(v: &str) -> Self {
        SessionValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SessionValue {
    fn from(v: Vec<u8>) -> Self {
        SessionValue::Bytes(v)
    }
}

impl From<DateTime<Utc>> for SessionValue {
    fn from(v: DateTime<Utc>) -> Self {
        SessionValue::Timestamp(v)
    }
}

impl From<serde_json::Value> for SessionValue {
    fn from(v: serde_json::Value) -> Self {
        SessionValue::Json(v)
    }
}
