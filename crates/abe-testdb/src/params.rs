//! Connection parameters handed to the bootstrap entry point.
//!
//! Embedded instances are described by a bare path string (`":memory:"` for a transient
//! instance). Server instances are described by a key/value mapping whose values may be
//! strings or nested mappings. Both encode to JSON losslessly; mappings keep their keys
//! sorted so the same parameters always produce the same blob.
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Path that asks SQLite for a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    String(String),
    Map(BTreeMap<String, ParamValue>),
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<BTreeMap<String, ParamValue>> for ParamValue {
    fn from(value: BTreeMap<String, ParamValue>) -> Self {
        Self::Map(value)
    }
}

/// Connection parameters for one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConnectArgs {
    /// Filesystem path, or [`MEMORY_PATH`]
    Path(String),
    Map(BTreeMap<String, ParamValue>),
}

impl ConnectArgs {
    pub fn memory() -> Self {
        Self::Path(MEMORY_PATH.to_string())
    }

    pub fn path<S: Into<String>>(path: S) -> Self {
        Self::Path(path.into())
    }

    /// Build a mapping from `(key, value)` pairs.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<ParamValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn is_memory(&self) -> bool {
        matches!(self, Self::Path(p) if p == MEMORY_PATH)
    }

    /// String value stored under `key`, if this is a mapping.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self {
            Self::Map(map) => match map.get(key) {
                Some(ParamValue::String(s)) => Some(s),
                _ => None,
            },
            Self::Path(_) => None,
        }
    }

    /// Encode as the JSON blob the bootstrap entry point expects.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Required string parameter, for backends that take a mapping.
    pub(crate) fn require_str(&self, dbtype: &str, key: &str) -> Result<&str> {
        self.get_str(key).ok_or_else(|| Error::InvalidConnectArgs {
            dbtype: dbtype.to_string(),
            message: format!("missing string parameter '{}'", key),
        })
    }
}
