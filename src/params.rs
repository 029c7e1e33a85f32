//! Parameter sets supplied by pages
//!
//! A parameter set maps names to strings, booleans or ordered string lists.
//! Sets are plain values passed to the renderer; nothing is read from global
//! state. They can be built in code or loaded from a flat TOML table.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use thiserror::Error;

/// Errors that can occur when loading parameter sets
#[derive(Error, Debug)]
pub enum ParamsError {
    #[error("Failed to read parameter file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse parameter TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Unsupported value for parameter '{name}': {kind} (expected string, boolean, number or list of strings)")]
    UnsupportedValue { name: String, kind: String },
    #[error("Invalid parameter assignment '{0}' (expected key=value)")]
    InvalidAssignment(String),
}

/// A parameter value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Bool(bool),
    List(Vec<String>),
}

impl Value {
    /// Truthiness used by `#if` and `#unless`
    ///
    /// Strings and lists are truthy when non-empty.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
        }
    }

    /// Name of the value's type for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Bool(_) => "boolean",
            Value::List(_) => "list",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Value::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{}", s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::List(items)
    }
}

impl From<Vec<&str>> for Value {
    fn from(items: Vec<&str>) -> Self {
        Value::List(items.into_iter().map(String::from).collect())
    }
}

/// Named values a page supplies to a fragment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSet {
    values: BTreeMap<String, Value>,
}

impl ParameterSet {
    /// Create an empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value, builder style
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace a value, returning the previous one
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Parameter names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// A new set with `overrides` layered on top of this one
    pub fn merged(&self, overrides: &ParameterSet) -> ParameterSet {
        let mut values = self.values.clone();
        for (name, value) in &overrides.values {
            values.insert(name.clone(), value.clone());
        }
        ParameterSet { values }
    }

    /// Load a parameter set from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ParamsError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load a parameter set from a flat TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ParamsError> {
        let table: toml::Table = toml::from_str(content)?;
        Self::from_toml_table(&table)
    }

    /// Convert a TOML table into a parameter set
    ///
    /// Numbers are kept as their textual form. Nested tables and datetimes
    /// are rejected.
    pub fn from_toml_table(table: &toml::Table) -> Result<Self, ParamsError> {
        let mut params = ParameterSet::new();
        for (name, value) in table {
            params.insert(name.clone(), convert_toml_value(name, value)?);
        }
        Ok(params)
    }

    /// Parse a `key=value` command-line assignment into a string parameter
    pub fn parse_assignment(assignment: &str) -> Result<(String, Value), ParamsError> {
        match assignment.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), Value::Str(value.to_string())))
            }
            _ => Err(ParamsError::InvalidAssignment(assignment.to_string())),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ParameterSet {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut params = ParameterSet::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

fn convert_toml_value(name: &str, value: &toml::Value) -> Result<Value, ParamsError> {
    let unsupported = |kind: &str| ParamsError::UnsupportedValue {
        name: name.to_string(),
        kind: kind.to_string(),
    };

    match value {
        toml::Value::String(s) => Ok(Value::Str(s.clone())),
        toml::Value::Boolean(b) => Ok(Value::Bool(*b)),
        toml::Value::Integer(i) => Ok(Value::Str(i.to_string())),
        toml::Value::Float(f) => Ok(Value::Str(f.to_string())),
        toml::Value::Array(items) => items
            .iter()
            .map(|item| match item {
                toml::Value::String(s) => Ok(s.clone()),
                toml::Value::Integer(i) => Ok(i.to_string()),
                toml::Value::Float(f) => Ok(f.to_string()),
                other => Err(unsupported(&format!("list containing {}", other.type_str()))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        other => Err(unsupported(other.type_str())),
    }
}
