//! Placeholder data model
//!
//! Submitted form data arrives as a flat map from field address to value.
//! Three address grammars share the key space: bare merge-field names, a row
//! index (`"7"`) for direct text overwrite and a row/ordinal pair (`"2:1"`) for
//! checkbox toggling. [`FieldAddress`] keeps them apart once parsed.

use std::collections::BTreeMap;
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref ROW_ADDRESS: Regex = Regex::new(r"^(\d+)(?::(\d+))?$").unwrap();
}

/// Value bound to a placeholder address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlaceholderValue {
    Boolean(bool),
    Number(f64),
    Text(String),
    List(Vec<PlaceholderMap>),
}

impl PlaceholderValue {
    /// String form used for substitution, or `None` for lists.
    pub fn as_scalar(&self) -> Option<String> {
        match self {
            PlaceholderValue::List(_) => None,
            other => Some(other.to_string()),
        }
    }

    /// Section truthiness: empty strings, `false`, zero and empty lists are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            PlaceholderValue::Boolean(b) => *b,
            PlaceholderValue::Number(n) => *n != 0.0 && !n.is_nan(),
            PlaceholderValue::Text(s) => !s.is_empty(),
            PlaceholderValue::List(items) => !items.is_empty(),
        }
    }
}

impl fmt::Display for PlaceholderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaceholderValue::Boolean(b) => write!(f, "{}", b),
            PlaceholderValue::Number(n) => {
                if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            PlaceholderValue::Text(s) => f.write_str(s),
            PlaceholderValue::List(items) => write!(f, "[{} items]", items.len()),
        }
    }
}

impl From<&str> for PlaceholderValue {
    fn from(value: &str) -> Self {
        PlaceholderValue::Text(value.to_string())
    }
}

impl From<String> for PlaceholderValue {
    fn from(value: String) -> Self {
        PlaceholderValue::Text(value)
    }
}

impl From<bool> for PlaceholderValue {
    fn from(value: bool) -> Self {
        PlaceholderValue::Boolean(value)
    }
}

impl From<f64> for PlaceholderValue {
    fn from(value: f64) -> Self {
        PlaceholderValue::Number(value)
    }
}

impl From<Vec<PlaceholderMap>> for PlaceholderValue {
    fn from(items: Vec<PlaceholderMap>) -> Self {
        PlaceholderValue::List(items)
    }
}

/// Parsed form of a placeholder key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldAddress {
    MergeField(String),
    RowText(usize),
    Checkbox { row: usize, ordinal: usize },
}

impl FieldAddress {
    pub fn parse(key: &str) -> Self {
        let parsed = ROW_ADDRESS.captures(key).and_then(|caps| {
            let row = caps.get(1)?.as_str().parse::<usize>().ok()?;
            match caps.get(2) {
                Some(ordinal) => Some(FieldAddress::Checkbox {
                    row,
                    ordinal: ordinal.as_str().parse().ok()?,
                }),
                None => Some(FieldAddress::RowText(row)),
            }
        });
        parsed.unwrap_or_else(|| FieldAddress::MergeField(key.to_string()))
    }
}

impl fmt::Display for FieldAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldAddress::MergeField(name) => f.write_str(name),
            FieldAddress::RowText(row) => write!(f, "{}", row),
            FieldAddress::Checkbox { row, ordinal } => write!(f, "{}:{}", row, ordinal),
        }
    }
}

/// Flat mapping from field address to value for one submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaceholderMap {
    fields: BTreeMap<String, PlaceholderValue>,
}

impl PlaceholderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PlaceholderValue>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn insert_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), PlaceholderValue::Text(value.into()));
    }

    pub fn insert_boolean(&mut self, key: impl Into<String>, value: bool) {
        self.fields.insert(key.into(), PlaceholderValue::Boolean(value));
    }

    pub fn remove(&mut self, key: &str) -> Option<PlaceholderValue> {
        self.fields.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&PlaceholderValue> {
        self.fields.get(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PlaceholderValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Every key paired with its parsed address.
    pub fn addresses(&self) -> impl Iterator<Item = (FieldAddress, &PlaceholderValue)> {
        self.fields.iter().map(|(k, v)| (FieldAddress::parse(k), v))
    }
}

impl<K: Into<String>, V: Into<PlaceholderValue>> FromIterator<(K, V)> for PlaceholderMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = PlaceholderMap::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}
