//! Wire types for the cypher-over-HTTP protocol.
//!
//! The store wraps graph entities inconsistently: a node cell is
//! `{ "metadata": { "id": n }, "data": { ..properties.. } }`, a
//! relationship cell additionally carries a top-level `"type"`, and
//! everything else arrives as a bare scalar. [`CellValue`] resolves that
//! once; downstream code only sees the tagged variant.

use serde::de::{Deserialize, Deserializer};
use serde::Serialize;
use serde_json::{Map, Value};

/// A single result cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    /// A bare scalar (string, number, bool, or array of scalars).
    Scalar(Value),
    /// A wrapped node: store-internal identity plus its property bag.
    Node { id: u64, properties: Map<String, Value> },
    /// A wrapped relationship.
    Relationship { id: u64, rel_type: String, properties: Map<String, Value> },
}

impl<'de> Deserialize<'de> for CellValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(CellValue::from_wire(raw))
    }
}

impl CellValue {
    /// Decode one raw cell. Objects that do not look like the store's
    /// node/relationship wrapping stay scalars.
    pub fn from_wire(raw: Value) -> CellValue {
        match raw {
            Value::Null => CellValue::Null,
            Value::Object(mut obj) => {
                let id = obj
                    .get("metadata")
                    .and_then(|m| m.get("id"))
                    .and_then(Value::as_u64);
                let has_data = matches!(obj.get("data"), Some(Value::Object(_)));
                match (id, has_data) {
                    (Some(id), true) => {
                        let properties = match obj.remove("data") {
                            Some(Value::Object(props)) => props,
                            _ => Map::new(),
                        };
                        let rel_type = obj
                            .get("type")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .or_else(|| {
                                obj.get("metadata")
                                    .and_then(|m| m.get("type"))
                                    .and_then(Value::as_str)
                                    .map(str::to_string)
                            });
                        match rel_type {
                            Some(rel_type) => CellValue::Relationship { id, rel_type, properties },
                            None => CellValue::Node { id, properties },
                        }
                    }
                    _ => CellValue::Scalar(Value::Object(obj)),
                }
            }
            other => CellValue::Scalar(other),
        }
    }

    /// Store-internal identity, if this is a node or relationship.
    pub fn identity(&self) -> Option<u64> {
        match self {
            CellValue::Node { id, .. } | CellValue::Relationship { id, .. } => Some(*id),
            _ => None,
        }
    }

    pub fn properties(&self) -> Option<&Map<String, Value>> {
        match self {
            CellValue::Node { properties, .. } | CellValue::Relationship { properties, .. } => {
                Some(properties)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Scalar(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Scalar(v) => v.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Scalar(v) => v.as_f64(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    // Test/mock builders.

    pub fn string(s: impl Into<String>) -> CellValue {
        CellValue::Scalar(Value::String(s.into()))
    }

    pub fn int(n: i64) -> CellValue {
        CellValue::Scalar(Value::from(n))
    }

    pub fn node(id: u64, properties: Value) -> CellValue {
        match properties {
            Value::Object(properties) => CellValue::Node { id, properties },
            _ => CellValue::Node { id, properties: Map::new() },
        }
    }
}

/// A tabular result: ordered column names plus rows of cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize, serde::Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub data: Vec<Vec<CellValue>>,
}

impl ResultSet {
    pub fn empty() -> ResultSet {
        ResultSet::default()
    }

    pub fn new(columns: &[&str], data: Vec<Vec<CellValue>>) -> ResultSet {
        ResultSet { columns: columns.iter().map(|c| c.to_string()).collect(), data }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// First cell of the first row as an integer; the shape every count
    /// query returns.
    pub fn single_count(&self) -> Option<i64> {
        self.data.first().and_then(|row| row.first()).and_then(CellValue::as_i64)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }
}
