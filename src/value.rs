//! Native representation of engine values.
//!
//! [`Value`] is the tagged union every decoded column lands in. Decoding
//! is value-to-value: once a `Value` exists it holds no reference back
//! into the engine. Composite shapes keep their declared order, so struct
//! fields, map entries and list elements come back exactly as the engine
//! reported them.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

/// A decoded engine value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    UInt64(u64),
    Float64(f64),
    /// A calendar date, normalized to midnight UTC of the stored day.
    Date(DateTime<Utc>),
    /// An instant; every engine timestamp precision/zone variant is
    /// normalized to this single representation.
    Timestamp(DateTime<Utc>),
    Interval(TimeDelta),
    String(String),
    Blob(Vec<u8>),
    Uuid(Uuid),
    List(Vec<Value>),
    /// Struct, union and recursive-relationship values, in declared field
    /// order.
    Struct(Vec<(String, Value)>),
    /// Map entries in iteration order; keys keep only their printed form.
    Map(Vec<(String, Value)>),
    Node(Box<Node>),
    Rel(Box<Rel>),
}

/// A graph node value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    /// Internal node identity (typically an internal-id struct).
    pub id: Value,
    /// Node labels, in declaration order.
    pub labels: Vec<String>,
    /// Properties in declaration order.
    pub properties: Vec<(String, Value)>,
}

/// A graph relationship value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rel {
    /// Internal relationship identity.
    pub id: Value,
    /// Source node identity.
    pub src_id: Value,
    /// Destination node identity.
    pub dst_id: Value,
    /// Relationship label.
    pub label: String,
    /// Properties in declaration order.
    pub properties: Vec<(String, Value)>,
}

impl Node {
    /// Property value by name, if present.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }
}

impl Rel {
    /// Property value by name, if present.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }
}

impl Value {
    /// Tag name used in type-mismatch diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int64(_) => "int64",
            Value::UInt64(_) => "uint64",
            Value::Float64(_) => "float64",
            Value::Date(_) => "date",
            Value::Timestamp(_) => "timestamp",
            Value::Interval(_) => "interval",
            Value::String(_) => "string",
            Value::Blob(_) => "blob",
            Value::Uuid(_) => "uuid",
            Value::List(_) => "list",
            Value::Struct(_) => "struct",
            Value::Map(_) => "map",
            Value::Node(_) => "node",
            Value::Rel(_) => "rel",
        }
    }

    /// True for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The inner bool, if this is a [`Value::Bool`].
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The inner integer, if this is a [`Value::Int64`].
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(i) => Some(*i),
            _ => None,
        }
    }

    /// The inner string slice, if this is a [`Value::String`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// JSON rendering, used by [`Display`](fmt::Display) for composite
    /// values and by the [`Serialize`] impl.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int64(i) => serde_json::Value::from(*i),
            Value::UInt64(u) => serde_json::Value::from(*u),
            Value::Float64(f) => {
                serde_json::Number::from_f64(*f).map_or(serde_json::Value::Null, Into::into)
            }
            Value::Date(t) => serde_json::Value::String(t.format("%Y-%m-%d").to_string()),
            Value::Timestamp(t) => serde_json::Value::String(t.to_rfc3339()),
            Value::Interval(d) => serde_json::Value::String(format!("{d}")),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Blob(b) => serde_json::Value::Array(
                b.iter().map(|byte| serde_json::Value::from(*byte)).collect(),
            ),
            Value::Uuid(u) => serde_json::Value::String(u.to_string()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Struct(fields) | Value::Map(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect(),
            ),
            Value::Node(node) => {
                let mut obj = serde_json::Map::new();
                obj.insert("id".to_string(), node.id.to_json());
                obj.insert(
                    "labels".to_string(),
                    serde_json::Value::Array(
                        node.labels
                            .iter()
                            .map(|label| serde_json::Value::String(label.clone()))
                            .collect(),
                    ),
                );
                obj.insert(
                    "properties".to_string(),
                    Value::Struct(node.properties.clone()).to_json(),
                );
                serde_json::Value::Object(obj)
            }
            Value::Rel(rel) => {
                let mut obj = serde_json::Map::new();
                obj.insert("id".to_string(), rel.id.to_json());
                obj.insert("src_id".to_string(), rel.src_id.to_json());
                obj.insert("dst_id".to_string(), rel.dst_id.to_json());
                obj.insert(
                    "label".to_string(),
                    serde_json::Value::String(rel.label.clone()),
                );
                obj.insert(
                    "properties".to_string(),
                    Value::Struct(rel.properties.clone()).to_json(),
                );
                serde_json::Value::Object(obj)
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, ""),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int64(i) => write!(f, "{i}"),
            Value::UInt64(u) => write!(f, "{u}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Date(t) => write!(f, "{}", t.format("%Y-%m-%d")),
            Value::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
            Value::Interval(d) => write!(f, "{d}"),
            Value::String(s) => f.write_str(s),
            Value::Uuid(u) => write!(f, "{u}"),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_lookup() {
        let node = Node {
            id: Value::Int64(7),
            labels: vec!["Person".to_string()],
            properties: vec![("name".to_string(), Value::String("Ann".to_string()))],
        };
        assert_eq!(
            node.property("name"),
            Some(&Value::String("Ann".to_string()))
        );
        assert_eq!(node.property("age"), None);
    }

    #[test]
    fn test_display_scalars_are_plain() {
        assert_eq!(Value::Int64(42).to_string(), "42");
        assert_eq!(Value::String("hi".to_string()).to_string(), "hi");
        assert_eq!(Value::Bool(true).to_string(), "true");
    }

    #[test]
    fn test_display_composites_render_as_json() {
        let value = Value::List(vec![Value::Int64(1), Value::Int64(2)]);
        assert_eq!(value.to_string(), "[1,2]");

        let value = Value::Struct(vec![("a".to_string(), Value::Bool(false))]);
        assert_eq!(value.to_string(), r#"{"a":false}"#);
    }

    #[test]
    fn test_struct_json_preserves_field_order() {
        let value = Value::Struct(vec![
            ("z".to_string(), Value::Int64(1)),
            ("a".to_string(), Value::Int64(2)),
        ]);
        // Relies on serde_json's preserve_order feature.
        assert_eq!(value.to_string(), r#"{"z":1,"a":2}"#);
    }

    #[test]
    fn test_scalar_accessors() {
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Int64(9).as_i64(), Some(9));
        assert_eq!(Value::String("hi".to_string()).as_str(), Some("hi"));
        assert_eq!(Value::Null.as_bool(), None);
        assert_eq!(Value::Bool(true).as_i64(), None);
        assert_eq!(Value::Int64(9).as_str(), None);
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Null.type_name(), "null");
        assert_eq!(Value::Uuid(Uuid::nil()).type_name(), "uuid");
        assert_eq!(Value::Map(vec![]).type_name(), "map");
    }
}
