//! Runtime values

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Static type of an expression as tracked by the checker
///
/// Fetched data and variables are `Dyn`; only literals and function results
/// carry precise types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CelType {
    Dyn,
    Null,
    Bool,
    Int,
    Uint,
    Double,
    String,
    List,
    Map,
}

impl CelType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, CelType::Int | CelType::Uint | CelType::Double)
    }

    /// Whether a value of this type could be used where `other` is expected
    pub fn is_assignable_to(&self, other: CelType) -> bool {
        *self == CelType::Dyn || other == CelType::Dyn || *self == other
    }
}

impl fmt::Display for CelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CelType::Dyn => "dyn",
            CelType::Null => "null_type",
            CelType::Bool => "bool",
            CelType::Int => "int",
            CelType::Uint => "uint",
            CelType::Double => "double",
            CelType::String => "string",
            CelType::List => "list",
            CelType::Map => "map",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Double(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn cel_type(&self) -> CelType {
        match self {
            Value::Null => CelType::Null,
            Value::Bool(_) => CelType::Bool,
            Value::Int(_) => CelType::Int,
            Value::Uint(_) => CelType::Uint,
            Value::Double(_) => CelType::Double,
            Value::String(_) => CelType::String,
            Value::List(_) => CelType::List,
            Value::Map(_) => CelType::Map,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Key used when the value indexes a map; maps are keyed by strings only
    pub(crate) fn map_key(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Int(i) => Some(i.to_string()),
            Value::Uint(u) => Some(u.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Equality with numeric values compared across int, uint and double
    pub fn cel_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.cel_equals(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|other| v.cel_equals(other)))
            }
            _ if self.cel_type().is_numeric() && other.cel_type().is_numeric() => {
                self.cel_compare(other) == Some(Ordering::Equal)
            }
            _ => self == other,
        }
    }

    /// Ordering for scalars; `None` when the pair is not comparable
    pub fn cel_compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Uint(a), Value::Uint(b)) => Some(a.cmp(b)),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Uint(b)) => Some(compare_int_uint(*a, *b)),
            (Value::Uint(a), Value::Int(b)) => Some(compare_int_uint(*b, *a).reverse()),
            (Value::Int(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
            (Value::Double(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Uint(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
            (Value::Double(a), Value::Uint(b)) => a.partial_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Uint(u) => serde_json::Value::from(*u),
            Value::Double(d) => serde_json::Number::from_f64(*d)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

fn compare_int_uint(int: i64, uint: u64) -> Ordering {
    if int < 0 {
        return Ordering::Less;
    }
    (int as u64).cmp(&uint)
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::Uint(u)
                } else {
                    Value::Double(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s}"),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_preserves_structure() {
        let value = Value::from(json!({"items": [1, "two", 3.5, null, true]}));
        let Value::Map(map) = value else {
            panic!("expected map");
        };
        assert_eq!(
            map["items"],
            Value::List(vec![
                Value::Int(1),
                Value::String("two".to_string()),
                Value::Double(3.5),
                Value::Null,
                Value::Bool(true),
            ])
        );
    }

    #[test]
    fn test_large_unsigned_numbers_become_uint() {
        assert_eq!(Value::from(json!(u64::MAX)), Value::Uint(u64::MAX));
    }

    #[test]
    fn test_heterogeneous_numeric_equality() {
        assert!(Value::Int(1).cel_equals(&Value::Double(1.0)));
        assert!(Value::Uint(2).cel_equals(&Value::Int(2)));
        assert!(!Value::Int(-1).cel_equals(&Value::Uint(u64::MAX)));
        assert!(!Value::Int(1).cel_equals(&Value::String("1".to_string())));
    }

    #[test]
    fn test_compare_int_and_uint() {
        assert_eq!(Value::Int(-1).cel_compare(&Value::Uint(0)), Some(Ordering::Less));
        assert_eq!(Value::Uint(5).cel_compare(&Value::Int(3)), Some(Ordering::Greater));
        assert_eq!(Value::Bool(true).cel_compare(&Value::Int(1)), None);
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Null.cel_type().to_string(), "null_type");
        assert_eq!(Value::Map(BTreeMap::new()).cel_type().to_string(), "map");
        assert_eq!(CelType::Dyn.to_string(), "dyn");
    }

    #[test]
    fn test_json_round_trip() {
        let original = json!({"a": [1, 2], "b": {"c": "d"}});
        assert_eq!(Value::from(original.clone()).to_json(), original);
    }
}
