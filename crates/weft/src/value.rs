//! Runtime value tree.
//!
//! Aggregates are `Rc`-wrapped so cloning is O(1); mutation goes through
//! `Rc::make_mut` (clone-on-write). `Cursor` is the handle reference that
//! flows through expression evaluation — see the handle module.

use crate::handle::Cursor;
use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

/// Insertion-ordered object representation.
pub type Object = IndexMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(Rc<str>),
    List(Rc<Vec<Value>>),
    Object(Rc<Object>),
    /// A live reference to a state location, produced by handle parameters
    /// during expression evaluation. Never stored inside a namespace.
    Cursor(Cursor),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into().into())
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(Rc::new(items.into_iter().collect()))
    }

    pub fn object(fields: impl IntoIterator<Item = (impl Into<String>, Value)>) -> Self {
        Value::Object(Rc::new(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
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

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object()?.get(key)
    }

    /// Truthiness used by `test`, conditionals, and logical operators.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Text(t) => !t.is_empty(),
            Value::List(_) | Value::Object(_) => true,
            Value::Cursor(cursor) => cursor.snapshot().is_truthy(),
        }
    }

    /// The "falsy variant" test for designated boolean attributes:
    /// false, "false", null, and missing all count as off. The empty string
    /// is *presence* (`<input disabled>`), so it stays on.
    pub fn is_boolean_off(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(b) => !*b,
            Value::Text(t) => t.as_ref() == "false",
            Value::Cursor(cursor) => cursor.snapshot().is_boolean_off(),
            _ => false,
        }
    }

    /// String coercion used by text interpolation and attribute emission.
    /// Null renders as the empty string.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Text(t) => t.to_string(),
            Value::List(items) => items
                .iter()
                .map(Value::to_text)
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object]".to_string(),
            Value::Cursor(cursor) => cursor.snapshot().to_text(),
        }
    }

    /// Stable stringification for iteration markers. Aggregates serialize as
    /// sorted JSON so equal rows always produce equal markers.
    pub fn marker_string(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Text(t) => t.to_string(),
            Value::List(_) | Value::Object(_) => self.to_json().to_string(),
            Value::Cursor(cursor) => cursor.snapshot().marker_string(),
        }
    }

    /// Replaces any cursor with a deep snapshot of its current value.
    pub fn materialize(self) -> Value {
        match self {
            Value::Cursor(cursor) => cursor.snapshot(),
            other => other,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(t) => serde_json::Value::String(t.to_string()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Cursor(cursor) => cursor.snapshot().to_json(),
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::text(s.clone()),
            serde_json::Value::Array(items) => Value::list(items.iter().map(Value::from_json)),
            serde_json::Value::Object(fields) => {
                Value::object(fields.iter().map(|(k, v)| (k.clone(), Value::from_json(v))))
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_text())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::text(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::text(s)
    }
}

/// Integral floats print without a trailing `.0`.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Recursive merge: object fields merge, everything else overwrites.
/// Used by the global-init bootstrap step.
pub fn deep_merge(target: &mut Value, incoming: &Value) {
    match (target, incoming) {
        (Value::Object(existing), Value::Object(incoming)) => {
            let existing = Rc::make_mut(existing);
            for (key, value) in incoming.iter() {
                match existing.get_mut(key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        existing.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, incoming) => *target = incoming.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_formatting_drops_integral_fraction() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(3.5), "3.5");
        assert_eq!(format_number(-0.25), "-0.25");
    }

    #[test]
    fn truthiness_matches_attribute_semantics() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::text("").is_truthy());
        assert!(Value::text("false").is_truthy());
        assert!(Value::text("false").is_boolean_off());
        assert!(Value::Bool(true).is_truthy());
        assert!(Value::object([("a", Value::Null)]).is_truthy());
    }

    #[test]
    fn deep_merge_preserves_sibling_fields() {
        let mut target = Value::object([("a", Value::Number(1.0)), ("b", Value::Number(2.0))]);
        let incoming = Value::object([(
            "b",
            Value::object([("inner", Value::text("x"))]),
        )]);
        deep_merge(&mut target, &incoming);
        assert_eq!(target.get("a"), Some(&Value::Number(1.0)));
        assert_eq!(
            target.get("b").and_then(|b| b.get("inner")),
            Some(&Value::text("x"))
        );
    }

    #[test]
    fn json_round_trip() {
        let value = Value::object([
            ("tab", Value::text("profile")),
            ("count", Value::Number(3.0)),
            ("flags", Value::list([Value::Bool(true), Value::Null])),
        ]);
        assert_eq!(Value::from_json(&value.to_json()), value);
    }
}
