//! Mutation input values.
//!
//! Input is JSON-like, except that any position may hold a reference to an
//! exported variable (`$name`). Such references never become bound
//! parameters; the synthesizer swaps them for script variables.

use serde_json::{Map, Number};

use super::Value;
use crate::{Error, Result};

/// A single input value.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<InputValue>),
    Object(InputObject),
    /// Reference to a variable exported by an earlier root field.
    Variable(String),
}

/// An ordered input object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InputObject {
    entries: Vec<(String, InputValue)>,
}

// ============================================================================
// InputValue
// ============================================================================

impl InputValue {
    /// Shorthand for a variable reference.
    pub fn var(name: impl Into<String>) -> Self {
        InputValue::Variable(name.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, InputValue::Null)
    }

    pub fn as_object(&self) -> Option<&InputObject> {
        match self {
            InputValue::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            InputValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_variable(&self) -> Option<&str> {
        match self {
            InputValue::Variable(v) => Some(v),
            _ => None,
        }
    }

    /// Treat a value as a list even if only one value is present.
    pub fn values(&self) -> Vec<&InputValue> {
        match self {
            InputValue::List(items) => items.iter().collect(),
            other => vec![other],
        }
    }

    /// Convert to a literal JSON value. Variables cannot be bound as literals.
    pub fn to_json(&self) -> Result<Value> {
        Ok(match self {
            InputValue::Null => Value::Null,
            InputValue::Bool(b) => Value::Bool(*b),
            InputValue::Number(n) => Value::Number(n.clone()),
            InputValue::String(s) => Value::String(s.clone()),
            InputValue::List(items) => {
                Value::Array(items.iter().map(InputValue::to_json).collect::<Result<_>>()?)
            }
            InputValue::Object(o) => Value::Object(o.to_json()?),
            InputValue::Variable(name) => {
                return Err(Error::Input(format!(
                    "variable ${name} cannot be used as a literal value"
                )));
            }
        })
    }
}

impl From<Value> for InputValue {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => InputValue::Null,
            Value::Bool(b) => InputValue::Bool(b),
            Value::Number(n) => InputValue::Number(n),
            Value::String(s) => InputValue::String(s),
            Value::Array(items) => InputValue::List(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => InputValue::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect()),
        }
    }
}

impl From<&str> for InputValue {
    fn from(v: &str) -> Self { InputValue::String(v.to_owned()) }
}
impl From<String> for InputValue {
    fn from(v: String) -> Self { InputValue::String(v) }
}
impl From<InputObject> for InputValue {
    fn from(v: InputObject) -> Self { InputValue::Object(v) }
}

// ============================================================================
// InputObject
// ============================================================================

impl InputObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<InputValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace, keeping the position of an existing key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<InputValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&InputValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<InputValue> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &InputValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> Result<Map<String, Value>> {
        self.entries
            .iter()
            .map(|(k, v)| Ok((k.clone(), v.to_json()?)))
            .collect()
    }
}

impl<K: Into<String>> FromIterator<(K, InputValue)> for InputObject {
    fn from_iter<I: IntoIterator<Item = (K, InputValue)>>(iter: I) -> Self {
        let mut obj = InputObject::new();
        for (k, v) in iter {
            obj.insert(k, v);
        }
        obj
    }
}

impl TryFrom<Value> for InputObject {
    type Error = Error;

    fn try_from(v: Value) -> Result<Self> {
        match InputValue::from(v) {
            InputValue::Object(o) => Ok(o),
            other => Err(Error::Input(format!("expected an input object, got {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_keeps_order() {
        let obj = InputObject::try_from(json!({"b": 1, "a": 2, "c": 3})).unwrap();
        let keys: Vec<_> = obj.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_variable_is_not_a_literal() {
        let obj = InputObject::new().with("name", InputValue::var("planet"));
        assert!(obj.to_json().is_err());
    }

    #[test]
    fn test_values_treats_single_as_list() {
        let single = InputValue::from(json!({"connect": "Person/1"}));
        assert_eq!(single.values().len(), 1);
        let many = InputValue::from(json!([{"connect": "Person/1"}, {"connect": "Person/2"}]));
        assert_eq!(many.values().len(), 2);
    }
}
