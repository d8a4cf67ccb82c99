//! value representation
//!
//! A parsed document is a tree of [Value]s. There are only two kinds:
//! - literal: boolean, integer (i64), decimal (f64) or string (utf-8)
//! - object (order-preserving "map", where the key is of type string)
//!
//! Additionally:
//! - there is no array type. Arrays are objects keyed `"0"`, `"1"`, ... in insertion order
//! - there is no `null`/`None` value
//! - the only valid **implicit** conversion: every `integer` is also a `decimal`
//! - every value remembers where it came from ([Location]). Equality ignores locations.
use indexmap::IndexMap;
use serde::{
    ser::{SerializeMap, SerializeSeq},
    Serializer,
};
use std::sync::Arc;

/// Order preserving key/value storage of an object
pub type Object = IndexMap<String, Value>;

/// Source position of a value
///
/// `line` and `column` are 1-based. A default location (line 0) means the value was built in code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, derive_new::new)]
pub struct Location {
    pub source: Option<Arc<str>>,
    pub line: usize,
    pub column: usize,
}

impl Location {
    /// Location of a value that was not read from any source
    pub fn generated() -> Self {
        Self::default()
    }

    pub fn is_generated(&self) -> bool {
        self.line == 0
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = self.source.as_deref().unwrap_or("<inline>");
        if self.is_generated() {
            return f.write_str(source);
        }
        write!(f, "{source}:{}:{}", self.line, self.column)
    }
}

/// A single scalar
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    String(String),
}

impl Literal {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Literal::Integer(i) => Some(*i),
            Literal::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Literal::Integer(i) => Some(*i as f64),
            Literal::Decimal(d) => Some(*d),
            Literal::String(s) => s.trim().parse().ok(),
            Literal::Boolean(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Literal::Boolean(b) => Some(*b),
            Literal::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Boolean(b) => write!(f, "{b}"),
            Literal::Integer(i) => write!(f, "{i}"),
            Literal::Decimal(d) => write!(f, "{d}"),
            Literal::String(s) => f.write_str(s),
        }
    }
}

/// A node of a parsed document
#[derive(Debug, Clone)]
pub enum Value {
    Literal(Literal, Location),
    Object(Object, Location),
}

impl Value {
    pub fn object(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        Value::Object(entries.into_iter().collect(), Location::generated())
    }

    pub fn empty_object() -> Self {
        Value::Object(Object::new(), Location::generated())
    }

    pub fn location(&self) -> &Location {
        match self {
            Value::Literal(_, location) | Value::Object(_, location) => location,
        }
    }

    pub fn with_location(mut self, new_location: Location) -> Self {
        match &mut self {
            Value::Literal(_, location) | Value::Object(_, location) => *location = new_location,
        }
        self
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Value::Literal(literal, _) => Some(literal),
            Value::Object(..) => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object, _) => Some(object),
            Value::Literal(..) => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut Object> {
        match self {
            Value::Object(object, _) => Some(object),
            Value::Literal(..) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_literal().and_then(Literal::as_str)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(..))
    }

    /// Child by exact key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|object| object.get(key))
    }

    /// Child by exact key, falling back to the first case-insensitive match
    pub fn get_ignore_case(&self, key: &str) -> Option<&Value> {
        let object = self.as_object()?;
        object.get(key).or_else(|| {
            object
                .iter()
                .find(|(candidate, _)| candidate.eq_ignore_ascii_case(key))
                .map(|(_, value)| value)
        })
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Follow a path of keys
    pub fn get_path<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        path.iter()
            .try_fold(self, |current, key| current.get(key.as_ref()))
    }

    /// Remove a key in place, keeping the order of the remaining keys
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.as_object_mut()
            .and_then(|object| object.shift_remove(key))
    }

    /// Copy of this tree without `key`
    pub fn without(&self, key: &str) -> Value {
        let mut copy = self.clone();
        copy.remove(key);
        copy
    }

    /// Entries whose key is a non-negative integer, sorted by that integer
    ///
    /// The second list contains all keys that are not indices.
    pub fn index_entries(&self) -> (Vec<(usize, &Value)>, Vec<&str>) {
        let mut indexed = vec![];
        let mut rejected = vec![];
        if let Some(object) = self.as_object() {
            for (key, value) in object {
                match key.parse::<usize>() {
                    Ok(index) => indexed.push((index, value)),
                    Err(_) => rejected.push(key.as_str()),
                }
            }
        }
        indexed.sort_by_key(|(index, _)| *index);
        (indexed, rejected)
    }

    /// Merge `overlay` into `self`, `overlay` wins
    ///
    /// - keys only present in `self` are kept (in their position)
    /// - keys present in both are combined recursively when both sides are objects,
    ///   otherwise replaced
    /// - keys only present in `overlay` are appended in `overlay` order
    pub fn combine(&mut self, overlay: Value) {
        match (self, overlay) {
            (Value::Object(base, _), Value::Object(overlay, _)) => {
                for (key, value) in overlay {
                    match base.get_mut(&key) {
                        Some(existing) if existing.is_object() && value.is_object() => {
                            existing.combine(value)
                        }
                        Some(existing) => *existing = value,
                        None => {
                            base.insert(key, value);
                        }
                    }
                }
            }
            (this, overlay) => *this = overlay,
        }
    }
}

/// Structural equality, locations are ignored
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Literal(a, _), Value::Literal(b, _)) => a == b,
            (Value::Object(a, _), Value::Object(b, _)) => {
                a.len() == b.len()
                    && a.iter().zip(b).all(|((ka, va), (kb, vb))| ka == kb && va == vb)
            }
            _ => false,
        }
    }
}

impl From<Literal> for Value {
    fn from(value: Literal) -> Self {
        Value::Literal(value, Location::generated())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Literal::String(value).into()
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Literal::String(value.to_string()).into()
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Literal::Boolean(value).into()
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Literal::Integer(value).into()
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Literal::Decimal(value).into()
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::object(
            value
                .into_iter()
                .enumerate()
                .map(|(index, element)| (index.to_string(), element.into())),
        )
    }
}

impl serde::ser::Serialize for Literal {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Literal::Boolean(value) => serializer.serialize_bool(*value),
            Literal::Integer(value) => serializer.serialize_i64(*value),
            Literal::Decimal(value) => serializer.serialize_f64(*value),
            Literal::String(value) => serializer.serialize_str(value),
        }
    }
}

/// Objects whose keys are exactly `0..n` serialize as sequences
impl serde::ser::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Literal(literal, _) => literal.serialize(serializer),
            Value::Object(object, _) if is_sequence(object) => {
                let mut ser = serializer.serialize_seq(Some(object.len()))?;
                for element in object.values() {
                    ser.serialize_element(element)?;
                }
                ser.end()
            }
            Value::Object(object, _) => {
                let mut ser = serializer.serialize_map(Some(object.len()))?;
                for (element_key, element_value) in object {
                    ser.serialize_entry(element_key, element_value)?;
                }
                ser.end()
            }
        }
    }
}

fn is_sequence(object: &Object) -> bool {
    !object.is_empty()
        && object
            .keys()
            .enumerate()
            .all(|(index, key)| key.parse::<usize>() == Ok(index))
}
