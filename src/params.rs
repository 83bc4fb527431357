//! Typed path-parameter values and ordered argument lists.

use std::fmt;

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

/// A single path-parameter value.
///
/// `Str` comes out of `string` placeholders, `Int` out of `int` ones. When
/// passed to [`Href::resolve`](crate::Href::resolve) either variant is
/// accepted for either placeholder type, as long as the text form fits.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Str(String),
    Int(i64),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            Self::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Str(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self { Self::Str(s.to_owned()) }
}

impl From<String> for Value {
    fn from(s: String) -> Self { Self::Str(s) }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self { Self::Str(s.clone()) }
}

macro_rules! int_value {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(n: $t) -> Self { Self::Int(i64::from(n)) }
        })*
    };
}

int_value!(i8, i16, i32, i64, u8, u16, u32);

/// Ordered `name → value` pairs.
///
/// Used both for the parameters extracted by a match and for the arguments
/// handed to the reverse resolver. Order is insertion order; it decides the
/// order of extra arguments in a generated query string.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Params(Vec<(String, Value)>);

/// Arguments for reverse resolution. Same shape as [`Params`].
pub type Args = Params;

impl Params {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Builder form of [`insert`](Params::insert):
    ///
    /// ```rust
    /// use kiri::Args;
    /// let args = Args::new().with("username", "foo").with("page", 2);
    /// assert_eq!(args.len(), 2);
    /// ```
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Sets `name`, replacing an earlier value in place.
    pub fn insert(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name.to_owned(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Params {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert(&k.into(), v);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_in_place() {
        let mut p = Params::new().with("a", 1).with("b", "x");
        p.insert("a", 2);
        let keys: Vec<_> = p.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["a", "b"]);
        assert_eq!(p.get("a"), Some(&Value::Int(2)));
    }

    #[test]
    fn serializes_as_a_map() {
        let p = Params::new().with("id", 7).with("name", "bob");
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json, serde_json::json!({"id": 7, "name": "bob"}));
    }
}
