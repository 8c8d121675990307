use std::fmt;

use indexmap::IndexMap;

use crate::object::{Name, Value};

/// Insertion-order-preserving dictionary with byte-exact name keys.
///
/// Key order at output equals insertion order; updating an existing key
/// keeps its original position. Removal uses `shift_remove` so the order of
/// the remaining entries is untouched.
#[derive(Clone, PartialEq, Default)]
pub struct Dictionary(IndexMap<Name, Value>);

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, key: &[u8]) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut Value> {
        self.0.get_mut(key)
    }

    pub fn set(&mut self, key: impl Into<Name>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Value> {
        self.0.shift_remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Name, &Value)> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&Name, &mut Value)> {
        self.0.iter_mut()
    }

    // Typed accessors. These return `None` both for a missing key and for a
    // key of the wrong type; callers that must distinguish use `get`.

    pub fn get_integer(&self, key: &[u8]) -> Option<i64> {
        self.get(key).and_then(Value::as_integer)
    }

    pub fn get_name(&self, key: &[u8]) -> Option<&Name> {
        self.get(key).and_then(Value::as_name)
    }

    pub fn get_array(&self, key: &[u8]) -> Option<&[Value]> {
        self.get(key).and_then(Value::as_array)
    }

    pub fn get_dict(&self, key: &[u8]) -> Option<&Dictionary> {
        self.get(key).and_then(Value::as_dict)
    }

    pub fn get_bool(&self, key: &[u8]) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }
}

impl FromIterator<(Name, Value)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (Name, Value)>>(iter: I) -> Self {
        Dictionary(iter.into_iter().collect())
    }
}

impl fmt::Debug for Dictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}
