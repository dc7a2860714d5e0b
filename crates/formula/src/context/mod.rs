//! Key/value data backing variable resolution.
//!
//! A [`DataContext`] maps keys to entries: plain values, nested formulas
//! (resolved against the owning context on every read), or lists of
//! either. Keys keep their insertion order, which [`DataContext::search`]
//! preserves.

use std::sync::Arc;

use indexmap::IndexMap;
use regex::Regex;
use tracing::trace;

use crate::Formula;
use crate::error::ResolveError;
use crate::value::Value;

/// Anything that can produce a [`Value`] given an optional context.
pub trait Resolvable {
    fn resolve(&self, context: Option<&DataContext>) -> Result<Value, ResolveError>;
}

impl Resolvable for Value {
    fn resolve(&self, _context: Option<&DataContext>) -> Result<Value, ResolveError> {
        Ok(self.clone())
    }
}

/// One stored context entry.
#[derive(Debug, Clone)]
pub enum Entry {
    Value(Value),
    /// A formula resolved lazily against the context it is read from.
    Formula(Arc<Formula>),
    List(Vec<Entry>),
}

impl Resolvable for Entry {
    fn resolve(&self, context: Option<&DataContext>) -> Result<Value, ResolveError> {
        match self {
            Self::Value(value) => Ok(value.clone()),
            // Fully qualified: `Formula` also has an inherent `resolve`.
            Self::Formula(formula) => Resolvable::resolve(formula.as_ref(), context),
            Self::List(entries) => {
                let values: Result<Vec<Value>, ResolveError> = entries
                    .iter()
                    .map(|entry| entry.resolve(context))
                    .collect();
                Ok(Value::List(values?))
            }
        }
    }
}

impl From<Value> for Entry {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for Entry {
    fn from(text: &str) -> Self {
        Self::Value(Value::from(text))
    }
}

impl From<String> for Entry {
    fn from(text: String) -> Self {
        Self::Value(Value::from(text))
    }
}

impl From<i64> for Entry {
    fn from(n: i64) -> Self {
        Self::Value(Value::from(n))
    }
}

impl From<f64> for Entry {
    fn from(d: f64) -> Self {
        Self::Value(Value::from(d))
    }
}

impl From<bool> for Entry {
    fn from(b: bool) -> Self {
        Self::Value(Value::from(b))
    }
}

impl From<Formula> for Entry {
    fn from(formula: Formula) -> Self {
        Self::Formula(Arc::new(formula))
    }
}

impl From<Arc<Formula>> for Entry {
    fn from(formula: Arc<Formula>) -> Self {
        Self::Formula(formula)
    }
}

impl From<Vec<Entry>> for Entry {
    fn from(entries: Vec<Entry>) -> Self {
        Self::List(entries)
    }
}

/// Ordered key/value data for resolving variables.
#[derive(Debug, Clone, Default)]
pub struct DataContext {
    data: IndexMap<String, Entry>,
}

impl DataContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a context from a JSON object; anything else yields an empty
    /// context.
    pub fn from_json(json: &serde_json::Value) -> Self {
        let mut context = Self::new();
        if let serde_json::Value::Object(map) = json {
            for (key, value) in map {
                context.set(key.clone(), Value::from(value.clone()));
            }
        }
        context
    }

    /// Looks up `key`. Missing keys are Null; stored formulas resolve
    /// against this context.
    pub fn get(&self, key: &str) -> Result<Value, ResolveError> {
        match self.data.get(key) {
            Some(entry) => entry.resolve(Some(self)),
            None => Ok(Value::Null),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Entry>) {
        self.data.insert(key.into(), value.into());
    }

    /// Appends to the list at `key`. An absent key becomes a one-element
    /// list; a scalar is promoted to a two-element list.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<Entry>) {
        let key = key.into();
        let value = value.into();
        match self.data.get_mut(&key) {
            Some(Entry::List(entries)) => entries.push(value),
            Some(existing) => {
                let previous = std::mem::replace(existing, Entry::List(Vec::new()));
                if let Entry::List(entries) = existing {
                    entries.push(previous);
                    entries.push(value);
                }
            }
            None => {
                self.data.insert(key, Entry::List(vec![value]));
            }
        }
    }

    /// Resolves every entry whose key matches `pattern`, in insertion
    /// order. `*` matches any run of characters; every other character is
    /// literal.
    pub fn search(&self, pattern: &str) -> Result<Vec<Value>, ResolveError> {
        let anchored = format!("^{}$", regex::escape(pattern).replace("\\*", ".*"));
        let matcher = Regex::new(&anchored)
            .map_err(|_| ResolveError::InvalidPattern(pattern.to_string()))?;
        trace!(pattern, "searching context keys");

        let mut found = Vec::new();
        for (key, entry) in &self.data {
            if matcher.is_match(key) {
                found.push(entry.resolve(Some(self))?);
            }
        }
        Ok(found)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }
}

impl FromIterator<(String, Entry)> for DataContext {
    fn from_iter<I: IntoIterator<Item = (String, Entry)>>(iter: I) -> Self {
        Self {
            data: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_get_missing_key_is_null() {
        let context = DataContext::new();
        assert_eq!(context.get("absent").unwrap(), Value::Null);
    }

    #[test]
    fn test_set_and_get() {
        let mut context = DataContext::new();
        context.set("key", 5_i64);
        assert_eq!(context.get("key").unwrap(), Value::Integer(5));
    }

    #[test]
    fn test_push_new_key() {
        let mut context = DataContext::new();
        context.push("key", 5_i64);
        assert_eq!(
            context.get("key").unwrap(),
            Value::List(vec![Value::Integer(5)])
        );
    }

    #[test]
    fn test_push_promotes_scalar() {
        let mut context = DataContext::new();
        context.set("key", 5_i64);
        context.push("key", 6_i64);
        assert_eq!(
            context.get("key").unwrap(),
            Value::List(vec![Value::Integer(5), Value::Integer(6)])
        );
    }

    #[test]
    fn test_push_appends_to_list() {
        let mut context = DataContext::new();
        context.push("key", 5_i64);
        context.push("key", 6_i64);
        context.push("key", 7_i64);
        assert_eq!(
            context.get("key").unwrap(),
            Value::List(vec![
                Value::Integer(5),
                Value::Integer(6),
                Value::Integer(7)
            ])
        );
    }

    #[test]
    fn test_search_is_literal_except_star() {
        let mut context = DataContext::new();
        context.set("attr.a", 1_i64);
        context.set("attr.b", 2_i64);
        context.set("attrxb", 3_i64);
        // `.` must not behave as a regex wildcard.
        assert_eq!(
            context.search("attr.*").unwrap(),
            vec![Value::Integer(1), Value::Integer(2)]
        );
        assert_eq!(context.search("attr.a").unwrap(), vec![Value::Integer(1)]);
    }

    #[test]
    fn test_search_preserves_insertion_order() {
        let mut context = DataContext::new();
        context.set("b", 2_i64);
        context.set("a", 1_i64);
        context.set("c", 3_i64);
        assert_eq!(
            context.search("*").unwrap(),
            vec![Value::Integer(2), Value::Integer(1), Value::Integer(3)]
        );
    }

    #[test]
    fn test_from_json_object() {
        let context = DataContext::from_json(&serde_json::json!({
            "a": 1,
            "b": "two",
        }));
        assert_eq!(context.get("a").unwrap(), Value::Integer(1));
        assert_eq!(context.get("b").unwrap(), Value::text("two"));
    }

    #[test]
    fn test_keys_in_insertion_order() {
        let mut context = DataContext::new();
        context.set("z", 1_i64);
        context.set("a", 2_i64);
        assert_eq!(context.keys().collect::<Vec<_>>(), vec!["z", "a"]);
    }
}
