//! Per-request context shared between the steps of one pipeline.

use crate::request::Request;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds the initial [`Context`] of a request, runs once before the first handler.
pub type ContextInit = Arc<dyn Fn(&Request) -> Context + Send + Sync>;

/// A mutable key → value map handlers use to pass derived state, such as
/// validation results, to later handlers of the same request.
#[derive(Debug, Clone, Default)]
pub struct Context {
    values: HashMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, returning the previous one under the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    /// Serializes `value` and stores it under `key`.
    pub fn insert_as<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.values.insert(key.into(), value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Reads the value under `key` back into a typed value.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<Result<T, serde_json::Error>> {
        self.values.get(key).map(|value| T::deserialize(value))
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self { values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::Context;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Validation {
        valid: bool,
        errors: Vec<String>,
    }

    #[test]
    fn test_insert_and_get() {
        let mut ctx = Context::new();
        assert!(ctx.is_empty());
        assert!(ctx.insert("user", "alice").is_none());
        assert_eq!(ctx.insert("user", "bob"), Some(json!("alice")));
        assert_eq!(ctx.get("user"), Some(&json!("bob")));
        assert!(ctx.contains_key("user"));
        assert_eq!(ctx.remove("user"), Some(json!("bob")));
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_typed_values() {
        let mut ctx = Context::new();
        let validation = Validation { valid: false, errors: vec!["name is required".into()] };
        ctx.insert_as("validation", &validation).unwrap();

        let read: Validation = ctx.get_as("validation").unwrap().unwrap();
        assert_eq!(read, validation);
        assert!(ctx.get_as::<Validation>("missing").is_none());
        assert!(ctx.get_as::<u32>("validation").unwrap().is_err());
    }

    #[test]
    fn test_from_iter() {
        let ctx: Context = [("a", 1), ("b", 2)].into_iter().collect();
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.get("b"), Some(&json!(2)));
    }
}
