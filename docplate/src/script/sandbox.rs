//! Per-invocation variable store.
//!
//! A `Sandbox` is created empty for every report, handed to the code runner
//! with each command and handed back afterwards, so assignments made by one
//! command are visible to every later command of the same invocation.  Loop
//! bindings (`$item`, `$idx`, …) live here too while their FOR is running.

use std::collections::BTreeMap;

use super::value::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sandbox {
    vars: BTreeMap<String, Value>,
}

impl Sandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or overwrite) a variable.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Remove a variable, returning its previous value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.vars.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.vars.iter()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Bind `name` to `value` and return what it shadowed, for [`restore`](Self::restore).
    pub fn shadow(&mut self, name: &str, value: Value) -> (String, Option<Value>) {
        let previous = self.vars.insert(name.to_owned(), value);
        (name.to_owned(), previous)
    }

    /// Undo a set of [`shadow`](Self::shadow) calls.
    pub fn restore(&mut self, saved: Vec<(String, Option<Value>)>) {
        for (name, previous) in saved.into_iter().rev() {
            match previous {
                Some(v) => {
                    self.vars.insert(name, v);
                }
                None => {
                    self.vars.remove(&name);
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get() {
        let mut sb = Sandbox::new();
        sb.set("total", Value::Int(3));
        assert_eq!(sb.get("total"), Some(&Value::Int(3)));
        assert!(sb.contains("total"));
    }

    #[test]
    fn shadow_and_restore() {
        let mut sb = Sandbox::new();
        sb.set("$item", Value::from("outer"));
        let saved = vec![
            sb.shadow("$item", Value::from("inner")),
            sb.shadow("$idx", Value::Int(0)),
        ];
        assert_eq!(sb.get("$item"), Some(&Value::from("inner")));
        sb.restore(saved);
        assert_eq!(sb.get("$item"), Some(&Value::from("outer")));
        assert!(!sb.contains("$idx"));
    }
}
