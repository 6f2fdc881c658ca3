//! Shared value types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A variable document: named top-level values scoped to one element
/// instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variables(pub Map<String, Value>);

impl Variables {
    /// An empty document.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build from pairs, for tests and trigger payloads.
    pub fn from_pairs(pairs: &[(&str, Value)]) -> Self {
        let mut map = Map::new();
        for (name, value) in pairs {
            map.insert(name.to_string(), value.clone());
        }
        Self(map)
    }

    /// Read one variable.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Write one variable.
    pub fn set(&mut self, name: &str, value: Value) {
        self.0.insert(name.to_string(), value);
    }

    /// Merge another document into this one; the other side wins on
    /// conflicts.
    pub fn merge(&mut self, other: &Variables) {
        for (name, value) in &other.0 {
            self.0.insert(name.clone(), value.clone());
        }
    }

    /// Whether the document has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_overwrites_conflicts() {
        let mut base = Variables::from_pairs(&[("a", json!(1)), ("b", json!(2))]);
        let update = Variables::from_pairs(&[("b", json!(3)), ("c", json!(4))]);

        base.merge(&update);

        assert_eq!(base.get("a"), Some(&json!(1)));
        assert_eq!(base.get("b"), Some(&json!(3)));
        assert_eq!(base.get("c"), Some(&json!(4)));
    }
}
