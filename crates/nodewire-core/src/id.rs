//! Stable node identifier newtype.
//!
//! Node ids are free-form strings chosen by whichever editor instance
//! created the node (`"node3"`, a uuid, ...). The newtype keeps them from
//! being confused with port names or titles at the type level.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable node identifier, unique within a graph.
///
/// An id is never reused while a live connection still references it; the
/// graph container enforces this by dropping touching connections when a
/// node is removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        NodeId(s)
    }
}

// Allows map lookups by &str without allocating.
impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_as_str() {
        let id = NodeId::from("n1");
        assert_eq!(format!("{}", id), "n1");
        assert_eq!(id.as_str(), "n1");
    }

    #[test]
    fn serde_is_transparent() {
        let id = NodeId::from("node42");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"node42\"");
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn borrow_allows_str_lookup() {
        use std::collections::HashMap;
        let mut map: HashMap<NodeId, i32> = HashMap::new();
        map.insert(NodeId::from("a"), 1);
        assert_eq!(map.get("a"), Some(&1));
    }
}
