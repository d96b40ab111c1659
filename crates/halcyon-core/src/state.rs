//! Persisted-state tree for non-host-parameter state.
//!
//! Components serialize state the host cannot see through its parameter
//! list — filter type selection, line-generator breakpoints, the
//! modulation-link graph, effect ordering — into a nested [`StateNode`]
//! tree keyed by component id. Attributes are stored as strings with
//! typed accessors that fall back to a default on missing or malformed
//! values: loading is tolerant by design, a missing sub-node means
//! "nothing to restore".
//!
//! The tree round-trips through TOML.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors at the TOML encode/decode boundary.
///
/// Everything inside the tree is tolerant; only the outer (de)serialization
/// can fail.
#[derive(Debug, Error)]
pub enum StateError {
    /// The persisted text is not valid TOML for a state tree.
    #[error("failed to parse state: {0}")]
    Parse(#[from] toml::de::Error),

    /// The tree could not be encoded as TOML.
    #[error("failed to encode state: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// A named child entry; the same name may appear multiple times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ChildEntry {
    name: String,
    node: StateNode,
}

/// One node of the persisted-state tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateNode {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attrs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<ChildEntry>,
}

impl StateNode {
    /// Creates an empty node.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a child with the given name and returns it for filling in.
    pub fn add_child(&mut self, name: &str) -> &mut StateNode {
        self.children.push(ChildEntry {
            name: name.to_string(),
            node: StateNode::new(),
        });
        &mut self.children.last_mut().expect("just pushed").node
    }

    /// Returns the first child with the given name.
    pub fn child(&self, name: &str) -> Option<&StateNode> {
        self.children
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.node)
    }

    /// Iterates every child with the given name, in insertion order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a StateNode> {
        self.children
            .iter()
            .filter(move |c| c.name == name)
            .map(|c| &c.node)
    }

    /// Sets a string attribute.
    pub fn set_str(&mut self, name: &str, value: &str) {
        self.attrs.insert(name.to_string(), value.to_string());
    }

    /// Sets a float attribute.
    pub fn set_f32(&mut self, name: &str, value: f32) {
        self.attrs.insert(name.to_string(), value.to_string());
    }

    /// Sets a boolean attribute.
    pub fn set_bool(&mut self, name: &str, value: bool) {
        self.attrs.insert(name.to_string(), value.to_string());
    }

    /// Sets an unsigned integer attribute.
    pub fn set_usize(&mut self, name: &str, value: usize) {
        self.attrs.insert(name.to_string(), value.to_string());
    }

    /// Reads a string attribute.
    pub fn str_attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// Reads a float attribute, falling back on missing or malformed values.
    pub fn f32_attr(&self, name: &str, default: f32) -> f32 {
        self.attrs
            .get(name)
            .and_then(|s| s.parse().ok())
            .unwrap_or(default)
    }

    /// Reads a boolean attribute, falling back on missing or malformed values.
    pub fn bool_attr(&self, name: &str, default: bool) -> bool {
        self.attrs
            .get(name)
            .and_then(|s| s.parse().ok())
            .unwrap_or(default)
    }

    /// Reads an unsigned integer attribute, falling back on missing or
    /// malformed values.
    pub fn usize_attr(&self, name: &str, default: usize) -> usize {
        self.attrs
            .get(name)
            .and_then(|s| s.parse().ok())
            .unwrap_or(default)
    }

    /// Encodes the tree as TOML text.
    pub fn to_toml(&self) -> Result<String, StateError> {
        Ok(toml::to_string(self)?)
    }

    /// Decodes a tree from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, StateError> {
        Ok(toml::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attrs_round_trip_through_strings() {
        let mut node = StateNode::new();
        node.set_f32("amount", 0.25);
        node.set_bool("bipolar", true);
        node.set_usize("index", 3);
        node.set_str("filter", "ladder");

        assert_eq!(node.f32_attr("amount", 0.0), 0.25);
        assert!(node.bool_attr("bipolar", false));
        assert_eq!(node.usize_attr("index", 0), 3);
        assert_eq!(node.str_attr("filter"), Some("ladder"));
    }

    #[test]
    fn missing_and_malformed_attrs_fall_back() {
        let mut node = StateNode::new();
        node.set_str("amount", "not-a-number");

        assert_eq!(node.f32_attr("amount", 0.5), 0.5);
        assert_eq!(node.f32_attr("absent", 0.7), 0.7);
        assert!(!node.bool_attr("absent", false));
    }

    #[test]
    fn repeated_child_names_are_kept_in_order() {
        let mut node = StateNode::new();
        node.add_child("point").set_f32("x", 0.0);
        node.add_child("point").set_f32("x", 0.5);
        node.add_child("other");
        node.add_child("point").set_f32("x", 1.0);

        let xs: Vec<f32> = node
            .children_named("point")
            .map(|p| p.f32_attr("x", -1.0))
            .collect();
        assert_eq!(xs, vec![0.0, 0.5, 1.0]);
        assert!(node.child("missing").is_none());
    }

    #[test]
    fn toml_round_trip_preserves_tree() {
        let mut root = StateNode::new();
        let filter = root.add_child("filter1");
        filter.set_str("filterName", "comb+");
        let lfo = root.add_child("lfo1");
        let points = lfo.add_child("lineGenerator");
        points.set_usize("numPoints", 2);
        for (x, y) in [(0.0, 0.0), (1.0, 1.0)] {
            let p = points.add_child("point");
            p.set_f32("x", x);
            p.set_f32("y", y);
        }

        let text = root.to_toml().expect("encode");
        let back = StateNode::from_toml(&text).expect("decode");
        assert_eq!(root, back);
    }

    #[test]
    fn garbage_toml_is_an_error() {
        assert!(StateNode::from_toml("= not toml =").is_err());
    }
}
