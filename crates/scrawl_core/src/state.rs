use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::keypath;

/// Scope key holding the current page URL.
pub const VAR_URL: &str = "_url";
/// Scope key holding the current node label, frame-local.
pub const VAR_NODE: &str = "_node";
/// Scope key holding the current match index, frame-local.
pub const VAR_NTH: &str = "_nth";

/// One harvested link: a URL plus the metadata that seeds `vars` when the
/// link is later visited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub url: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl LinkRecord {
    pub fn bare(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            metadata: Map::new(),
        }
    }
}

/// Saved values of the frame-local scope keys, restored when a traversal
/// branch returns control so siblings never observe each other's values.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSnapshot {
    node: Option<Value>,
    nth: Option<Value>,
}

/// The three-namespace run state: `data` (nested result tree), `vars`
/// (flat scope, replaced wholesale per page visit) and `links` (named
/// append-only registries of harvested link records).
#[derive(Debug, Clone, PartialEq)]
pub struct RunState {
    data: Value,
    vars: Map<String, Value>,
    links: BTreeMap<String, Vec<LinkRecord>>,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            data: Value::Object(Map::new()),
            vars: Map::new(),
            links: BTreeMap::new(),
        }
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn vars(&self) -> &Map<String, Value> {
        &self.vars
    }

    pub fn links(&self) -> &BTreeMap<String, Vec<LinkRecord>> {
        &self.links
    }

    /// The link registries as a serializable value tree.
    pub fn links_value(&self) -> Value {
        serde_json::to_value(&self.links).unwrap_or(Value::Null)
    }

    pub fn var(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn set_var(&mut self, name: &str, value: Value) {
        self.vars.insert(name.to_string(), value);
    }

    /// Replaces the whole `vars` scope with the visited link's metadata,
    /// seeded with `_url`. Deliberately not a merge.
    pub fn reset_vars_for_page(&mut self, metadata: Map<String, Value>, url: &str) {
        self.vars = metadata;
        self.vars
            .insert(VAR_URL.to_string(), Value::String(url.to_string()));
    }

    pub fn append_link(&mut self, name: &str, record: LinkRecord) {
        self.links.entry(name.to_string()).or_default().push(record);
    }

    /// The current contents of a named link registry; empty if absent.
    pub fn named_links(&self, name: &str) -> &[LinkRecord] {
        self.links.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Merge-assigns `value` into the data tree at already-resolved
    /// segments.
    pub fn merge_data(&mut self, segments: &[String], value: Value) {
        keypath::assign(&mut self.data, segments, value, true);
    }

    /// Resolves a destination keypath against the data tree and the
    /// current scope.
    pub fn resolve_scope(
        &self,
        path: &str,
        strict: bool,
    ) -> Result<Vec<String>, keypath::KeypathError> {
        keypath::resolve(&self.data, path, &self.vars, strict)
    }

    pub fn frame_snapshot(&self) -> FrameSnapshot {
        FrameSnapshot {
            node: self.vars.get(VAR_NODE).cloned(),
            nth: self.vars.get(VAR_NTH).cloned(),
        }
    }

    pub fn set_frame_node(&mut self, label: &str) {
        self.vars
            .insert(VAR_NODE.to_string(), Value::String(label.to_string()));
    }

    pub fn set_frame_nth(&mut self, index: usize) {
        self.vars.insert(VAR_NTH.to_string(), Value::from(index));
    }

    pub fn restore_frame(&mut self, snapshot: FrameSnapshot) {
        match snapshot.node {
            Some(value) => self.vars.insert(VAR_NODE.to_string(), value),
            None => self.vars.shift_remove(VAR_NODE),
        };
        match snapshot.nth {
            Some(value) => self.vars.insert(VAR_NTH.to_string(), value),
            None => self.vars.shift_remove(VAR_NTH),
        };
    }
}
