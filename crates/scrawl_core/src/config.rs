use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

use crate::state::LinkRecord;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Shape(String),
    #[error("invalid configuration value at {path}: {message}")]
    Value { path: String, message: String },
}

/// Validated, immutable configuration tree for one run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScrawlConfig {
    #[serde(default)]
    pub browser: BrowserSettings,
    #[serde(default)]
    pub scrawl: Vec<PageDescriptor>,
    #[serde(default)]
    pub logging: bool,
}

impl ScrawlConfig {
    /// Checks the constraints serde cannot express. Runs before any
    /// browser resource is acquired.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (page_index, page) in self.scrawl.iter().enumerate() {
            let page_path = format!("scrawl.{page_index}");
            if let Some(RepeatPolicy::While(probe)) = &page.repeat {
                if probe.exists.is_none() && probe.disabled.is_none() {
                    return Err(ConfigError::Value {
                        path: format!("{page_path}.repeat.while"),
                        message: "expected at least one of `exists` or `disabled`".into(),
                    });
                }
                if probe.selector.is_empty() {
                    return Err(ConfigError::Value {
                        path: format!("{page_path}.repeat.while.selector"),
                        message: "expected a non-empty selector".into(),
                    });
                }
            }
            validate_nodes(&page.nodes, &format!("{page_path}.nodes"))?;
        }
        Ok(())
    }
}

fn validate_nodes(nodes: &[NodeEntry], path: &str) -> Result<(), ConfigError> {
    for (index, entry) in nodes.iter().enumerate() {
        match entry {
            NodeEntry::One(node) => validate_node(node, &format!("{path}.{index}"))?,
            NodeEntry::Alternatives(alternatives) => {
                for (alt_index, node) in alternatives.iter().enumerate() {
                    validate_node(node, &format!("{path}.{index}.{alt_index}"))?;
                }
            }
        }
    }
    Ok(())
}

fn validate_node(node: &NodeDescriptor, path: &str) -> Result<(), ConfigError> {
    if node.selector.is_empty() {
        return Err(ConfigError::Value {
            path: format!("{path}.selector"),
            message: "expected a non-empty selector".into(),
        });
    }
    if let Some(range) = &node.range {
        if range.len() > 3 {
            return Err(ConfigError::Value {
                path: format!("{path}.range"),
                message: "expected at most three entries (start, stop, step)".into(),
            });
        }
        for (index, bound) in range.iter().enumerate() {
            if let RangeBound::Open(token) = bound {
                if token != "_" {
                    return Err(ConfigError::Value {
                        path: format!("{path}.range.{index}"),
                        message: format!("expected an integer or `_`, got `{token}`"),
                    });
                }
            }
        }
    }
    for (index, action) in node.actions.iter().enumerate() {
        if action.kind.is_empty() {
            return Err(ConfigError::Value {
                path: format!("{path}.actions.{index}.type"),
                message: "expected a non-empty action type".into(),
            });
        }
    }
    validate_nodes(&node.nodes, &format!("{path}.nodes"))
}

/// Browser session settings. The engine kind is a closed enum; unknown
/// kinds are rejected at deserialization time.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BrowserSettings {
    #[serde(default, rename = "type")]
    pub engine: EngineKind,
    #[serde(default)]
    pub show: bool,
    #[serde(default)]
    pub viewport: Option<[u32; 2]>,
    #[serde(default)]
    pub block: Vec<String>,
    #[serde(default)]
    pub ready_on: Option<ReadyState>,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub slowdown: Option<u64>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            engine: EngineKind::default(),
            show: false,
            viewport: None,
            block: Vec::new(),
            ready_on: None,
            timeout: None,
            slowdown: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadyState {
    Load,
    DomContentLoaded,
    NetworkIdle,
    Commit,
}

/// One page to visit: a link source, an optional repeat policy and the
/// node descriptors to interact with.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PageDescriptor {
    pub link: PageLink,
    #[serde(default)]
    pub repeat: Option<RepeatPolicy>,
    #[serde(default)]
    pub nodes: Vec<NodeEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PageLink {
    Many(Vec<PageLinkSource>),
    One(PageLinkSource),
}

/// A literal URL, a `$name` back-reference to a harvested link registry,
/// or an explicit `{url, metadata}` record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PageLinkSource {
    Url(String),
    Record(LinkRecord),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub enum RepeatPolicy {
    #[serde(rename = "times")]
    Times(u32),
    #[serde(rename = "while")]
    While(Probe),
}

/// Continuation probe for `while` repeats. Both criteria, when present,
/// are OR-ed: either one being satisfied triggers another round.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Probe {
    pub selector: String,
    #[serde(default)]
    pub exists: Option<bool>,
    #[serde(default)]
    pub disabled: Option<bool>,
}

/// A node list entry: one descriptor, or a list of alternatives where the
/// first descriptor yielding matches is used for that position.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum NodeEntry {
    Alternatives(Vec<NodeDescriptor>),
    One(NodeDescriptor),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NodeDescriptor {
    pub selector: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub contains: Option<String>,
    #[serde(default)]
    pub excludes: Option<String>,
    /// Appearance-wait timeout in milliseconds; exceeding it is fatal.
    #[serde(default)]
    pub wait: Option<u64>,
    #[serde(default)]
    pub range: Option<Vec<RangeBound>>,
    /// Interact with all matches instead of only the first.
    #[serde(default)]
    pub all: bool,
    /// Scroll each element into view before interacting.
    #[serde(default)]
    pub show: bool,
    #[serde(default)]
    pub actions: Vec<ActionDescriptor>,
    #[serde(default)]
    pub links: Vec<LinkHarvest>,
    #[serde(default)]
    pub data: Vec<DataHarvest>,
    #[serde(default)]
    pub nodes: Vec<NodeEntry>,
}

/// A numeric range bound; the string `_` means "unbounded at this
/// position".
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RangeBound {
    Index(usize),
    Open(String),
}

/// Resolves a `(start, stop, step)` window against `max` matches. Missing
/// or `_` positions default to `(0, max, 1)`.
pub fn resolve_range(range: &[RangeBound], max: usize) -> (usize, usize, usize) {
    let bound = |position: usize, fallback: usize| match range.get(position) {
        Some(RangeBound::Index(value)) => *value,
        _ => fallback,
    };
    (bound(0, 0), bound(1, max), bound(2, 1))
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActionDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub count: Count,
    /// Milliseconds to wait before each repetition.
    #[serde(default)]
    pub delay: Option<u64>,
    /// Milliseconds to wait after each repetition.
    #[serde(default)]
    pub wait: Option<u64>,
    /// Screenshot path expression, evaluated before the action runs.
    #[serde(default)]
    pub screenshot: Option<String>,
    /// Dispatch the action type as a raw event instead of a native
    /// interaction.
    #[serde(default)]
    pub dispatch: bool,
    #[serde(default)]
    pub options: ClickOptions,
}

/// Repetition count: a literal, or a notation expression resolved against
/// the current scope.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Count {
    Literal(u32),
    Expression(String),
}

impl Default for Count {
    fn default() -> Self {
        Count::Literal(1)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ClickOptions {
    #[serde(default)]
    pub button: Option<MouseButton>,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Modifier {
    Alt,
    Control,
    Meta,
    Shift,
}

/// Harvest link records into a named registry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LinkHarvest {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Harvest a value into the data tree at a keypath destination.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DataHarvest {
    pub scope: String,
    pub value: HarvestValue,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum HarvestValue {
    One(String),
    Many(Vec<String>),
    Map(BTreeMap<String, String>),
}
