//! Scrawl core: pure configuration, notation, keypath and state primitives.
mod config;
mod keypath;
mod notation;
mod state;
mod utility;

pub use config::{
    resolve_range, ActionDescriptor, BrowserSettings, ClickOptions, ConfigError, Count,
    DataHarvest, EngineKind, HarvestValue, LinkHarvest, Modifier, MouseButton, NodeDescriptor,
    NodeEntry, PageDescriptor, PageLink, PageLinkSource, Probe, RangeBound, ReadyState,
    RepeatPolicy, ScrawlConfig,
};
pub use keypath::{assign, get, join, resolve, split, KeypathError};
pub use notation::{
    parse_value, scan_embedded_tokens, Ctx, EmbeddedToken, Max, ParsedNotation, TokenKind,
    UtilityCall,
};
pub use state::{FrameSnapshot, LinkRecord, RunState, VAR_NODE, VAR_NTH, VAR_URL};
pub use utility::{apply_utils, UtilityError};
