use std::path::PathBuf;

use thiserror::Error;

use crate::capability::CapabilityError;
use scrawl_core::{ConfigError, KeypathError, UtilityError};

/// Everything a run can fail with. Validation errors surface before any
/// browser resource exists; runtime errors propagate only after the
/// session has been released.
#[derive(Debug, Error)]
pub enum ScrawlError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("unsupported file type: {}", .0.display())]
    UnsupportedFileType(PathBuf),
    #[error("notation error: {0}")]
    Notation(String),
    #[error("the `{0}` action is not supported")]
    UnsupportedAction(String),
    #[error("timed out after {timeout_ms}ms waiting for `{selector}`")]
    ElementTimeout { selector: String, timeout_ms: u64 },
    #[error(transparent)]
    Keypath(#[from] KeypathError),
    #[error(transparent)]
    Utility(#[from] UtilityError),
    #[error(transparent)]
    Capability(#[from] CapabilityError),
    #[error("failed to serialize state: {0}")]
    Serialize(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
