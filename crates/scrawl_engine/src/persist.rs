use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::ScrawlError;

/// Notation formats recognized by the loader and the writers, keyed off
/// the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FileKind {
    Json,
    Yaml,
}

impl FileKind {
    pub(crate) fn for_path(path: &Path) -> Result<Self, ScrawlError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("yaml") | Some("yml") => Ok(Self::Yaml),
            _ => Err(ScrawlError::UnsupportedFileType(path.to_path_buf())),
        }
    }
}

/// Serializes `state` to `path`, picking the format from the extension.
/// The write is atomic: content goes to a sibling temp file which then
/// replaces the target.
pub fn write_state<T: Serialize>(path: &Path, state: &T) -> Result<PathBuf, ScrawlError> {
    let kind = FileKind::for_path(path)?;
    let content = match kind {
        FileKind::Json => serde_json::to_string_pretty(state)
            .map_err(|err| ScrawlError::Serialize(err.to_string()))?,
        FileKind::Yaml => {
            serde_yml::to_string(state).map_err(|err| ScrawlError::Serialize(err.to_string()))?
        }
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent)?;
            parent.to_path_buf()
        }
        _ => PathBuf::from("."),
    };
    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.flush()?;
    tmp.as_file_mut().sync_all()?;
    if path.exists() {
        fs::remove_file(path)?;
    }
    tmp.persist(path).map_err(|err| ScrawlError::Io(err.error))?;
    Ok(path.to_path_buf())
}
