use std::fs;
use std::path::Path;

use crate::error::ScrawlError;
use crate::persist::FileKind;
use scrawl_core::{ConfigError, ScrawlConfig};

/// Reads and validates a configuration file. YAML (`.yaml`/`.yml`) and
/// JSON (`.json`) are accepted; anything else is rejected before the file
/// is opened.
pub fn load_config(path: impl AsRef<Path>) -> Result<ScrawlConfig, ScrawlError> {
    let path = path.as_ref();
    let kind = FileKind::for_path(path)?;
    let content = fs::read_to_string(path)?;
    let config: ScrawlConfig = match kind {
        FileKind::Json => serde_json::from_str(&content)
            .map_err(|err| ConfigError::Shape(err.to_string()))?,
        FileKind::Yaml => {
            serde_yml::from_str(&content).map_err(|err| ConfigError::Shape(err.to_string()))?
        }
    };
    config.validate()?;
    Ok(config)
}
