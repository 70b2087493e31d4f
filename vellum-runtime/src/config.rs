//! Runtime configuration, loaded from JSON.
//!
//! Every field has a default, so `{}` is a valid configuration:
//!
//! ```json
//! {
//!   "graphics": { "width": 800, "height": 600,
//!                 "recovery": { "poll_interval_ms": 50 } },
//!   "atlas": { "page_size": 512, "prewarm": false }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vellum_render::GraphicsConfig;
use vellum_text::AtlasConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub graphics: GraphicsConfig,
    pub atlas: AtlasConfig,
}

impl RuntimeConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_default() {
        let config = RuntimeConfig::from_json_str("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.graphics.recovery.poll_interval_ms, 100);
        assert_eq!(config.graphics.recovery.max_polls_per_frame, 50);
        assert_eq!(config.atlas.page_size, 1024);
        assert_eq!(config.atlas.window, 2048);
        assert!(config.atlas.prewarm);
    }

    #[test]
    fn test_partial_override() {
        let config = RuntimeConfig::from_json_str(
            r#"{ "graphics": { "width": 320, "recovery": { "poll_interval_ms": 5 } },
                 "atlas": { "prewarm": false } }"#,
        )
        .unwrap();
        assert_eq!(config.graphics.width, 320);
        assert_eq!(config.graphics.height, 480);
        assert_eq!(config.graphics.recovery.poll_interval_ms, 5);
        assert_eq!(config.graphics.recovery.max_polls_per_frame, 50);
        assert!(!config.atlas.prewarm);
        assert_eq!(config.atlas.max_pages, 64);
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            RuntimeConfig::from_json_str("{ graphics: 1 }"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vellum.json");
        let config = RuntimeConfig {
            atlas: AtlasConfig {
                page_size: 256,
                ..AtlasConfig::default()
            },
            ..RuntimeConfig::default()
        };
        std::fs::write(&path, config.to_json_pretty().unwrap()).unwrap();
        assert_eq!(RuntimeConfig::from_path(&path).unwrap(), config);
        assert!(matches!(
            RuntimeConfig::from_path(&dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
    }
}
