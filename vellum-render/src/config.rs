//! Graphics configuration.

use serde::{Deserialize, Serialize};

use crate::recovery::RecoveryConfig;

/// Settings for [`crate::GraphicsDevice::open`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    /// Framebuffer width in pixels.
    pub width: u32,
    /// Framebuffer height in pixels.
    pub height: u32,
    pub recovery: RecoveryConfig,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            recovery: RecoveryConfig::default(),
        }
    }
}
