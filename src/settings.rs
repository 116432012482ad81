//! Engine Settings
//!
//! Tunables shared by the repository, the traversal and the render loop.
//!
//! ```rust,ignore
//! use vizgraph::settings::EngineSettings;
//!
//! let settings = EngineSettings {
//!     lock_timeout_ms: 50,
//!     ..Default::default()
//! };
//!
//! // Or from a JSON document; missing fields keep their defaults.
//! let settings = EngineSettings::from_json_str(r#"{ "pick": { "window_radius": 4 } }"#)?;
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Upper bound on any wait for the repository or a node lock.
    pub lock_timeout_ms: u64,
    /// Render a second, transparent pass after the opaque one.
    pub transparency_pass: bool,
    pub pick: PickSettings,
    pub depth_levels: DepthLevelSettings,
    pub drag: DragSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 200,
            transparency_pass: true,
            pick: PickSettings::default(),
            depth_levels: DepthLevelSettings::default(),
            drag: DragSettings::default(),
        }
    }
}

impl EngineSettings {
    /// Parses settings from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads settings from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    #[inline]
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Pick-pass limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PickSettings {
    /// Maximum depth of the pick-name stack. Deeper pushes are counted but
    /// not recorded.
    pub name_stack_len: usize,
    /// Maximum number of name stacks stored per pick pass. Bounded by the
    /// 12 bits the color encoding reserves for the stack index.
    pub stored_stack_count: usize,
    /// Half-size of the pick window around the cursor, in pixels.
    pub window_radius: i32,
}

impl Default for PickSettings {
    fn default() -> Self {
        Self {
            name_stack_len: 32,
            stored_stack_count: crate::pick::MAX_STORED_STACKS,
            window_radius: 2,
        }
    }
}

/// Layout of the depth range into discrete depth levels.
///
/// Level `i` maps to `near = origin - i * width` and `far = near + width - gap`,
/// so negative levels lie in front of the standard scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthLevelSettings {
    pub count: u32,
}

impl Default for DepthLevelSettings {
    fn default() -> Self {
        Self { count: 21 }
    }
}

impl DepthLevelSettings {
    #[inline]
    #[must_use]
    pub fn width(&self) -> f64 {
        1.0 / f64::from(self.count.max(1))
    }

    #[inline]
    #[must_use]
    pub fn gap(&self) -> f64 {
        0.05 * self.width()
    }

    #[inline]
    #[must_use]
    pub fn origin(&self) -> f64 {
        f64::from(self.count.max(1) >> 1) * self.width()
    }
}

/// Drag channel and mouse smoothing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DragSettings {
    /// Number of independent drag channels per scene.
    pub channel_count: usize,
    /// Smooth mouse steps with a Gaussian-weighted moving average.
    pub smooth_mouse: bool,
    /// Number of past mouse samples kept for smoothing.
    pub smooth_queue_len: usize,
    /// Standard deviation of the smoothing kernel, in seconds.
    pub smooth_time: f64,
}

impl Default for DragSettings {
    fn default() -> Self {
        Self {
            channel_count: 4,
            smooth_mouse: true,
            smooth_queue_len: 5,
            smooth_time: 0.05,
        }
    }
}
