//! Pipeline configuration.
//!
//! Every field has a default, so a configuration file only needs to list what
//! it changes:
//!
//! ```json
//! { "filter_levels": 3, "history_tap": "final", "camera": "orbit" }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::render_graph::{ChannelName, FormatKind, MAX_FILTER_LEVELS, SLOT_COUNT};

/// Which stage's output becomes next frame's temporal history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryTap {
    /// The unfiltered accumulate output.
    Accumulated,
    /// The output of one wavelet iteration (0-indexed).
    Iteration(u32),
    /// The most filtered result.
    Final,
}

/// Camera trajectory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraMode {
    Static,
    Orbit,
}

/// Slot layout of one channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: ChannelName,
    /// Number of roles; 1 means produced by the trace pass only.
    pub slots: usize,
    pub format: FormatKind,
}

impl ChannelConfig {
    pub fn color(name: ChannelName, slots: usize) -> Self {
        Self {
            name,
            slots,
            format: FormatKind::HighPrecisionColor,
        }
    }

    pub fn depth(name: ChannelName, slots: usize) -> Self {
        Self {
            name,
            slots,
            format: FormatKind::Depth,
        }
    }
}

/// Configuration for the window and the pass graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Number of wavelet iterations; iteration `i` uses step size `2^i`.
    pub filter_levels: u32,
    /// Without the variance pass, the first wavelet iteration reads the
    /// accumulate output in the current slot, so `history_tap` must not be
    /// `Iteration(0)` (the default).
    pub variance_pass: bool,
    pub history_tap: HistoryTap,
    /// Channels read by the draw pass.
    pub composite_channels: Vec<ChannelName>,
    /// Registered in order; this order is also attachment order.
    pub channels: Vec<ChannelConfig>,
    /// Capacity of the render target pool.
    pub max_render_targets: usize,
    pub samples_per_frame: u32,
    pub camera: CameraMode,
    /// Directory with `.wgsl` program overrides.
    pub shader_dir: Option<PathBuf>,
    /// Mixed into every frame's random seed.
    pub seed: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            title: "SVGF".to_string(),
            width: 800,
            height: 600,
            filter_levels: 5,
            variance_pass: true,
            history_tap: HistoryTap::Iteration(0),
            composite_channels: vec![ChannelName::Direct, ChannelName::Indirect],
            channels: vec![
                ChannelConfig::color(ChannelName::History, 3),
                ChannelConfig::color(ChannelName::Direct, 4),
                ChannelConfig::color(ChannelName::Indirect, 4),
                ChannelConfig::color(ChannelName::MeshId, 4),
                ChannelConfig::color(ChannelName::Normal, 4),
                ChannelConfig::color(ChannelName::Moment, 4),
                ChannelConfig::color(ChannelName::Motion, 1),
                ChannelConfig::depth(ChannelName::Depth, 4),
            ],
            max_render_targets: 32,
            samples_per_frame: 1,
            camera: CameraMode::Static,
            shader_dir: None,
            seed: 0,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file; missing fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        tracing::info!(path = %path.as_ref().display(), "loaded configuration");
        Ok(config)
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn filter_levels(mut self, levels: u32) -> Self {
        self.filter_levels = levels;
        self
    }

    pub fn variance_pass(mut self, enabled: bool) -> Self {
        self.variance_pass = enabled;
        self
    }

    pub fn history_tap(mut self, tap: HistoryTap) -> Self {
        self.history_tap = tap;
        self
    }

    pub fn channels(mut self, channels: Vec<ChannelConfig>) -> Self {
        self.channels = channels;
        self
    }

    pub fn composite_channels(mut self, channels: Vec<ChannelName>) -> Self {
        self.composite_channels = channels;
        self
    }

    pub fn max_render_targets(mut self, capacity: usize) -> Self {
        self.max_render_targets = capacity;
        self
    }

    pub fn camera(mut self, mode: CameraMode) -> Self {
        self.camera = mode;
        self
    }

    pub fn shader_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shader_dir = Some(dir.into());
        self
    }

    /// Reject configurations that cannot produce a pass graph.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(PipelineError::Config(format!(
                "resolution {}x{} is empty",
                self.width, self.height
            )));
        }
        if self.filter_levels > MAX_FILTER_LEVELS {
            return Err(PipelineError::Config(format!(
                "{} filter levels requested, at most {MAX_FILTER_LEVELS} supported",
                self.filter_levels
            )));
        }
        if let HistoryTap::Iteration(i) = self.history_tap {
            if i >= self.filter_levels {
                return Err(PipelineError::Config(format!(
                    "history tap at iteration {i} but only {} filter levels",
                    self.filter_levels
                )));
            }
        }
        if !self.variance_pass && self.history_tap == HistoryTap::Iteration(0) {
            return Err(PipelineError::Config(
                "variance_pass = false needs a history_tap other than iteration 0: \
                 the first wavelet iteration would read and write the current slot"
                    .into(),
            ));
        }
        if self.samples_per_frame == 0 {
            return Err(PipelineError::Config("samples_per_frame must be at least 1".into()));
        }
        if self.composite_channels.is_empty() {
            return Err(PipelineError::Config("no composite channels".into()));
        }
        for name in &self.composite_channels {
            if !self.channels.iter().any(|c| c.name == *name) {
                return Err(PipelineError::Config(format!(
                    "composite channel {name} is not registered"
                )));
            }
        }
        if let Some(c) = self.channels.iter().find(|c| c.slots > SLOT_COUNT) {
            return Err(PipelineError::Config(format!(
                "channel {} has {} slots, at most {SLOT_COUNT}",
                c.name, c.slots
            )));
        }
        Ok(())
    }
}
