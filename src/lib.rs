//! # svgf
//!
//! **A real-time path tracing pipeline with spatiotemporal variance-guided
//! filtering.**
//!
//! Every frame traces one noisy sample per pixel, blends it with reprojected
//! history, estimates per-pixel variance and runs a few iterations of an
//! edge-avoiding wavelet filter before drawing to the window:
//!
//! ```text
//! trace → accumulate → variance → wavelet × L → draw
//! ```
//!
//! The crate owns the bookkeeping that makes this work: a pool of
//! high-precision render targets, channels that group targets into slot
//! positions, the temporal history rotation, the pass scheduler that binds
//! every pass to the right slots and a frame driver that can be paused.
//! The GPU programs themselves are plain WGSL and can be swapped out.
//!
//! ## Quick Start
//!
//! ```no_run
//! fn main() -> Result<(), svgf::PipelineError> {
//!     svgf::run(svgf::PipelineConfig::new().size(1280, 720))
//! }
//! ```
//!
//! ## Without a window
//!
//! [`PipelineContext`] works with any [`GpuBackend`], so the scheduling logic
//! can be driven and inspected without a GPU:
//!
//! ```ignore
//! let mut ctx = PipelineContext::new(backend, &config, &ShaderSources::embedded())?;
//! let mut driver = FrameDriver::new();
//! driver.tick(&mut ctx, elapsed_seconds);
//! ```

mod app;
mod camera;
mod config;
mod driver;
mod error;
mod gpu;
mod pipeline;
pub mod render_graph;
mod shader_source;

pub use app::run;
pub use camera::{CameraPose, CameraState, OrbitPose, PoseProvider, StaticPose};
pub use config::{CameraMode, ChannelConfig, HistoryTap, PipelineConfig};
pub use driver::{DriverState, FPS_WINDOW, FrameClock, FrameDriver, FrameStatus, TickOutcome};
pub use error::{PipelineError, Result};
pub use gpu::GpuContext;
pub use pipeline::{FrameInfo, PipelineContext};
pub use render_graph::{
    BackendLimits, ChannelName, FormatKind, GpuBackend, PassKind, PassUniforms, ProgramId,
    ProgramLayout, ResolvedPass, WgpuBackend,
};
pub use shader_source::{REQUIRED, ShaderSources, VERTEX};
