//! Error types for pipeline construction and frame execution.

use thiserror::Error;

use crate::render_graph::{ChannelName, PassKind};

/// Everything that can go wrong while building or running the pipeline.
///
/// Construction errors are permanent: a pipeline that failed to build is never
/// retried, the host has to re-initialize from scratch. Frame errors abort a
/// single tick and leave the frame driver paused.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The window surface could not be created or configured.
    #[error("Display surface unavailable: {0}")]
    Surface(String),

    /// No adapter is compatible with the surface.
    #[error("No suitable GPU adapter: {0}")]
    Adapter(String),

    /// Device creation failed.
    #[error("Failed to create GPU device: {0}")]
    Device(String),

    /// The adapter lacks something the pipeline cannot run without.
    #[error("Required rendering capability missing: {0}")]
    CapabilityMissing(String),

    /// A GPU program did not compile or link.
    #[error("Failed to build {pass} program: {message}")]
    ProgramBuild { pass: PassKind, message: String },

    /// A program source was never supplied by the loader.
    #[error("Program source '{0}' is not available")]
    MissingSource(String),

    /// Invalid pipeline configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A pass would read the slot it writes.
    #[error("Pass {pass} reads and writes {channel}[{slot}]")]
    Hazard {
        pass: PassKind,
        channel: ChannelName,
        slot: usize,
    },

    /// More render targets requested than the pool can address.
    #[error("Render target pool exhausted: {requested} requested, capacity {capacity}")]
    PoolExhausted { requested: usize, capacity: usize },

    /// A composite target has more attachments than the device allows.
    #[error("Pass {pass} writes {count} color attachments ({bytes} bytes/pixel), limit {max} ({max_bytes} bytes/pixel)")]
    TooManyAttachments {
        pass: PassKind,
        count: usize,
        bytes: u32,
        max: u32,
        max_bytes: u32,
    },

    /// A pass samples more images than one shader stage may bind.
    #[error("Pass {pass} binds {count} input images, limit {max}")]
    TooManyInputs { pass: PassKind, count: usize, max: u32 },

    /// A frame could not be encoded or submitted.
    #[error("Frame aborted: {0}")]
    Frame(String),

    /// Configuration or shader file I/O.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file parse error.
    #[error("Invalid configuration file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PipelineError>;
