//! The backend seam between pass scheduling and the graphics API.

use crate::error::Result;
use crate::render_graph::{ProgramLayout, ResolvedPass, TargetDesc};

/// Identifies a program built by a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramId(pub usize);

/// Device limits the scheduler checks passes against at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackendLimits {
    /// Images one pass may read.
    pub max_pass_inputs: u32,
    pub max_color_attachments: u32,
    pub max_color_attachment_bytes_per_sample: u32,
    /// Largest width or height of one render target.
    pub max_texture_dimension: u32,
}

/// A graphics backend able to run resolved passes.
///
/// The scheduler drives a frame as `begin_frame`, one `encode_pass` per pass
/// in dependency order, then `submit_frame`. If anything fails in between it
/// calls `discard_frame` instead, and the backend must drop every command
/// recorded since `begin_frame` so no target observes a partial frame.
///
/// # Implementing a backend
///
/// ```ignore
/// impl GpuBackend for MyBackend {
///     fn encode_pass(&mut self, program: ProgramId, pass: &ResolvedPass) -> Result<()> {
///         let pipeline = &self.pipelines[program.0];
///         // bind pass.inputs in order at group 1, pass.uniforms at group 0,
///         // attach the composite output and draw a fullscreen triangle
///         Ok(())
///     }
///     // ...
/// }
/// ```
pub trait GpuBackend {
    fn limits(&self) -> BackendLimits;

    /// Resolution of the display surface, read once per pipeline.
    fn resolution(&self) -> (u32, u32);

    /// Materialize pooled targets, in allocation order.
    fn create_targets(&mut self, targets: &[TargetDesc]) -> Result<()>;

    /// Compile and link a program for `layout`.
    ///
    /// Fails with [`PipelineError::ProgramBuild`](crate::PipelineError::ProgramBuild)
    /// when the source is rejected.
    fn build_program(&mut self, layout: &ProgramLayout, source: &str) -> Result<ProgramId>;

    fn begin_frame(&mut self) -> Result<()>;

    fn encode_pass(&mut self, program: ProgramId, pass: &ResolvedPass) -> Result<()>;

    /// Submit everything recorded since `begin_frame` and present.
    fn submit_frame(&mut self) -> Result<()>;

    /// Drop everything recorded since `begin_frame`.
    fn discard_frame(&mut self);
}

impl<B: GpuBackend + ?Sized> GpuBackend for &mut B {
    fn limits(&self) -> BackendLimits {
        (**self).limits()
    }

    fn resolution(&self) -> (u32, u32) {
        (**self).resolution()
    }

    fn create_targets(&mut self, targets: &[TargetDesc]) -> Result<()> {
        (**self).create_targets(targets)
    }

    fn build_program(&mut self, layout: &ProgramLayout, source: &str) -> Result<ProgramId> {
        (**self).build_program(layout, source)
    }

    fn begin_frame(&mut self) -> Result<()> {
        (**self).begin_frame()
    }

    fn encode_pass(&mut self, program: ProgramId, pass: &ResolvedPass) -> Result<()> {
        (**self).encode_pass(program, pass)
    }

    fn submit_frame(&mut self) -> Result<()> {
        (**self).submit_frame()
    }

    fn discard_frame(&mut self) {
        (**self).discard_frame()
    }
}
