//! A backend that records what it is asked to do, for tests.

use crate::error::{PipelineError, Result};
use crate::render_graph::{
    BackendLimits, GpuBackend, PassKind, ProgramId, ProgramLayout, ResolvedPass, TargetDesc,
};

/// Records targets, programs and submitted passes without touching a GPU.
pub struct RecordingBackend {
    width: u32,
    height: u32,
    pub limits: BackendLimits,
    pub targets: Vec<TargetDesc>,
    pub programs: Vec<ProgramLayout>,
    /// Passes of every submitted frame, in submission order.
    pub submitted: Vec<Vec<ResolvedPass>>,
    pub discarded: usize,
    pending: Option<Vec<ResolvedPass>>,
    fail_build: Option<PassKind>,
    fail_encode: Option<PassKind>,
}

impl RecordingBackend {
    pub const LIMITS: BackendLimits = BackendLimits {
        max_pass_inputs: 16,
        max_color_attachments: 8,
        max_color_attachment_bytes_per_sample: 128,
        max_texture_dimension: 8192,
    };

    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            limits: Self::LIMITS,
            targets: Vec::new(),
            programs: Vec::new(),
            submitted: Vec::new(),
            discarded: 0,
            pending: None,
            fail_build: None,
            fail_encode: None,
        }
    }

    /// Make building the program for `kind` fail.
    pub fn fail_build(&mut self, kind: PassKind) {
        self.fail_build = Some(kind);
    }

    /// Make encoding any pass of `kind` fail.
    pub fn fail_encode(&mut self, kind: PassKind) {
        self.fail_encode = Some(kind);
    }

    pub fn heal(&mut self) {
        self.fail_encode = None;
    }

    /// Every pass that reached the GPU, across frames.
    pub fn encoded_passes(&self) -> usize {
        self.submitted.iter().map(Vec::len).sum()
    }

    pub fn last_frame(&self) -> Option<&[ResolvedPass]> {
        self.submitted.last().map(Vec::as_slice)
    }
}

impl GpuBackend for RecordingBackend {
    fn limits(&self) -> BackendLimits {
        self.limits
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn create_targets(&mut self, targets: &[TargetDesc]) -> Result<()> {
        self.targets.extend_from_slice(targets);
        Ok(())
    }

    fn build_program(&mut self, layout: &ProgramLayout, source: &str) -> Result<ProgramId> {
        if self.fail_build == Some(layout.kind) {
            return Err(PipelineError::ProgramBuild {
                pass: layout.kind,
                message: "rejected by test backend".into(),
            });
        }
        assert!(source.contains("struct Uniforms"));
        self.programs.push(layout.clone());
        Ok(ProgramId(self.programs.len() - 1))
    }

    fn begin_frame(&mut self) -> Result<()> {
        assert!(self.pending.is_none(), "frame already open");
        self.pending = Some(Vec::new());
        Ok(())
    }

    fn encode_pass(&mut self, program: ProgramId, pass: &ResolvedPass) -> Result<()> {
        if self.fail_encode == Some(pass.kind) {
            return Err(PipelineError::Frame(format!("{} rejected", pass.label())));
        }
        assert_eq!(self.programs[program.0], pass.layout());
        self.pending
            .as_mut()
            .expect("encode outside a frame")
            .push(pass.clone());
        Ok(())
    }

    fn submit_frame(&mut self) -> Result<()> {
        let passes = self.pending.take().expect("submit outside a frame");
        self.submitted.push(passes);
        Ok(())
    }

    fn discard_frame(&mut self) {
        self.pending = None;
        self.discarded += 1;
    }
}
