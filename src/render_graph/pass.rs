//! Pass descriptions and the program binding contract.
//!
//! A [`ResolvedPass`] is one program invocation with every binding already
//! mapped to a pooled target. Passes are rebuilt every frame because history
//! slots rotate, so nothing here is cached across frames.

use std::fmt;
use std::fmt::Write as _;

use crate::render_graph::{
    ChannelName, CompositeTarget, FormatKind, RenderTargetHandle, SlotRole,
};

/// The GPU programs run each frame, in dependency order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PassKind {
    Trace,
    Accumulate,
    Variance,
    Wavelet,
    Draw,
}

impl PassKind {
    /// Name of the program source implementing this pass.
    pub fn source_name(self) -> &'static str {
        match self {
            PassKind::Trace => "tracer",
            PassKind::Accumulate => "accumulate",
            PassKind::Variance => "variance",
            PassKind::Wavelet => "wavelet",
            PassKind::Draw => "draw",
        }
    }
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source_name())
    }
}

/// Uniforms shared by every program.
///
/// Bound at `@group(0) @binding(0)`. The layout matches the generated WGSL
/// `Uniforms` struct (16-byte aligned, matrices as padded columns).
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PassUniforms {
    pub resolution: [f32; 2],
    pub resolution_inverse: [f32; 2],
    pub camera_pos: [f32; 3],
    /// Per-frame seed for the trace program.
    pub random_seed: u32,
    pub prev_camera_pos: [f32; 3],
    /// Samples accumulated so far, including this frame's.
    pub sample_count: u32,
    pub camera_rot: [[f32; 4]; 3],
    /// Inverse of the previous frame's rotation, for reprojection.
    pub prev_camera_rot_inv: [[f32; 4]; 3],
    pub frame: u32,
    /// Wavelet tap spacing in texels; 0 outside the filter passes.
    pub step_size: f32,
    /// 1 when history slots hold a previous frame's data.
    pub history_valid: u32,
    pub _padding: u32,
}

/// One texture input of a pass.
#[derive(Clone, Debug, PartialEq)]
pub struct InputBinding {
    /// `<prefix>_<channel>`, the identifier programs use.
    pub name: String,
    pub channel: ChannelName,
    /// What the bound slot holds this frame.
    pub role: SlotRole,
    pub slot: usize,
    pub handle: RenderTargetHandle,
    pub format: FormatKind,
}

/// Where a pass writes.
#[derive(Clone, Debug, PartialEq)]
pub enum PassOutput {
    Composite(CompositeTarget),
    /// The display surface; nothing reads it back.
    Surface,
}

impl PassOutput {
    pub fn slot(&self) -> Option<usize> {
        match self {
            PassOutput::Composite(target) => Some(target.slot),
            PassOutput::Surface => None,
        }
    }
}

/// A fully bound pass for the current frame.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedPass {
    pub kind: PassKind,
    /// Filter iteration, for wavelet passes.
    pub iteration: Option<u32>,
    pub inputs: Vec<InputBinding>,
    pub output: PassOutput,
    pub uniforms: PassUniforms,
}

impl ResolvedPass {
    pub fn label(&self) -> String {
        match self.iteration {
            Some(i) => format!("{}[{}]", self.kind, i),
            None => self.kind.to_string(),
        }
    }

    /// The binding shape a program must have to run this pass.
    pub fn layout(&self) -> ProgramLayout {
        ProgramLayout {
            kind: self.kind,
            inputs: self
                .inputs
                .iter()
                .map(|b| (b.name.clone(), b.format))
                .collect(),
            outputs: match &self.output {
                PassOutput::Composite(target) => OutputLayout::Composite {
                    color: target.color.iter().map(|(name, _)| *name).collect(),
                    depth: target.depth.map(|(name, _)| name),
                },
                PassOutput::Surface => OutputLayout::Surface,
            },
        }
    }

    pub fn input(&self, name: &str) -> Option<&InputBinding> {
        self.inputs.iter().find(|b| b.name == name)
    }
}

/// Output attachments of a program.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum OutputLayout {
    Composite {
        color: Vec<ChannelName>,
        depth: Option<ChannelName>,
    },
    Surface,
}

/// Binding shape of a program; one compiled pipeline exists per layout.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProgramLayout {
    pub kind: PassKind,
    pub inputs: Vec<(String, FormatKind)>,
    pub outputs: OutputLayout,
}

impl ProgramLayout {
    pub fn color_formats(&self) -> Vec<FormatKind> {
        match &self.outputs {
            OutputLayout::Composite { color, .. } => {
                vec![FormatKind::HighPrecisionColor; color.len()]
            }
            OutputLayout::Surface => Vec::new(),
        }
    }

    pub fn has_depth(&self) -> bool {
        matches!(
            self.outputs,
            OutputLayout::Composite { depth: Some(_), .. }
        )
    }

    /// WGSL declarations every program of this layout is compiled against.
    ///
    /// Programs refer to uniforms as `u.<field>`, to inputs by binding name
    /// and return `Outputs` with one field per written channel.
    pub fn prelude(&self) -> String {
        let mut src = String::new();
        let _ = writeln!(src, "// bindings for the {} pass", self.kind);
        src.push_str(UNIFORMS_WGSL);
        for (i, (name, format)) in self.inputs.iter().enumerate() {
            let ty = match format {
                FormatKind::HighPrecisionColor => "texture_2d<f32>",
                FormatKind::Depth => "texture_depth_2d",
            };
            let _ = writeln!(src, "@group(1) @binding({i}) var {name}: {ty};");
        }
        if let OutputLayout::Composite { color, depth } = &self.outputs {
            src.push_str("struct Outputs {\n");
            for (location, name) in color.iter().enumerate() {
                let _ = writeln!(src, "    @location({location}) {name}: vec4f,");
            }
            if let Some(name) = depth {
                let _ = writeln!(src, "    @builtin(frag_depth) {name}: f32,");
            }
            src.push_str("}\n");
        }
        src
    }
}

const UNIFORMS_WGSL: &str = "struct Uniforms {
    resolution: vec2f,
    resolution_inverse: vec2f,
    camera_pos: vec3f,
    random_seed: u32,
    prev_camera_pos: vec3f,
    sample_count: u32,
    camera_rot: mat3x3f,
    prev_camera_rot_inv: mat3x3f,
    frame: u32,
    step_size: f32,
    history_valid: u32,
}
@group(0) @binding(0) var<uniform> u: Uniforms;
";
