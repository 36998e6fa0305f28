//! [`GpuBackend`] on top of wgpu.
//!
//! Every pass is a fullscreen triangle drawn by one render pipeline. Uniforms
//! live at `@group(0)`, input textures at `@group(1)` in binding order, and
//! texels are read with `textureLoad`, so no sampler is ever bound.
//!
//! A frame is recorded into a single command encoder inside a validation
//! error scope. Only when every pass encoded cleanly is the command buffer
//! submitted and the surface presented; otherwise the encoder is dropped and
//! no target sees a partial frame.

use crate::error::{PipelineError, Result};
use crate::gpu::GpuContext;
use crate::render_graph::{
    BackendLimits, FormatKind, GpuBackend, OutputLayout, PassKind, PassOutput, PassUniforms, ProgramId,
    ProgramLayout, RenderTarget, RenderTargetHandle, ResolvedPass, TargetDesc,
};

struct Program {
    kind: PassKind,
    pipeline: wgpu::RenderPipeline,
    inputs_layout: wgpu::BindGroupLayout,
}

/// One uniform buffer per pass position, since every queued write lands
/// before the frame's commands run.
struct UniformSlot {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

struct FrameInFlight {
    encoder: wgpu::CommandEncoder,
    surface: wgpu::SurfaceTexture,
    surface_view: wgpu::TextureView,
    passes: usize,
}

pub struct WgpuBackend {
    gpu: GpuContext,
    targets: Vec<RenderTarget>,
    programs: Vec<Program>,
    uniform_layout: wgpu::BindGroupLayout,
    uniforms: Vec<UniformSlot>,
    frame: Option<FrameInFlight>,
}

impl WgpuBackend {
    pub fn new(gpu: GpuContext) -> Self {
        let uniform_layout = gpu
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Pass Uniforms Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });
        Self {
            gpu,
            targets: Vec::new(),
            programs: Vec::new(),
            uniform_layout,
            uniforms: Vec::new(),
            frame: None,
        }
    }

    /// Release every pipeline resource and hand the context back, e.g. to
    /// rebuild after a resize.
    pub fn into_gpu(self) -> GpuContext {
        self.gpu
    }

    fn ensure_uniform_slot(&mut self, index: usize) {
        while self.uniforms.len() <= index {
            let buffer = self.gpu.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Pass Uniforms"),
                size: std::mem::size_of::<PassUniforms>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let bind_group = self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Pass Uniforms Bind Group"),
                layout: &self.uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            });
            self.uniforms.push(UniformSlot { buffer, bind_group });
        }
    }

    fn inputs_layout(&self, layout: &ProgramLayout) -> wgpu::BindGroupLayout {
        let entries: Vec<_> = layout
            .inputs
            .iter()
            .enumerate()
            .map(|(i, (_, format))| wgpu::BindGroupLayoutEntry {
                binding: i as u32,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: match format {
                        FormatKind::HighPrecisionColor => {
                            wgpu::TextureSampleType::Float { filterable: false }
                        }
                        FormatKind::Depth => wgpu::TextureSampleType::Depth,
                    },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            })
            .collect();
        self.gpu
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("{} Inputs Layout", layout.kind)),
                entries: &entries,
            })
    }
}

impl GpuBackend for WgpuBackend {
    fn limits(&self) -> BackendLimits {
        let limits = self.gpu.device.limits();
        BackendLimits {
            max_pass_inputs: limits
                .max_sampled_textures_per_shader_stage
                .min(limits.max_bindings_per_bind_group),
            max_color_attachments: limits.max_color_attachments,
            max_color_attachment_bytes_per_sample: limits.max_color_attachment_bytes_per_sample,
            max_texture_dimension: limits.max_texture_dimension_2d,
        }
    }

    fn resolution(&self) -> (u32, u32) {
        (self.gpu.width(), self.gpu.height())
    }

    fn create_targets(&mut self, targets: &[TargetDesc]) -> Result<()> {
        let device = &self.gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let created: Vec<_> = targets
            .iter()
            .map(|desc| RenderTarget::new(device, desc))
            .collect();
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(PipelineError::CapabilityMissing(format!(
                "render targets could not be created: {err}"
            )));
        }

        self.targets.extend(created);
        tracing::debug!(count = targets.len(), "created render targets");
        Ok(())
    }

    fn build_program(&mut self, layout: &ProgramLayout, source: &str) -> Result<ProgramId> {
        let device = &self.gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let label = format!("{} Program", layout.kind);
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let inputs_layout = self.inputs_layout(layout);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&label),
            bind_group_layouts: &[&self.uniform_layout, &inputs_layout],
            push_constant_ranges: &[],
        });

        let color_targets: Vec<Option<wgpu::ColorTargetState>> = match layout.outputs {
            OutputLayout::Surface => vec![Some(wgpu::ColorTargetState {
                format: self.gpu.config.format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            OutputLayout::Composite { .. } => layout
                .color_formats()
                .into_iter()
                .map(|format| {
                    Some(wgpu::ColorTargetState {
                        format: format.texture_format(),
                        // 32-bit float targets are not blendable
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })
                })
                .collect(),
        };
        let depth_stencil = layout.has_depth().then(|| wgpu::DepthStencilState {
            format: FormatKind::Depth.texture_format(),
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Always,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&label),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs"),
                targets: &color_targets,
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(PipelineError::ProgramBuild {
                pass: layout.kind,
                message: err.to_string(),
            });
        }

        self.programs.push(Program {
            kind: layout.kind,
            pipeline,
            inputs_layout,
        });
        Ok(ProgramId(self.programs.len() - 1))
    }

    fn begin_frame(&mut self) -> Result<()> {
        let surface = match self.gpu.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.gpu.reconfigure();
                return Err(PipelineError::Frame("surface lost, reconfigured".into()));
            }
            Err(err) => return Err(PipelineError::Frame(err.to_string())),
        };
        let surface_view = surface
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.gpu
            .device
            .push_error_scope(wgpu::ErrorFilter::Validation);
        let encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });
        self.frame = Some(FrameInFlight {
            encoder,
            surface,
            surface_view,
            passes: 0,
        });
        Ok(())
    }

    fn encode_pass(&mut self, program: ProgramId, pass: &ResolvedPass) -> Result<()> {
        let index = self
            .frame
            .as_ref()
            .map(|f| f.passes)
            .ok_or_else(|| PipelineError::Frame("pass encoded outside a frame".into()))?;
        self.ensure_uniform_slot(index);

        let Self {
            gpu,
            targets,
            programs,
            uniforms,
            frame,
            ..
        } = self;
        let frame = frame
            .as_mut()
            .ok_or_else(|| PipelineError::Frame("pass encoded outside a frame".into()))?;
        let program = programs
            .get(program.0)
            .ok_or_else(|| PipelineError::Frame(format!("unknown program for {}", pass.label())))?;
        debug_assert_eq!(program.kind, pass.kind);

        let inputs = pass
            .inputs
            .iter()
            .enumerate()
            .map(|(i, input)| {
                Ok(wgpu::BindGroupEntry {
                    binding: i as u32,
                    resource: wgpu::BindingResource::TextureView(target_view(
                        targets,
                        input.handle,
                    )?),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let label = pass.label();
        let input_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&label),
            layout: &program.inputs_layout,
            entries: &inputs,
        });

        let uniforms = &uniforms[index];
        gpu.queue
            .write_buffer(&uniforms.buffer, 0, bytemuck::cast_slice(&[pass.uniforms]));

        let (color_views, depth_view) = match &pass.output {
            PassOutput::Composite(target) => {
                let color = target
                    .color
                    .iter()
                    .map(|(_, handle)| target_view(targets, *handle))
                    .collect::<Result<Vec<_>>>()?;
                let depth = match target.depth {
                    Some((_, handle)) => Some(target_view(targets, handle)?),
                    None => None,
                };
                (color, depth)
            }
            PassOutput::Surface => (vec![&frame.surface_view], None),
        };
        let clear = wgpu::Operations {
            load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
            store: wgpu::StoreOp::Store,
        };
        let color_attachments: Vec<_> = color_views
            .into_iter()
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: clear,
                })
            })
            .collect();
        let depth_stencil_attachment =
            depth_view.map(|view| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            });

        {
            let mut render_pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(&label),
                color_attachments: &color_attachments,
                depth_stencil_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            render_pass.set_pipeline(&program.pipeline);
            render_pass.set_bind_group(0, &uniforms.bind_group, &[]);
            render_pass.set_bind_group(1, &input_group, &[]);
            render_pass.draw(0..3, 0..1);
        }
        frame.passes += 1;
        Ok(())
    }

    fn submit_frame(&mut self) -> Result<()> {
        let frame = self
            .frame
            .take()
            .ok_or_else(|| PipelineError::Frame("submit outside a frame".into()))?;
        let commands = frame.encoder.finish();
        if let Some(err) = pollster::block_on(self.gpu.device.pop_error_scope()) {
            // commands and surface texture are dropped unsubmitted
            return Err(PipelineError::Frame(err.to_string()));
        }
        self.gpu.queue.submit(std::iter::once(commands));
        frame.surface.present();
        Ok(())
    }

    fn discard_frame(&mut self) {
        if self.frame.take().is_some() {
            // close the scope opened by begin_frame; its errors belong to the
            // frame being thrown away
            let _ = pollster::block_on(self.gpu.device.pop_error_scope());
            tracing::warn!("discarded frame");
        }
    }
}

fn target_view(targets: &[RenderTarget], handle: RenderTargetHandle) -> Result<&wgpu::TextureView> {
    targets
        .get(handle.index())
        .map(|t| &t.view)
        .ok_or_else(|| PipelineError::Frame(format!("render target {} not created", handle.index())))
}
