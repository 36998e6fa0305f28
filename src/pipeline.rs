//! The assembled pipeline: every piece of per-pipeline state in one place.

use glam::Mat3;

use crate::camera::{CameraPose, CameraState, OrbitPose, StaticPose};
use crate::config::{CameraMode, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::render_graph::{
    ChannelRegistry, GpuBackend, PassScheduler, PassUniforms, RenderTargetPool, TemporalHistory,
};
use crate::shader_source::ShaderSources;

/// Per-frame inputs supplied by the frame driver.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameInfo {
    /// Seconds since the driver started.
    pub time: f32,
    /// 0 for the first rendered frame.
    pub frame: u64,
    /// Samples accumulated so far, including this frame's.
    pub sample_count: u32,
}

/// Owns the backend, target pool, channel registry, scheduler, temporal
/// history and camera of one pipeline.
///
/// A pipeline is built for a fixed resolution; a resize means building a new
/// one.
pub struct PipelineContext<B: GpuBackend> {
    backend: B,
    pool: RenderTargetPool,
    registry: ChannelRegistry,
    scheduler: PassScheduler,
    history: TemporalHistory,
    camera: CameraState,
    samples_per_frame: u32,
    seed: u32,
}

impl<B: GpuBackend> PipelineContext<B> {
    /// Build the whole pipeline, or nothing.
    ///
    /// Refuses to start until every program source is present, then
    /// registers channels, validates the pass graph, builds every program and
    /// finally materializes the targets.
    pub fn new(mut backend: B, config: &PipelineConfig, sources: &ShaderSources) -> Result<Self> {
        sources.require_all()?;
        config.validate()?;

        let (width, height) = backend.resolution();
        if width == 0 || height == 0 {
            return Err(PipelineError::Surface(format!(
                "surface is {width}x{height}"
            )));
        }
        let max = backend.limits().max_texture_dimension;
        if width > max || height > max {
            return Err(PipelineError::CapabilityMissing(format!(
                "{width}x{height} targets exceed the device limit of {max}"
            )));
        }

        let mut pool = RenderTargetPool::new(width, height, config.max_render_targets);
        let mut registry = ChannelRegistry::new();
        for channel in &config.channels {
            registry.register(&mut pool, channel.name, channel.slots, channel.format)?;
        }
        let history = TemporalHistory::new(&registry);

        let mut scheduler = PassScheduler::new(config);
        scheduler.build_programs(&mut backend, &registry, &history, sources)?;
        backend.create_targets(pool.targets())?;

        let camera = match config.camera {
            CameraMode::Static => CameraState::new(StaticPose::default()),
            CameraMode::Orbit => CameraState::new(OrbitPose::default()),
        };

        tracing::info!(
            width,
            height,
            channels = registry.channels().len(),
            targets = pool.len(),
            filter_levels = scheduler.filter_levels(),
            "pipeline constructed"
        );

        Ok(Self {
            backend,
            pool,
            registry,
            scheduler,
            history,
            camera,
            samples_per_frame: config.samples_per_frame,
            seed: config.seed,
        })
    }

    /// Render one frame: advance the camera, run every pass, rotate history.
    ///
    /// On failure nothing is submitted and history is marked invalid, since
    /// the camera has already moved past the pose it was written from.
    pub fn render_frame(&mut self, frame: FrameInfo) -> Result<usize> {
        let span = tracing::debug_span!("frame", frame = frame.frame);
        let _enter = span.enter();

        let (current, previous) = self.camera.advance(frame.time);
        let uniforms = self.uniforms(&frame, current, previous);
        match self
            .scheduler
            .run_frame(&mut self.backend, &self.registry, &self.history, uniforms)
        {
            Ok(passes) => {
                self.history.advance();
                tracing::trace!(passes, "frame submitted");
                Ok(passes)
            }
            Err(err) => {
                self.history.invalidate();
                Err(err)
            }
        }
    }

    fn uniforms(&self, frame: &FrameInfo, current: CameraPose, previous: CameraPose) -> PassUniforms {
        let (width, height) = self.pool.resolution();
        PassUniforms {
            resolution: [width as f32, height as f32],
            resolution_inverse: [1.0 / width as f32, 1.0 / height as f32],
            camera_pos: current.position.to_array(),
            random_seed: frame_seed(self.seed, frame.frame),
            prev_camera_pos: previous.position.to_array(),
            sample_count: frame.sample_count,
            camera_rot: padded_columns(current.rotation_matrix()),
            prev_camera_rot_inv: padded_columns(previous.inverse_rotation_matrix()),
            frame: frame.frame as u32,
            step_size: 0.0,
            history_valid: u32::from(self.history.is_valid()),
            _padding: 0,
        }
    }

    pub fn samples_per_frame(&self) -> u32 {
        self.samples_per_frame
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.pool.resolution()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Drop all pipeline state and keep only the backend.
    pub fn into_backend(self) -> B {
        self.backend
    }

    pub fn pool(&self) -> &RenderTargetPool {
        &self.pool
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &PassScheduler {
        &self.scheduler
    }

    pub fn history(&self) -> &TemporalHistory {
        &self.history
    }

    pub fn camera(&self) -> &CameraState {
        &self.camera
    }
}

/// Hash of the frame index and configured seed.
fn frame_seed(seed: u32, frame: u64) -> u32 {
    let (lo, hi) = (frame as u32, (frame >> 32) as u32);
    let mut h = seed;
    h = h.wrapping_add(lo.wrapping_mul(374761393));
    h = h.wrapping_add(hi.wrapping_mul(668265263));
    h ^= h >> 13;
    h = h.wrapping_mul(1274126177);
    h ^= h >> 16;
    h
}

/// `mat3x3f` columns are 16-byte aligned.
fn padded_columns(m: Mat3) -> [[f32; 4]; 3] {
    [
        m.x_axis.extend(0.0).to_array(),
        m.y_axis.extend(0.0).to_array(),
        m.z_axis.extend(0.0).to_array(),
    ]
}
