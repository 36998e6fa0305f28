use std::sync::Arc;
use std::time::Instant;

use winit::application::ApplicationHandler;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::config::PipelineConfig;
use crate::driver::{FrameDriver, TickOutcome};
use crate::error::{PipelineError, Result};
use crate::gpu::GpuContext;
use crate::pipeline::PipelineContext;
use crate::render_graph::WgpuBackend;
use crate::shader_source::ShaderSources;

/// Open a window and render until it is closed.
///
/// Program sources and configuration are checked before any window exists;
/// a pipeline that fails to build stops the event loop and its error is
/// returned here. A left click pauses and resumes rendering.
///
/// # Example
/// ```no_run
/// svgf::run(svgf::PipelineConfig::new().title("Cornell box").filter_levels(3))?;
/// # Ok::<(), svgf::PipelineError>(())
/// ```
pub fn run(config: PipelineConfig) -> Result<()> {
    config.validate()?;
    let sources = match &config.shader_dir {
        Some(dir) => ShaderSources::with_overrides(dir)?,
        None => ShaderSources::embedded(),
    };
    sources.require_all()?;

    let event_loop = EventLoop::new().map_err(|e| PipelineError::Surface(e.to_string()))?;
    // frames are requested explicitly, and only while the driver runs
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = SvgfApp::Pending { config, sources };
    event_loop
        .run_app(&mut app)
        .map_err(|e| PipelineError::Surface(e.to_string()))?;

    match app {
        SvgfApp::Stopped(Some(err)) => Err(err),
        _ => Ok(()),
    }
}

enum SvgfApp {
    Pending {
        config: PipelineConfig,
        sources: ShaderSources,
    },
    Running(Box<Running>),
    Stopped(Option<PipelineError>),
}

struct Running {
    window: Arc<Window>,
    /// `None` only while being rebuilt.
    pipeline: Option<PipelineContext<WgpuBackend>>,
    driver: FrameDriver,
    config: PipelineConfig,
    sources: ShaderSources,
    start_time: Instant,
}

impl Running {
    fn start(
        event_loop: &ActiveEventLoop,
        config: PipelineConfig,
        sources: ShaderSources,
    ) -> Result<Self> {
        let window_attrs = WindowAttributes::default()
            .with_title(&config.title)
            .with_inner_size(winit::dpi::LogicalSize::new(config.width, config.height));
        let window = Arc::new(
            event_loop
                .create_window(window_attrs)
                .map_err(|e| PipelineError::Surface(e.to_string()))?,
        );

        let gpu = GpuContext::new(window.clone())?;
        let pipeline = PipelineContext::new(WgpuBackend::new(gpu), &config, &sources)?;

        Ok(Self {
            window,
            pipeline: Some(pipeline),
            driver: FrameDriver::new(),
            config,
            sources,
            start_time: Instant::now(),
        })
    }

    /// Tear the pipeline down and build it again at the new size.
    fn rebuild(&mut self, width: u32, height: u32) -> Result<()> {
        let Some(pipeline) = self.pipeline.take() else {
            return Ok(());
        };
        if pipeline.resolution() == (width, height) {
            self.pipeline = Some(pipeline);
            return Ok(());
        }

        let mut gpu = pipeline.into_backend().into_gpu();
        gpu.resize(width, height);
        self.pipeline = Some(PipelineContext::new(
            WgpuBackend::new(gpu),
            &self.config,
            &self.sources,
        )?);
        tracing::info!(width, height, "pipeline rebuilt after resize");
        Ok(())
    }

    fn redraw(&mut self) {
        let Some(pipeline) = self.pipeline.as_mut() else {
            return;
        };
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if self.driver.tick(pipeline, elapsed) != TickOutcome::Skipped {
            self.window.set_title(&self.driver.title(&self.config.title));
        }
        if self.driver.is_running() {
            self.window.request_redraw();
        }
    }

    fn toggle(&mut self) {
        self.driver.toggle();
        if self.driver.is_running() {
            self.window.request_redraw();
        } else {
            self.window.set_title(&self.driver.title(&self.config.title));
        }
    }
}

impl ApplicationHandler for SvgfApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if !matches!(self, SvgfApp::Pending { .. }) {
            return;
        }
        let SvgfApp::Pending { config, sources } =
            std::mem::replace(self, SvgfApp::Stopped(None))
        else {
            return;
        };

        match Running::start(event_loop, config, sources) {
            Ok(running) => {
                running.window.request_redraw();
                *self = SvgfApp::Running(Box::new(running));
            }
            Err(err) => {
                tracing::error!(error = %err, "pipeline construction failed");
                *self = SvgfApp::Stopped(Some(err));
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let SvgfApp::Running(app) = self else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if size.width == 0 || size.height == 0 {
                    return;
                }
                if let Err(err) = app.rebuild(size.width, size.height) {
                    tracing::error!(error = %err, "pipeline rebuild failed");
                    *self = SvgfApp::Stopped(Some(err));
                    event_loop.exit();
                    return;
                }
                app.window.request_redraw();
            }
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => app.toggle(),
            WindowEvent::RedrawRequested => app.redraw(),
            _ => {}
        }
    }
}
