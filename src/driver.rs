//! Per-refresh frame driving: counters, moving frame rate, pause/resume.

use std::collections::VecDeque;
use std::fmt;

use crate::pipeline::{FrameInfo, PipelineContext};
use crate::render_graph::GpuBackend;

/// Number of recent frame timestamps the frame rate is averaged over.
pub const FPS_WINDOW: usize = 100;

/// Frame and sample counters plus a window of recent frame timestamps.
#[derive(Clone, Debug, Default)]
pub struct FrameClock {
    frame: u64,
    sample_count: u32,
    times: VecDeque<f64>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed frame at `time` seconds.
    pub fn record(&mut self, time: f64, samples: u32) {
        self.frame += 1;
        self.sample_count = self.sample_count.saturating_add(samples);
        self.times.push_back(time);
        if self.times.len() > FPS_WINDOW {
            self.times.pop_front();
        }
    }

    /// Completed frames.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn timestamps(&self) -> impl Iterator<Item = f64> + '_ {
        self.times.iter().copied()
    }

    pub fn window_len(&self) -> usize {
        self.times.len()
    }

    /// Average frame rate over the window; 0 until two frames are recorded.
    pub fn fps(&self) -> f64 {
        match (self.times.front(), self.times.back()) {
            (Some(first), Some(last)) if last > first => {
                (self.times.len() - 1) as f64 / (last - first)
            }
            _ => 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    Running,
    Paused,
}

/// What one call to [`FrameDriver::tick`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Rendered,
    /// Paused; nothing ran.
    Skipped,
    /// The frame was discarded and the driver paused.
    Failed,
}

/// User-visible progress line.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameStatus {
    pub frame: u64,
    pub fps: f64,
}

impl fmt::Display for FrameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame: {}; FPS: {:.1}", self.frame, self.fps)
    }
}

/// Runs at most one frame per display refresh while running.
#[derive(Debug)]
pub struct FrameDriver {
    state: DriverState,
    clock: FrameClock,
}

impl Default for FrameDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDriver {
    pub fn new() -> Self {
        Self {
            state: DriverState::Running,
            clock: FrameClock::new(),
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == DriverState::Running
    }

    /// Flip between running and paused; returns the new state.
    pub fn toggle(&mut self) -> DriverState {
        self.state = match self.state {
            DriverState::Running => DriverState::Paused,
            DriverState::Paused => DriverState::Running,
        };
        tracing::info!(state = ?self.state, frame = self.clock.frame(), "frame driver toggled");
        self.state
    }

    /// Render one frame if running.
    ///
    /// Errors stop here: a failed frame is logged and pauses the driver.
    pub fn tick<B: GpuBackend>(
        &mut self,
        ctx: &mut PipelineContext<B>,
        elapsed: f64,
    ) -> TickOutcome {
        if self.state == DriverState::Paused {
            return TickOutcome::Skipped;
        }

        let samples = ctx.samples_per_frame();
        let info = FrameInfo {
            time: elapsed as f32,
            frame: self.clock.frame(),
            sample_count: self.clock.sample_count().saturating_add(samples),
        };
        match ctx.render_frame(info) {
            Ok(_) => {
                self.clock.record(elapsed, samples);
                TickOutcome::Rendered
            }
            Err(err) => {
                tracing::error!(frame = info.frame, error = %err, "frame failed, pausing");
                self.state = DriverState::Paused;
                TickOutcome::Failed
            }
        }
    }

    pub fn status(&self) -> FrameStatus {
        FrameStatus {
            frame: self.clock.frame(),
            fps: self.clock.fps(),
        }
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    /// Window title: `base`, the status line and a marker while paused.
    pub fn title(&self, base: &str) -> String {
        match self.state {
            DriverState::Running => format!("{base} | {}", self.status()),
            DriverState::Paused => format!("{base} | {} (paused)", self.status()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChannelConfig, PipelineConfig};
    use crate::render_graph::recording::RecordingBackend;
    use crate::render_graph::{ChannelName, PassKind, SlotRole};
    use crate::shader_source::ShaderSources;

    fn context(backend: &mut RecordingBackend) -> PipelineContext<&mut RecordingBackend> {
        PipelineContext::new(backend, &PipelineConfig::default(), &ShaderSources::embedded())
            .unwrap()
    }

    #[test]
    fn paused_driver_runs_nothing() {
        let mut backend = RecordingBackend::new(8, 8);
        let mut ctx = context(&mut backend);
        let mut driver = FrameDriver::new();

        assert_eq!(driver.toggle(), DriverState::Paused);
        for i in 0..3 {
            assert_eq!(driver.tick(&mut ctx, i as f64), TickOutcome::Skipped);
        }
        assert_eq!(ctx.backend().encoded_passes(), 0);
        assert_eq!(driver.status().frame, 0);

        assert_eq!(driver.toggle(), DriverState::Running);
        let before = ctx.backend().submitted.len();
        assert_eq!(driver.tick(&mut ctx, 3.0), TickOutcome::Rendered);
        assert_eq!(ctx.backend().submitted.len(), before + 1);
    }

    #[test]
    fn one_frame_per_tick_after_resume() {
        let mut backend = RecordingBackend::new(8, 8);
        let mut ctx = context(&mut backend);
        let mut driver = FrameDriver::new();

        driver.tick(&mut ctx, 0.0);
        driver.toggle();
        driver.tick(&mut ctx, 0.1);
        driver.tick(&mut ctx, 0.2);
        driver.toggle();
        driver.tick(&mut ctx, 0.3);
        driver.tick(&mut ctx, 0.4);

        assert_eq!(ctx.backend().submitted.len(), 3);
        assert_eq!(driver.status().frame, 3);
        let frames: Vec<_> = ctx
            .backend()
            .submitted
            .iter()
            .map(|f| f[0].uniforms.frame)
            .collect();
        assert_eq!(frames, vec![0, 1, 2]);
    }

    #[test]
    fn frame_rate_window_is_bounded() {
        let mut clock = FrameClock::new();
        for i in 0..=FPS_WINDOW {
            clock.record(i as f64 * 0.01, 1);
        }
        assert_eq!(clock.window_len(), FPS_WINDOW);
        assert_eq!(clock.timestamps().next(), Some(0.01));
        assert_eq!(clock.frame(), 101);
        assert!((clock.fps() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn fps_needs_two_frames() {
        let mut clock = FrameClock::new();
        assert_eq!(clock.fps(), 0.0);
        clock.record(1.0, 1);
        assert_eq!(clock.fps(), 0.0);
        clock.record(1.5, 1);
        assert_eq!(clock.fps(), 2.0);
    }

    #[test]
    fn failed_frame_pauses() {
        let mut backend = RecordingBackend::new(8, 8);
        let mut ctx = context(&mut backend);
        let mut driver = FrameDriver::new();

        driver.tick(&mut ctx, 0.0);
        ctx.backend_mut().fail_encode(PassKind::Accumulate);
        assert_eq!(driver.tick(&mut ctx, 0.1), TickOutcome::Failed);
        assert_eq!(driver.state(), DriverState::Paused);
        assert_eq!(driver.status().frame, 1);
        assert_eq!(driver.title("SVGF"), "SVGF | Frame: 1; FPS: 0.0 (paused)");
        assert_eq!(driver.tick(&mut ctx, 0.2), TickOutcome::Skipped);
        assert_eq!(ctx.backend().submitted.len(), 1);
        assert_eq!(ctx.backend().discarded, 1);
    }

    #[test]
    fn history_alternates_over_five_ticks() {
        let config = PipelineConfig::default().channels(vec![
            ChannelConfig::color(ChannelName::Direct, 3),
            ChannelConfig::color(ChannelName::Indirect, 3),
            ChannelConfig::color(ChannelName::Moment, 3),
            ChannelConfig::color(ChannelName::Motion, 1),
        ]);
        let mut backend = RecordingBackend::new(8, 8);
        let mut ctx =
            PipelineContext::new(&mut backend, &config, &ShaderSources::embedded()).unwrap();
        let mut driver = FrameDriver::new();

        let mut written = Vec::new();
        for tick in 0..5 {
            assert_eq!(driver.tick(&mut ctx, tick as f64 / 60.0), TickOutcome::Rendered);
            let frame = ctx.backend().last_frame().unwrap();
            let accumulate = frame.iter().find(|p| p.kind == PassKind::Accumulate).unwrap();
            written.push(accumulate.output.slot().unwrap());
        }

        assert_eq!(written, vec![1, 0, 1, 0, 1]);
        assert_eq!(
            ctx.history().position(ChannelName::Direct, SlotRole::History),
            Some(written[4])
        );
        assert_eq!(driver.clock().sample_count(), 5);
    }

    #[test]
    fn status_line() {
        let status = FrameStatus {
            frame: 42,
            fps: 59.94,
        };
        assert_eq!(status.to_string(), "Frame: 42; FPS: 59.9");
    }
}
