//! The per-frame pass graph.
//!
//! The topology is fixed; only slot positions change between frames:
//!
//! ```text
//! trace ──▶ accumulate ──▶ variance ──▶ wavelet 0 ──▶ … ──▶ wavelet L-1 ──▶ draw
//!  [T]     [T]+[H] → [C]    [C] → [S]    [S] → [H]                          surface
//! ```
//!
//! `T` is the trace slot, `S` the scratch slot, `H`/`C` the history and
//! current slots of the temporal pair. Wavelet iterations ping-pong between
//! `S` and the already consumed `H`; the history-tap iteration writes `C`
//! instead so its output survives as next frame's history.

use std::collections::HashMap;

use crate::config::{HistoryTap, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::render_graph::{
    BackendLimits, ChannelName, ChannelRegistry, CompositeTarget, FormatKind, GpuBackend,
    InputBinding, PassKind, PassOutput, PassUniforms, ProgramId, ProgramLayout, ResolvedPass,
    SlotRole, TemporalHistory, TemporalSlots,
};
use crate::shader_source::ShaderSources;

/// Most wavelet iterations a pass graph may run.
pub const MAX_FILTER_LEVELS: u32 = 16;

/// Step sizes of `levels` wavelet iterations: 1, 2, 4, …
///
/// Stops at the largest step a `u32` can hold.
pub fn step_sizes(levels: u32) -> Vec<u32> {
    (0..levels).map_while(|i| 1u32.checked_shl(i)).collect()
}

/// Builds and runs the fixed pass sequence for each frame.
///
/// # Example
///
/// ```ignore
/// let mut scheduler = PassScheduler::new(&config);
/// scheduler.build_programs(&mut backend, &registry, &history, &sources)?;
///
/// // every frame:
/// scheduler.run_frame(&mut backend, &registry, &history, uniforms)?;
/// history.advance();
/// ```
pub struct PassScheduler {
    filter_levels: u32,
    variance_pass: bool,
    history_tap: HistoryTap,
    composite_channels: Vec<ChannelName>,
    programs: HashMap<ProgramLayout, ProgramId>,
}

impl PassScheduler {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            filter_levels: config.filter_levels,
            variance_pass: config.variance_pass,
            history_tap: config.history_tap,
            composite_channels: config.composite_channels.clone(),
            programs: HashMap::new(),
        }
    }

    pub fn filter_levels(&self) -> u32 {
        self.filter_levels
    }

    /// Whether wavelet iteration `i` writes the history slot.
    fn taps(&self, i: u32) -> bool {
        match self.history_tap {
            HistoryTap::Accumulated => false,
            HistoryTap::Iteration(tap) => tap == i,
            HistoryTap::Final => i + 1 == self.filter_levels,
        }
    }

    /// Bind every channel present at `role` as `<prefix>_<channel>`.
    fn bind_all(
        registry: &ChannelRegistry,
        temporal: TemporalSlots,
        prefix: &str,
        role: SlotRole,
        out: &mut Vec<InputBinding>,
    ) {
        let slot = temporal.position(role);
        for channel in registry.channels() {
            if let Some(handle) = channel.target(slot) {
                out.push(InputBinding {
                    name: format!("{prefix}_{}", channel.name()),
                    channel: channel.name(),
                    role,
                    slot,
                    handle,
                    format: channel.format(),
                });
            }
        }
    }

    fn composite(
        registry: &ChannelRegistry,
        temporal: TemporalSlots,
        kind: PassKind,
        role: SlotRole,
    ) -> Result<PassOutput> {
        let target: CompositeTarget = registry.composite(temporal.position(role));
        if target.is_empty() {
            return Err(PipelineError::Config(format!(
                "{kind} pass has no channel bound at the {role:?} slot"
            )));
        }
        Ok(PassOutput::Composite(target))
    }

    /// The temporal pair shared by all channels this frame.
    fn temporal_slots(history: &TemporalHistory) -> Result<TemporalSlots> {
        let mut pairs = history.channels().map(|(_, slots)| slots);
        let first = pairs
            .next()
            .ok_or_else(|| PipelineError::Config("no channel can hold history".into()))?;
        if pairs.any(|slots| slots != first) {
            return Err(PipelineError::Config(
                "temporal channels disagree on the history slot".into(),
            ));
        }
        Ok(first)
    }

    /// Resolve every pass of one frame against the current slot rotation.
    pub fn resolve(
        &self,
        registry: &ChannelRegistry,
        history: &TemporalHistory,
        base: PassUniforms,
    ) -> Result<Vec<ResolvedPass>> {
        if self.filter_levels > MAX_FILTER_LEVELS {
            return Err(PipelineError::Config(format!(
                "{} filter levels requested, at most {MAX_FILTER_LEVELS} supported",
                self.filter_levels
            )));
        }
        let temporal = Self::temporal_slots(history)?;
        let mut passes = Vec::with_capacity(self.filter_levels as usize + 4);

        passes.push(ResolvedPass {
            kind: PassKind::Trace,
            iteration: None,
            inputs: Vec::new(),
            output: Self::composite(registry, temporal, PassKind::Trace, SlotRole::Trace)?,
            uniforms: base,
        });

        let mut inputs = Vec::new();
        Self::bind_all(registry, temporal, "tracer", SlotRole::Trace, &mut inputs);
        Self::bind_all(registry, temporal, "prev", SlotRole::History, &mut inputs);
        passes.push(ResolvedPass {
            kind: PassKind::Accumulate,
            iteration: None,
            inputs,
            output: Self::composite(registry, temporal, PassKind::Accumulate, SlotRole::Current)?,
            uniforms: base,
        });

        let mut read_role = SlotRole::Current;
        if self.variance_pass {
            let mut inputs = Vec::new();
            Self::bind_all(registry, temporal, "curr", SlotRole::Current, &mut inputs);
            let moment = ChannelName::Moment;
            if let Some(handle) = registry.resolve_role(moment, SlotRole::History, history) {
                inputs.push(InputBinding {
                    name: format!("prev_{moment}"),
                    channel: moment,
                    role: SlotRole::History,
                    slot: temporal.position(SlotRole::History),
                    handle,
                    format: FormatKind::HighPrecisionColor,
                });
            }
            passes.push(ResolvedPass {
                kind: PassKind::Variance,
                iteration: None,
                inputs,
                output: Self::composite(registry, temporal, PassKind::Variance, SlotRole::Scratch)?,
                uniforms: base,
            });
            read_role = SlotRole::Scratch;
        }

        let scratch = [SlotRole::Scratch, SlotRole::History];
        for (i, step) in step_sizes(self.filter_levels).into_iter().enumerate() {
            let i = i as u32;
            let write_role = if self.taps(i) {
                SlotRole::Current
            } else {
                scratch[(i as usize + 1) % 2]
            };
            let mut inputs = Vec::new();
            Self::bind_all(registry, temporal, "curr", read_role, &mut inputs);
            passes.push(ResolvedPass {
                kind: PassKind::Wavelet,
                iteration: Some(i),
                inputs,
                output: Self::composite(registry, temporal, PassKind::Wavelet, write_role)?,
                uniforms: PassUniforms {
                    step_size: step as f32,
                    ..base
                },
            });
            read_role = write_role;
        }

        let read_slot = temporal.position(read_role);
        let mut inputs = Vec::new();
        for &name in &self.composite_channels {
            if let Some(channel) = registry.get(name) {
                if let Some(handle) = channel.target(read_slot) {
                    inputs.push(InputBinding {
                        name: format!("curr_{name}"),
                        channel: name,
                        role: read_role,
                        slot: read_slot,
                        handle,
                        format: channel.format(),
                    });
                }
            }
        }
        if inputs.is_empty() {
            return Err(PipelineError::Config(format!(
                "draw pass finds no composite channel at the {read_role:?} slot"
            )));
        }
        passes.push(ResolvedPass {
            kind: PassKind::Draw,
            iteration: None,
            inputs,
            output: PassOutput::Surface,
            uniforms: base,
        });

        Ok(passes)
    }

    /// Check one frame's passes for slot aliasing, unread outputs and
    /// device limits.
    fn check(passes: &[ResolvedPass], limits: &BackendLimits) -> Result<()> {
        for pass in passes {
            if let PassOutput::Composite(target) = &pass.output {
                for input in &pass.inputs {
                    if input.slot == target.slot && target.writes(input.channel) {
                        return Err(PipelineError::Hazard {
                            pass: pass.kind,
                            channel: input.channel,
                            slot: input.slot,
                        });
                    }
                }
                // only the trace pass may produce a channel from nothing
                if pass.kind != PassKind::Trace {
                    if let Some(channel) = target
                        .channels()
                        .find(|&c| !pass.inputs.iter().any(|input| input.channel == c))
                    {
                        return Err(PipelineError::Config(format!(
                            "{} writes channel {channel} at slot {} without reading it",
                            pass.label(),
                            target.slot
                        )));
                    }
                }

                let count = target.color.len();
                let bytes = count as u32 * FormatKind::HighPrecisionColor.bytes_per_pixel();
                if count as u32 > limits.max_color_attachments
                    || bytes > limits.max_color_attachment_bytes_per_sample
                {
                    return Err(PipelineError::TooManyAttachments {
                        pass: pass.kind,
                        count,
                        bytes,
                        max: limits.max_color_attachments,
                        max_bytes: limits.max_color_attachment_bytes_per_sample,
                    });
                }
            }
            if pass.inputs.len() as u32 > limits.max_pass_inputs {
                return Err(PipelineError::TooManyInputs {
                    pass: pass.kind,
                    count: pass.inputs.len(),
                    max: limits.max_pass_inputs,
                });
            }
        }
        Ok(())
    }

    /// Validate both rotation parities and collect every program layout.
    ///
    /// Slot rotation alternates between two states, so checking one frame of
    /// each proves every future frame hazard-free.
    pub fn validate(
        &self,
        registry: &ChannelRegistry,
        history: &TemporalHistory,
        limits: &BackendLimits,
    ) -> Result<Vec<ProgramLayout>> {
        let mut layouts: Vec<ProgramLayout> = Vec::new();
        let mut rotated = history.clone();
        for _ in 0..2 {
            let passes = self.resolve(registry, &rotated, PassUniforms::default())?;
            Self::check(&passes, limits)?;
            for pass in &passes {
                let layout = pass.layout();
                if !layouts.contains(&layout) {
                    layouts.push(layout);
                }
            }
            rotated.advance();
        }
        Ok(layouts)
    }

    /// Validate the graph and build one program per distinct layout.
    pub fn build_programs<B: GpuBackend>(
        &mut self,
        backend: &mut B,
        registry: &ChannelRegistry,
        history: &TemporalHistory,
        sources: &ShaderSources,
    ) -> Result<()> {
        let layouts = self.validate(registry, history, &backend.limits())?;
        for layout in layouts {
            let source = sources.program(&layout)?;
            let id = backend.build_program(&layout, &source)?;
            tracing::debug!(pass = %layout.kind, inputs = layout.inputs.len(), "built program");
            self.programs.insert(layout, id);
        }
        tracing::info!(programs = self.programs.len(), "pass graph ready");
        Ok(())
    }

    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    /// Encode and submit one frame.
    ///
    /// Either every pass is submitted or none is: on any failure the frame
    /// is discarded and the targets keep their pre-frame contents.
    pub fn run_frame<B: GpuBackend>(
        &self,
        backend: &mut B,
        registry: &ChannelRegistry,
        history: &TemporalHistory,
        base: PassUniforms,
    ) -> Result<usize> {
        let passes = self.resolve(registry, history, base)?;
        let programs = passes
            .iter()
            .map(|pass| {
                self.programs.get(&pass.layout()).copied().ok_or_else(|| {
                    PipelineError::Frame(format!("no program built for {}", pass.label()))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        backend.begin_frame()?;
        for (pass, program) in passes.iter().zip(programs) {
            if let Err(err) = backend.encode_pass(program, pass) {
                backend.discard_frame();
                return Err(err);
            }
        }
        backend.submit_frame()?;
        Ok(passes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelConfig;
    use crate::render_graph::recording::RecordingBackend;
    use crate::render_graph::{RenderTargetPool, SCRATCH_SLOT, TRACE_SLOT};

    fn setup(config: &PipelineConfig) -> (ChannelRegistry, TemporalHistory) {
        let mut pool = RenderTargetPool::new(8, 8, config.max_render_targets);
        let mut registry = ChannelRegistry::new();
        for c in &config.channels {
            registry
                .register(&mut pool, c.name, c.slots, c.format)
                .unwrap();
        }
        let history = TemporalHistory::new(&registry);
        (registry, history)
    }

    fn wavelets(passes: &[ResolvedPass]) -> Vec<&ResolvedPass> {
        passes.iter().filter(|p| p.kind == PassKind::Wavelet).collect()
    }

    #[test]
    fn step_sizes_are_powers_of_two() {
        assert_eq!(step_sizes(5), vec![1, 2, 4, 8, 16]);
        assert_eq!(step_sizes(3), vec![1, 2, 4]);
        assert!(step_sizes(0).is_empty());
        assert_eq!(step_sizes(40).len(), 32);
        assert_eq!(step_sizes(40).last(), Some(&(1 << 31)));
    }

    #[test]
    fn too_many_levels_are_refused_without_config_checks() {
        let mut config = PipelineConfig::default().history_tap(HistoryTap::Final);
        config.filter_levels = 33;
        let (registry, history) = setup(&config);
        let err = PassScheduler::new(&config)
            .validate(&registry, &history, &RecordingBackend::LIMITS)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn bindings_name_their_roles() {
        let config = PipelineConfig::default();
        let (registry, mut history) = setup(&config);
        let scheduler = PassScheduler::new(&config);

        for _ in 0..2 {
            let slots = history.slots(ChannelName::Direct).unwrap();
            let passes = scheduler
                .resolve(&registry, &history, PassUniforms::default())
                .unwrap();
            for pass in &passes {
                for input in &pass.inputs {
                    assert_eq!(slots.position(input.role), input.slot, "{}", input.name);
                }
            }
            let accumulate = &passes[1];
            assert_eq!(accumulate.input("tracer_direct").unwrap().role, SlotRole::Trace);
            assert_eq!(accumulate.input("prev_direct").unwrap().role, SlotRole::History);
            let variance = &passes[2];
            assert_eq!(variance.input("prev_moment").unwrap().role, SlotRole::History);
            assert_eq!(variance.input("curr_direct").unwrap().role, SlotRole::Current);
            history.advance();
        }
    }

    #[test]
    fn channel_without_scratch_slot_cannot_be_filtered() {
        let channels = PipelineConfig::default()
            .channels
            .into_iter()
            .map(|c| match c.name {
                ChannelName::Normal => ChannelConfig::color(ChannelName::Normal, 2),
                _ => c,
            })
            .collect();
        let config = PipelineConfig::default().channels(channels);
        let (registry, history) = setup(&config);
        let err = PassScheduler::new(&config)
            .validate(&registry, &history, &RecordingBackend::LIMITS)
            .unwrap_err();

        let PipelineError::Config(message) = err else {
            panic!("expected a configuration error");
        };
        assert!(message.contains("wavelet"), "{message}");
        assert!(message.contains("normal"), "{message}");
    }

    #[test]
    fn default_topology_order() {
        let config = PipelineConfig::default();
        let (registry, history) = setup(&config);
        let passes = PassScheduler::new(&config)
            .resolve(&registry, &history, PassUniforms::default())
            .unwrap();

        let kinds: Vec<_> = passes.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                PassKind::Trace,
                PassKind::Accumulate,
                PassKind::Variance,
                PassKind::Wavelet,
                PassKind::Wavelet,
                PassKind::Wavelet,
                PassKind::Wavelet,
                PassKind::Wavelet,
                PassKind::Draw,
            ]
        );
        let steps: Vec<_> = wavelets(&passes)
            .iter()
            .map(|p| p.uniforms.step_size)
            .collect();
        assert_eq!(steps, vec![1.0, 2.0, 4.0, 8.0, 16.0]);
    }

    #[test]
    fn three_levels_stop_at_step_four() {
        let config = PipelineConfig::default().filter_levels(3);
        let (registry, history) = setup(&config);
        let passes = PassScheduler::new(&config)
            .resolve(&registry, &history, PassUniforms::default())
            .unwrap();

        let steps: Vec<_> = wavelets(&passes)
            .iter()
            .map(|p| p.uniforms.step_size)
            .collect();
        assert_eq!(steps, vec![1.0, 2.0, 4.0]);
    }

    #[test]
    fn accumulate_reads_trace_and_history() {
        let config = PipelineConfig::default();
        let (registry, history) = setup(&config);
        let passes = PassScheduler::new(&config)
            .resolve(&registry, &history, PassUniforms::default())
            .unwrap();
        let accumulate = &passes[1];
        let slots = history.slots(ChannelName::Direct).unwrap();

        assert_eq!(accumulate.input("tracer_direct").unwrap().slot, TRACE_SLOT);
        assert_eq!(accumulate.input("prev_direct").unwrap().slot, slots.history);
        assert_eq!(accumulate.input("tracer_motion").unwrap().slot, TRACE_SLOT);
        assert!(accumulate.input("prev_motion").is_none());
        assert_eq!(accumulate.output.slot(), Some(slots.current));
    }

    #[test]
    fn wavelets_ping_pong_and_tap_current() {
        let config = PipelineConfig::default();
        let (registry, history) = setup(&config);
        let slots = history.slots(ChannelName::Direct).unwrap();
        let passes = PassScheduler::new(&config)
            .resolve(&registry, &history, PassUniforms::default())
            .unwrap();

        let writes: Vec<_> = wavelets(&passes)
            .iter()
            .map(|p| p.output.slot().unwrap())
            .collect();
        assert_eq!(
            writes,
            vec![
                slots.current,
                SCRATCH_SLOT,
                slots.history,
                SCRATCH_SLOT,
                slots.history
            ]
        );
        let draw = passes.last().unwrap();
        assert_eq!(draw.input("curr_direct").unwrap().slot, slots.history);
        assert_eq!(draw.output, PassOutput::Surface);
    }

    #[test]
    fn every_frame_is_hazard_free() {
        for tap in [
            HistoryTap::Accumulated,
            HistoryTap::Iteration(0),
            HistoryTap::Iteration(3),
            HistoryTap::Final,
        ] {
            let config = PipelineConfig::default().history_tap(tap);
            let (registry, history) = setup(&config);
            let scheduler = PassScheduler::new(&config);
            let layouts = scheduler
                .validate(&registry, &history, &RecordingBackend::LIMITS)
                .unwrap();
            assert!(!layouts.is_empty());
        }
    }

    #[test]
    fn tap_on_unvarianced_accumulation_is_a_hazard() {
        let config = PipelineConfig::default()
            .variance_pass(false)
            .history_tap(HistoryTap::Iteration(0));
        let (registry, history) = setup(&config);
        let err = PassScheduler::new(&config)
            .validate(&registry, &history, &RecordingBackend::LIMITS)
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Hazard {
                pass: PassKind::Wavelet,
                ..
            }
        ));
    }

    #[test]
    fn variance_can_be_skipped() {
        let config = PipelineConfig::default()
            .variance_pass(false)
            .history_tap(HistoryTap::Final);
        let (registry, history) = setup(&config);
        let passes = PassScheduler::new(&config)
            .resolve(&registry, &history, PassUniforms::default())
            .unwrap();
        let slots = history.slots(ChannelName::Direct).unwrap();

        assert!(passes.iter().all(|p| p.kind != PassKind::Variance));
        let first = wavelets(&passes)[0];
        assert_eq!(first.input("curr_direct").unwrap().slot, slots.current);
        assert_eq!(wavelets(&passes).last().unwrap().output.slot(), Some(slots.current));
    }

    #[test]
    fn attachment_limit_is_enforced() {
        let config = PipelineConfig::default();
        let (registry, history) = setup(&config);
        let limits = BackendLimits {
            max_color_attachments: 4,
            ..RecordingBackend::LIMITS
        };
        let err = PassScheduler::new(&config)
            .validate(&registry, &history, &limits)
            .unwrap_err();
        assert!(matches!(err, PipelineError::TooManyAttachments { .. }));
    }

    #[test]
    fn input_limit_is_enforced() {
        let config = PipelineConfig::default();
        let (registry, history) = setup(&config);
        let limits = BackendLimits {
            max_pass_inputs: 8,
            ..RecordingBackend::LIMITS
        };
        let err = PassScheduler::new(&config)
            .validate(&registry, &history, &limits)
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::TooManyInputs {
                pass: PassKind::Accumulate,
                ..
            }
        ));
    }

    #[test]
    fn encode_failure_discards_the_frame() {
        let config = PipelineConfig::default();
        let (registry, history) = setup(&config);
        let mut scheduler = PassScheduler::new(&config);
        let mut backend = RecordingBackend::new(8, 8);
        scheduler
            .build_programs(&mut backend, &registry, &history, &ShaderSources::embedded())
            .unwrap();

        backend.fail_encode(PassKind::Wavelet);
        let err = scheduler
            .run_frame(&mut backend, &registry, &history, PassUniforms::default())
            .unwrap_err();

        assert!(matches!(err, PipelineError::Frame(_)));
        assert_eq!(backend.discarded, 1);
        assert!(backend.submitted.is_empty());
    }

    #[test]
    fn programs_are_shared_between_parities() {
        let config = PipelineConfig::default();
        let (registry, history) = setup(&config);
        let mut scheduler = PassScheduler::new(&config);
        let mut backend = RecordingBackend::new(8, 8);
        scheduler
            .build_programs(&mut backend, &registry, &history, &ShaderSources::embedded())
            .unwrap();

        // trace, accumulate, variance, wavelet, draw: every slot position
        // carries the same channels, so one layout per pass kind
        assert_eq!(scheduler.program_count(), 5);
        assert_eq!(backend.programs.len(), 5);
    }
}
