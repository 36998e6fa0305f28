//! Semantic channels and the registry mapping them to pooled targets.
//!
//! Every channel has the same four slot positions:
//!
//! ```text
//!   0, 1     temporal pair: one holds history, the other the current frame
//!   2        filter scratch
//!   3        raw trace output
//! ```
//!
//! A channel registered with fewer roles leaves positions [`Slot::Absent`].
//! Which of 0 and 1 is "history" is decided by the temporal history manager,
//! never by the registry.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::render_graph::{
    FormatKind, RenderTargetHandle, RenderTargetPool, SlotRole, TemporalHistory,
};

/// Number of slot positions per channel.
pub const SLOT_COUNT: usize = 4;
/// The two positions that alternate between history and current.
pub const TEMPORAL_SLOTS: [usize; 2] = [0, 1];
/// Filter scratch position.
pub const SCRATCH_SLOT: usize = 2;
/// Position written by the trace pass.
pub const TRACE_SLOT: usize = 3;

/// Semantic quantity stored by a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelName {
    /// Per-pixel accumulated sample count.
    History,
    /// Direct lighting; `w` carries variance after the variance pass.
    Direct,
    /// Indirect lighting; `w` carries variance after the variance pass.
    Indirect,
    MeshId,
    Normal,
    /// Luminance moments: 1st/2nd direct, 1st/2nd indirect.
    Moment,
    /// Screen-space motion, only produced by the trace pass.
    Motion,
    Depth,
}

impl ChannelName {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelName::History => "history",
            ChannelName::Direct => "direct",
            ChannelName::Indirect => "indirect",
            ChannelName::MeshId => "mesh_id",
            ChannelName::Normal => "normal",
            ChannelName::Moment => "moment",
            ChannelName::Motion => "motion",
            ChannelName::Depth => "depth",
        }
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One slot position of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    Bound(RenderTargetHandle),
    /// The channel plays no role at this position.
    Absent,
}

impl Slot {
    pub fn target(self) -> Option<RenderTargetHandle> {
        match self {
            Slot::Bound(handle) => Some(handle),
            Slot::Absent => None,
        }
    }

    pub fn is_bound(self) -> bool {
        matches!(self, Slot::Bound(_))
    }
}

/// A registered channel and its slots.
#[derive(Clone, Debug)]
pub struct Channel {
    name: ChannelName,
    format: FormatKind,
    role_count: usize,
    slots: [Slot; SLOT_COUNT],
}

impl Channel {
    pub fn name(&self) -> ChannelName {
        self.name
    }

    pub fn format(&self) -> FormatKind {
        self.format
    }

    pub fn role_count(&self) -> usize {
        self.role_count
    }

    pub fn slots(&self) -> &[Slot; SLOT_COUNT] {
        &self.slots
    }

    pub fn slot(&self, position: usize) -> Slot {
        self.slots.get(position).copied().unwrap_or(Slot::Absent)
    }

    pub fn target(&self, position: usize) -> Option<RenderTargetHandle> {
        self.slot(position).target()
    }

    /// Whether the channel owns both temporal positions and can keep history.
    pub fn is_temporal(&self) -> bool {
        TEMPORAL_SLOTS.iter().all(|&p| self.slot(p).is_bound())
    }
}

/// Slot positions occupied by a channel with `role_count` roles.
///
/// A single role means the channel is only produced by the trace pass.
fn positions_for(role_count: usize) -> Vec<usize> {
    if role_count == 1 {
        vec![TRACE_SLOT]
    } else {
        (0..role_count).collect()
    }
}

/// The outputs of one pass: every channel bound at one slot position.
#[derive(Clone, Debug, PartialEq)]
pub struct CompositeTarget {
    pub slot: usize,
    /// Color attachments in registration order.
    pub color: Vec<(ChannelName, RenderTargetHandle)>,
    pub depth: Option<(ChannelName, RenderTargetHandle)>,
}

impl CompositeTarget {
    pub fn is_empty(&self) -> bool {
        self.color.is_empty() && self.depth.is_none()
    }

    /// Channels written by this composite, colors first.
    pub fn channels(&self) -> impl Iterator<Item = ChannelName> + '_ {
        self.color
            .iter()
            .chain(self.depth.iter())
            .map(|(name, _)| *name)
    }

    pub fn writes(&self, channel: ChannelName) -> bool {
        self.channels().any(|c| c == channel)
    }
}

/// Maps channel names to their pooled targets.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: Vec<Channel>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a channel and eagerly allocate one target per role.
    pub fn register(
        &mut self,
        pool: &mut RenderTargetPool,
        name: ChannelName,
        role_count: usize,
        format: FormatKind,
    ) -> Result<()> {
        if !(1..=SLOT_COUNT).contains(&role_count) {
            return Err(PipelineError::Config(format!(
                "channel {name} needs between 1 and {SLOT_COUNT} slots, got {role_count}"
            )));
        }
        if self.get(name).is_some() {
            return Err(PipelineError::Config(format!(
                "channel {name} registered twice"
            )));
        }
        if format.is_depth() && self.channels.iter().any(|c| c.format.is_depth()) {
            return Err(PipelineError::Config(format!(
                "channel {name}: only one depth channel can be attached per pass"
            )));
        }

        let mut slots = [Slot::Absent; SLOT_COUNT];
        for position in positions_for(role_count) {
            slots[position] = Slot::Bound(pool.allocate(name, position, format)?);
        }

        tracing::debug!(channel = %name, role_count, ?format, "registered channel");
        self.channels.push(Channel {
            name,
            format,
            role_count,
            slots,
        });
        Ok(())
    }

    pub fn get(&self, name: ChannelName) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name == name)
    }

    /// The target of `name` at slot `position`, if the channel plays a role there.
    pub fn resolve(&self, name: ChannelName, position: usize) -> Option<RenderTargetHandle> {
        self.get(name).and_then(|c| c.target(position))
    }

    /// The target of `name` playing `role` this frame.
    pub fn resolve_role(
        &self,
        name: ChannelName,
        role: SlotRole,
        history: &TemporalHistory,
    ) -> Option<RenderTargetHandle> {
        history
            .position(name, role)
            .and_then(|position| self.resolve(name, position))
    }

    /// Channels in registration order.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn for_each_channel<F>(&self, mut f: F)
    where
        F: FnMut(ChannelName, &[Slot]),
    {
        for channel in &self.channels {
            f(channel.name, &channel.slots);
        }
    }

    /// Assemble the composite covering every channel bound at `position`.
    pub fn composite(&self, position: usize) -> CompositeTarget {
        let mut color = Vec::new();
        let mut depth = None;
        for channel in &self.channels {
            if let Some(handle) = channel.target(position) {
                if channel.format.is_depth() {
                    depth = Some((channel.name, handle));
                } else {
                    color.push((channel.name, handle));
                }
            }
        }
        CompositeTarget {
            slot: position,
            color,
            depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (ChannelRegistry, RenderTargetPool) {
        let mut pool = RenderTargetPool::new(16, 16, 32);
        let mut registry = ChannelRegistry::new();
        registry
            .register(&mut pool, ChannelName::Direct, 4, FormatKind::HighPrecisionColor)
            .unwrap();
        registry
            .register(&mut pool, ChannelName::Moment, 3, FormatKind::HighPrecisionColor)
            .unwrap();
        registry
            .register(&mut pool, ChannelName::Motion, 1, FormatKind::HighPrecisionColor)
            .unwrap();
        registry
            .register(&mut pool, ChannelName::Depth, 4, FormatKind::Depth)
            .unwrap();
        (registry, pool)
    }

    #[test]
    fn single_role_channel_lives_at_trace_slot() {
        let (registry, _) = registry();
        let motion = registry.get(ChannelName::Motion).unwrap();

        assert_eq!(motion.slot(0), Slot::Absent);
        assert_eq!(motion.slot(SCRATCH_SLOT), Slot::Absent);
        assert!(motion.slot(TRACE_SLOT).is_bound());
        assert!(!motion.is_temporal());
    }

    #[test]
    fn resolve_reports_absent_roles() {
        let (registry, pool) = registry();

        assert!(registry.resolve(ChannelName::Moment, TRACE_SLOT).is_none());
        let handle = registry.resolve(ChannelName::Moment, SCRATCH_SLOT).unwrap();
        let desc = pool.get(handle).unwrap();
        assert_eq!(desc.channel, ChannelName::Moment);
        assert_eq!(desc.slot, SCRATCH_SLOT);
        assert!(registry.resolve(ChannelName::Normal, 0).is_none());
    }

    #[test]
    fn roles_follow_the_history_rotation() {
        let (registry, _) = registry();
        let mut history = TemporalHistory::new(&registry);
        let history_before = registry.resolve_role(ChannelName::Direct, SlotRole::History, &history);
        let current_before = registry.resolve_role(ChannelName::Direct, SlotRole::Current, &history);
        assert_eq!(history_before, registry.resolve(ChannelName::Direct, 0));

        history.advance();
        assert_eq!(
            registry.resolve_role(ChannelName::Direct, SlotRole::History, &history),
            current_before
        );
        assert_eq!(
            registry.resolve_role(ChannelName::Direct, SlotRole::Current, &history),
            history_before
        );
        assert!(registry
            .resolve_role(ChannelName::Motion, SlotRole::History, &history)
            .is_none());
        assert!(registry
            .resolve_role(ChannelName::Motion, SlotRole::Trace, &history)
            .is_some());
    }

    #[test]
    fn eager_allocation_counts() {
        let (_, pool) = registry();
        assert_eq!(pool.len(), 4 + 3 + 1 + 4);
    }

    #[test]
    fn composite_splits_color_and_depth() {
        let (registry, _) = registry();

        let trace = registry.composite(TRACE_SLOT);
        let names: Vec<_> = trace.color.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec![ChannelName::Direct, ChannelName::Motion]);
        assert_eq!(trace.depth.map(|(n, _)| n), Some(ChannelName::Depth));

        let scratch = registry.composite(SCRATCH_SLOT);
        assert!(scratch.writes(ChannelName::Moment));
        assert!(!scratch.writes(ChannelName::Motion));
    }

    #[test]
    fn for_each_channel_keeps_registration_order() {
        let (registry, _) = registry();
        let mut seen = Vec::new();
        registry.for_each_channel(|name, slots| seen.push((name, slots.len())));
        assert_eq!(
            seen,
            vec![
                (ChannelName::Direct, SLOT_COUNT),
                (ChannelName::Moment, SLOT_COUNT),
                (ChannelName::Motion, SLOT_COUNT),
                (ChannelName::Depth, SLOT_COUNT),
            ]
        );
    }

    #[test]
    fn rejects_bad_registrations() {
        let (mut registry, mut pool) = registry();

        assert!(matches!(
            registry.register(&mut pool, ChannelName::Direct, 2, FormatKind::HighPrecisionColor),
            Err(PipelineError::Config(_))
        ));
        assert!(matches!(
            registry.register(&mut pool, ChannelName::Normal, 5, FormatKind::HighPrecisionColor),
            Err(PipelineError::Config(_))
        ));
        assert!(matches!(
            registry.register(&mut pool, ChannelName::Normal, 0, FormatKind::HighPrecisionColor),
            Err(PipelineError::Config(_))
        ));
    }
}
