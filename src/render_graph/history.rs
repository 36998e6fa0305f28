//! Temporal history bookkeeping.
//!
//! For every channel that owns both temporal slot positions, the manager
//! records which one holds last frame's data (`history`) and which one this
//! frame writes (`current`). [`TemporalHistory::advance`] swaps them once per
//! completed frame:
//!
//! ```text
//! frame 0:  history=0  current=1   accumulate writes 1
//! frame 1:  history=1  current=0   accumulate reads 1, writes 0
//! frame 2:  history=0  current=1   ...
//! ```
//!
//! Scratch and trace positions are reused in place every frame.

use std::collections::BTreeMap;

use crate::render_graph::channel::{SCRATCH_SLOT, TEMPORAL_SLOTS, TRACE_SLOT};
use crate::render_graph::{ChannelName, ChannelRegistry};

/// What a slot position is used for during the current frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlotRole {
    /// Written by the previous frame, read by temporal passes.
    History,
    /// Written by this frame's accumulate pass; becomes history next frame.
    Current,
    Scratch,
    Trace,
}

/// The temporal pair of one channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TemporalSlots {
    pub history: usize,
    pub current: usize,
}

impl TemporalSlots {
    fn initial() -> Self {
        Self {
            history: TEMPORAL_SLOTS[0],
            current: TEMPORAL_SLOTS[1],
        }
    }

    /// Slot position playing `role` in a frame with this temporal pair.
    pub fn position(self, role: SlotRole) -> usize {
        match role {
            SlotRole::History => self.history,
            SlotRole::Current => self.current,
            SlotRole::Scratch => SCRATCH_SLOT,
            SlotRole::Trace => TRACE_SLOT,
        }
    }

    fn swapped(self) -> Self {
        Self {
            history: self.current,
            current: self.history,
        }
    }
}

/// Tracks history slots across frames.
#[derive(Clone, Debug)]
pub struct TemporalHistory {
    slots: BTreeMap<ChannelName, TemporalSlots>,
    valid: bool,
    advances: u64,
}

impl TemporalHistory {
    /// Start tracking every temporal channel of `registry`.
    ///
    /// History starts out invalid: nothing has been written to it yet.
    pub fn new(registry: &ChannelRegistry) -> Self {
        let slots = registry
            .channels()
            .iter()
            .filter(|c| c.is_temporal())
            .map(|c| (c.name(), TemporalSlots::initial()))
            .collect();
        Self {
            slots,
            valid: false,
            advances: 0,
        }
    }

    pub fn slots(&self, channel: ChannelName) -> Option<TemporalSlots> {
        self.slots.get(&channel).copied()
    }

    /// Slot position playing `role` for `channel` this frame.
    ///
    /// Temporal roles resolve to `None` for channels without history.
    pub fn position(&self, channel: ChannelName, role: SlotRole) -> Option<usize> {
        match role {
            SlotRole::History | SlotRole::Current => {
                self.slots(channel).map(|slots| slots.position(role))
            }
            SlotRole::Scratch => Some(SCRATCH_SLOT),
            SlotRole::Trace => Some(TRACE_SLOT),
        }
    }

    /// Rotate every channel after a completed frame.
    ///
    /// The slot just written becomes history and the stale history slot
    /// becomes next frame's write target.
    pub fn advance(&mut self) {
        for slots in self.slots.values_mut() {
            *slots = slots.swapped();
        }
        self.valid = true;
        self.advances += 1;
        debug_assert!(self.is_hazard_free());
    }

    /// Whether history slots hold data written by a previous frame.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Mark history as unusable, e.g. after a discarded frame.
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Number of completed frames since construction.
    pub fn advances(&self) -> u64 {
        self.advances
    }

    /// Whether every channel's history slot differs from its write slot.
    pub fn is_hazard_free(&self) -> bool {
        self.slots.values().all(|s| s.history != s.current)
    }

    pub fn channels(&self) -> impl Iterator<Item = (ChannelName, TemporalSlots)> + '_ {
        self.slots.iter().map(|(name, slots)| (*name, *slots))
    }
}
