//! Render-pass orchestration for the denoising pipeline.
//!
//! This module owns the bookkeeping side of rendering: which targets exist,
//! which channel each belongs to, which slot holds history this frame, and
//! which bindings each pass gets. Actual GPU work goes through the
//! [`GpuBackend`] trait.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   ┌─────────────────┐   ┌──────────────────┐
//! │ RenderTargetPool │◀──│ ChannelRegistry │◀──│  PassScheduler   │──▶ GpuBackend
//! │  (handles)       │   │ (name → slots)  │   │ (resolve, run)   │
//! └──────────────────┘   └─────────────────┘   └──────────────────┘
//!                                                      ▲
//!                                              ┌───────┴─────────┐
//!                                              │ TemporalHistory │
//!                                              │ (H/C rotation)  │
//!                                              └─────────────────┘
//! ```

mod channel;
mod graph;
mod history;
mod pass;
#[cfg(test)]
pub(crate) mod recording;
mod render_node;
mod render_target;
mod wgpu_backend;

pub use channel::{
    Channel, ChannelName, ChannelRegistry, CompositeTarget, SCRATCH_SLOT, SLOT_COUNT, Slot,
    TEMPORAL_SLOTS, TRACE_SLOT,
};
pub use graph::{MAX_FILTER_LEVELS, PassScheduler, step_sizes};
pub use history::{SlotRole, TemporalHistory, TemporalSlots};
pub use pass::{
    InputBinding, OutputLayout, PassKind, PassOutput, PassUniforms, ProgramLayout, ResolvedPass,
};
pub use render_node::{BackendLimits, GpuBackend, ProgramId};
pub use render_target::{
    FormatKind, RenderTarget, RenderTargetHandle, RenderTargetPool, TargetDesc,
};
pub use wgpu_backend::WgpuBackend;
