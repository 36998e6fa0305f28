//! Render targets and the pool that allocates them.
//!
//! The pool only hands out descriptors and handles. Turning a descriptor into
//! GPU memory is the backend's job, which keeps the bookkeeping testable
//! without a device.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::render_graph::ChannelName;

/// Pixel storage of a render target.
///
/// Every target is a data buffer rather than a visual texture, so programs
/// always read it with nearest, clamp-to-edge integer loads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    /// Four 32-bit float channels.
    HighPrecisionColor,
    /// A single 32-bit float depth value, attached as the depth buffer.
    Depth,
}

impl FormatKind {
    /// The wgpu format backing this kind.
    pub fn texture_format(self) -> wgpu::TextureFormat {
        match self {
            FormatKind::HighPrecisionColor => wgpu::TextureFormat::Rgba32Float,
            FormatKind::Depth => wgpu::TextureFormat::Depth32Float,
        }
    }

    /// Bytes per pixel when used as a color attachment.
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            FormatKind::HighPrecisionColor => 16,
            FormatKind::Depth => 4,
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(self, FormatKind::Depth)
    }
}

/// Opaque reference to a pooled render target.
///
/// The wrapped index is the allocation order, which is stable for the
/// lifetime of the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderTargetHandle(u32);

impl RenderTargetHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Everything a backend needs to materialize one target.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetDesc {
    pub handle: RenderTargetHandle,
    pub channel: ChannelName,
    pub slot: usize,
    pub format: FormatKind,
    pub width: u32,
    pub height: u32,
}

impl TargetDesc {
    /// Debug label, e.g. `direct[2]`.
    pub fn label(&self) -> String {
        format!("{}[{}]", self.channel, self.slot)
    }
}

/// Allocates typed render targets at one fixed resolution.
///
/// Each allocation consumes one addressable image unit. Running out is a
/// configuration error: the pool never grows, and it is never resized; a new
/// resolution means a new pool.
pub struct RenderTargetPool {
    width: u32,
    height: u32,
    capacity: usize,
    targets: Vec<TargetDesc>,
}

impl RenderTargetPool {
    pub fn new(width: u32, height: u32, capacity: usize) -> Self {
        Self {
            width,
            height,
            capacity,
            targets: Vec::new(),
        }
    }

    /// Allocate a target for `channel` at slot position `slot`.
    pub fn allocate(
        &mut self,
        channel: ChannelName,
        slot: usize,
        format: FormatKind,
    ) -> Result<RenderTargetHandle> {
        if self.targets.len() >= self.capacity {
            return Err(PipelineError::PoolExhausted {
                requested: self.targets.len() + 1,
                capacity: self.capacity,
            });
        }

        let handle = RenderTargetHandle(self.targets.len() as u32);
        self.targets.push(TargetDesc {
            handle,
            channel,
            slot,
            format,
            width: self.width,
            height: self.height,
        });
        Ok(handle)
    }

    pub fn get(&self, handle: RenderTargetHandle) -> Option<&TargetDesc> {
        self.targets.get(handle.index())
    }

    /// All descriptors in allocation order.
    pub fn targets(&self) -> &[TargetDesc] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// A GPU texture created for one pooled target.
///
/// Targets are both rendered to (as a color or depth attachment) and read by
/// later passes (as a texture binding).
pub struct RenderTarget {
    /// The underlying GPU texture.
    pub texture: wgpu::Texture,
    /// View used for both attachment and binding.
    pub view: wgpu::TextureView,
    pub format: FormatKind,
}

impl RenderTarget {
    pub fn new(device: &wgpu::Device, desc: &TargetDesc) -> Self {
        let label = desc.label();
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format.texture_format(),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            format: desc.format,
        }
    }
}
