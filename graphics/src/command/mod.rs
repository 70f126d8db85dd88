//! Explicit command recording and submission.
//!
//! Work reaches the GPU in four steps:
//!
//! 1. A [`CommandAllocator`] owns the memory commands are recorded into.
//! 2. A [`CommandList`] is reset onto an allocator, records commands and is
//!    closed.
//! 3. A [`CommandQueue`] executes closed lists in submission order.
//! 4. The queue signals its [`Fence`](crate::Fence) with the next value; once
//!    the CPU observes that value, every allocator used before the signal
//!    may be reset and reused.
//!
//! Two queue kinds exist: [`QueueKind::Direct`] accepts every command,
//! [`QueueKind::Copy`] only barriers and copies.
//!
//! Resource states are explicit. Every state change is a
//! [`ResourceBarrier`] recorded by the caller; backends never insert
//! transitions on their own.

mod allocator;
mod list;
mod queue;

use std::sync::Arc;

pub use allocator::CommandAllocator;
pub use list::CommandList;
pub use queue::CommandQueue;

use crate::resources::{Buffer, DescriptorTable, PipelineState, RootSignature, Texture};
use crate::types::{
    Footprint, IndexFormat, PrimitiveTopology, ResourceState, ScissorRect, Viewport,
};

/// Which command queue a list, allocator or submission belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    /// Graphics queue: draws, clears, copies and barriers.
    Direct,
    /// Transfer queue: copies and barriers only.
    Copy,
}

impl QueueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Copy => "copy",
        }
    }
}

impl std::fmt::Display for QueueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A buffer or texture referenced by a barrier.
#[derive(Debug, Clone)]
pub enum ResourceRef {
    Buffer(Arc<Buffer>),
    Texture(Arc<Texture>),
}

impl ResourceRef {
    pub fn id(&self) -> u64 {
        match self {
            Self::Buffer(buffer) => buffer.id(),
            Self::Texture(texture) => texture.id(),
        }
    }

    pub fn debug_name(&self) -> String {
        match self {
            Self::Buffer(buffer) => buffer.debug_name(),
            Self::Texture(texture) => texture.debug_name(),
        }
    }
}

impl From<Arc<Buffer>> for ResourceRef {
    fn from(buffer: Arc<Buffer>) -> Self {
        Self::Buffer(buffer)
    }
}

impl From<&Arc<Buffer>> for ResourceRef {
    fn from(buffer: &Arc<Buffer>) -> Self {
        Self::Buffer(Arc::clone(buffer))
    }
}

impl From<Arc<Texture>> for ResourceRef {
    fn from(texture: Arc<Texture>) -> Self {
        Self::Texture(texture)
    }
}

impl From<&Arc<Texture>> for ResourceRef {
    fn from(texture: &Arc<Texture>) -> Self {
        Self::Texture(Arc::clone(texture))
    }
}

/// A state transition of one resource.
#[derive(Debug, Clone)]
pub struct ResourceBarrier {
    pub resource: ResourceRef,
    pub before: ResourceState,
    pub after: ResourceState,
}

impl ResourceBarrier {
    pub fn transition(
        resource: impl Into<ResourceRef>,
        before: ResourceState,
        after: ResourceState,
    ) -> Self {
        Self {
            resource: resource.into(),
            before,
            after,
        }
    }
}

/// A range of a buffer bound as vertex input.
#[derive(Debug, Clone)]
pub struct VertexBufferView {
    pub buffer: Arc<Buffer>,
    pub offset: u64,
    pub size: u64,
    pub stride: u32,
}

/// A range of a buffer bound as index input.
#[derive(Debug, Clone)]
pub struct IndexBufferView {
    pub buffer: Arc<Buffer>,
    pub offset: u64,
    pub size: u64,
    pub format: IndexFormat,
}

/// One recorded command.
///
/// Commands hold strong references to everything they touch, so resources
/// stay alive until the list is reset after its submission completed.
#[derive(Debug, Clone)]
pub enum Command {
    ResourceBarrier(Vec<ResourceBarrier>),
    CopyBufferRegion {
        dst: Arc<Buffer>,
        dst_offset: u64,
        src: Arc<Buffer>,
        src_offset: u64,
        size: u64,
    },
    /// Copy a placed footprint of `src` into the whole of `dst`.
    CopyBufferToTexture {
        dst: Arc<Texture>,
        src: Arc<Buffer>,
        footprint: Footprint,
    },
    /// Copy the whole of `src` into a placed footprint of `dst`.
    CopyTextureToBuffer {
        dst: Arc<Buffer>,
        footprint: Footprint,
        src: Arc<Texture>,
    },
    SetViewport(Viewport),
    SetScissorRect(ScissorRect),
    SetRenderTargets {
        color: Option<Arc<Texture>>,
        depth: Option<Arc<Texture>>,
    },
    ClearRenderTarget {
        target: Arc<Texture>,
        color: [f32; 4],
    },
    ClearDepthStencil {
        target: Arc<Texture>,
        depth: f32,
    },
    SetPipelineState(Arc<PipelineState>),
    SetGraphicsRootSignature(Arc<RootSignature>),
    SetPrimitiveTopology(PrimitiveTopology),
    SetVertexBuffers {
        start_slot: u32,
        views: Vec<VertexBufferView>,
    },
    SetIndexBuffer(Option<IndexBufferView>),
    SetGraphicsRootConstantBufferView {
        parameter: u32,
        buffer: Arc<Buffer>,
    },
    SetGraphicsRootDescriptorTable {
        parameter: u32,
        table: Arc<DescriptorTable>,
    },
    DrawInstanced {
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    },
    DrawIndexedInstanced {
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    },
}

impl Command {
    /// Command name for logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ResourceBarrier(_) => "ResourceBarrier",
            Self::CopyBufferRegion { .. } => "CopyBufferRegion",
            Self::CopyBufferToTexture { .. } => "CopyBufferToTexture",
            Self::CopyTextureToBuffer { .. } => "CopyTextureToBuffer",
            Self::SetViewport(_) => "SetViewport",
            Self::SetScissorRect(_) => "SetScissorRect",
            Self::SetRenderTargets { .. } => "SetRenderTargets",
            Self::ClearRenderTarget { .. } => "ClearRenderTarget",
            Self::ClearDepthStencil { .. } => "ClearDepthStencil",
            Self::SetPipelineState(_) => "SetPipelineState",
            Self::SetGraphicsRootSignature(_) => "SetGraphicsRootSignature",
            Self::SetPrimitiveTopology(_) => "SetPrimitiveTopology",
            Self::SetVertexBuffers { .. } => "SetVertexBuffers",
            Self::SetIndexBuffer(_) => "SetIndexBuffer",
            Self::SetGraphicsRootConstantBufferView { .. } => "SetGraphicsRootConstantBufferView",
            Self::SetGraphicsRootDescriptorTable { .. } => "SetGraphicsRootDescriptorTable",
            Self::DrawInstanced { .. } => "DrawInstanced",
            Self::DrawIndexedInstanced { .. } => "DrawIndexedInstanced",
        }
    }

    /// Whether a copy queue accepts this command.
    pub fn allowed_on_copy_queue(&self) -> bool {
        matches!(
            self,
            Self::ResourceBarrier(_)
                | Self::CopyBufferRegion { .. }
                | Self::CopyBufferToTexture { .. }
                | Self::CopyTextureToBuffer { .. }
        )
    }

    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            Self::DrawInstanced { .. } | Self::DrawIndexedInstanced { .. }
        )
    }
}
