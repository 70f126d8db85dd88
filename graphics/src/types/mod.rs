//! Common types and descriptors for graphics resources.
//!
//! This module contains format enums, usage flags, resource states and
//! descriptor structs used throughout the graphics system.

mod buffer;
mod common;
mod sampler;
mod state;
mod texture;

pub use buffer::{BufferDescriptor, BufferUsage, MemoryLocation};
pub use common::{
    CONSTANT_BUFFER_ALIGNMENT, ROW_PITCH_ALIGNMENT, ScissorRect, Viewport, align_up,
};
pub use sampler::{AddressMode, Filter, FilterMode, SamplerDescriptor};
pub use state::{
    BlendFactor, BlendOp, BlendState, CompareFunction, CullMode, DepthStencilState, IndexFormat,
    PrimitiveTopology, RasterizerState, ResourceState, TopologyClass, VertexComponent,
    VertexFormat,
};
pub use texture::{Footprint, TextureDescriptor, TextureFormat, TextureUsage};
