//! GPU resources.
//!
//! This module contains the GPU object types that are created by [`GraphicsDevice`]:
//! - [`Buffer`] - GPU memory buffer
//! - [`Texture`] - GPU texture/image
//! - [`Sampler`] - Texture sampler
//! - [`RootSignature`] - Binding layout of a pipeline
//! - [`PipelineState`] - Compiled graphics pipeline
//! - [`DescriptorTable`] - Shader-visible table of textures or samplers
//!
//! Objects are reference-counted with [`Arc`] and can be shared across threads.
//! Each carries a device-unique id used by backends and diagnostics.
//!
//! [`GraphicsDevice`]: crate::GraphicsDevice
//! [`Arc`]: std::sync::Arc

mod buffer;
mod descriptor_table;
mod pipeline_state;
mod root_signature;
mod sampler;
mod texture;

pub use buffer::Buffer;
pub use descriptor_table::{DescriptorSlot, DescriptorTable, DescriptorTableDescriptor};
pub use pipeline_state::{PipelineState, PipelineStateDescriptor, VertexInputElement};
pub use root_signature::{
    DescriptorTableKind, RootParameter, RootSignature, RootSignatureDescriptor,
};
pub use sampler::Sampler;
pub use texture::Texture;
