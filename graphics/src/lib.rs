//! # RenderLab Graphics
//!
//! An explicit GPU command pipeline and a glTF scene renderer built on it.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`GraphicsInstance`] / [`GraphicsDevice`] - Backend selection and the
//!   device context owning the direct and copy [`CommandQueue`]s
//! - [`CommandList`] / [`CommandAllocator`] - Recorded commands with
//!   explicit [`ResourceState`] transitions
//! - [`Fence`] - Monotonic per-queue timelines
//! - [`scene`] - Resource table, material bank, meshes and pipeline cache
//! - [`frame`] - Frame resource rotation
//! - [`SceneRenderer`] - The draw traversal and frame loop
//! - Multiple backend support: wgpu, and Dummy (for testing)
//!
//! ## Example
//!
//! ```ignore
//! use renderlab_graphics::{GraphicsInstance, RendererConfig, SceneRenderer};
//! use renderlab_graphics::shader::GlslShaderCompiler;
//!
//! let device = GraphicsInstance::new().create_device()?;
//! let config = RendererConfig::new().with_readback("output");
//! let mut renderer = SceneRenderer::new(device, Arc::new(GlslShaderCompiler::new()), config);
//! renderer.init(&document)?;
//! renderer.update(1.0 / 60.0)?;
//! renderer.render()?;
//! ```

pub mod backend;
pub mod command;
pub mod device;
pub mod error;
pub mod frame;
pub mod instance;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod shader;
pub mod sync;
pub mod types;

// Re-export main types for convenience
pub use backend::{DummyBackend, GpuBackend, WindowTarget};
pub use command::{
    CommandAllocator, CommandList, CommandQueue, IndexBufferView, QueueKind, ResourceBarrier,
    VertexBufferView,
};
pub use device::{DeviceCapabilities, GraphicsDevice};
pub use error::GraphicsError;
pub use frame::{FrameRotator, FrameSlot, FrameTargets};
pub use instance::{BackendType, GraphicsInstance, InstanceParameters, PowerPreference};
pub use renderer::{
    AssetError, DiagnosticKind, Diagnostics, FrameError, FrameReport, InitError, OutputMode,
    RendererConfig, SceneRenderer,
};
pub use resources::{Buffer, DescriptorTable, PipelineState, RootSignature, Sampler, Texture};
pub use shader::{GlslShaderCompiler, ShaderCompiler};
pub use sync::Fence;
pub use types::{
    BufferDescriptor, BufferUsage, ResourceState, SamplerDescriptor, TextureDescriptor,
    TextureFormat, TextureUsage,
};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the graphics subsystem.
///
/// This should be called before using any graphics functionality.
pub fn init() {
    log::info!("RenderLab Graphics v{} initialized", VERSION);
}
