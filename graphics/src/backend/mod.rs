//! GPU backend abstraction layer.
//!
//! This module provides a trait-based abstraction for GPU backends,
//! allowing the graphics crate to work with different GPU APIs.
//!
//! # Available Backends
//!
//! - Dummy: CPU emulation of the explicit API, for tests and machines
//!   without a GPU. Always built; the `dummy` feature (default) makes
//!   [`BackendType::Auto`] fall back to it.
//! - `wgpu-backend`: Cross-platform backend using wgpu
//!
//! # Architecture
//!
//! Each backend implements the [`GpuBackend`] trait, which provides:
//! - Resource creation (buffers, textures, samplers, root signatures,
//!   pipeline states, descriptor tables)
//! - Execution of recorded command lists per queue
//! - Fence signaling and CPU waits
//! - Surface configuration and present

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

pub mod dummy;

pub use dummy::DummyBackend;

use std::sync::Arc;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::command::{Command, QueueKind};
use crate::device::DeviceCapabilities;
use crate::error::GraphicsError;
use crate::instance::{BackendType, InstanceParameters};
use crate::resources::{
    Buffer, DescriptorTableDescriptor, PipelineStateDescriptor, RootSignatureDescriptor, Texture,
};
use crate::sync::Fence;
use crate::types::{BufferDescriptor, SamplerDescriptor, TextureDescriptor, TextureFormat};

/// A window a backend can present to.
pub trait WindowTarget: HasWindowHandle + HasDisplayHandle + Send + Sync {}

impl<T: HasWindowHandle + HasDisplayHandle + Send + Sync> WindowTarget for T {}

/// Handle to a GPU buffer resource.
pub enum GpuBuffer {
    /// Dummy backend (contents live in the backend, keyed by resource id)
    Dummy,
    /// wgpu backend buffer
    #[cfg(feature = "wgpu-backend")]
    Wgpu {
        buffer: wgpu::Buffer,
        /// Bind group used when the buffer is bound as a root CBV.
        constant_group: std::sync::OnceLock<wgpu::BindGroup>,
    },
}

impl std::fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy => write!(f, "GpuBuffer::Dummy"),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu { buffer, .. } => f
                .debug_struct("GpuBuffer::Wgpu")
                .field("buffer", buffer)
                .finish_non_exhaustive(),
        }
    }
}

/// Handle to a GPU texture resource.
pub enum GpuTexture {
    /// Dummy backend (no GPU allocation)
    Dummy,
    /// wgpu backend texture
    #[cfg(feature = "wgpu-backend")]
    Wgpu {
        texture: wgpu::Texture,
        view: wgpu::TextureView,
    },
}

impl std::fmt::Debug for GpuTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy => write!(f, "GpuTexture::Dummy"),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu { texture, view } => f
                .debug_struct("GpuTexture::Wgpu")
                .field("texture", texture)
                .field("view", view)
                .finish(),
        }
    }
}

/// Handle to a GPU sampler resource.
pub enum GpuSampler {
    /// Dummy backend (no GPU allocation)
    Dummy,
    /// wgpu backend sampler
    #[cfg(feature = "wgpu-backend")]
    Wgpu(wgpu::Sampler),
}

impl std::fmt::Debug for GpuSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy => write!(f, "GpuSampler::Dummy"),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(sampler) => f.debug_tuple("GpuSampler::Wgpu").field(sampler).finish(),
        }
    }
}

/// Handle to a root signature.
pub enum GpuRootSignature {
    Dummy,
    /// One bind group layout per root parameter, in parameter order.
    #[cfg(feature = "wgpu-backend")]
    Wgpu {
        layout: wgpu::PipelineLayout,
        bind_group_layouts: Vec<wgpu::BindGroupLayout>,
    },
}

impl std::fmt::Debug for GpuRootSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy => write!(f, "GpuRootSignature::Dummy"),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu {
                bind_group_layouts, ..
            } => f
                .debug_struct("GpuRootSignature::Wgpu")
                .field("bind_groups", &bind_group_layouts.len())
                .finish_non_exhaustive(),
        }
    }
}

/// Handle to a pipeline-state object.
pub enum GpuPipelineState {
    Dummy,
    #[cfg(feature = "wgpu-backend")]
    Wgpu(wgpu::RenderPipeline),
}

impl std::fmt::Debug for GpuPipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy => write!(f, "GpuPipelineState::Dummy"),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(pipeline) => f
                .debug_tuple("GpuPipelineState::Wgpu")
                .field(pipeline)
                .finish(),
        }
    }
}

/// Handle to a descriptor table.
pub enum GpuDescriptorTable {
    Dummy,
    #[cfg(feature = "wgpu-backend")]
    Wgpu(wgpu::BindGroup),
}

impl std::fmt::Debug for GpuDescriptorTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy => write!(f, "GpuDescriptorTable::Dummy"),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(group) => f
                .debug_tuple("GpuDescriptorTable::Wgpu")
                .field(group)
                .finish(),
        }
    }
}

/// GPU backend trait for abstracting different GPU APIs.
///
/// Resource ids are allocated by the device and are unique for the life of
/// the process. The device validates descriptors before they reach the
/// backend.
pub trait GpuBackend: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Limits and alignment rules of the underlying device.
    fn capabilities(&self) -> DeviceCapabilities;

    /// Create a buffer resource.
    fn create_buffer(&self, id: u64, descriptor: &BufferDescriptor)
    -> Result<GpuBuffer, GraphicsError>;

    /// Create a texture resource.
    fn create_texture(
        &self,
        id: u64,
        descriptor: &TextureDescriptor,
    ) -> Result<GpuTexture, GraphicsError>;

    /// Create a sampler resource.
    fn create_sampler(
        &self,
        id: u64,
        descriptor: &SamplerDescriptor,
    ) -> Result<GpuSampler, GraphicsError>;

    /// Create a root signature.
    fn create_root_signature(
        &self,
        id: u64,
        descriptor: &RootSignatureDescriptor,
    ) -> Result<GpuRootSignature, GraphicsError>;

    /// Compile a pipeline-state object.
    fn create_pipeline_state(
        &self,
        id: u64,
        descriptor: &PipelineStateDescriptor,
    ) -> Result<GpuPipelineState, GraphicsError>;

    /// Create a descriptor table.
    fn create_descriptor_table(
        &self,
        id: u64,
        descriptor: &DescriptorTableDescriptor,
    ) -> Result<GpuDescriptorTable, GraphicsError>;

    /// Write CPU data into an upload-heap buffer. The write is complete when
    /// this returns.
    fn write_buffer(&self, buffer: &Buffer, offset: u64, data: &[u8])
    -> Result<(), GraphicsError>;

    /// Read a readback-heap buffer. The caller must have observed the fence
    /// covering the last GPU write.
    fn read_buffer(&self, buffer: &Buffer, offset: u64, size: u64)
    -> Result<Vec<u8>, GraphicsError>;

    /// Execute one closed command list on `queue`.
    fn execute(&self, queue: QueueKind, commands: &[Command]) -> Result<(), GraphicsError>;

    /// Set `fence` to `value` once all work submitted to `queue` so far is done.
    fn signal(&self, queue: QueueKind, fence: &Arc<Fence>, value: u64)
    -> Result<(), GraphicsError>;

    /// Block until `fence` reaches `value`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::FenceNeverSignaled`] if no submitted signal
    /// will ever reach `value`.
    fn wait_for_fence_value(&self, fence: &Fence, value: u64) -> Result<(), GraphicsError>;

    /// Create or reconfigure the presentation surface for `window`.
    ///
    /// Returns the color format frames must be rendered in to be presented.
    fn configure_surface(
        &self,
        window: Arc<dyn WindowTarget>,
        width: u32,
        height: u32,
    ) -> Result<TextureFormat, GraphicsError>;

    /// Present `texture`, which must be in the present state.
    fn present(&self, texture: &Texture) -> Result<(), GraphicsError>;
}

/// Selects and creates a backend for `params`.
///
/// [`BackendType::Auto`] tries wgpu first and falls back to the dummy
/// backend.
pub fn create_backend(params: &InstanceParameters) -> Result<Arc<dyn GpuBackend>, GraphicsError> {
    match params.backend {
        BackendType::Dummy => {
            log::info!("Using dummy backend");
            Ok(Arc::new(dummy::DummyBackend::new()))
        }
        BackendType::Wgpu => create_wgpu_backend(params),
        BackendType::Auto => match create_wgpu_backend(params) {
            Ok(backend) => Ok(backend),
            Err(e) => auto_fallback(e),
        },
    }
}

/// `Auto` falls back to the dummy backend only when the `dummy` feature is
/// enabled.
#[cfg(feature = "dummy")]
fn auto_fallback(error: GraphicsError) -> Result<Arc<dyn GpuBackend>, GraphicsError> {
    log::warn!("Failed to create wgpu backend: {}", error);
    log::info!("Using dummy backend");
    Ok(Arc::new(dummy::DummyBackend::new()))
}

#[cfg(not(feature = "dummy"))]
fn auto_fallback(error: GraphicsError) -> Result<Arc<dyn GpuBackend>, GraphicsError> {
    Err(error)
}

#[cfg(feature = "wgpu-backend")]
fn create_wgpu_backend(params: &InstanceParameters) -> Result<Arc<dyn GpuBackend>, GraphicsError> {
    let backend = wgpu_backend::WgpuBackend::with_params(params)?;
    log::info!("Using wgpu backend");
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "wgpu-backend"))]
fn create_wgpu_backend(_params: &InstanceParameters) -> Result<Arc<dyn GpuBackend>, GraphicsError> {
    Err(GraphicsError::FeatureNotSupported(
        "built without the wgpu-backend feature".to_string(),
    ))
}

/// Check if a real GPU backend is available.
pub fn has_gpu_backend() -> bool {
    cfg!(feature = "wgpu-backend")
}
