//! wgpu GPU backend implementation.
//!
//! This backend uses wgpu for cross-platform GPU access, supporting
//! Vulkan, Metal, DX12 and GL. The explicit model maps onto wgpu as
//! follows:
//!
//! - a root signature is a pipeline layout with one bind group per root
//!   parameter, at the parameter's index;
//! - a root constant buffer binds through a bind group cached on the buffer;
//! - a descriptor table is a bind group;
//! - both queues submit to the single wgpu queue, so submission order is
//!   global;
//! - fences advance from `on_submitted_work_done` callbacks;
//! - barriers are recorded for validation only; wgpu tracks states itself.

mod conversion;
mod encoding;
mod resources;
mod surface;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::command::{Command, QueueKind};
use crate::device::DeviceCapabilities;
use crate::error::GraphicsError;
use crate::instance::{InstanceParameters, PowerPreference};
use crate::resources::{
    Buffer, DescriptorTableDescriptor, DescriptorTableKind, PipelineStateDescriptor,
    RootSignatureDescriptor, Texture,
};
use crate::sync::Fence;
use crate::types::{BufferDescriptor, SamplerDescriptor, TextureDescriptor, TextureFormat};

use super::{
    GpuBackend, GpuBuffer, GpuDescriptorTable, GpuPipelineState, GpuRootSignature, GpuSampler,
    GpuTexture, WindowTarget,
};

/// Bind groups a root signature may need: camera, node and material
/// constants plus the texture and sampler tables.
const REQUIRED_BIND_GROUPS: u32 = 5;

/// Vertex buffer offsets and strides must be multiples of this.
const VERTEX_ALIGNMENT: u64 = 4;

/// Shape of the bind group layout behind one root parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LayoutKey {
    ConstantBuffer,
    Table(DescriptorTableKind, u32),
}

/// wgpu-based GPU backend.
pub struct WgpuBackend {
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    capabilities: DeviceCapabilities,
    layouts: Mutex<HashMap<LayoutKey, wgpu::BindGroupLayout>>,
    defaults: resources::DefaultBindings,
    surface: Mutex<Option<surface::SurfaceState>>,
}

impl std::fmt::Debug for WgpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuBackend")
            .field("adapter", &self.adapter.get_info().name)
            .finish()
    }
}

impl WgpuBackend {
    /// Create a new wgpu backend with default parameters.
    pub fn new() -> Result<Self, GraphicsError> {
        Self::with_params(&InstanceParameters::default())
    }

    /// Create a new wgpu backend with custom parameters.
    pub fn with_params(params: &InstanceParameters) -> Result<Self, GraphicsError> {
        // Determine which wgpu backends to enable
        let backends = params.wgpu_backend.to_wgpu_backends();

        // Configure instance flags based on validation/debug settings
        let mut flags = wgpu::InstanceFlags::default();
        if params.validation {
            flags |= wgpu::InstanceFlags::VALIDATION;
            flags |= wgpu::InstanceFlags::GPU_BASED_VALIDATION;
        }
        if params.debug {
            flags |= wgpu::InstanceFlags::DEBUG;
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            flags,
            backend_options: wgpu::BackendOptions::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
        });

        let power_preference = match params.power_preference {
            PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
            PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
        };
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| {
            GraphicsError::InitializationFailed(format!("No compatible GPU adapter: {e}"))
        })?;

        log::info!("wgpu adapter: {:?}", adapter.get_info());

        let limits = adapter.limits();
        if limits.max_bind_groups < REQUIRED_BIND_GROUPS {
            return Err(GraphicsError::InitializationFailed(format!(
                "adapter supports {} bind groups, {} required",
                limits.max_bind_groups, REQUIRED_BIND_GROUPS
            )));
        }

        // Float readback targets blend only with this feature.
        let features = adapter.features() & wgpu::Features::FLOAT32_BLENDABLE;
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("RenderLab Device"),
            required_features: features,
            required_limits: limits.clone(),
            memory_hints: wgpu::MemoryHints::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| {
            GraphicsError::InitializationFailed(format!("Device creation failed: {e}"))
        })?;

        let capabilities = DeviceCapabilities {
            max_texture_dimension: limits.max_texture_dimension_2d,
            max_buffer_size: limits.max_buffer_size,
            vertex_buffer_offset_alignment: VERTEX_ALIGNMENT,
            vertex_stride_alignment: VERTEX_ALIGNMENT as u32,
            float32_blendable: features.contains(wgpu::Features::FLOAT32_BLENDABLE),
        };
        let defaults = resources::DefaultBindings::new(&device, &queue);

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            capabilities,
            layouts: Mutex::new(HashMap::new()),
            defaults,
            surface: Mutex::new(None),
        })
    }

    /// Get the wgpu device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Get the wgpu queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Block until the device has finished all submitted work.
    fn poll_wait(&self) -> Result<(), GraphicsError> {
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map(|_| ())
            .map_err(|e| GraphicsError::Internal(format!("device poll failed: {e}")))
    }
}

impl GpuBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu Backend"
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn create_buffer(
        &self,
        _id: u64,
        descriptor: &BufferDescriptor,
    ) -> Result<GpuBuffer, GraphicsError> {
        self.create_buffer_resource(descriptor)
    }

    fn create_texture(
        &self,
        _id: u64,
        descriptor: &TextureDescriptor,
    ) -> Result<GpuTexture, GraphicsError> {
        self.create_texture_resource(descriptor)
    }

    fn create_sampler(
        &self,
        _id: u64,
        descriptor: &SamplerDescriptor,
    ) -> Result<GpuSampler, GraphicsError> {
        self.create_sampler_resource(descriptor)
    }

    fn create_root_signature(
        &self,
        _id: u64,
        descriptor: &RootSignatureDescriptor,
    ) -> Result<GpuRootSignature, GraphicsError> {
        self.create_root_signature_layout(descriptor)
    }

    fn create_pipeline_state(
        &self,
        _id: u64,
        descriptor: &PipelineStateDescriptor,
    ) -> Result<GpuPipelineState, GraphicsError> {
        self.create_render_pipeline(descriptor)
    }

    fn create_descriptor_table(
        &self,
        _id: u64,
        descriptor: &DescriptorTableDescriptor,
    ) -> Result<GpuDescriptorTable, GraphicsError> {
        self.create_table_bind_group(descriptor)
    }

    fn write_buffer(&self, buffer: &Buffer, offset: u64, data: &[u8]) -> Result<(), GraphicsError> {
        let GpuBuffer::Wgpu { buffer: target, .. } = buffer.handle() else {
            return Err(GraphicsError::Internal(format!(
                "buffer '{}' has no wgpu handle",
                buffer.debug_name()
            )));
        };
        if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "write offset {offset} into '{}' is not 4-byte aligned",
                buffer.debug_name()
            )));
        }
        if data.len() as u64 % wgpu::COPY_BUFFER_ALIGNMENT == 0 {
            self.queue.write_buffer(target, offset, data);
        } else {
            // Buffers are allocated padded, so the tail fits.
            let mut padded = data.to_vec();
            padded.resize(
                crate::types::align_up(data.len() as u64, wgpu::COPY_BUFFER_ALIGNMENT) as usize,
                0,
            );
            self.queue.write_buffer(target, offset, &padded);
        }
        Ok(())
    }

    fn read_buffer(&self, buffer: &Buffer, offset: u64, size: u64) -> Result<Vec<u8>, GraphicsError> {
        let GpuBuffer::Wgpu { buffer: source, .. } = buffer.handle() else {
            return Err(GraphicsError::Internal(format!(
                "buffer '{}' has no wgpu handle",
                buffer.debug_name()
            )));
        };

        let slice = source.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.poll_wait()?;

        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(GraphicsError::Internal(format!(
                    "mapping '{}' failed: {e}",
                    buffer.debug_name()
                )));
            }
            Err(_) => {
                return Err(GraphicsError::Internal(format!(
                    "mapping '{}' never completed",
                    buffer.debug_name()
                )));
            }
        }

        let data = {
            let mapped = slice.get_mapped_range();
            mapped[offset as usize..(offset + size) as usize].to_vec()
        };
        source.unmap();
        Ok(data)
    }

    fn execute(&self, queue: QueueKind, commands: &[Command]) -> Result<(), GraphicsError> {
        let command_buffer = self.encode(queue, commands)?;
        self.queue.submit(std::iter::once(command_buffer));
        Ok(())
    }

    fn signal(&self, queue: QueueKind, fence: &Arc<Fence>, value: u64) -> Result<(), GraphicsError> {
        let fence = Arc::clone(fence);
        log::trace!("wgpu: {queue} signal {value} queued");
        self.queue
            .on_submitted_work_done(move || fence.advance_to(value));
        Ok(())
    }

    fn wait_for_fence_value(&self, fence: &Fence, value: u64) -> Result<(), GraphicsError> {
        if fence.is_reached(value) {
            return Ok(());
        }
        self.poll_wait()?;
        if fence.is_reached(value) {
            Ok(())
        } else {
            Err(GraphicsError::FenceNeverSignaled {
                fence: fence.label().to_string(),
                value,
            })
        }
    }

    fn configure_surface(
        &self,
        window: Arc<dyn WindowTarget>,
        width: u32,
        height: u32,
    ) -> Result<TextureFormat, GraphicsError> {
        self.configure_window_surface(window, width, height)
    }

    fn present(&self, texture: &Texture) -> Result<(), GraphicsError> {
        self.present_to_surface(texture)
    }
}
