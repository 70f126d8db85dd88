//! Graphics device.
//!
//! The [`GraphicsDevice`] is the explicit device context: it owns the
//! backend, the direct and copy [`CommandQueue`]s and their fences, and
//! creates every GPU object. It is created by
//! [`GraphicsInstance::create_device`](crate::GraphicsInstance::create_device)
//! or directly from a backend with [`GraphicsDevice::new`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::{GpuBackend, WindowTarget};
use crate::command::{CommandAllocator, CommandList, CommandQueue, QueueKind};
use crate::error::GraphicsError;
use crate::resources::{
    Buffer, DescriptorSlot, DescriptorTable, DescriptorTableDescriptor, DescriptorTableKind,
    PipelineState, PipelineStateDescriptor, RootParameter, RootSignature,
    RootSignatureDescriptor, Sampler, Texture,
};
use crate::sync::Fence;
use crate::types::{
    BufferDescriptor, MemoryLocation, SamplerDescriptor, TextureDescriptor, TextureFormat,
};

/// Capabilities of a graphics device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceCapabilities {
    /// Maximum texture dimension.
    pub max_texture_dimension: u32,
    /// Maximum buffer size.
    pub max_buffer_size: u64,
    /// Vertex buffer view offsets must be multiples of this.
    pub vertex_buffer_offset_alignment: u64,
    /// Vertex strides must be multiples of this.
    pub vertex_stride_alignment: u32,
    /// `Rgba32Float` render targets support blending.
    pub float32_blendable: bool,
}

impl DeviceCapabilities {
    /// Whether pipelines rendering to `format` can blend.
    pub fn can_blend(&self, format: TextureFormat) -> bool {
        format.is_blendable() || (format == TextureFormat::Rgba32Float && self.float32_blendable)
    }
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            max_texture_dimension: 16384,
            max_buffer_size: 1 << 30, // 1 GB
            vertex_buffer_offset_alignment: 1,
            vertex_stride_alignment: 1,
            float32_blendable: true,
        }
    }
}

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique id for a GPU object.
pub(crate) fn next_resource_id() -> u64 {
    NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed)
}

/// A graphics device for creating GPU objects and submitting work.
///
/// # Thread Safety
///
/// `GraphicsDevice` is `Send + Sync`. Queues serialize their own
/// submissions; command lists are recorded by one thread at a time.
///
/// # Example
///
/// ```ignore
/// let instance = GraphicsInstance::new()?;
/// let device = instance.create_device()?;
///
/// let staging = device.create_buffer(&BufferDescriptor::upload(1024, BufferUsage::COPY_SRC))?;
/// device.write_buffer(&staging, 0, &bytes)?;
///
/// let allocator = device.create_command_allocator(QueueKind::Copy, "upload");
/// let mut list = device.create_command_list(QueueKind::Copy, &allocator, "upload")?;
/// list.copy_buffer_region(&vertices, 0, &staging, 0, 1024);
/// list.close()?;
///
/// let queue = device.copy_queue();
/// queue.execute_command_lists(&[&list])?;
/// let value = queue.signal()?;
/// device.wait_for_fence_value(queue.fence(), value)?;
/// ```
pub struct GraphicsDevice {
    name: String,
    capabilities: DeviceCapabilities,
    backend: Arc<dyn GpuBackend>,
    direct_queue: CommandQueue,
    copy_queue: CommandQueue,
}

impl GraphicsDevice {
    /// Create a device context on top of `backend`.
    pub fn new(backend: Arc<dyn GpuBackend>) -> Arc<Self> {
        let name = backend.name().to_string();
        let capabilities = backend.capabilities();
        let direct_queue = CommandQueue::new(
            QueueKind::Direct,
            Arc::clone(&backend),
            Fence::new(next_resource_id(), "direct"),
        );
        let copy_queue = CommandQueue::new(
            QueueKind::Copy,
            Arc::clone(&backend),
            Fence::new(next_resource_id(), "copy"),
        );
        log::info!("GraphicsDevice: created on {name}");

        Arc::new(Self {
            name,
            capabilities,
            backend,
            direct_queue,
            copy_queue,
        })
    }

    /// Get the device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the device capabilities.
    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    /// The backend executing this device's work.
    pub fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    /// The queue of the given kind.
    pub fn queue(&self, kind: QueueKind) -> &CommandQueue {
        match kind {
            QueueKind::Direct => &self.direct_queue,
            QueueKind::Copy => &self.copy_queue,
        }
    }

    pub fn direct_queue(&self) -> &CommandQueue {
        &self.direct_queue
    }

    pub fn copy_queue(&self) -> &CommandQueue {
        &self.copy_queue
    }

    /// Create a GPU buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer size is zero, exceeds device limits,
    /// or allocation fails.
    pub fn create_buffer(
        &self,
        descriptor: &BufferDescriptor,
    ) -> Result<Arc<Buffer>, GraphicsError> {
        // Validate
        if descriptor.size > self.capabilities.max_buffer_size {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer size {} exceeds maximum {}",
                descriptor.size, self.capabilities.max_buffer_size
            )));
        }

        if descriptor.size == 0 {
            return Err(GraphicsError::InvalidParameter(
                "buffer size cannot be zero".to_string(),
            ));
        }

        let id = next_resource_id();
        let handle = self.backend.create_buffer(id, descriptor)?;
        let buffer = Arc::new(Buffer::new(id, descriptor.clone(), handle));

        log::trace!(
            "GraphicsDevice: created buffer {}, size={}, {:?}",
            buffer.debug_name(),
            descriptor.size,
            descriptor.memory
        );

        Ok(buffer)
    }

    /// Create a GPU texture.
    ///
    /// # Errors
    ///
    /// Returns an error if the texture dimensions are zero, exceed device
    /// limits, or allocation fails.
    pub fn create_texture(
        &self,
        descriptor: &TextureDescriptor,
    ) -> Result<Arc<Texture>, GraphicsError> {
        // Validate
        let max_dim = self.capabilities.max_texture_dimension;
        if descriptor.width > max_dim || descriptor.height > max_dim {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture dimension exceeds maximum {max_dim}"
            )));
        }

        if descriptor.width == 0 || descriptor.height == 0 {
            return Err(GraphicsError::InvalidParameter(
                "texture dimensions cannot be zero".to_string(),
            ));
        }

        let id = next_resource_id();
        let handle = self.backend.create_texture(id, descriptor)?;
        let texture = Arc::new(Texture::new(id, descriptor.clone(), handle));

        log::trace!(
            "GraphicsDevice: created texture {}, size={}x{} {:?}",
            texture.debug_name(),
            descriptor.width,
            descriptor.height,
            descriptor.format
        );

        Ok(texture)
    }

    /// Create a texture sampler.
    ///
    /// # Errors
    ///
    /// Returns an error if the LOD range is inverted or sampler creation fails.
    pub fn create_sampler(
        &self,
        descriptor: &SamplerDescriptor,
    ) -> Result<Arc<Sampler>, GraphicsError> {
        if descriptor.min_lod > descriptor.max_lod {
            return Err(GraphicsError::InvalidParameter(format!(
                "sampler min LOD {} above max LOD {}",
                descriptor.min_lod, descriptor.max_lod
            )));
        }

        let id = next_resource_id();
        let handle = self.backend.create_sampler(id, descriptor)?;

        log::trace!("GraphicsDevice: created sampler {:?}", descriptor.label);

        Ok(Arc::new(Sampler::new(id, descriptor.clone(), handle)))
    }

    /// Create a root signature.
    ///
    /// # Errors
    ///
    /// Returns an error if a descriptor table parameter is empty or two
    /// constant buffer parameters share a register.
    pub fn create_root_signature(
        &self,
        descriptor: &RootSignatureDescriptor,
    ) -> Result<Arc<RootSignature>, GraphicsError> {
        let mut registers = Vec::new();
        for (index, parameter) in descriptor.parameters.iter().enumerate() {
            match *parameter {
                RootParameter::ConstantBufferView { register } => {
                    if registers.contains(&register) {
                        return Err(GraphicsError::InvalidParameter(format!(
                            "root parameter {index} reuses register b{register}"
                        )));
                    }
                    registers.push(register);
                }
                RootParameter::DescriptorTable { count: 0, .. } => {
                    return Err(GraphicsError::InvalidParameter(format!(
                        "root parameter {index} is an empty descriptor table"
                    )));
                }
                RootParameter::DescriptorTable { .. } => {}
            }
        }

        let id = next_resource_id();
        let handle = self.backend.create_root_signature(id, descriptor)?;

        log::trace!(
            "GraphicsDevice: created root signature {:?} with {} parameters",
            descriptor.label,
            descriptor.parameters.len()
        );

        Ok(Arc::new(RootSignature::new(id, descriptor.clone(), handle)))
    }

    /// Compile a graphics pipeline-state object.
    ///
    /// # Errors
    ///
    /// Returns an error if the target formats are of the wrong kind, an
    /// input element is misaligned, or the backend rejects the pipeline.
    pub fn create_pipeline_state(
        &self,
        descriptor: &PipelineStateDescriptor,
    ) -> Result<Arc<PipelineState>, GraphicsError> {
        if descriptor.color_format.is_depth() {
            return Err(GraphicsError::InvalidParameter(format!(
                "color format {:?} is a depth format",
                descriptor.color_format
            )));
        }
        if !descriptor.depth_format.is_depth() {
            return Err(GraphicsError::InvalidParameter(format!(
                "depth format {:?} is not a depth format",
                descriptor.depth_format
            )));
        }

        let stride_alignment = self.capabilities.vertex_stride_alignment.max(1);
        for element in &descriptor.input_layout {
            if element.stride < element.format.size() {
                return Err(GraphicsError::InvalidParameter(format!(
                    "{} stride {} is smaller than its element size {}",
                    element.semantic,
                    element.stride,
                    element.format.size()
                )));
            }
            if element.stride % stride_alignment != 0 {
                return Err(GraphicsError::InvalidParameter(format!(
                    "{} stride {} is not a multiple of {stride_alignment}",
                    element.semantic, element.stride
                )));
            }
        }

        let id = next_resource_id();
        let handle = self.backend.create_pipeline_state(id, descriptor)?;

        log::trace!(
            "GraphicsDevice: created pipeline {:?}, {} inputs, {:?}",
            descriptor.label,
            descriptor.input_layout.len(),
            descriptor.topology
        );

        Ok(Arc::new(PipelineState::new(id, descriptor.clone(), handle)))
    }

    /// Create a shader-visible descriptor table.
    ///
    /// # Errors
    ///
    /// Returns an error if a slot holds a descriptor of the wrong kind.
    pub fn create_descriptor_table(
        &self,
        descriptor: &DescriptorTableDescriptor,
    ) -> Result<Arc<DescriptorTable>, GraphicsError> {
        for (index, slot) in descriptor.slots.iter().enumerate() {
            let matches = match slot {
                DescriptorSlot::Texture(_) => {
                    descriptor.kind == DescriptorTableKind::ShaderResource
                }
                DescriptorSlot::Sampler(_) => descriptor.kind == DescriptorTableKind::Sampler,
                DescriptorSlot::Empty => true,
            };
            if !matches {
                return Err(GraphicsError::InvalidParameter(format!(
                    "slot {index} of {:?} table {:?} holds the wrong descriptor kind",
                    descriptor.kind, descriptor.label
                )));
            }
        }

        let id = next_resource_id();
        let handle = self.backend.create_descriptor_table(id, descriptor)?;

        log::trace!(
            "GraphicsDevice: created {:?} table {:?} with {} slots",
            descriptor.kind,
            descriptor.label,
            descriptor.slots.len()
        );

        Ok(Arc::new(DescriptorTable::new(id, descriptor.clone(), handle)))
    }

    /// Create a standalone fence, starting at 0.
    pub fn create_fence(&self, label: impl Into<String>) -> Arc<Fence> {
        Arc::new(Fence::new(next_resource_id(), label))
    }

    /// Create a command allocator for lists of `kind`.
    pub fn create_command_allocator(
        &self,
        kind: QueueKind,
        label: impl Into<String>,
    ) -> Arc<CommandAllocator> {
        Arc::new(CommandAllocator::new(next_resource_id(), kind, label))
    }

    /// Create an open command list recording into `allocator`.
    ///
    /// # Errors
    ///
    /// Returns an error if the allocator belongs to another queue kind.
    pub fn create_command_list(
        &self,
        kind: QueueKind,
        allocator: &Arc<CommandAllocator>,
        label: impl Into<String>,
    ) -> Result<CommandList, GraphicsError> {
        CommandList::new(next_resource_id(), kind, allocator, label)
    }

    /// Write CPU data into an upload-heap buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is not CPU-writable or the range
    /// exceeds the buffer.
    pub fn write_buffer(
        &self,
        buffer: &Buffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        if buffer.memory() != MemoryLocation::Upload {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer '{}' is not in the upload heap",
                buffer.debug_name()
            )));
        }
        check_range(buffer, offset, data.len() as u64)?;
        self.backend.write_buffer(buffer, offset, data)
    }

    /// Read back `size` bytes of a readback-heap buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is not CPU-readable, the range exceeds
    /// the buffer, or a GPU write to it has not been observed complete.
    pub fn read_buffer(
        &self,
        buffer: &Buffer,
        offset: u64,
        size: u64,
    ) -> Result<Vec<u8>, GraphicsError> {
        if buffer.memory() != MemoryLocation::Readback {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer '{}' is not in the readback heap",
                buffer.debug_name()
            )));
        }
        check_range(buffer, offset, size)?;
        self.backend.read_buffer(buffer, offset, size)
    }

    /// Block until `fence` reaches `value`.
    ///
    /// This is the one wait primitive shared by both queues. Waiting on a
    /// value that is already reached still counts as observing it, which
    /// makes the resources it covers safe to use from the other queue.
    pub fn wait_for_fence_value(&self, fence: &Fence, value: u64) -> Result<(), GraphicsError> {
        log::trace!(
            "GraphicsDevice: waiting for fence '{}' to reach {} (at {})",
            fence.label(),
            value,
            fence.completed_value()
        );
        self.backend.wait_for_fence_value(fence, value)
    }

    /// Wait until both queues have drained.
    pub fn wait_idle(&self) -> Result<(), GraphicsError> {
        self.copy_queue.wait_idle()?;
        self.direct_queue.wait_idle()
    }

    /// Create or reconfigure the presentation surface.
    ///
    /// Returns the color format frames must be rendered in.
    pub fn configure_surface(
        &self,
        window: Arc<dyn WindowTarget>,
        width: u32,
        height: u32,
    ) -> Result<TextureFormat, GraphicsError> {
        if width == 0 || height == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "surface size {width}x{height} is empty"
            )));
        }
        self.backend.configure_surface(window, width, height)
    }

    /// Present a color target that is in the present state.
    pub fn present(&self, texture: &Texture) -> Result<(), GraphicsError> {
        self.backend.present(texture)
    }
}

fn check_range(buffer: &Buffer, offset: u64, size: u64) -> Result<(), GraphicsError> {
    match offset.checked_add(size) {
        Some(end) if end <= buffer.size() => Ok(()),
        _ => Err(GraphicsError::InvalidParameter(format!(
            "range {offset}+{size} exceeds buffer '{}' of {} bytes",
            buffer.debug_name(),
            buffer.size()
        ))),
    }
}

impl std::fmt::Debug for GraphicsDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsDevice")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

// Ensure GraphicsDevice is Send + Sync
static_assertions::assert_impl_all!(GraphicsDevice: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::types::{BufferUsage, TextureUsage};

    fn create_test_device() -> Arc<GraphicsDevice> {
        GraphicsDevice::new(Arc::new(DummyBackend::new()))
    }

    #[test]
    fn test_device_name() {
        let device = create_test_device();
        assert_eq!(device.name(), "Dummy Backend");
    }

    #[test]
    fn test_create_buffer() {
        let device = create_test_device();
        let buffer = device
            .create_buffer(&BufferDescriptor::new(1024, BufferUsage::VERTEX))
            .unwrap();
        assert_eq!(buffer.size(), 1024);
    }

    #[test]
    fn test_create_buffer_zero_size() {
        let device = create_test_device();
        let result = device.create_buffer(&BufferDescriptor::new(0, BufferUsage::VERTEX));
        assert!(result.is_err());
    }

    #[test]
    fn test_create_texture_zero_size() {
        let device = create_test_device();
        let result = device.create_texture(&TextureDescriptor::new_2d(
            0,
            512,
            TextureFormat::Rgba8Unorm,
            TextureUsage::TEXTURE_BINDING,
        ));
        assert!(result.is_err());
    }

    #[test]
    fn test_resource_ids_are_unique() {
        let device = create_test_device();
        let a = device
            .create_buffer(&BufferDescriptor::new(16, BufferUsage::VERTEX))
            .unwrap();
        let b = device
            .create_buffer(&BufferDescriptor::new(16, BufferUsage::VERTEX))
            .unwrap();
        assert_ne!(a.id(), b.id());
        assert_ne!(device.direct_queue().fence().id(), device.copy_queue().fence().id());
    }

    #[test]
    fn test_write_requires_upload_heap() {
        let device = create_test_device();
        let gpu_only = device
            .create_buffer(&BufferDescriptor::new(16, BufferUsage::VERTEX))
            .unwrap();
        assert!(device.write_buffer(&gpu_only, 0, &[0; 4]).is_err());

        let upload = device
            .create_buffer(&BufferDescriptor::upload(16, BufferUsage::COPY_SRC))
            .unwrap();
        assert!(device.write_buffer(&upload, 12, &[0; 8]).is_err());
        device.write_buffer(&upload, 0, &[1; 16]).unwrap();
    }

    #[test]
    fn test_descriptor_table_rejects_wrong_kind() {
        let device = create_test_device();
        let sampler = device.create_sampler(&SamplerDescriptor::default()).unwrap();
        let desc = DescriptorTableDescriptor::new(DescriptorTableKind::ShaderResource, 5)
            .with_slot(0, DescriptorSlot::Sampler(sampler));
        assert!(device.create_descriptor_table(&desc).is_err());
    }

    #[test]
    fn test_root_signature_rejects_duplicate_registers() {
        let device = create_test_device();
        let desc = RootSignatureDescriptor::new(vec![
            RootParameter::ConstantBufferView { register: 0 },
            RootParameter::ConstantBufferView { register: 0 },
        ]);
        assert!(device.create_root_signature(&desc).is_err());
    }

    #[test]
    fn test_wait_idle_advances_both_fences() {
        let device = create_test_device();
        device.wait_idle().unwrap();
        assert_eq!(device.copy_queue().fence().completed_value(), 1);
        assert_eq!(device.direct_queue().fence().completed_value(), 1);
    }
}
