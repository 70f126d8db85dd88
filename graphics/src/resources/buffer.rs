//! GPU buffer resource.

use crate::backend::GpuBuffer;
use crate::types::{BufferDescriptor, MemoryLocation, ResourceState};

/// A GPU buffer resource.
///
/// Buffers are created by [`GraphicsDevice::create_buffer`] and shared as
/// `Arc<Buffer>`. Command lists keep the `Arc` alive until the list is
/// reset, so a buffer referenced by in-flight work is never released early.
///
/// # Example
///
/// ```ignore
/// let buffer = device.create_buffer(&BufferDescriptor::new(1024, BufferUsage::VERTEX))?;
/// println!("Buffer size: {}", buffer.size());
/// ```
///
/// [`GraphicsDevice::create_buffer`]: crate::GraphicsDevice::create_buffer
pub struct Buffer {
    id: u64,
    descriptor: BufferDescriptor,
    handle: GpuBuffer,
}

impl Buffer {
    /// Create a new buffer (called by GraphicsDevice).
    pub(crate) fn new(id: u64, descriptor: BufferDescriptor, handle: GpuBuffer) -> Self {
        Self {
            id,
            descriptor,
            handle,
        }
    }

    /// Device-unique resource id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the buffer descriptor.
    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    /// Get the buffer size in bytes.
    pub fn size(&self) -> u64 {
        self.descriptor.size
    }

    /// Heap the buffer lives in.
    pub fn memory(&self) -> MemoryLocation {
        self.descriptor.memory
    }

    /// State the buffer was created in.
    pub fn initial_state(&self) -> ResourceState {
        self.descriptor.initial_state
    }

    /// Get the buffer label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Label for diagnostics, falling back to the id.
    pub fn debug_name(&self) -> String {
        match &self.descriptor.label {
            Some(label) => label.clone(),
            None => format!("buffer#{}", self.id),
        }
    }

    pub(crate) fn handle(&self) -> &GpuBuffer {
        &self.handle
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("size", &self.descriptor.size)
            .field("usage", &self.descriptor.usage)
            .field("memory", &self.descriptor.memory)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

// Ensure Buffer is Send + Sync
static_assertions::assert_impl_all!(Buffer: Send, Sync);
