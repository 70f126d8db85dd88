//! Buffer types and descriptors.

use bitflags::bitflags;

use super::ResourceState;

bitflags! {
    /// Usage flags for buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Buffer can be used as a vertex buffer.
        const VERTEX = 1 << 0;
        /// Buffer can be used as an index buffer.
        const INDEX = 1 << 1;
        /// Buffer can be used as a constant (uniform) buffer.
        const UNIFORM = 1 << 2;
        /// Buffer can be copied from.
        const COPY_SRC = 1 << 3;
        /// Buffer can be copied to.
        const COPY_DST = 1 << 4;
        /// Buffer is mappable for CPU reads.
        const MAP_READ = 1 << 5;
        /// Buffer is mappable for CPU writes.
        const MAP_WRITE = 1 << 6;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Which heap a buffer lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryLocation {
    /// Device-local, not CPU visible.
    #[default]
    GpuOnly,
    /// CPU-writable, GPU-readable. Always in [`ResourceState::GenericRead`].
    Upload,
    /// GPU-writable, CPU-readable. Always in [`ResourceState::CopyDest`].
    Readback,
}

impl MemoryLocation {
    /// The state a resource in this heap starts in.
    pub const fn default_state(self) -> ResourceState {
        match self {
            Self::GpuOnly => ResourceState::Common,
            Self::Upload => ResourceState::GenericRead,
            Self::Readback => ResourceState::CopyDest,
        }
    }
}

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Usage flags.
    pub usage: BufferUsage,
    /// Heap the buffer is allocated in.
    pub memory: MemoryLocation,
    /// State the buffer is created in.
    pub initial_state: ResourceState,
}

impl BufferDescriptor {
    /// Create a new device-local buffer descriptor.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
            memory: MemoryLocation::GpuOnly,
            initial_state: ResourceState::Common,
        }
    }

    /// A CPU-writable staging/constant buffer.
    pub fn upload(size: u64, usage: BufferUsage) -> Self {
        Self::new(size, usage | BufferUsage::MAP_WRITE).with_memory(MemoryLocation::Upload)
    }

    /// A CPU-readable copy destination.
    pub fn readback(size: u64) -> Self {
        Self::new(size, BufferUsage::COPY_DST | BufferUsage::MAP_READ)
            .with_memory(MemoryLocation::Readback)
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the heap. Also resets the initial state to the heap's default.
    pub fn with_memory(mut self, memory: MemoryLocation) -> Self {
        self.memory = memory;
        self.initial_state = memory.default_state();
        self
    }

    /// Set the state the buffer is created in.
    pub fn with_initial_state(mut self, state: ResourceState) -> Self {
        self.initial_state = state;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_descriptor() {
        let desc = BufferDescriptor::upload(256, BufferUsage::UNIFORM).with_label("camera");
        assert_eq!(desc.memory, MemoryLocation::Upload);
        assert_eq!(desc.initial_state, ResourceState::GenericRead);
        assert!(desc.usage.contains(BufferUsage::UNIFORM | BufferUsage::MAP_WRITE));
        assert_eq!(desc.label.as_deref(), Some("camera"));
    }

    #[test]
    fn test_readback_descriptor() {
        let desc = BufferDescriptor::readback(1024);
        assert_eq!(desc.initial_state, ResourceState::CopyDest);
        assert!(desc.usage.contains(BufferUsage::MAP_READ));
    }
}
