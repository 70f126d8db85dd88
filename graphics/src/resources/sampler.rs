//! GPU sampler resource.

use crate::backend::GpuSampler;
use crate::types::SamplerDescriptor;

/// A GPU texture sampler.
///
/// Samplers are created by [`GraphicsDevice::create_sampler`] and shared as
/// `Arc<Sampler>`.
///
/// [`GraphicsDevice::create_sampler`]: crate::GraphicsDevice::create_sampler
pub struct Sampler {
    id: u64,
    descriptor: SamplerDescriptor,
    handle: GpuSampler,
}

impl Sampler {
    /// Create a new sampler (called by GraphicsDevice).
    pub(crate) fn new(id: u64, descriptor: SamplerDescriptor, handle: GpuSampler) -> Self {
        Self {
            id,
            descriptor,
            handle,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the sampler descriptor.
    pub fn descriptor(&self) -> &SamplerDescriptor {
        &self.descriptor
    }

    /// Get the sampler label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    pub(crate) fn handle(&self) -> &GpuSampler {
        &self.handle
    }
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("id", &self.id)
            .field("filter", &self.descriptor.filter)
            .field("address_u", &self.descriptor.address_u)
            .field("address_v", &self.descriptor.address_v)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

// Ensure Sampler is Send + Sync
static_assertions::assert_impl_all!(Sampler: Send, Sync);
