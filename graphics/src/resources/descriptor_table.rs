//! Shader-visible descriptor tables.

use std::sync::Arc;

use crate::backend::GpuDescriptorTable;

use super::{DescriptorTableKind, Sampler, Texture};

/// One entry of a descriptor table.
#[derive(Debug, Clone, Default)]
pub enum DescriptorSlot {
    Texture(Arc<Texture>),
    Sampler(Arc<Sampler>),
    /// Unwritten slot. Backends bind a neutral default.
    #[default]
    Empty,
}

impl DescriptorSlot {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Descriptor for creating a descriptor table.
#[derive(Debug, Clone)]
pub struct DescriptorTableDescriptor {
    pub label: Option<String>,
    pub kind: DescriptorTableKind,
    pub slots: Vec<DescriptorSlot>,
}

impl DescriptorTableDescriptor {
    /// A table of `count` empty slots.
    pub fn new(kind: DescriptorTableKind, count: usize) -> Self {
        Self {
            label: None,
            kind,
            slots: vec![DescriptorSlot::Empty; count],
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Write `slot` at `index`. Out-of-range indices are ignored.
    pub fn with_slot(mut self, index: usize, slot: DescriptorSlot) -> Self {
        if let Some(entry) = self.slots.get_mut(index) {
            *entry = slot;
        }
        self
    }

    /// Textures referenced by the table.
    pub fn textures(&self) -> impl Iterator<Item = &Arc<Texture>> {
        self.slots.iter().filter_map(|slot| match slot {
            DescriptorSlot::Texture(texture) => Some(texture),
            _ => None,
        })
    }
}

/// A descriptor table, immutable once created.
pub struct DescriptorTable {
    id: u64,
    descriptor: DescriptorTableDescriptor,
    handle: GpuDescriptorTable,
}

impl DescriptorTable {
    pub(crate) fn new(
        id: u64,
        descriptor: DescriptorTableDescriptor,
        handle: GpuDescriptorTable,
    ) -> Self {
        Self {
            id,
            descriptor,
            handle,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> DescriptorTableKind {
        self.descriptor.kind
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.descriptor.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptor.slots.is_empty()
    }

    pub fn slots(&self) -> &[DescriptorSlot] {
        &self.descriptor.slots
    }

    pub fn descriptor(&self) -> &DescriptorTableDescriptor {
        &self.descriptor
    }

    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    pub(crate) fn handle(&self) -> &GpuDescriptorTable {
        &self.handle
    }
}

impl std::fmt::Debug for DescriptorTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorTable")
            .field("id", &self.id)
            .field("kind", &self.descriptor.kind)
            .field("len", &self.descriptor.slots.len())
            .field("label", &self.descriptor.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(DescriptorTable: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GpuSampler;
    use crate::types::SamplerDescriptor;

    #[test]
    fn test_table_slots_default_to_empty() {
        let sampler = Arc::new(Sampler::new(1, SamplerDescriptor::default(), GpuSampler::Dummy));
        let desc = DescriptorTableDescriptor::new(DescriptorTableKind::Sampler, 5)
            .with_slot(0, DescriptorSlot::Sampler(sampler))
            .with_slot(9, DescriptorSlot::Empty);
        assert_eq!(desc.slots.len(), 5);
        assert!(!desc.slots[0].is_empty());
        assert!(desc.slots[1..].iter().all(DescriptorSlot::is_empty));
        assert_eq!(desc.textures().count(), 0);
    }
}
