//! Root signatures: the binding layout a pipeline is built against.

use crate::backend::GpuRootSignature;

/// Kind of descriptors a table holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorTableKind {
    /// Sampled textures.
    ShaderResource,
    Sampler,
}

/// One root parameter. Parameters are addressed by their index in
/// [`RootSignatureDescriptor::parameters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootParameter {
    /// A constant buffer bound directly at shader register `b{register}`.
    ConstantBufferView { register: u32 },
    /// A table of `count` descriptors of one kind.
    DescriptorTable { kind: DescriptorTableKind, count: u32 },
}

/// Descriptor for creating a root signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RootSignatureDescriptor {
    pub label: Option<String>,
    pub parameters: Vec<RootParameter>,
}

impl RootSignatureDescriptor {
    pub fn new(parameters: Vec<RootParameter>) -> Self {
        Self {
            label: None,
            parameters,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// A compiled root signature.
pub struct RootSignature {
    id: u64,
    descriptor: RootSignatureDescriptor,
    handle: GpuRootSignature,
}

impl RootSignature {
    pub(crate) fn new(id: u64, descriptor: RootSignatureDescriptor, handle: GpuRootSignature) -> Self {
        Self {
            id,
            descriptor,
            handle,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn descriptor(&self) -> &RootSignatureDescriptor {
        &self.descriptor
    }

    pub fn parameters(&self) -> &[RootParameter] {
        &self.descriptor.parameters
    }

    /// The parameter at `index`, if the signature has one.
    pub fn parameter(&self, index: u32) -> Option<RootParameter> {
        self.descriptor.parameters.get(index as usize).copied()
    }

    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    pub(crate) fn handle(&self) -> &GpuRootSignature {
        &self.handle
    }
}

impl std::fmt::Debug for RootSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootSignature")
            .field("id", &self.id)
            .field("parameters", &self.descriptor.parameters)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(RootSignature: Send, Sync);
