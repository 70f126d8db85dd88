//! Graphics pipeline-state objects.

use std::sync::Arc;

use crate::backend::GpuPipelineState;
use crate::shader::ShaderBytecode;
use crate::types::{
    BlendState, DepthStencilState, PrimitiveTopology, RasterizerState, TextureFormat,
    TopologyClass, VertexFormat,
};

use super::RootSignature;

/// One vertex attribute of the input layout.
///
/// Every attribute reads from its own input slot, tightly packed unless
/// `stride` says otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexInputElement {
    /// Semantic name (`POSITION`, `NORMAL`, ...).
    pub semantic: String,
    /// Shader input location.
    pub location: u32,
    pub format: VertexFormat,
    /// Vertex buffer slot the attribute is read from.
    pub slot: u32,
    /// Distance between consecutive elements in the slot's buffer.
    pub stride: u32,
}

/// Everything a pipeline-state object is built from.
#[derive(Debug, Clone)]
pub struct PipelineStateDescriptor {
    pub label: Option<String>,
    pub root_signature: Arc<RootSignature>,
    pub vertex_shader: ShaderBytecode,
    pub pixel_shader: ShaderBytecode,
    pub input_layout: Vec<VertexInputElement>,
    pub blend: BlendState,
    pub rasterizer: RasterizerState,
    pub depth_stencil: DepthStencilState,
    /// Topology the pipeline is built for. Only its class is baked in;
    /// list and strip variants of the class may be set at draw time.
    pub topology: PrimitiveTopology,
    pub color_format: TextureFormat,
    pub depth_format: TextureFormat,
}

/// A compiled graphics pipeline.
pub struct PipelineState {
    id: u64,
    descriptor: PipelineStateDescriptor,
    handle: GpuPipelineState,
}

impl PipelineState {
    pub(crate) fn new(id: u64, descriptor: PipelineStateDescriptor, handle: GpuPipelineState) -> Self {
        Self {
            id,
            descriptor,
            handle,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn descriptor(&self) -> &PipelineStateDescriptor {
        &self.descriptor
    }

    pub fn root_signature(&self) -> &Arc<RootSignature> {
        &self.descriptor.root_signature
    }

    pub fn topology_class(&self) -> TopologyClass {
        self.descriptor.topology.class()
    }

    pub fn blend(&self) -> &BlendState {
        &self.descriptor.blend
    }

    pub fn rasterizer(&self) -> &RasterizerState {
        &self.descriptor.rasterizer
    }

    pub fn input_layout(&self) -> &[VertexInputElement] {
        &self.descriptor.input_layout
    }

    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    pub(crate) fn handle(&self) -> &GpuPipelineState {
        &self.handle
    }
}

impl std::fmt::Debug for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineState")
            .field("id", &self.id)
            .field("topology", &self.descriptor.topology)
            .field("inputs", &self.descriptor.input_layout.len())
            .field("label", &self.descriptor.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(PipelineState: Send, Sync);
