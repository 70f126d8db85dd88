//! Per-node constant buffers.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use renderlab_core::scene::SceneDocument;

use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::resources::Buffer;
use crate::types::{BufferDescriptor, BufferUsage, CONSTANT_BUFFER_ALIGNMENT, align_up};

/// Node constants as laid out in the shader's `Node` block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct NodeConstants {
    /// Local transform, column-major. Parent transforms are not applied.
    pub world: [f32; 16],
}

pub const NODE_BUFFER_SIZE: u64 = align_up(
    std::mem::size_of::<NodeConstants>() as u64,
    CONSTANT_BUFFER_ALIGNMENT,
);

/// One constant buffer per document node, written once.
#[derive(Debug, Default)]
pub struct NodeBuffers {
    buffers: Vec<Arc<Buffer>>,
}

impl NodeBuffers {
    pub fn build(device: &GraphicsDevice, document: &SceneDocument) -> Result<Self, GraphicsError> {
        let buffers = document
            .nodes
            .iter()
            .enumerate()
            .map(|(index, node)| {
                let label = match &node.name {
                    Some(name) => format!("node {index} ({name})"),
                    None => format!("node {index}"),
                };
                let buffer = device.create_buffer(
                    &BufferDescriptor::upload(NODE_BUFFER_SIZE, BufferUsage::UNIFORM)
                        .with_label(label),
                )?;
                let constants = NodeConstants { world: node.matrix };
                device.write_buffer(&buffer, 0, bytemuck::bytes_of(&constants))?;
                Ok(buffer)
            })
            .collect::<Result<Vec<_>, GraphicsError>>()?;
        Ok(Self { buffers })
    }

    pub fn get(&self, node: usize) -> Option<&Arc<Buffer>> {
        self.buffers.get(node)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyBackend, GpuBackend};
    use renderlab_core::scene::SceneNode;

    #[test]
    fn test_node_matrix_is_written() {
        let backend = Arc::new(DummyBackend::new());
        let device = GraphicsDevice::new(Arc::clone(&backend) as Arc<dyn GpuBackend>);
        let mut document = SceneDocument::new();
        let mut matrix = SceneNode::IDENTITY;
        matrix[12] = 4.0;
        document.add_node(SceneNode::new());
        document.add_node(SceneNode::new().with_matrix(matrix));

        let nodes = NodeBuffers::build(&device, &document).unwrap();

        assert_eq!(nodes.len(), 2);
        let contents = backend.buffer_contents(nodes.get(1).unwrap().id()).unwrap();
        assert_eq!(contents.len() as u64, NODE_BUFFER_SIZE);
        assert_eq!(&contents[..64], bytemuck::cast_slice::<f32, u8>(&matrix));
    }
}
