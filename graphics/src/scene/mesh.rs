//! Drawable meshes built from document meshes.
//!
//! A [`GpuPrimitive`] references ranges of the uploaded document buffers
//! directly: one vertex buffer view per attribute, plus an optional index
//! buffer view. 8-bit indices are widened to 16 bits into a buffer of
//! their own.

use std::fmt;
use std::sync::Arc;

use renderlab_core::scene::{
    Accessor, AccessorDimensions, ComponentType, DocumentPrimitive, PrimitiveMode, SceneDocument,
};

use crate::command::{IndexBufferView, VertexBufferView};
use crate::device::DeviceCapabilities;
use crate::renderer::{AssetError, Diagnostics};
use crate::shader::semantic_location;
use crate::types::{
    BufferUsage, IndexFormat, PrimitiveTopology, VertexComponent, VertexFormat,
};

use super::pipeline_cache::PrimitivePipeline;
use super::resource_table::ResourceTable;
use super::upload::UploadBatch;

/// Identifies a primitive by mesh and primitive index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimitiveId {
    pub mesh: usize,
    pub primitive: usize,
}

impl PrimitiveId {
    pub const fn new(mesh: usize, primitive: usize) -> Self {
        Self { mesh, primitive }
    }
}

impl fmt::Display for PrimitiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mesh {} primitive {}", self.mesh, self.primitive)
    }
}

/// Topology for a glTF primitive mode. Line loops and triangle fans have
/// none.
pub fn topology_for_mode(mode: PrimitiveMode) -> Option<PrimitiveTopology> {
    match mode {
        PrimitiveMode::Points => Some(PrimitiveTopology::PointList),
        PrimitiveMode::Lines => Some(PrimitiveTopology::LineList),
        PrimitiveMode::LineStrip => Some(PrimitiveTopology::LineStrip),
        PrimitiveMode::Triangles => Some(PrimitiveTopology::TriangleList),
        PrimitiveMode::TriangleStrip => Some(PrimitiveTopology::TriangleStrip),
        PrimitiveMode::LineLoop | PrimitiveMode::TriangleFan => None,
    }
}

/// Vertex format of an accessor, if it is a scalar or vector.
pub fn vertex_format(accessor: &Accessor) -> Option<VertexFormat> {
    let count = match accessor.dimensions {
        AccessorDimensions::Scalar => 1,
        AccessorDimensions::Vec2 => 2,
        AccessorDimensions::Vec3 => 3,
        AccessorDimensions::Vec4 => 4,
        AccessorDimensions::Mat2 | AccessorDimensions::Mat3 | AccessorDimensions::Mat4 => {
            return None;
        }
    };
    let component = match accessor.component_type {
        ComponentType::I8 => VertexComponent::Sint8,
        ComponentType::U8 => VertexComponent::Uint8,
        ComponentType::I16 => VertexComponent::Sint16,
        ComponentType::U16 => VertexComponent::Uint16,
        ComponentType::U32 => VertexComponent::Uint32,
        ComponentType::F32 => VertexComponent::Float32,
    };
    Some(VertexFormat::new(component, count, accessor.normalized))
}

/// One vertex input of a primitive.
#[derive(Debug, Clone)]
pub struct VertexAttribute {
    pub semantic: String,
    /// Shader input location.
    pub location: u32,
    pub format: VertexFormat,
    pub view: VertexBufferView,
}

/// A drawable primitive.
#[derive(Debug, Clone)]
pub struct GpuPrimitive {
    pub id: PrimitiveId,
    /// Attributes in input-slot order.
    pub attributes: Vec<VertexAttribute>,
    pub index_buffer: Option<IndexBufferView>,
    /// Index format of the source accessor; differs from the bound format
    /// when indices were widened.
    pub source_index_format: Option<IndexFormat>,
    pub vertex_count: u32,
    pub index_count: u32,
    pub topology: PrimitiveTopology,
    pub material: Option<usize>,
    /// `None` if the pipeline failed to build; the primitive is not drawn.
    pub pipeline: Option<PrimitivePipeline>,
    vertex_buffers: Vec<VertexBufferView>,
}

impl GpuPrimitive {
    pub fn is_renderable(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn is_indexed(&self) -> bool {
        self.index_buffer.is_some()
    }

    /// Vertex buffer views in slot order.
    pub fn vertex_buffers(&self) -> &[VertexBufferView] {
        &self.vertex_buffers
    }

    pub fn semantics(&self) -> impl Iterator<Item = &str> + Clone {
        self.attributes.iter().map(|a| a.semantic.as_str())
    }
}

/// A mesh's primitives that built successfully.
#[derive(Debug, Clone, Default)]
pub struct GpuMesh {
    pub name: Option<String>,
    pub primitives: Vec<GpuPrimitive>,
    /// Primitives that failed to build.
    pub skipped: usize,
}

impl GpuMesh {
    /// Primitives that will not be drawn: failed geometry plus failed
    /// pipelines.
    pub fn unrenderable_count(&self) -> usize {
        self.skipped + self.primitives.iter().filter(|p| !p.is_renderable()).count()
    }
}

/// Builds meshes against the uploaded resource table.
pub struct MeshBuilder<'a> {
    document: &'a SceneDocument,
    table: &'a ResourceTable,
    capabilities: DeviceCapabilities,
}

impl<'a> MeshBuilder<'a> {
    pub fn new(
        document: &'a SceneDocument,
        table: &'a ResourceTable,
        capabilities: DeviceCapabilities,
    ) -> Self {
        Self {
            document,
            table,
            capabilities,
        }
    }

    /// Build every mesh of the document. Widened index buffers are staged
    /// into `batch`. Failed primitives are reported and left out.
    pub fn build_all(&self, batch: &mut UploadBatch, diagnostics: &mut Diagnostics) -> Vec<GpuMesh> {
        self.document
            .meshes
            .iter()
            .enumerate()
            .map(|(mesh_index, mesh)| {
                let mut gpu = GpuMesh {
                    name: mesh.name.clone(),
                    ..GpuMesh::default()
                };
                for (index, primitive) in mesh.primitives.iter().enumerate() {
                    let id = PrimitiveId::new(mesh_index, index);
                    match self.build_primitive(id, primitive, batch, diagnostics) {
                        Ok(built) => gpu.primitives.push(built),
                        Err(e) => {
                            diagnostics.skipped(&e);
                            gpu.skipped += 1;
                        }
                    }
                }
                gpu
            })
            .collect()
    }

    /// Build one primitive's geometry. The pipeline is left empty.
    pub fn build_primitive(
        &self,
        id: PrimitiveId,
        primitive: &DocumentPrimitive,
        batch: &mut UploadBatch,
        diagnostics: &mut Diagnostics,
    ) -> Result<GpuPrimitive, AssetError> {
        let topology = topology_for_mode(primitive.mode).ok_or(AssetError::UnsupportedTopology {
            primitive: id,
            mode: primitive.mode,
        })?;
        let position = *primitive
            .attributes
            .get("POSITION")
            .ok_or(AssetError::MissingPosition { primitive: id })?;

        let mut attributes = Vec::with_capacity(primitive.attributes.len());
        for (semantic, &accessor) in &primitive.attributes {
            let Some(location) = semantic_location(semantic) else {
                diagnostics.unsupported(format!(
                    "{id}: attribute {semantic} has no shader input, ignoring it"
                ));
                continue;
            };
            attributes.push(self.vertex_attribute(id, semantic, location, accessor)?);
        }

        let vertex_count = self
            .document
            .accessors
            .get(position)
            .map(|a| a.count)
            .unwrap_or_default();
        let vertex_count = u32::try_from(vertex_count).map_err(|_| AssetError::InvalidAccessor {
            primitive: id,
            semantic: "POSITION".into(),
            accessor: position,
        })?;

        let (index_buffer, source_index_format, index_count) = match primitive.indices {
            Some(accessor) => {
                let (view, source, count) =
                    self.index_buffer(id, accessor, batch, diagnostics)?;
                (Some(view), Some(source), count)
            }
            None => (None, None, 0),
        };

        let vertex_buffers = attributes.iter().map(|a| a.view.clone()).collect();
        Ok(GpuPrimitive {
            id,
            attributes,
            index_buffer,
            source_index_format,
            vertex_count,
            index_count,
            topology,
            material: primitive.material,
            pipeline: None,
            vertex_buffers,
        })
    }

    fn vertex_attribute(
        &self,
        id: PrimitiveId,
        semantic: &str,
        location: u32,
        accessor_index: usize,
    ) -> Result<VertexAttribute, AssetError> {
        let invalid = || AssetError::InvalidAccessor {
            primitive: id,
            semantic: semantic.to_string(),
            accessor: accessor_index,
        };
        let unsupported = |reason: String| AssetError::UnsupportedAttribute {
            primitive: id,
            semantic: semantic.to_string(),
            reason,
        };

        let accessor = self.document.accessors.get(accessor_index).ok_or_else(invalid)?;
        let format = vertex_format(accessor)
            .ok_or_else(|| unsupported(format!("{:?} elements", accessor.dimensions)))?;
        let range = self
            .document
            .accessor_range(accessor_index)
            .filter(|r| r.count > 0)
            .ok_or_else(invalid)?;
        let buffer = self.table.buffer(range.buffer).ok_or_else(invalid)?;

        let offset_alignment = self.capabilities.vertex_buffer_offset_alignment.max(1);
        if range.offset as u64 % offset_alignment != 0 {
            return Err(unsupported(format!(
                "offset {} is not a multiple of {offset_alignment}",
                range.offset
            )));
        }
        let stride_alignment = self.capabilities.vertex_stride_alignment.max(1) as usize;
        if range.stride % stride_alignment != 0 {
            return Err(unsupported(format!(
                "stride {} is not a multiple of {stride_alignment}",
                range.stride
            )));
        }

        Ok(VertexAttribute {
            semantic: semantic.to_string(),
            location,
            format,
            view: VertexBufferView {
                buffer: Arc::clone(buffer),
                offset: range.offset as u64,
                size: range.size as u64,
                stride: range.stride as u32,
            },
        })
    }

    fn index_buffer(
        &self,
        id: PrimitiveId,
        accessor_index: usize,
        batch: &mut UploadBatch,
        diagnostics: &mut Diagnostics,
    ) -> Result<(IndexBufferView, IndexFormat, u32), AssetError> {
        let invalid = || AssetError::InvalidAccessor {
            primitive: id,
            semantic: "indices".into(),
            accessor: accessor_index,
        };
        let accessor = self.document.accessors.get(accessor_index).ok_or_else(invalid)?;
        let format = match (accessor.component_type, accessor.dimensions) {
            (ComponentType::U8, AccessorDimensions::Scalar) => IndexFormat::Uint8,
            (ComponentType::U16, AccessorDimensions::Scalar) => IndexFormat::Uint16,
            (ComponentType::U32, AccessorDimensions::Scalar) => IndexFormat::Uint32,
            (component, dimensions) => {
                return Err(AssetError::UnsupportedAttribute {
                    primitive: id,
                    semantic: "indices".into(),
                    reason: format!("{dimensions:?} of {component:?}"),
                });
            }
        };
        let range = self
            .document
            .accessor_range(accessor_index)
            .filter(|r| r.count > 0)
            .ok_or_else(invalid)?;
        let count = u32::try_from(range.count).map_err(|_| invalid())?;

        if format == IndexFormat::Uint8 {
            let bytes = self.document.accessor_bytes(accessor_index).ok_or_else(invalid)?;
            let widened: Vec<u8> = bytes
                .iter()
                .step_by(range.stride)
                .flat_map(|&i| u16::from(i).to_le_bytes())
                .collect();
            let buffer = batch
                .upload_buffer(&widened, BufferUsage::INDEX, &format!("{id} indices (widened)"))
                .map_err(|source| AssetError::Resource {
                    primitive: id,
                    source,
                })?;
            diagnostics.unsupported(format!("{id}: 8-bit indices, widened to 16-bit"));
            let view = IndexBufferView {
                buffer,
                offset: 0,
                size: u64::from(count) * IndexFormat::Uint16.size(),
                format: IndexFormat::Uint16,
            };
            return Ok((view, IndexFormat::Uint8, count));
        }

        if range.stride as u64 != format.size() || range.offset as u64 % format.size() != 0 {
            return Err(AssetError::UnsupportedAttribute {
                primitive: id,
                semantic: "indices".into(),
                reason: format!("stride {} at offset {}", range.stride, range.offset),
            });
        }
        let buffer = self.table.buffer(range.buffer).ok_or_else(invalid)?;
        let view = IndexBufferView {
            buffer: Arc::clone(buffer),
            offset: range.offset as u64,
            size: range.size as u64,
            format,
        };
        Ok((view, format, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::device::GraphicsDevice;
    use crate::renderer::DiagnosticKind;
    use renderlab_core::scene::{BufferView, DocumentMesh};
    use rstest::rstest;
    use std::collections::BTreeMap;

    fn accessor(
        document: &mut SceneDocument,
        data: Vec<u8>,
        component_type: ComponentType,
        dimensions: AccessorDimensions,
        count: usize,
    ) -> usize {
        let length = data.len();
        let buffer = document.add_buffer(data);
        let view = document.add_buffer_view(BufferView {
            buffer,
            byte_offset: 0,
            byte_length: length,
            byte_stride: None,
        });
        document.add_accessor(Accessor {
            buffer_view: Some(view),
            byte_offset: 0,
            component_type,
            dimensions,
            normalized: false,
            count,
        })
    }

    fn triangle(document: &mut SceneDocument) -> usize {
        let positions: Vec<f32> = vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        accessor(
            document,
            bytemuck::cast_slice(&positions).to_vec(),
            ComponentType::F32,
            AccessorDimensions::Vec3,
            3,
        )
    }

    fn build(
        document: &SceneDocument,
    ) -> (Vec<GpuMesh>, Diagnostics) {
        let device = GraphicsDevice::new(Arc::new(DummyBackend::new()));
        let mut batch = UploadBatch::new(&device, "test").unwrap();
        let table = ResourceTable::stage(document, &mut batch).unwrap();
        let mut diagnostics = Diagnostics::new();
        let meshes = MeshBuilder::new(document, &table, *device.capabilities())
            .build_all(&mut batch, &mut diagnostics);
        batch.submit().unwrap().finish().unwrap();
        (meshes, diagnostics)
    }

    #[rstest]
    #[case(PrimitiveMode::Points, Some(PrimitiveTopology::PointList))]
    #[case(PrimitiveMode::Lines, Some(PrimitiveTopology::LineList))]
    #[case(PrimitiveMode::LineStrip, Some(PrimitiveTopology::LineStrip))]
    #[case(PrimitiveMode::Triangles, Some(PrimitiveTopology::TriangleList))]
    #[case(PrimitiveMode::TriangleStrip, Some(PrimitiveTopology::TriangleStrip))]
    #[case(PrimitiveMode::LineLoop, None)]
    #[case(PrimitiveMode::TriangleFan, None)]
    fn test_topology_for_mode(
        #[case] mode: PrimitiveMode,
        #[case] expected: Option<PrimitiveTopology>,
    ) {
        assert_eq!(topology_for_mode(mode), expected);
    }

    #[test]
    fn test_non_indexed_triangle() {
        let mut document = SceneDocument::new();
        let position = triangle(&mut document);
        document.add_mesh(DocumentMesh {
            name: Some("tri".into()),
            primitives: vec![DocumentPrimitive {
                attributes: BTreeMap::from([("POSITION".to_string(), position)]),
                ..DocumentPrimitive::default()
            }],
        });

        let (meshes, diagnostics) = build(&document);
        let primitive = &meshes[0].primitives[0];
        assert_eq!(primitive.vertex_count, 3);
        assert!(!primitive.is_indexed());
        assert_eq!(primitive.attributes[0].format, VertexFormat::float32(3));
        assert_eq!(primitive.vertex_buffers()[0].stride, 12);
        assert_eq!(primitive.vertex_buffers()[0].size, 36);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_u8_indices_are_widened() {
        let mut document = SceneDocument::new();
        let position = triangle(&mut document);
        let indices = accessor(
            &mut document,
            vec![0, 1, 2],
            ComponentType::U8,
            AccessorDimensions::Scalar,
            3,
        );
        document.add_mesh(DocumentMesh {
            name: None,
            primitives: vec![DocumentPrimitive {
                attributes: BTreeMap::from([("POSITION".to_string(), position)]),
                indices: Some(indices),
                ..DocumentPrimitive::default()
            }],
        });

        let (meshes, diagnostics) = build(&document);
        let primitive = &meshes[0].primitives[0];
        let view = primitive.index_buffer.as_ref().unwrap();
        assert_eq!(view.format, IndexFormat::Uint16);
        assert_eq!(view.size, 6);
        assert_eq!(primitive.source_index_format, Some(IndexFormat::Uint8));
        assert_eq!(primitive.index_count, 3);
        assert_eq!(diagnostics.count(DiagnosticKind::UnsupportedFeature), 1);
    }

    #[test]
    fn test_failed_primitives_are_skipped() {
        let mut document = SceneDocument::new();
        let position = triangle(&mut document);
        document.add_mesh(DocumentMesh {
            name: None,
            primitives: vec![
                DocumentPrimitive {
                    attributes: BTreeMap::from([("POSITION".to_string(), position)]),
                    mode: PrimitiveMode::TriangleFan,
                    ..DocumentPrimitive::default()
                },
                DocumentPrimitive {
                    attributes: BTreeMap::from([("NORMAL".to_string(), position)]),
                    ..DocumentPrimitive::default()
                },
                DocumentPrimitive {
                    attributes: BTreeMap::from([("POSITION".to_string(), position)]),
                    ..DocumentPrimitive::default()
                },
            ],
        });

        let (meshes, diagnostics) = build(&document);
        assert_eq!(meshes[0].primitives.len(), 1);
        assert_eq!(meshes[0].primitives[0].id, PrimitiveId::new(0, 2));
        assert_eq!(meshes[0].skipped, 2);
        assert_eq!(diagnostics.count(DiagnosticKind::SkippedAsset), 2);
    }
}
