//! Per-primitive pipeline-state objects.
//!
//! Root signatures come in two shapes, with and without a material:
//!
//! | Parameter | Binding |
//! |-----------|---------|
//! | 0 | camera constants, `b0` |
//! | 1 | node constants, `b1` |
//! | 2 | material constants, `b2` |
//! | 3 | shader resource table |
//! | 4 | sampler table |
//!
//! Pipelines are shared between primitives with the same input layout,
//! topology and material.

use std::collections::HashMap;
use std::sync::Arc;

use crate::device::GraphicsDevice;
use crate::renderer::{AssetError, Diagnostics};
use crate::resources::{
    DescriptorTableKind, PipelineState, PipelineStateDescriptor, RootParameter, RootSignature,
    RootSignatureDescriptor, VertexInputElement,
};
use crate::shader::{ShaderCompiler, ShaderDefines, ShaderRequest};
use crate::types::{
    BlendState, DepthStencilState, PrimitiveTopology, RasterizerState, TextureFormat, VertexFormat,
};

use super::material_bank::{MATERIAL_TABLE_SIZE, MaterialBank};
use super::mesh::{GpuMesh, GpuPrimitive};

/// Root parameter of the camera constants.
pub const CAMERA_PARAMETER: u32 = 0;
/// Root parameter of the node constants.
pub const NODE_PARAMETER: u32 = 1;
/// Root parameter of the material constants.
pub const MATERIAL_PARAMETER: u32 = 2;
/// Root parameter of the material texture table.
pub const TEXTURE_TABLE_PARAMETER: u32 = 3;
/// Root parameter of the material sampler table.
pub const SAMPLER_TABLE_PARAMETER: u32 = 4;

/// Format of every depth target.
pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

/// The pipeline a primitive is drawn with.
#[derive(Debug, Clone)]
pub struct PrimitivePipeline {
    pub root_signature: Arc<RootSignature>,
    pub pipeline_state: Arc<PipelineState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    inputs: Vec<(u32, VertexFormat, u32)>,
    topology: PrimitiveTopology,
    material: Option<usize>,
}

/// Builds and shares pipelines for a fixed color format.
pub struct PipelineCache {
    device: Arc<GraphicsDevice>,
    compiler: Arc<dyn ShaderCompiler>,
    shader_path: String,
    color_format: TextureFormat,
    root_signatures: [Option<Arc<RootSignature>>; 2],
    pipelines: HashMap<PipelineKey, Arc<PipelineState>>,
}

impl PipelineCache {
    pub fn new(
        device: Arc<GraphicsDevice>,
        compiler: Arc<dyn ShaderCompiler>,
        shader_path: impl Into<String>,
        color_format: TextureFormat,
    ) -> Self {
        Self {
            device,
            compiler,
            shader_path: shader_path.into(),
            color_format,
            root_signatures: [None, None],
            pipelines: HashMap::new(),
        }
    }

    pub fn color_format(&self) -> TextureFormat {
        self.color_format
    }

    /// Number of distinct pipeline-state objects built.
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Attach pipelines to every primitive of `meshes`. Failures are
    /// reported and leave the primitive unrenderable.
    pub fn prepare_meshes(
        &mut self,
        meshes: &mut [GpuMesh],
        materials: &MaterialBank,
        diagnostics: &mut Diagnostics,
    ) {
        for primitive in meshes.iter_mut().flat_map(|m| m.primitives.iter_mut()) {
            match self.pipeline_for(primitive, materials, diagnostics) {
                Ok(pipeline) => primitive.pipeline = Some(pipeline),
                Err(e) => diagnostics.skipped(&e),
            }
        }
        log::debug!(
            "PipelineCache: {} pipelines, {} root signatures",
            self.pipelines.len(),
            self.root_signatures.iter().flatten().count()
        );
    }

    /// The pipeline for one primitive, built on first use.
    ///
    /// Alpha blending the color format cannot do is reported once per
    /// pipeline and rendered opaque.
    pub fn pipeline_for(
        &mut self,
        primitive: &GpuPrimitive,
        materials: &MaterialBank,
        diagnostics: &mut Diagnostics,
    ) -> Result<PrimitivePipeline, AssetError> {
        let id = primitive.id;
        let material = match primitive.material {
            Some(index) => Some(materials.get(index).ok_or(AssetError::MissingMaterial {
                primitive: id,
                material: index,
            })?),
            None => None,
        };

        let root_signature = self
            .root_signature(material.is_some())
            .map_err(|source| AssetError::Resource {
                primitive: id,
                source,
            })?;

        let input_layout = input_layout(primitive);
        let key = PipelineKey {
            inputs: input_layout
                .iter()
                .map(|e| (e.location, e.format, e.stride))
                .collect(),
            topology: primitive.topology,
            material: primitive.material,
        };
        if let Some(pipeline_state) = self.pipelines.get(&key) {
            return Ok(PrimitivePipeline {
                root_signature,
                pipeline_state: Arc::clone(pipeline_state),
            });
        }

        let defines = ShaderDefines::for_primitive(primitive.semantics(), material.is_some());
        let compile = |request: ShaderRequest| {
            self.compiler
                .compile(&request)
                .map_err(|source| AssetError::Shader {
                    primitive: id,
                    source,
                })
        };
        let vertex_shader = compile(ShaderRequest::vertex(&self.shader_path, defines.clone()))?;
        let pixel_shader = compile(ShaderRequest::pixel(&self.shader_path, defines))?;

        let (mut blend, rasterizer) = match material {
            Some(m) => (m.blend, m.rasterizer),
            None => (BlendState::opaque(), RasterizerState::default()),
        };
        if blend.enabled && !self.device.capabilities().can_blend(self.color_format) {
            diagnostics.unsupported(format!(
                "{id}: alpha mode BLEND on a {:?} target without float blending, rendering opaque",
                self.color_format
            ));
            blend = BlendState::opaque();
        }
        let descriptor = PipelineStateDescriptor {
            label: Some(format!("{id}")),
            root_signature: Arc::clone(&root_signature),
            vertex_shader,
            pixel_shader,
            input_layout,
            blend,
            rasterizer,
            depth_stencil: DepthStencilState::default(),
            topology: primitive.topology,
            color_format: self.color_format,
            depth_format: DEPTH_FORMAT,
        };
        let pipeline_state = self
            .device
            .create_pipeline_state(&descriptor)
            .map_err(|source| AssetError::Pipeline {
                primitive: id,
                source,
            })?;
        self.pipelines.insert(key, Arc::clone(&pipeline_state));

        Ok(PrimitivePipeline {
            root_signature,
            pipeline_state,
        })
    }

    fn root_signature(
        &mut self,
        has_material: bool,
    ) -> Result<Arc<RootSignature>, crate::error::GraphicsError> {
        let slot = &mut self.root_signatures[usize::from(has_material)];
        if let Some(signature) = slot {
            return Ok(Arc::clone(signature));
        }
        let signature = self.device.create_root_signature(&root_signature_descriptor(has_material))?;
        *slot = Some(Arc::clone(&signature));
        Ok(signature)
    }
}

impl std::fmt::Debug for PipelineCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineCache")
            .field("shader_path", &self.shader_path)
            .field("color_format", &self.color_format)
            .field("pipelines", &self.pipelines.len())
            .finish()
    }
}

/// Root signature layout for primitives with or without a material.
pub fn root_signature_descriptor(has_material: bool) -> RootSignatureDescriptor {
    let mut parameters = vec![
        RootParameter::ConstantBufferView { register: 0 },
        RootParameter::ConstantBufferView { register: 1 },
    ];
    if has_material {
        parameters.extend([
            RootParameter::ConstantBufferView { register: 2 },
            RootParameter::DescriptorTable {
                kind: DescriptorTableKind::ShaderResource,
                count: MATERIAL_TABLE_SIZE as u32,
            },
            RootParameter::DescriptorTable {
                kind: DescriptorTableKind::Sampler,
                count: MATERIAL_TABLE_SIZE as u32,
            },
        ]);
    }
    let label = if has_material {
        "material root signature"
    } else {
        "plain root signature"
    };
    RootSignatureDescriptor::new(parameters).with_label(label)
}

/// One input slot per attribute, in attribute order.
pub fn input_layout(primitive: &GpuPrimitive) -> Vec<VertexInputElement> {
    primitive
        .attributes
        .iter()
        .enumerate()
        .map(|(slot, attribute)| VertexInputElement {
            semantic: attribute.semantic.clone(),
            location: attribute.location,
            format: attribute.format,
            slot: slot as u32,
            stride: attribute.view.stride,
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::scene::mesh::{MeshBuilder, PrimitiveId};
    use crate::scene::resource_table::ResourceTable;
    use crate::scene::upload::UploadBatch;
    use crate::shader::{ShaderBytecode, ShaderCompileError, ShaderStage};
    use renderlab_core::scene::{
        Accessor, AccessorDimensions, BufferView, ComponentType, DocumentMaterial, DocumentMesh,
        DocumentPrimitive, SceneDocument,
    };
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Returns placeholder code and records every request. Requests whose
    /// defines contain `fail_on` fail to compile.
    #[derive(Default)]
    pub(crate) struct RecordingCompiler {
        pub requests: Mutex<Vec<ShaderRequest>>,
        pub fail_on: Option<&'static str>,
    }

    impl ShaderCompiler for RecordingCompiler {
        fn compile(&self, request: &ShaderRequest) -> Result<ShaderBytecode, ShaderCompileError> {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(request.clone());
            }
            if self.fail_on.is_some_and(|d| request.defines.contains(d)) {
                return Err(ShaderCompileError::Parse {
                    path: request.path.clone(),
                    diagnostics: "forced failure".into(),
                });
            }
            let stage = ShaderStage::from_target(&request.target)
                .ok_or_else(|| ShaderCompileError::UnsupportedTarget(request.target.clone()))?;
            Ok(ShaderBytecode {
                stage,
                entry_point: request.entry_point.clone(),
                target: request.target.clone(),
                code: Arc::from(&b"placeholder"[..]),
            })
        }
    }

    fn document() -> SceneDocument {
        let mut document = SceneDocument::new();
        let data: Vec<f32> = vec![0.0; 18];
        let buffer = document.add_buffer(bytemuck::cast_slice(&data).to_vec());
        let view = document.add_buffer_view(BufferView {
            buffer,
            byte_offset: 0,
            byte_length: 72,
            byte_stride: None,
        });
        let accessor = |document: &mut SceneDocument, offset| {
            document.add_accessor(Accessor {
                buffer_view: Some(view),
                byte_offset: offset,
                component_type: ComponentType::F32,
                dimensions: AccessorDimensions::Vec3,
                normalized: false,
                count: 3,
            })
        };
        let position = accessor(&mut document, 0);
        let normal = accessor(&mut document, 36);
        let material = document.add_material(DocumentMaterial::default());

        let plain = DocumentPrimitive {
            attributes: BTreeMap::from([("POSITION".to_string(), position)]),
            ..DocumentPrimitive::default()
        };
        let shaded = DocumentPrimitive {
            attributes: BTreeMap::from([
                ("NORMAL".to_string(), normal),
                ("POSITION".to_string(), position),
            ]),
            material: Some(material),
            ..DocumentPrimitive::default()
        };
        document.add_mesh(DocumentMesh {
            name: None,
            primitives: vec![plain.clone(), shaded, plain],
        });
        document
    }

    fn prepare(compiler: Arc<RecordingCompiler>) -> (Vec<GpuMesh>, Diagnostics, PipelineCache) {
        let device = GraphicsDevice::new(Arc::new(DummyBackend::new()));
        let document = document();
        let mut diagnostics = Diagnostics::new();
        let mut batch = UploadBatch::new(&device, "test").unwrap();
        let table = ResourceTable::stage(&document, &mut batch).unwrap();
        let mut meshes = MeshBuilder::new(&document, &table, *device.capabilities())
            .build_all(&mut batch, &mut diagnostics);
        batch.submit().unwrap().finish().unwrap();
        let materials = MaterialBank::build(&device, &document, &table, &mut diagnostics).unwrap();

        let mut cache = PipelineCache::new(
            Arc::clone(&device),
            compiler,
            "scene.glsl",
            TextureFormat::Rgba8Unorm,
        );
        cache.prepare_meshes(&mut meshes, &materials, &mut diagnostics);
        (meshes, diagnostics, cache)
    }

    #[test]
    fn test_root_signature_shapes() {
        assert_eq!(root_signature_descriptor(false).parameters.len(), 2);
        let with_material = root_signature_descriptor(true);
        assert_eq!(with_material.parameters.len(), 5);
        assert_eq!(
            with_material.parameters[SAMPLER_TABLE_PARAMETER as usize],
            RootParameter::DescriptorTable {
                kind: DescriptorTableKind::Sampler,
                count: 5
            }
        );
    }

    #[test]
    fn test_identical_primitives_share_a_pipeline() {
        let compiler = Arc::new(RecordingCompiler::default());
        let (meshes, diagnostics, cache) = prepare(Arc::clone(&compiler));
        let primitives = &meshes[0].primitives;

        assert!(diagnostics.is_empty());
        assert_eq!(cache.pipeline_count(), 2);
        let first = primitives[0].pipeline.as_ref().unwrap();
        let third = primitives[2].pipeline.as_ref().unwrap();
        assert!(Arc::ptr_eq(&first.pipeline_state, &third.pipeline_state));
        assert_eq!(compiler.requests.lock().unwrap().len(), 4);
    }

    #[test]
    fn test_material_primitive_layout_and_defines() {
        let compiler = Arc::new(RecordingCompiler::default());
        let (meshes, _, _) = prepare(Arc::clone(&compiler));
        let shaded = &meshes[0].primitives[1];
        let pipeline = shaded.pipeline.as_ref().unwrap();

        assert_eq!(pipeline.root_signature.parameters().len(), 5);
        let layout = pipeline.pipeline_state.input_layout();
        assert_eq!(layout[0].semantic, "NORMAL");
        assert_eq!((layout[0].slot, layout[0].location), (0, 1));
        assert_eq!((layout[1].slot, layout[1].location), (1, 0));
        assert!(pipeline.pipeline_state.rasterizer().front_counter_clockwise);

        let requests = compiler.requests.lock().unwrap();
        let shaded_request = requests
            .iter()
            .find(|r| r.defines.contains("HAS_MATERIAL"))
            .unwrap();
        let names: Vec<_> = shaded_request.defines.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["HAS_NORMAL", "HAS_MATERIAL"]);
    }

    #[test]
    fn test_shader_failure_only_affects_its_primitive() {
        let compiler = Arc::new(RecordingCompiler {
            fail_on: Some("HAS_NORMAL"),
            ..RecordingCompiler::default()
        });
        let (meshes, diagnostics, _) = prepare(compiler);
        let primitives = &meshes[0].primitives;

        assert!(primitives[0].is_renderable());
        assert!(!primitives[1].is_renderable());
        assert!(primitives[2].is_renderable());
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics.entries()[0]
            .message
            .starts_with(&PrimitiveId::new(0, 1).to_string()));
    }
}
