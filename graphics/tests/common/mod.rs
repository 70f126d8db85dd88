//! Common utilities for renderer integration tests.
//!
//! Provides scene documents built in code, a shader compiler that needs no
//! sources, and devices for the available backends.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use renderlab_core::scene::{
    Accessor, AccessorDimensions, AlphaMode, BufferView, ComponentType, DocumentMaterial,
    DocumentMesh, DocumentPrimitive, Scene, SceneDocument, SceneNode,
};
use renderlab_graphics::shader::{
    ShaderBytecode, ShaderCompileError, ShaderCompiler, ShaderRequest, ShaderStage,
};
use renderlab_graphics::{
    BackendType, DummyBackend, GpuBackend, GraphicsDevice, GraphicsInstance, InstanceParameters,
    RendererConfig, SceneRenderer,
};

/// Install `env_logger` once for tests that want to see warnings.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Backends
// ============================================================================

/// Available GPU backends for testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// CPU emulation, always available.
    Dummy,
    /// wgpu on whatever adapter the machine has.
    Wgpu,
}

impl Backend {
    /// Create a device, or `None` if the backend is unavailable here.
    pub fn create_device(self) -> Option<Arc<GraphicsDevice>> {
        let backend = match self {
            Backend::Dummy => BackendType::Dummy,
            Backend::Wgpu => BackendType::Wgpu,
        };
        let instance =
            GraphicsInstance::with_parameters(InstanceParameters::new().with_backend(backend));
        instance.create_device().ok()
    }
}

/// A dummy device together with its backend, for inspecting GPU state.
pub fn dummy_device() -> (Arc<DummyBackend>, Arc<GraphicsDevice>) {
    let backend = Arc::new(DummyBackend::new());
    let device = GraphicsDevice::new(Arc::clone(&backend) as Arc<dyn GpuBackend>);
    (backend, device)
}

/// Like [`dummy_device`], but queue work only runs when a fence wait needs
/// it.
pub fn deferred_dummy_device() -> (Arc<DummyBackend>, Arc<GraphicsDevice>) {
    let backend = Arc::new(DummyBackend::new().with_deferred_execution());
    let device = GraphicsDevice::new(Arc::clone(&backend) as Arc<dyn GpuBackend>);
    (backend, device)
}

// ============================================================================
// Shader compiler
// ============================================================================

/// Returns placeholder bytecode and records every request.
#[derive(Default)]
pub struct StubCompiler {
    requests: Mutex<Vec<ShaderRequest>>,
    /// Requests defining this macro fail to compile.
    pub fail_on: Option<&'static str>,
}

impl StubCompiler {
    pub fn failing_on(define: &'static str) -> Self {
        Self {
            fail_on: Some(define),
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<ShaderRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl ShaderCompiler for StubCompiler {
    fn compile(&self, request: &ShaderRequest) -> Result<ShaderBytecode, ShaderCompileError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if self.fail_on.is_some_and(|d| request.defines.contains(d)) {
            return Err(ShaderCompileError::Parse {
                path: request.path.clone(),
                diagnostics: format!("{} is not supported by this stub", request.target),
            });
        }
        let stage = ShaderStage::from_target(&request.target)
            .ok_or_else(|| ShaderCompileError::UnsupportedTarget(request.target.clone()))?;
        Ok(ShaderBytecode {
            stage,
            entry_point: request.entry_point.clone(),
            target: request.target.clone(),
            code: Arc::from(&b"stub"[..]),
        })
    }
}

// ============================================================================
// Renderers
// ============================================================================

/// A fresh directory under the system temp dir.
pub fn output_dir(test: &str) -> PathBuf {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    std::env::temp_dir().join(format!(
        "renderlab-{test}-{}-{}",
        std::process::id(),
        NEXT.fetch_add(1, Ordering::Relaxed)
    ))
}

/// A small headless configuration writing into `directory`.
pub fn headless_config(directory: PathBuf) -> RendererConfig {
    RendererConfig::new().with_size(8, 6).with_readback(directory)
}

/// A headless renderer over `device` with the stub compiler.
pub fn headless_renderer(device: Arc<GraphicsDevice>, test: &str) -> SceneRenderer {
    SceneRenderer::new(
        device,
        Arc::new(StubCompiler::default()),
        headless_config(output_dir(test)),
    )
}

// ============================================================================
// Documents
// ============================================================================

pub const TRIANGLE_POSITIONS: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];

pub const QUAD_POSITIONS: [f32; 12] = [
    -1.0, -1.0, 0.0, //
    1.0, -1.0, 0.0, //
    1.0, 1.0, 0.0, //
    -1.0, 1.0, 0.0,
];
pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

/// Add `data` as its own buffer, view and accessor.
pub fn add_accessor(
    document: &mut SceneDocument,
    data: Vec<u8>,
    component_type: ComponentType,
    dimensions: AccessorDimensions,
    count: usize,
) -> usize {
    let byte_length = data.len();
    let buffer = document.add_buffer(data);
    let view = document.add_buffer_view(BufferView {
        buffer,
        byte_offset: 0,
        byte_length,
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

pub fn add_positions(document: &mut SceneDocument, positions: &[f32]) -> usize {
    add_accessor(
        document,
        bytemuck::cast_slice(positions).to_vec(),
        ComponentType::F32,
        AccessorDimensions::Vec3,
        positions.len() / 3,
    )
}

pub fn position_only(position: usize) -> DocumentPrimitive {
    DocumentPrimitive {
        attributes: BTreeMap::from([("POSITION".to_string(), position)]),
        ..DocumentPrimitive::default()
    }
}

/// Wrap `meshes` in one root node each and a default scene.
pub fn with_scene(mut document: SceneDocument, meshes: Vec<DocumentMesh>) -> SceneDocument {
    let mut roots = Vec::new();
    for mesh in meshes {
        let mesh = document.add_mesh(mesh);
        roots.push(document.add_node(SceneNode::new().with_mesh(mesh)));
    }
    let scene = document.add_scene(Scene {
        name: None,
        nodes: roots,
    });
    document.default_scene = Some(scene);
    document
}

/// One primitive, no material, 3 vertices, no indices.
pub fn triangle_document() -> SceneDocument {
    let mut document = SceneDocument::new();
    let position = add_positions(&mut document, &TRIANGLE_POSITIONS);
    with_scene(
        document,
        vec![DocumentMesh {
            name: Some("triangle".into()),
            primitives: vec![position_only(position)],
        }],
    )
}

/// An indexed quad with a material of the given alpha mode.
pub fn quad_document(alpha_mode: AlphaMode) -> SceneDocument {
    let mut document = SceneDocument::new();
    let position = add_positions(&mut document, &QUAD_POSITIONS);
    let indices = add_accessor(
        &mut document,
        bytemuck::cast_slice(&QUAD_INDICES).to_vec(),
        ComponentType::U16,
        AccessorDimensions::Scalar,
        QUAD_INDICES.len(),
    );
    let material = document.add_material(DocumentMaterial {
        name: Some("quad".into()),
        alpha_mode,
        ..DocumentMaterial::default()
    });
    with_scene(
        document,
        vec![DocumentMesh {
            name: Some("quad".into()),
            primitives: vec![DocumentPrimitive {
                indices: Some(indices),
                material: Some(material),
                ..position_only(position)
            }],
        }],
    )
}

/// Node 0 is a root with one child, node 1, whose child is node 0 again.
pub fn cyclic_document() -> SceneDocument {
    let mut document = SceneDocument::new();
    let position = add_positions(&mut document, &TRIANGLE_POSITIONS);
    let mesh = document.add_mesh(DocumentMesh {
        name: None,
        primitives: vec![position_only(position)],
    });
    document.add_node(SceneNode::new().with_mesh(mesh).with_children(vec![1]));
    document.add_node(SceneNode::new().with_children(vec![0]));
    let scene = document.add_scene(Scene {
        name: None,
        nodes: vec![0],
    });
    document.default_scene = Some(scene);
    document
}
