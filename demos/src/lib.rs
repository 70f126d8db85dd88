//! # RenderLab Demos
//!
//! Host programs for the scene renderer.
//!
//! ## Available Demos
//!
//! - `window_viewer` - Orbits a model in a winit window
//! - `headless_orbit` - Renders frames offscreen and writes them as PNGs
//!
//! Both take a glTF path and fall back to a built-in cube without one.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use renderlab_core::gltf::{GltfError, load_gltf_file};
use renderlab_core::scene::{
    Accessor, AccessorDimensions, BufferView, ComponentType, DocumentMaterial, DocumentMesh,
    DocumentPrimitive, Scene, SceneDocument, SceneNode,
};
use renderlab_graphics::scene::OrbitParams;
use renderlab_graphics::{
    BackendType, GraphicsDevice, GraphicsError, GraphicsInstance, InstanceParameters,
    RendererConfig,
};

/// Demos library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// GPU backend selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum BackendArg {
    #[default]
    Auto,
    Dummy,
    Wgpu,
}

impl From<BackendArg> for BackendType {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Auto => BackendType::Auto,
            BackendArg::Dummy => BackendType::Dummy,
            BackendArg::Wgpu => BackendType::Wgpu,
        }
    }
}

/// Options shared by the demo binaries.
#[derive(Debug, Clone, Parser)]
pub struct DemoArgs {
    /// glTF or GLB file to render. Renders a built-in cube if omitted.
    pub model: Option<PathBuf>,

    #[arg(long, default_value_t = 600)]
    pub width: u32,

    #[arg(long, default_value_t = 400)]
    pub height: u32,

    #[arg(long, value_enum, default_value_t = BackendArg::Auto)]
    pub backend: BackendArg,

    /// Frames in flight.
    #[arg(long, default_value_t = 2)]
    pub frame_count: usize,

    /// Orbit speed in degrees per second.
    #[arg(long, default_value_t = 10.0)]
    pub orbit_rate: f32,

    #[arg(long, default_value_t = 5.0)]
    pub orbit_radius: f32,
}

impl DemoArgs {
    /// Renderer configuration for these options, presenting to a window.
    pub fn renderer_config(&self) -> RendererConfig {
        RendererConfig::new()
            .with_size(self.width, self.height)
            .with_frame_count(self.frame_count)
            .with_orbit(OrbitParams {
                rate: self.orbit_rate,
                radius: self.orbit_radius,
                ..OrbitParams::default()
            })
    }

    /// Create a device on the selected backend.
    pub fn create_device(&self) -> Result<Arc<GraphicsDevice>, GraphicsError> {
        let parameters = InstanceParameters::new().with_backend(self.backend.into());
        GraphicsInstance::with_parameters(parameters).create_device()
    }

    /// Load the model, or build the cube if no path was given.
    ///
    /// Loader warnings are logged and otherwise ignored.
    pub fn load_document(&self) -> Result<SceneDocument, GltfError> {
        let Some(path) = &self.model else {
            log::info!("No model given, rendering the built-in cube");
            return Ok(cube_document());
        };
        let loaded = load_gltf_file(path)?;
        for warning in &loaded.warnings {
            log::warn!("{}: {warning}", path.display());
        }
        log::info!(
            "Loaded {}: {} meshes, {} nodes, {} materials",
            path.display(),
            loaded.document.meshes.len(),
            loaded.document.nodes.len(),
            loaded.document.materials.len()
        );
        Ok(loaded.document)
    }
}

/// Install `env_logger`, defaulting to `info`.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    renderlab_core::init();
    renderlab_graphics::init();
}

/// A unit cube with per-face normals and one opaque material.
pub fn cube_document() -> SceneDocument {
    // (normal, tangent, bitangent) per face.
    const FACES: [[[f32; 3]; 3]; 6] = [
        [[1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]],
        [[-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]],
        [[0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]],
        [[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]],
        [[0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        [[0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
    ];
    const CORNERS: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];

    let mut positions = Vec::with_capacity(24 * 3);
    let mut normals = Vec::with_capacity(24 * 3);
    let mut indices = Vec::with_capacity(36);
    for (face, [n, t, b]) in FACES.iter().enumerate() {
        for [u, v] in CORNERS {
            for axis in 0..3 {
                positions.push(0.5 * (n[axis] + u * t[axis] + v * b[axis]));
            }
            normals.extend_from_slice(n);
        }
        let base = (face * 4) as u16;
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    let mut document = SceneDocument::new();
    let mut add = |data: &[u8], component_type, dimensions, count| {
        let buffer = document.add_buffer(data.to_vec());
        let view = document.add_buffer_view(BufferView {
            buffer,
            byte_offset: 0,
            byte_length: data.len(),
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
    };
    let position = add(
        bytemuck::cast_slice(&positions),
        ComponentType::F32,
        AccessorDimensions::Vec3,
        24,
    );
    let normal = add(
        bytemuck::cast_slice(&normals),
        ComponentType::F32,
        AccessorDimensions::Vec3,
        24,
    );
    let index = add(
        bytemuck::cast_slice(&indices),
        ComponentType::U16,
        AccessorDimensions::Scalar,
        36,
    );

    let material = document.add_material(DocumentMaterial {
        name: Some("cube".into()),
        base_color_factor: [0.8, 0.3, 0.2, 1.0],
        metallic_factor: 0.0,
        roughness_factor: 0.6,
        ..DocumentMaterial::default()
    });
    let mesh = document.add_mesh(DocumentMesh {
        name: Some("cube".into()),
        primitives: vec![DocumentPrimitive {
            attributes: BTreeMap::from([
                ("NORMAL".to_string(), normal),
                ("POSITION".to_string(), position),
            ]),
            indices: Some(index),
            material: Some(material),
            ..DocumentPrimitive::default()
        }],
    });
    let node = document.add_node(SceneNode::new().with_mesh(mesh));
    document.add_scene(Scene {
        name: Some("cube".into()),
        nodes: vec![node],
    });
    document
}
