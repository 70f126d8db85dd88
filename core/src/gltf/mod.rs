//! glTF 2.0 scene loader.
//!
//! Loads `.gltf`/`.glb` data into a [`SceneDocument`]: raw buffers,
//! buffer views and accessors, decoded RGBA8 images, samplers (as GL
//! enumerants), materials, meshes, nodes and scenes.
//!
//! # Resource Resolution
//!
//! Buffers and images can come from the GLB binary chunk, from embedded
//! base64 data URIs, or from external files. External files are only
//! resolved by [`load_gltf_file`], relative to the directory of the loaded
//! file.
//!
//! # Warnings
//!
//! Problems that do not prevent rendering (an image that fails to decode,
//! a sparse accessor) are collected into [`GltfLoad::warnings`] instead of
//! failing the load. A failed image is replaced by a 1x1 white placeholder
//! so texture indices stay valid.
//!
//! # Example
//!
//! ```ignore
//! use renderlab_core::gltf::load_gltf_file;
//!
//! let loaded = load_gltf_file("Cube/Cube.gltf")?;
//! for warning in &loaded.warnings {
//!     log::warn!("{warning}");
//! }
//! println!("Nodes: {}", loaded.document.nodes.len());
//! ```

mod error;
mod loader;
#[cfg(test)]
mod tests;

pub use error::GltfError;

use std::path::Path;

use crate::scene::SceneDocument;

/// Result of a successful load.
#[derive(Debug, Clone)]
pub struct GltfLoad {
    /// The parsed scene.
    pub document: SceneDocument,
    /// Non-fatal problems found while loading.
    pub warnings: Vec<String>,
}

/// Load a glTF document from binary data.
///
/// Supports binary glTF (`.glb`) and JSON glTF with embedded data URIs.
/// External file references fail with [`GltfError::Buffer`] for
/// buffers and produce a warning for images.
pub fn load_gltf(data: &[u8]) -> Result<GltfLoad, GltfError> {
    load_with_base(data, None)
}

/// Load a glTF document from disk, resolving external buffers and images
/// relative to the file's directory.
pub fn load_gltf_file(path: impl AsRef<Path>) -> Result<GltfLoad, GltfError> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|source| GltfError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    log::debug!("Loading glTF {} ({} bytes)", path.display(), data.len());
    load_with_base(&data, path.parent())
}

fn load_with_base(data: &[u8], base_dir: Option<&Path>) -> Result<GltfLoad, GltfError> {
    let gltf = gltf_dep::Gltf::from_slice(data)?;
    let blob = gltf.blob.clone();

    let buffers = loader::resolve_buffers(&gltf.document, blob, base_dir)?;
    let mut ctx = loader::LoadContext::new(gltf.document, buffers, base_dir);

    let buffer_views = ctx.load_buffer_views();
    let accessors = ctx.load_accessors()?;
    let images = ctx.load_images();
    let samplers = ctx.load_samplers();
    let textures = ctx.load_textures();
    let materials = ctx.load_materials();
    let meshes = ctx.load_meshes();
    let nodes = ctx.load_nodes();
    let scenes = ctx.load_scenes();
    let default_scene = ctx.default_scene();
    let (buffers, warnings) = ctx.finish();

    for warning in &warnings {
        log::warn!("glTF: {warning}");
    }

    Ok(GltfLoad {
        document: SceneDocument {
            buffers,
            buffer_views,
            accessors,
            images,
            samplers,
            textures,
            materials,
            meshes,
            nodes,
            scenes,
            default_scene,
        },
        warnings,
    })
}
