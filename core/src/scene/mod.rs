//! Scene document types.
//!
//! These types are format-agnostic and can be produced by any loader
//! or built programmatically:
//!
//! - [`SceneDocument`] - Buffers, images, materials, meshes and nodes
//! - [`SceneNode`] / [`Scene`] - The node graph and its roots
//! - [`DocumentMesh`] / [`DocumentPrimitive`] - Drawable geometry
//! - [`DocumentMaterial`] / [`DocumentSampler`] - Surface description

mod types;

pub use types::{
    Accessor, AccessorDimensions, AccessorRange, AlphaMode, BufferView, ComponentType,
    DocumentImage, DocumentMaterial, DocumentMesh, DocumentPrimitive, DocumentSampler,
    DocumentTexture, PrimitiveMode, Scene, SceneDocument, SceneNode, TextureRef, gl,
};
