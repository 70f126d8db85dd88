//! Scene document data types.
//!
//! All types use plain arrays and indices into the owning
//! [`SceneDocument`] lists. Nothing here holds a reference to another
//! element; a node names its mesh and children by index, a primitive names
//! its accessors and material by index.

use std::collections::BTreeMap;

/// OpenGL enumerants used by glTF sampler definitions.
pub mod gl {
    /// `GL_NEAREST`
    pub const NEAREST: u32 = 9728;
    /// `GL_LINEAR`
    pub const LINEAR: u32 = 9729;
    /// `GL_NEAREST_MIPMAP_NEAREST`
    pub const NEAREST_MIPMAP_NEAREST: u32 = 9984;
    /// `GL_LINEAR_MIPMAP_NEAREST`
    pub const LINEAR_MIPMAP_NEAREST: u32 = 9985;
    /// `GL_NEAREST_MIPMAP_LINEAR`
    pub const NEAREST_MIPMAP_LINEAR: u32 = 9986;
    /// `GL_LINEAR_MIPMAP_LINEAR`
    pub const LINEAR_MIPMAP_LINEAR: u32 = 9987;
    /// `GL_REPEAT`
    pub const REPEAT: u32 = 10497;
    /// `GL_CLAMP_TO_EDGE`
    pub const CLAMP_TO_EDGE: u32 = 33071;
    /// `GL_MIRRORED_REPEAT`
    pub const MIRRORED_REPEAT: u32 = 33648;
}

/// A contiguous byte range of a source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferView {
    /// Index of the source buffer.
    pub buffer: usize,
    /// Byte offset into the buffer.
    pub byte_offset: usize,
    /// Length in bytes.
    pub byte_length: usize,
    /// Distance between consecutive elements, if interleaved.
    pub byte_stride: Option<usize>,
}

/// Scalar component type of an accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    I8,
    U8,
    I16,
    U16,
    U32,
    F32,
}

impl ComponentType {
    /// Size of one component in bytes.
    pub const fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::U32 | Self::F32 => 4,
        }
    }
}

/// Number and arrangement of components in one accessor element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessorDimensions {
    Scalar,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat3,
    Mat4,
}

impl AccessorDimensions {
    /// Number of scalar components per element.
    pub const fn component_count(self) -> usize {
        match self {
            Self::Scalar => 1,
            Self::Vec2 => 2,
            Self::Vec3 => 3,
            Self::Vec4 | Self::Mat2 => 4,
            Self::Mat3 => 9,
            Self::Mat4 => 16,
        }
    }
}

/// Typed view over a buffer view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accessor {
    /// Backing buffer view. `None` means the accessor is all zeros.
    pub buffer_view: Option<usize>,
    /// Offset relative to the start of the buffer view.
    pub byte_offset: usize,
    pub component_type: ComponentType,
    pub dimensions: AccessorDimensions,
    pub normalized: bool,
    /// Number of elements.
    pub count: usize,
}

impl Accessor {
    /// Size of one tightly packed element in bytes.
    pub const fn element_size(&self) -> usize {
        self.component_type.size() * self.dimensions.component_count()
    }
}

/// An accessor resolved down to a byte range of a source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessorRange {
    /// Index of the source buffer.
    pub buffer: usize,
    /// Absolute byte offset of the first element.
    pub offset: usize,
    /// Number of bytes spanned by all elements.
    pub size: usize,
    /// Distance between elements.
    pub stride: usize,
    /// Number of elements.
    pub count: usize,
}

/// Decoded image pixels.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocumentImage {
    pub name: Option<String>,
    pub width: u32,
    pub height: u32,
    /// Channels per pixel; decoded images are always 4 (RGBA8).
    pub components: u32,
    /// Tightly packed rows of `width * components` bytes.
    pub pixels: Vec<u8>,
}

impl DocumentImage {
    /// Build an RGBA8 image from raw pixels.
    pub fn rgba8(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            name: None,
            width,
            height,
            components: 4,
            pixels,
        }
    }

    /// Bytes per source row.
    pub fn row_size(&self) -> usize {
        self.width as usize * self.components as usize
    }
}

/// Sampler definition, stored as raw GL enumerants (see [`gl`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentSampler {
    pub mag_filter: Option<u32>,
    pub min_filter: Option<u32>,
    pub wrap_s: u32,
    pub wrap_t: u32,
}

impl Default for DocumentSampler {
    fn default() -> Self {
        Self {
            mag_filter: None,
            min_filter: None,
            wrap_s: gl::REPEAT,
            wrap_t: gl::REPEAT,
        }
    }
}

/// A texture: an image plus an optional sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentTexture {
    pub image: usize,
    pub sampler: Option<usize>,
}

/// Reference from a material to a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureRef {
    pub texture: usize,
    pub tex_coord: u32,
}

/// Material alpha mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AlphaMode {
    #[default]
    Opaque,
    Mask,
    Blend,
}

impl AlphaMode {
    /// The glTF spelling of the mode.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Opaque => "OPAQUE",
            Self::Mask => "MASK",
            Self::Blend => "BLEND",
        }
    }
}

impl std::fmt::Display for AlphaMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metallic-roughness material definition.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentMaterial {
    pub name: Option<String>,
    pub alpha_mode: AlphaMode,
    pub double_sided: bool,
    pub base_color_factor: [f32; 4],
    pub base_color_texture: Option<TextureRef>,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub metallic_roughness_texture: Option<TextureRef>,
}

impl Default for DocumentMaterial {
    fn default() -> Self {
        Self {
            name: None,
            alpha_mode: AlphaMode::Opaque,
            double_sided: false,
            base_color_factor: [1.0; 4],
            base_color_texture: None,
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            metallic_roughness_texture: None,
        }
    }
}

/// Primitive assembly mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveMode {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
}

/// One drawable part of a mesh.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocumentPrimitive {
    /// Attribute semantic (`POSITION`, `NORMAL`, ...) to accessor index,
    /// in name order.
    pub attributes: BTreeMap<String, usize>,
    pub indices: Option<usize>,
    pub material: Option<usize>,
    pub mode: PrimitiveMode,
}

/// A named list of primitives.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocumentMesh {
    pub name: Option<String>,
    pub primitives: Vec<DocumentPrimitive>,
}

/// A node in the scene graph.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub name: Option<String>,
    pub mesh: Option<usize>,
    /// Local transform, column-major.
    pub matrix: [f32; 16],
    pub children: Vec<usize>,
}

impl SceneNode {
    /// Column-major identity.
    pub const IDENTITY: [f32; 16] = [
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ];

    /// An empty node with an identity transform.
    pub fn new() -> Self {
        Self {
            name: None,
            mesh: None,
            matrix: Self::IDENTITY,
            children: Vec::new(),
        }
    }

    /// Returns this node with a mesh attached.
    #[must_use]
    pub fn with_mesh(mut self, mesh: usize) -> Self {
        self.mesh = Some(mesh);
        self
    }

    /// Returns this node with the given children.
    #[must_use]
    pub fn with_children(mut self, children: Vec<usize>) -> Self {
        self.children = children;
        self
    }

    /// Returns this node with a local transform.
    #[must_use]
    pub fn with_matrix(mut self, matrix: [f32; 16]) -> Self {
        self.matrix = matrix;
        self
    }
}

impl Default for SceneNode {
    fn default() -> Self {
        Self::new()
    }
}

/// A set of root nodes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Scene {
    pub name: Option<String>,
    pub nodes: Vec<usize>,
}

/// Typed, read-only form of a parsed scene file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SceneDocument {
    pub buffers: Vec<Vec<u8>>,
    pub buffer_views: Vec<BufferView>,
    pub accessors: Vec<Accessor>,
    pub images: Vec<DocumentImage>,
    pub samplers: Vec<DocumentSampler>,
    pub textures: Vec<DocumentTexture>,
    pub materials: Vec<DocumentMaterial>,
    pub meshes: Vec<DocumentMesh>,
    pub nodes: Vec<SceneNode>,
    pub scenes: Vec<Scene>,
    pub default_scene: Option<usize>,
}

impl SceneDocument {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a source buffer, returning its index.
    pub fn add_buffer(&mut self, data: Vec<u8>) -> usize {
        self.buffers.push(data);
        self.buffers.len() - 1
    }

    /// Append a buffer view, returning its index.
    pub fn add_buffer_view(&mut self, view: BufferView) -> usize {
        self.buffer_views.push(view);
        self.buffer_views.len() - 1
    }

    /// Append an accessor, returning its index.
    pub fn add_accessor(&mut self, accessor: Accessor) -> usize {
        self.accessors.push(accessor);
        self.accessors.len() - 1
    }

    /// Append an image, returning its index.
    pub fn add_image(&mut self, image: DocumentImage) -> usize {
        self.images.push(image);
        self.images.len() - 1
    }

    /// Append a material, returning its index.
    pub fn add_material(&mut self, material: DocumentMaterial) -> usize {
        self.materials.push(material);
        self.materials.len() - 1
    }

    /// Append a mesh, returning its index.
    pub fn add_mesh(&mut self, mesh: DocumentMesh) -> usize {
        self.meshes.push(mesh);
        self.meshes.len() - 1
    }

    /// Append a node, returning its index.
    pub fn add_node(&mut self, node: SceneNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Append a scene, returning its index. The first scene added becomes
    /// the default one.
    pub fn add_scene(&mut self, scene: Scene) -> usize {
        self.scenes.push(scene);
        let index = self.scenes.len() - 1;
        self.default_scene.get_or_insert(index);
        index
    }

    /// The scene to render: the declared default, or the first one.
    pub fn active_scene(&self) -> Option<&Scene> {
        self.default_scene
            .and_then(|i| self.scenes.get(i))
            .or_else(|| self.scenes.first())
    }

    /// Resolve an accessor to the byte range it covers in its source buffer.
    ///
    /// Returns `None` for sparse/zero accessors, dangling indices, or ranges
    /// that fall outside the buffer or overflow `usize`.
    pub fn accessor_range(&self, index: usize) -> Option<AccessorRange> {
        let accessor = self.accessors.get(index)?;
        let view = self.buffer_views.get(accessor.buffer_view?)?;
        let data = self.buffers.get(view.buffer)?;

        let element_size = accessor.element_size();
        let stride = view.byte_stride.unwrap_or(element_size).max(element_size);
        let size = match accessor.count {
            0 => 0,
            n => stride.checked_mul(n - 1)?.checked_add(element_size)?,
        };
        let offset = view.byte_offset.checked_add(accessor.byte_offset)?;
        if offset.checked_add(size)? > data.len()
            || accessor.byte_offset.checked_add(size)? > view.byte_length
        {
            return None;
        }

        Some(AccessorRange {
            buffer: view.buffer,
            offset,
            size,
            stride,
            count: accessor.count,
        })
    }

    /// Borrow the bytes covered by an accessor.
    pub fn accessor_bytes(&self, index: usize) -> Option<&[u8]> {
        let range = self.accessor_range(index)?;
        let data = self.buffers.get(range.buffer)?;
        data.get(range.offset..range.offset + range.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn document_with_accessor(stride: Option<usize>, count: usize) -> SceneDocument {
        let mut doc = SceneDocument::new();
        let buffer = doc.add_buffer(vec![0u8; 64]);
        let view = doc.add_buffer_view(BufferView {
            buffer,
            byte_offset: 8,
            byte_length: 48,
            byte_stride: stride,
        });
        doc.add_accessor(Accessor {
            buffer_view: Some(view),
            byte_offset: 4,
            component_type: ComponentType::F32,
            dimensions: AccessorDimensions::Vec2,
            normalized: false,
            count,
        });
        doc
    }

    #[test]
    fn test_accessor_range_tightly_packed() {
        let doc = document_with_accessor(None, 3);
        let range = doc.accessor_range(0).unwrap();
        assert_eq!(range.offset, 12);
        assert_eq!(range.stride, 8);
        assert_eq!(range.size, 24);
    }

    #[test]
    fn test_accessor_range_interleaved() {
        let doc = document_with_accessor(Some(16), 3);
        let range = doc.accessor_range(0).unwrap();
        assert_eq!(range.stride, 16);
        assert_eq!(range.size, 16 * 2 + 8);
    }

    #[rstest]
    #[case::past_the_view(Some(16), 10)]
    #[case::overflowing_count(Some(16), usize::MAX)]
    #[case::overflowing_tight_count(None, usize::MAX / 4)]
    fn test_accessor_range_out_of_bounds(#[case] stride: Option<usize>, #[case] count: usize) {
        let doc = document_with_accessor(stride, count);
        assert!(doc.accessor_range(0).is_none());
        assert!(doc.accessor_bytes(0).is_none());
    }

    #[test]
    fn test_accessor_range_overflowing_offset() {
        let mut doc = document_with_accessor(None, 1);
        doc.accessors[0].byte_offset = usize::MAX - 2;
        assert!(doc.accessor_range(0).is_none());
    }

    #[test]
    fn test_first_scene_becomes_default() {
        let mut doc = SceneDocument::new();
        assert!(doc.active_scene().is_none());
        let node = doc.add_node(SceneNode::new());
        doc.add_scene(Scene {
            name: None,
            nodes: vec![node],
        });
        doc.add_scene(Scene::default());
        assert_eq!(doc.default_scene, Some(0));
        assert_eq!(doc.active_scene().unwrap().nodes, vec![node]);
    }

    #[test]
    fn test_alpha_mode_names() {
        assert_eq!(AlphaMode::Mask.to_string(), "MASK");
        assert_eq!(AlphaMode::default(), AlphaMode::Opaque);
    }
}
