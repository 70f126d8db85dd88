//! Internal glTF loading logic.
//!
//! The [`LoadContext`] holds all state needed during loading: resolved buffer
//! data, the parsed glTF document and the warnings collected so far.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use base64::Engine as _;

use crate::scene::{
    Accessor, AccessorDimensions, AlphaMode, BufferView, ComponentType, DocumentImage,
    DocumentMaterial, DocumentMesh, DocumentPrimitive, DocumentSampler, DocumentTexture,
    PrimitiveMode, Scene, SceneNode, TextureRef, gl,
};

use super::error::GltfError;

/// Internal loading context that holds resolved data during loading.
pub(crate) struct LoadContext {
    /// The parsed glTF document.
    document: gltf_dep::Document,
    /// Resolved buffer data (one Vec<u8> per glTF buffer).
    buffers: Vec<Vec<u8>>,
    /// Directory external URIs are resolved against.
    base_dir: Option<PathBuf>,
    warnings: Vec<String>,
}

impl LoadContext {
    /// Create a new LoadContext from parsed glTF data.
    pub fn new(
        document: gltf_dep::Document,
        buffers: Vec<Vec<u8>>,
        base_dir: Option<&Path>,
    ) -> Self {
        Self {
            document,
            buffers,
            base_dir: base_dir.map(Path::to_path_buf),
            warnings: Vec::new(),
        }
    }

    /// Hand back the resolved buffers and the collected warnings.
    pub fn finish(self) -> (Vec<Vec<u8>>, Vec<String>) {
        (self.buffers, self.warnings)
    }

    pub fn load_buffer_views(&self) -> Vec<BufferView> {
        self.document
            .views()
            .map(|view| BufferView {
                buffer: view.buffer().index(),
                byte_offset: view.offset(),
                byte_length: view.length(),
                byte_stride: view.stride(),
            })
            .collect()
    }

    pub fn load_accessors(&mut self) -> Result<Vec<Accessor>, GltfError> {
        let mut accessors = Vec::new();
        for accessor in self.document.accessors() {
            if accessor.sparse().is_some() {
                self.warnings.push(format!(
                    "accessor {} uses sparse storage, only the base view is used",
                    accessor.index()
                ));
            }
            let view = accessor.view();
            if let Some(view) = &view
                && view.buffer().index() >= self.buffers.len()
            {
                return Err(GltfError::Accessor {
                    accessor: accessor.index(),
                    reason: format!("references missing buffer {}", view.buffer().index()),
                });
            }
            accessors.push(Accessor {
                buffer_view: view.map(|v| v.index()),
                byte_offset: accessor.offset(),
                component_type: map_component_type(accessor.data_type()),
                dimensions: map_dimensions(accessor.dimensions()),
                normalized: accessor.normalized(),
                count: accessor.count(),
            });
        }
        Ok(accessors)
    }

    /// Load all images, decoding to RGBA8.
    ///
    /// An image that cannot be resolved or decoded becomes a warning plus a
    /// 1x1 white placeholder.
    pub fn load_images(&mut self) -> Vec<DocumentImage> {
        let mut images = Vec::new();

        for image in self.document.images() {
            let name = image.name().map(String::from);
            let decoded = match image.source() {
                gltf_dep::image::Source::View { view, .. } => {
                    let start = view.offset();
                    let end = start + view.length();
                    self.buffers
                        .get(view.buffer().index())
                        .and_then(|data| data.get(start..end))
                        .ok_or_else(|| {
                            GltfError::Buffer(format!(
                                "image {} view is out of range",
                                image.index()
                            ))
                        })
                        .and_then(decode_image)
                }
                gltf_dep::image::Source::Uri { uri, .. } => {
                    resolve_uri(uri, self.base_dir.as_deref()).and_then(|bytes| decode_image(&bytes))
                }
            };

            match decoded {
                Ok(mut decoded) => {
                    decoded.name = name;
                    images.push(decoded);
                }
                Err(e) => {
                    self.warnings
                        .push(format!("image {} replaced by placeholder: {e}", image.index()));
                    let mut placeholder = DocumentImage::rgba8(1, 1, vec![255; 4]);
                    placeholder.name = name;
                    images.push(placeholder);
                }
            }
        }

        images
    }

    /// Load all samplers.
    pub fn load_samplers(&self) -> Vec<DocumentSampler> {
        self.document
            .samplers()
            .map(|sampler| DocumentSampler {
                mag_filter: sampler.mag_filter().map(map_mag_filter),
                min_filter: sampler.min_filter().map(map_min_filter),
                wrap_s: map_wrapping(sampler.wrap_s()),
                wrap_t: map_wrapping(sampler.wrap_t()),
            })
            .collect()
    }

    /// Load all textures.
    pub fn load_textures(&self) -> Vec<DocumentTexture> {
        self.document
            .textures()
            .map(|tex| DocumentTexture {
                image: tex.source().index(),
                sampler: tex.sampler().index(),
            })
            .collect()
    }

    /// Load all materials.
    pub fn load_materials(&self) -> Vec<DocumentMaterial> {
        self.document
            .materials()
            .map(|mat| {
                let pbr = mat.pbr_metallic_roughness();
                DocumentMaterial {
                    name: mat.name().map(String::from),
                    alpha_mode: match mat.alpha_mode() {
                        gltf_dep::material::AlphaMode::Opaque => AlphaMode::Opaque,
                        gltf_dep::material::AlphaMode::Mask => AlphaMode::Mask,
                        gltf_dep::material::AlphaMode::Blend => AlphaMode::Blend,
                    },
                    double_sided: mat.double_sided(),
                    base_color_factor: pbr.base_color_factor(),
                    base_color_texture: pbr.base_color_texture().map(|t| TextureRef {
                        texture: t.texture().index(),
                        tex_coord: t.tex_coord(),
                    }),
                    metallic_factor: pbr.metallic_factor(),
                    roughness_factor: pbr.roughness_factor(),
                    metallic_roughness_texture: pbr.metallic_roughness_texture().map(|t| {
                        TextureRef {
                            texture: t.texture().index(),
                            tex_coord: t.tex_coord(),
                        }
                    }),
                }
            })
            .collect()
    }

    pub fn load_meshes(&self) -> Vec<DocumentMesh> {
        self.document
            .meshes()
            .map(|mesh| DocumentMesh {
                name: mesh.name().map(String::from),
                primitives: mesh
                    .primitives()
                    .map(|prim| DocumentPrimitive {
                        attributes: prim
                            .attributes()
                            .map(|(semantic, accessor)| (semantic_name(&semantic), accessor.index()))
                            .collect::<BTreeMap<_, _>>(),
                        indices: prim.indices().map(|a| a.index()),
                        material: prim.material().index(),
                        mode: map_mode(prim.mode()),
                    })
                    .collect(),
            })
            .collect()
    }

    /// Load all nodes. TRS transforms are composed into a single matrix.
    pub fn load_nodes(&self) -> Vec<SceneNode> {
        self.document
            .nodes()
            .map(|node| {
                let columns = node.transform().matrix();
                let mut matrix = [0.0f32; 16];
                for (c, column) in columns.iter().enumerate() {
                    matrix[c * 4..c * 4 + 4].copy_from_slice(column);
                }
                SceneNode {
                    name: node.name().map(String::from),
                    mesh: node.mesh().map(|m| m.index()),
                    matrix,
                    children: node.children().map(|c| c.index()).collect(),
                }
            })
            .collect()
    }

    pub fn load_scenes(&self) -> Vec<Scene> {
        self.document
            .scenes()
            .map(|scene| Scene {
                name: scene.name().map(String::from),
                nodes: scene.nodes().map(|n| n.index()).collect(),
            })
            .collect()
    }

    pub fn default_scene(&self) -> Option<usize> {
        self.document.default_scene().map(|s| s.index())
    }
}

/// Decode image bytes to RGBA8.
fn decode_image(bytes: &[u8]) -> Result<DocumentImage, GltfError> {
    let img = image::load_from_memory(bytes)?;

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();

    Ok(DocumentImage::rgba8(width, height, rgba.into_raw()))
}

/// Parse a data URI (e.g., `data:image/png;base64,...`) and return the decoded bytes.
fn parse_data_uri(uri: &str) -> Option<Result<Vec<u8>, GltfError>> {
    let rest = uri.strip_prefix("data:")?;
    let Some(base64_start) = rest.find(";base64,") else {
        return Some(Err(GltfError::Buffer(
            "only base64 data URIs are supported".into(),
        )));
    };
    let encoded = &rest[base64_start + 8..];
    Some(
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| GltfError::Buffer(format!("invalid base64 data URI: {e}"))),
    )
}

/// Resolve a data URI or a file path relative to `base_dir`.
fn resolve_uri(uri: &str, base_dir: Option<&Path>) -> Result<Vec<u8>, GltfError> {
    if let Some(data) = parse_data_uri(uri) {
        return data;
    }
    let Some(base_dir) = base_dir else {
        return Err(GltfError::Buffer(format!(
            "external URI {uri} cannot be resolved without a base directory"
        )));
    };
    let path = base_dir.join(uri.replace("%20", " "));
    std::fs::read(&path).map_err(|source| GltfError::Io { path, source })
}

/// Resolve all buffer data from the glTF document.
pub(crate) fn resolve_buffers(
    document: &gltf_dep::Document,
    blob: Option<Vec<u8>>,
    base_dir: Option<&Path>,
) -> Result<Vec<Vec<u8>>, GltfError> {
    let mut buffers = Vec::new();

    for buffer in document.buffers() {
        let data = match buffer.source() {
            gltf_dep::buffer::Source::Bin => blob.clone().ok_or_else(|| {
                GltfError::Buffer("binary buffer referenced but no blob present".into())
            })?,
            gltf_dep::buffer::Source::Uri(uri) => resolve_uri(uri, base_dir)?,
        };
        if data.len() < buffer.length() {
            return Err(GltfError::Buffer(format!(
                "buffer {} holds {} bytes, {} declared",
                buffer.index(),
                data.len(),
                buffer.length()
            )));
        }
        buffers.push(data);
    }

    Ok(buffers)
}

fn semantic_name(semantic: &gltf_dep::Semantic) -> String {
    use gltf_dep::Semantic;
    match semantic {
        Semantic::Positions => "POSITION".to_string(),
        Semantic::Normals => "NORMAL".to_string(),
        Semantic::Tangents => "TANGENT".to_string(),
        Semantic::Colors(n) => format!("COLOR_{n}"),
        Semantic::TexCoords(n) => format!("TEXCOORD_{n}"),
        Semantic::Joints(n) => format!("JOINTS_{n}"),
        Semantic::Weights(n) => format!("WEIGHTS_{n}"),
        #[allow(unreachable_patterns)]
        other => format!("{other:?}"),
    }
}

fn map_component_type(data_type: gltf_dep::accessor::DataType) -> ComponentType {
    use gltf_dep::accessor::DataType;
    match data_type {
        DataType::I8 => ComponentType::I8,
        DataType::U8 => ComponentType::U8,
        DataType::I16 => ComponentType::I16,
        DataType::U16 => ComponentType::U16,
        DataType::U32 => ComponentType::U32,
        DataType::F32 => ComponentType::F32,
    }
}

fn map_dimensions(dimensions: gltf_dep::accessor::Dimensions) -> AccessorDimensions {
    use gltf_dep::accessor::Dimensions;
    match dimensions {
        Dimensions::Scalar => AccessorDimensions::Scalar,
        Dimensions::Vec2 => AccessorDimensions::Vec2,
        Dimensions::Vec3 => AccessorDimensions::Vec3,
        Dimensions::Vec4 => AccessorDimensions::Vec4,
        Dimensions::Mat2 => AccessorDimensions::Mat2,
        Dimensions::Mat3 => AccessorDimensions::Mat3,
        Dimensions::Mat4 => AccessorDimensions::Mat4,
    }
}

fn map_mode(mode: gltf_dep::mesh::Mode) -> PrimitiveMode {
    use gltf_dep::mesh::Mode;
    match mode {
        Mode::Points => PrimitiveMode::Points,
        Mode::Lines => PrimitiveMode::Lines,
        Mode::LineLoop => PrimitiveMode::LineLoop,
        Mode::LineStrip => PrimitiveMode::LineStrip,
        Mode::Triangles => PrimitiveMode::Triangles,
        Mode::TriangleStrip => PrimitiveMode::TriangleStrip,
        Mode::TriangleFan => PrimitiveMode::TriangleFan,
    }
}

/// Map glTF magnification filter to its GL enumerant.
fn map_mag_filter(filter: gltf_dep::texture::MagFilter) -> u32 {
    match filter {
        gltf_dep::texture::MagFilter::Nearest => gl::NEAREST,
        gltf_dep::texture::MagFilter::Linear => gl::LINEAR,
    }
}

/// Map glTF minification filter to its GL enumerant.
fn map_min_filter(filter: gltf_dep::texture::MinFilter) -> u32 {
    use gltf_dep::texture::MinFilter;
    match filter {
        MinFilter::Nearest => gl::NEAREST,
        MinFilter::Linear => gl::LINEAR,
        MinFilter::NearestMipmapNearest => gl::NEAREST_MIPMAP_NEAREST,
        MinFilter::LinearMipmapNearest => gl::LINEAR_MIPMAP_NEAREST,
        MinFilter::NearestMipmapLinear => gl::NEAREST_MIPMAP_LINEAR,
        MinFilter::LinearMipmapLinear => gl::LINEAR_MIPMAP_LINEAR,
    }
}

/// Map glTF wrapping mode to its GL enumerant.
fn map_wrapping(wrap: gltf_dep::texture::WrappingMode) -> u32 {
    match wrap {
        gltf_dep::texture::WrappingMode::ClampToEdge => gl::CLAMP_TO_EDGE,
        gltf_dep::texture::WrappingMode::MirroredRepeat => gl::MIRRORED_REPEAT,
        gltf_dep::texture::WrappingMode::Repeat => gl::REPEAT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data_uri() {
        let decoded = parse_data_uri("data:application/octet-stream;base64,SGVsbG8gV29ybGQ=")
            .unwrap()
            .unwrap();
        assert_eq!(decoded, b"Hello World");
    }

    #[test]
    fn test_parse_data_uri_ignores_paths() {
        assert!(parse_data_uri("Cube.bin").is_none());
    }

    #[test]
    fn test_parse_data_uri_rejects_non_base64() {
        assert!(matches!(
            parse_data_uri("data:text/plain,hello"),
            Some(Err(GltfError::Buffer(_)))
        ));
    }

    #[test]
    fn test_external_uri_without_base_dir() {
        assert!(matches!(
            resolve_uri("Cube.bin", None),
            Err(GltfError::Buffer(_))
        ));
    }

    #[test]
    fn test_sampler_enum_mapping() {
        assert_eq!(map_min_filter(gltf_dep::texture::MinFilter::LinearMipmapLinear), 9987);
        assert_eq!(map_wrapping(gltf_dep::texture::WrappingMode::MirroredRepeat), 33648);
        assert_eq!(map_mag_filter(gltf_dep::texture::MagFilter::Nearest), 9728);
    }
}
