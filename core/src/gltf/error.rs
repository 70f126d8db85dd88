use std::fmt;
use std::path::PathBuf;

/// Failure to turn a glTF file into a [`SceneDocument`](crate::scene::SceneDocument).
#[derive(Debug)]
pub enum GltfError {
    /// The JSON or GLB container is malformed.
    Parse(gltf_dep::Error),
    Io { path: PathBuf, source: std::io::Error },
    /// Image bytes could not be decoded.
    Image(image::ImageError),
    /// An accessor cannot be read.
    Accessor { accessor: usize, reason: String },
    /// Buffer or image data could not be resolved.
    Buffer(String),
}

impl fmt::Display for GltfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "glTF parse error: {e}"),
            Self::Io { path, source } => write!(f, "failed to read {}: {source}", path.display()),
            Self::Image(e) => write!(f, "image decode error: {e}"),
            Self::Accessor { accessor, reason } => write!(f, "accessor {accessor}: {reason}"),
            Self::Buffer(reason) => write!(f, "buffer error: {reason}"),
        }
    }
}

impl std::error::Error for GltfError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(e) => Some(e),
            Self::Io { source, .. } => Some(source),
            Self::Image(e) => Some(e),
            Self::Accessor { .. } | Self::Buffer(_) => None,
        }
    }
}

impl From<gltf_dep::Error> for GltfError {
    fn from(e: gltf_dep::Error) -> Self {
        Self::Parse(e)
    }
}

impl From<image::ImageError> for GltfError {
    fn from(e: image::ImageError) -> Self {
        Self::Image(e)
    }
}
