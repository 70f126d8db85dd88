//! Renderer error classes and collected diagnostics.

use std::fmt;
use std::path::PathBuf;

use renderlab_core::codec::CodecError;
use renderlab_core::scene::PrimitiveMode;

use crate::error::GraphicsError;
use crate::scene::PrimitiveId;
use crate::shader::ShaderCompileError;

/// Fatal failure while initializing the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitError {
    /// `init()` was called twice.
    AlreadyInitialized,
    /// The configuration cannot be rendered with.
    InvalidConfig(String),
    /// The window surface could not be configured.
    Surface(GraphicsError),
    /// Staging or copying a document buffer or image failed.
    Upload {
        resource: String,
        source: GraphicsError,
    },
    /// Creating a renderer-owned resource failed.
    Resource {
        resource: String,
        source: GraphicsError,
    },
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInitialized => write!(f, "renderer is already initialized"),
            Self::InvalidConfig(msg) => write!(f, "invalid renderer configuration: {msg}"),
            Self::Surface(e) => write!(f, "failed to configure the surface: {e}"),
            Self::Upload { resource, source } => {
                write!(f, "failed to upload '{resource}': {source}")
            }
            Self::Resource { resource, source } => {
                write!(f, "failed to create '{resource}': {source}")
            }
        }
    }
}

impl std::error::Error for InitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Surface(e) => Some(e),
            Self::Upload { source, .. } | Self::Resource { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Failure to build one asset. The asset is skipped; the rest of the scene
/// still renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetError {
    /// The primitive has no `POSITION` attribute.
    MissingPosition { primitive: PrimitiveId },
    /// An accessor is dangling, sparse or out of its buffer's bounds.
    InvalidAccessor {
        primitive: PrimitiveId,
        semantic: String,
        accessor: usize,
    },
    /// An attribute has a layout the input assembler cannot read.
    UnsupportedAttribute {
        primitive: PrimitiveId,
        semantic: String,
        reason: String,
    },
    /// The assembly mode has no matching topology.
    UnsupportedTopology {
        primitive: PrimitiveId,
        mode: PrimitiveMode,
    },
    /// The primitive references a material that failed to build or does
    /// not exist.
    MissingMaterial {
        primitive: PrimitiveId,
        material: usize,
    },
    /// Building the material's GPU state failed.
    Material { material: usize, source: GraphicsError },
    /// A GPU resource for the primitive could not be created.
    Resource {
        primitive: PrimitiveId,
        source: GraphicsError,
    },
    /// A shader stage failed to compile.
    Shader {
        primitive: PrimitiveId,
        source: ShaderCompileError,
    },
    /// The pipeline-state object was rejected.
    Pipeline {
        primitive: PrimitiveId,
        source: GraphicsError,
    },
}

impl fmt::Display for AssetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingPosition { primitive } => {
                write!(f, "{primitive} has no POSITION attribute")
            }
            Self::InvalidAccessor {
                primitive,
                semantic,
                accessor,
            } => write!(f, "{primitive}: {semantic} accessor {accessor} is invalid"),
            Self::UnsupportedAttribute {
                primitive,
                semantic,
                reason,
            } => write!(f, "{primitive}: unsupported {semantic} attribute ({reason})"),
            Self::UnsupportedTopology { primitive, mode } => {
                write!(f, "{primitive}: unsupported primitive mode {mode:?}")
            }
            Self::MissingMaterial {
                primitive,
                material,
            } => write!(f, "{primitive}: material {material} is unavailable"),
            Self::Material { material, source } => {
                write!(f, "material {material} failed to build: {source}")
            }
            Self::Resource { primitive, source } => write!(f, "{primitive}: {source}"),
            Self::Shader { primitive, source } => {
                write!(f, "{primitive}: shader compilation failed: {source}")
            }
            Self::Pipeline { primitive, source } => {
                write!(f, "{primitive}: pipeline creation failed: {source}")
            }
        }
    }
}

impl std::error::Error for AssetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Material { source, .. }
            | Self::Resource { source, .. }
            | Self::Pipeline { source, .. } => Some(source),
            Self::Shader { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Failure of one frame. The frame is abandoned; the next one starts from
/// an intact rotation.
#[derive(Debug)]
pub enum FrameError {
    /// `update()` or `render()` before a successful `init()`.
    NotInitialized,
    /// Writing the camera constants failed.
    Camera(GraphicsError),
    /// Waiting for or resetting the frame slot failed.
    Rotation { frame: u64, source: GraphicsError },
    /// The frame's command list failed to record.
    Record { frame: u64, source: GraphicsError },
    /// The queue rejected the frame.
    Submit { frame: u64, source: GraphicsError },
    /// Presenting the color target failed.
    Present { frame: u64, source: GraphicsError },
    /// Copying the color target back failed.
    Readback { frame: u64, source: GraphicsError },
    /// Writing the image file failed.
    Encode {
        frame: u64,
        path: PathBuf,
        source: CodecError,
    },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialized => write!(f, "renderer is not initialized"),
            Self::Camera(e) => write!(f, "failed to update the camera: {e}"),
            Self::Rotation { frame, source } => {
                write!(f, "frame {frame}: failed to acquire the frame slot: {source}")
            }
            Self::Record { frame, source } => {
                write!(f, "frame {frame}: recording failed: {source}")
            }
            Self::Submit { frame, source } => {
                write!(f, "frame {frame}: submission failed: {source}")
            }
            Self::Present { frame, source } => write!(f, "frame {frame}: present failed: {source}"),
            Self::Readback { frame, source } => {
                write!(f, "frame {frame}: readback failed: {source}")
            }
            Self::Encode {
                frame,
                path,
                source,
            } => write!(f, "frame {frame}: failed to write {}: {source}", path.display()),
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::NotInitialized => None,
            Self::Camera(source)
            | Self::Rotation { source, .. }
            | Self::Record { source, .. }
            | Self::Submit { source, .. }
            | Self::Present { source, .. }
            | Self::Readback { source, .. } => Some(source),
            Self::Encode { source, .. } => Some(source),
        }
    }
}

/// Category of a [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// A feature the renderer does not support; a fallback was used.
    UnsupportedFeature,
    /// An asset failed to build and is not rendered.
    SkippedAsset,
}

/// One warning collected while building or rendering the scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

/// Warnings collected by the renderer. Every entry is also logged.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an unsupported feature and the fallback taken.
    pub fn unsupported(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("Unsupported feature: {message}");
        self.entries.push(Diagnostic {
            kind: DiagnosticKind::UnsupportedFeature,
            message,
        });
    }

    /// Record a skipped asset.
    pub fn skipped(&mut self, error: &AssetError) {
        log::warn!("Skipping asset: {error}");
        self.entries.push(Diagnostic {
            kind: DiagnosticKind::SkippedAsset,
            message: error.to_string(),
        });
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Number of entries of `kind`.
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.entries.iter().filter(|d| d.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_error_names_the_primitive() {
        let err = AssetError::UnsupportedTopology {
            primitive: PrimitiveId::new(2, 1),
            mode: PrimitiveMode::TriangleFan,
        };
        assert_eq!(
            err.to_string(),
            "mesh 2 primitive 1: unsupported primitive mode TriangleFan"
        );
    }

    #[test]
    fn test_init_error_source() {
        use std::error::Error;
        let err = InitError::Upload {
            resource: "buffer 0".into(),
            source: GraphicsError::OutOfMemory,
        };
        assert!(err.source().is_some());
        assert!(InitError::AlreadyInitialized.source().is_none());
    }

    #[test]
    fn test_diagnostics_are_counted_by_kind() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.unsupported("alpha mode MASK");
        diagnostics.skipped(&AssetError::MissingPosition {
            primitive: PrimitiveId::new(0, 0),
        });
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics.count(DiagnosticKind::UnsupportedFeature), 1);
        assert_eq!(diagnostics.count(DiagnosticKind::SkippedAsset), 1);
    }
}
