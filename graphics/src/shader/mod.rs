//! Shader compilation service.
//!
//! The renderer asks a [`ShaderCompiler`] for bytecode with a
//! [`ShaderRequest`]: a source path, a set of [`ShaderDefines`], an entry
//! point (`VSMain` / `PSMain`) and a target profile (`vs_5_0` / `ps_5_0`).
//! The compiler is a trait so tests and tools can substitute their own.
//!
//! [`GlslShaderCompiler`] is the built-in implementation. It preprocesses
//! GLSL with the requested defines through naga and emits WGSL, which the
//! wgpu backend consumes directly.
//!
//! # Shader Defines
//!
//! Defines are derived from a primitive with a fixed, ordered table:
//!
//! | Condition | Define |
//! |-----------|--------|
//! | `NORMAL` attribute | `HAS_NORMAL=1` |
//! | `TANGENT` attribute | `HAS_TANGENT=1` |
//! | `TEXCOORD_0` attribute | `HAS_TEXCOORD_0=1` |
//! | material present | `HAS_MATERIAL=1` |
//!
//! # Vertex Locations
//!
//! Every semantic has a stable shader input location, see
//! [`semantic_location`].

mod compiler;

use std::sync::Arc;

pub use compiler::{GlslShaderCompiler, SCENE_SHADER_PATH};

/// Vertex entry point name.
pub const VERTEX_ENTRY_POINT: &str = "VSMain";
/// Pixel entry point name.
pub const PIXEL_ENTRY_POINT: &str = "PSMain";
/// Vertex target profile.
pub const VERTEX_TARGET: &str = "vs_5_0";
/// Pixel target profile.
pub const PIXEL_TARGET: &str = "ps_5_0";

/// Semantic to define, in emission order.
const ATTRIBUTE_DEFINES: [(&str, &str); 3] = [
    ("NORMAL", "HAS_NORMAL"),
    ("TANGENT", "HAS_TANGENT"),
    ("TEXCOORD_0", "HAS_TEXCOORD_0"),
];

/// Semantic to shader input location.
const SEMANTIC_LOCATIONS: [(&str, u32); 8] = [
    ("POSITION", 0),
    ("NORMAL", 1),
    ("TANGENT", 2),
    ("TEXCOORD_0", 3),
    ("TEXCOORD_1", 4),
    ("COLOR_0", 5),
    ("JOINTS_0", 6),
    ("WEIGHTS_0", 7),
];

/// Stable shader input location of a vertex semantic, if it has one.
pub fn semantic_location(semantic: &str) -> Option<u32> {
    SEMANTIC_LOCATIONS
        .iter()
        .find(|(name, _)| *name == semantic)
        .map(|(_, location)| *location)
}

/// Shader pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

impl ShaderStage {
    /// Stage of a target profile such as `vs_5_0`.
    pub fn from_target(target: &str) -> Option<Self> {
        match target.split('_').next() {
            Some("vs") => Some(Self::Vertex),
            Some("ps") => Some(Self::Pixel),
            _ => None,
        }
    }
}

/// Ordered list of preprocessor defines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ShaderDefines {
    defines: Vec<(String, String)>,
}

impl ShaderDefines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines for a primitive with the given attribute semantics.
    pub fn for_primitive<'a>(
        semantics: impl IntoIterator<Item = &'a str> + Clone,
        has_material: bool,
    ) -> Self {
        let mut defines = Self::new();
        for (semantic, define) in ATTRIBUTE_DEFINES {
            if semantics.clone().into_iter().any(|s| s == semantic) {
                defines.push(define, "1");
            }
        }
        if has_material {
            defines.push("HAS_MATERIAL", "1");
        }
        defines
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.defines.push((name.into(), value.into()));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.defines.iter().any(|(n, _)| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.defines.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.defines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defines.is_empty()
    }
}

/// One compilation request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderRequest {
    pub path: String,
    pub defines: ShaderDefines,
    pub entry_point: String,
    pub target: String,
}

impl ShaderRequest {
    /// Vertex stage request for `path`.
    pub fn vertex(path: impl Into<String>, defines: ShaderDefines) -> Self {
        Self {
            path: path.into(),
            defines,
            entry_point: VERTEX_ENTRY_POINT.to_string(),
            target: VERTEX_TARGET.to_string(),
        }
    }

    /// Pixel stage request for `path`.
    pub fn pixel(path: impl Into<String>, defines: ShaderDefines) -> Self {
        Self {
            path: path.into(),
            defines,
            entry_point: PIXEL_ENTRY_POINT.to_string(),
            target: PIXEL_TARGET.to_string(),
        }
    }
}

/// Compiled shader code for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderBytecode {
    pub stage: ShaderStage,
    pub entry_point: String,
    pub target: String,
    /// Backend-ready code (WGSL text for the built-in compiler).
    pub code: Arc<[u8]>,
}

/// Shader compilation failure, with diagnostic text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderCompileError {
    /// No source is registered or on disk at the path.
    SourceNotFound { path: String, reason: String },
    /// The target profile names no known stage.
    UnsupportedTarget(String),
    /// The source failed to preprocess or parse.
    Parse { path: String, diagnostics: String },
    /// The parsed module failed validation.
    Validation { path: String, diagnostics: String },
    /// Code generation failed.
    Generation(String),
}

impl std::fmt::Display for ShaderCompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SourceNotFound { path, reason } => {
                write!(f, "shader source '{path}' not found: {reason}")
            }
            Self::UnsupportedTarget(target) => write!(f, "unsupported shader target '{target}'"),
            Self::Parse { path, diagnostics } => {
                write!(f, "failed to parse '{path}':\n{diagnostics}")
            }
            Self::Validation { path, diagnostics } => {
                write!(f, "shader '{path}' failed validation: {diagnostics}")
            }
            Self::Generation(msg) => write!(f, "shader code generation failed: {msg}"),
        }
    }
}

impl std::error::Error for ShaderCompileError {}

/// Turns shader requests into bytecode.
pub trait ShaderCompiler: Send + Sync {
    /// Compile one stage.
    fn compile(&self, request: &ShaderRequest) -> Result<ShaderBytecode, ShaderCompileError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defines_follow_table_order() {
        let defines =
            ShaderDefines::for_primitive(["TEXCOORD_0", "POSITION", "NORMAL"], true);
        let names: Vec<_> = defines.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["HAS_NORMAL", "HAS_TEXCOORD_0", "HAS_MATERIAL"]);
        assert!(defines.iter().all(|(_, v)| v == "1"));
    }

    #[test]
    fn test_position_only_without_material_has_no_defines() {
        let defines = ShaderDefines::for_primitive(["POSITION"], false);
        assert!(defines.is_empty());
    }

    #[test]
    fn test_semantic_locations() {
        assert_eq!(semantic_location("POSITION"), Some(0));
        assert_eq!(semantic_location("TEXCOORD_0"), Some(3));
        assert_eq!(semantic_location("WEIGHTS_0"), Some(7));
        assert_eq!(semantic_location("_CUSTOM"), None);
    }

    #[test]
    fn test_stage_from_target() {
        assert_eq!(ShaderStage::from_target("vs_5_0"), Some(ShaderStage::Vertex));
        assert_eq!(ShaderStage::from_target("ps_5_0"), Some(ShaderStage::Pixel));
        assert_eq!(ShaderStage::from_target("cs_5_0"), None);
    }
}
