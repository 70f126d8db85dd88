//! GLSL to WGSL compiler built on naga.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{ShaderBytecode, ShaderCompileError, ShaderCompiler, ShaderRequest, ShaderStage};

/// Path of the built-in scene shader.
pub const SCENE_SHADER_PATH: &str = "renderlab/scene.glsl";

const SCENE_SHADER_SOURCE: &str = include_str!("../../shaders/scene.glsl");

/// Compiles GLSL sources with naga.
///
/// Sources are looked up among registered sources first, then on disk.
/// A single file holds both stages: `VERTEX` or `FRAGMENT` is defined
/// according to the target, next to the requested defines. The GLSL
/// `main` is renamed to the requested entry point.
///
/// Results are cached per request.
pub struct GlslShaderCompiler {
    sources: HashMap<String, String>,
    cache: Mutex<HashMap<ShaderRequest, ShaderBytecode>>,
}

impl Default for GlslShaderCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl GlslShaderCompiler {
    /// A compiler with the built-in scene shader registered.
    pub fn new() -> Self {
        let mut compiler = Self {
            sources: HashMap::new(),
            cache: Mutex::new(HashMap::new()),
        };
        compiler.register_source(SCENE_SHADER_PATH, SCENE_SHADER_SOURCE);
        compiler
    }

    /// Make `source` available under `path`, shadowing files on disk.
    pub fn register_source(&mut self, path: impl Into<String>, source: impl Into<String>) {
        self.sources.insert(path.into(), source.into());
    }

    /// Number of cached compilation results.
    pub fn cached_count(&self) -> usize {
        self.cache.lock().len()
    }

    fn load_source(&self, path: &str) -> Result<String, ShaderCompileError> {
        if let Some(source) = self.sources.get(path) {
            return Ok(source.clone());
        }
        std::fs::read_to_string(path).map_err(|e| ShaderCompileError::SourceNotFound {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    fn compile_uncached(&self, request: &ShaderRequest) -> Result<ShaderBytecode, ShaderCompileError> {
        let stage = ShaderStage::from_target(&request.target)
            .ok_or_else(|| ShaderCompileError::UnsupportedTarget(request.target.clone()))?;
        let source = self.load_source(&request.path)?;

        let mut defines = naga::FastHashMap::default();
        let naga_stage = match stage {
            ShaderStage::Vertex => {
                defines.insert("VERTEX".to_string(), String::new());
                naga::ShaderStage::Vertex
            }
            ShaderStage::Pixel => {
                defines.insert("FRAGMENT".to_string(), String::new());
                naga::ShaderStage::Fragment
            }
        };
        for (name, value) in request.defines.iter() {
            defines.insert(name.to_string(), value.to_string());
        }

        let options = naga::front::glsl::Options {
            stage: naga_stage,
            defines,
        };
        let mut frontend = naga::front::glsl::Frontend::default();
        let mut module = frontend
            .parse(&options, &source)
            .map_err(|errors| ShaderCompileError::Parse {
                path: request.path.clone(),
                diagnostics: errors.to_string(),
            })?;

        for entry_point in &mut module.entry_points {
            entry_point.name = request.entry_point.clone();
        }

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        let info = validator
            .validate(&module)
            .map_err(|e| ShaderCompileError::Validation {
                path: request.path.clone(),
                diagnostics: e.to_string(),
            })?;

        let wgsl =
            naga::back::wgsl::write_string(&module, &info, naga::back::wgsl::WriterFlags::empty())
                .map_err(|e| ShaderCompileError::Generation(e.to_string()))?;

        log::debug!(
            "Compiled {} {} with {} defines ({} bytes of WGSL)",
            request.path,
            request.target,
            request.defines.len(),
            wgsl.len()
        );

        Ok(ShaderBytecode {
            stage,
            entry_point: request.entry_point.clone(),
            target: request.target.clone(),
            code: Arc::from(wgsl.into_bytes()),
        })
    }
}

impl ShaderCompiler for GlslShaderCompiler {
    fn compile(&self, request: &ShaderRequest) -> Result<ShaderBytecode, ShaderCompileError> {
        if let Some(bytecode) = self.cache.lock().get(request) {
            return Ok(bytecode.clone());
        }
        let bytecode = self.compile_uncached(request)?;
        self.cache.lock().insert(request.clone(), bytecode.clone());
        Ok(bytecode)
    }
}

impl std::fmt::Debug for GlslShaderCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlslShaderCompiler")
            .field("sources", &self.sources.keys().collect::<Vec<_>>())
            .field("cached", &self.cached_count())
            .finish()
    }
}
