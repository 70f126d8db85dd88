//! Renderer configuration.

use std::path::PathBuf;

use crate::scene::OrbitParams;
use crate::shader::SCENE_SHADER_PATH;

use super::InitError;

/// Where finished frames go.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum OutputMode {
    /// Present to the window surface.
    #[default]
    Present,
    /// Copy each frame back and write it as `output{N}.png` into
    /// `directory`.
    Readback { directory: PathBuf },
}

/// Parameters for creating a [`SceneRenderer`](super::SceneRenderer).
///
/// # Example
///
/// ```ignore
/// let config = RendererConfig::new()
///     .with_size(800, 600)
///     .with_output(OutputMode::Readback { directory: "output".into() });
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
    /// Number of frames in flight.
    pub frame_count: usize,
    pub output: OutputMode,
    pub clear_color: [f32; 4],
    pub orbit: OrbitParams,
    /// Path requested from the shader compiler.
    pub shader_path: String,
    /// Deepest node nesting the traversal follows. Deeper nodes are
    /// reported and skipped.
    pub max_depth: usize,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 600,
            height: 400,
            title: "RenderLab".to_string(),
            frame_count: 2,
            output: OutputMode::Present,
            clear_color: [0.0, 0.2, 0.4, 1.0],
            orbit: OrbitParams::default(),
            shader_path: SCENE_SHADER_PATH.to_string(),
            max_depth: 64,
        }
    }
}

impl RendererConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_frame_count(mut self, frame_count: usize) -> Self {
        self.frame_count = frame_count;
        self
    }

    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    /// Write frames as PNG files into `directory`.
    pub fn with_readback(self, directory: impl Into<PathBuf>) -> Self {
        self.with_output(OutputMode::Readback {
            directory: directory.into(),
        })
    }

    pub fn with_clear_color(mut self, clear_color: [f32; 4]) -> Self {
        self.clear_color = clear_color;
        self
    }

    pub fn with_orbit(mut self, orbit: OrbitParams) -> Self {
        self.orbit = orbit;
        self
    }

    pub fn with_shader_path(mut self, shader_path: impl Into<String>) -> Self {
        self.shader_path = shader_path.into();
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn is_headless(&self) -> bool {
        matches!(self.output, OutputMode::Readback { .. })
    }

    /// Check that a renderer can be built from this configuration.
    pub fn validate(&self) -> Result<(), InitError> {
        if self.width == 0 || self.height == 0 {
            return Err(InitError::InvalidConfig(format!(
                "size {}x{} is empty",
                self.width, self.height
            )));
        }
        if self.frame_count == 0 {
            return Err(InitError::InvalidConfig("frame count is 0".into()));
        }
        let fov_in_range = self.orbit.fov > 0.0 && self.orbit.fov < 180.0;
        if self.orbit.radius <= 0.0 || !fov_in_range {
            return Err(InitError::InvalidConfig(format!(
                "orbit radius {} / field of view {} out of range",
                self.orbit.radius, self.orbit.fov
            )));
        }
        Ok(())
    }
}
