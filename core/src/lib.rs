//! # RenderLab Core
//!
//! CPU-side scene data for RenderLab: the [`scene::SceneDocument`] consumed
//! by the renderer, the glTF loader that produces it, and the PNG codec used
//! to write rendered frames.

pub mod codec;
#[cfg(feature = "gltf")]
pub mod gltf;
pub mod math;
pub mod scene;

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the core library version.
pub fn init() {
    log::info!("RenderLab Core v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
