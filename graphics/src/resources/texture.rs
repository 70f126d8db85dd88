//! GPU texture resource.

use crate::backend::GpuTexture;
use crate::types::{Footprint, ResourceState, TextureDescriptor, TextureFormat};

/// A GPU texture resource.
///
/// Textures are created by [`GraphicsDevice::create_texture`] and shared as
/// `Arc<Texture>`.
///
/// # Example
///
/// ```ignore
/// let texture = device.create_texture(&TextureDescriptor::new_2d(
///     600, 400,
///     TextureFormat::Rgba32Float,
///     TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC,
/// ))?;
/// println!("Texture size: {}x{}", texture.width(), texture.height());
/// ```
///
/// [`GraphicsDevice::create_texture`]: crate::GraphicsDevice::create_texture
pub struct Texture {
    id: u64,
    descriptor: TextureDescriptor,
    handle: GpuTexture,
}

impl Texture {
    /// Create a new texture (called by GraphicsDevice).
    pub(crate) fn new(id: u64, descriptor: TextureDescriptor, handle: GpuTexture) -> Self {
        Self {
            id,
            descriptor,
            handle,
        }
    }

    /// Device-unique resource id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the texture descriptor.
    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    /// Get the texture width.
    pub fn width(&self) -> u32 {
        self.descriptor.width
    }

    /// Get the texture height.
    pub fn height(&self) -> u32 {
        self.descriptor.height
    }

    /// Get the texture format.
    pub fn format(&self) -> TextureFormat {
        self.descriptor.format
    }

    /// State the texture was created in.
    pub fn initial_state(&self) -> ResourceState {
        self.descriptor.initial_state
    }

    /// Copyable footprint of the texture's only subresource.
    pub fn footprint(&self) -> Footprint {
        self.descriptor.footprint()
    }

    /// Get the texture label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Label for diagnostics, falling back to the id.
    pub fn debug_name(&self) -> String {
        match &self.descriptor.label {
            Some(label) => label.clone(),
            None => format!("texture#{}", self.id),
        }
    }

    pub(crate) fn handle(&self) -> &GpuTexture {
        &self.handle
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("width", &self.descriptor.width)
            .field("height", &self.descriptor.height)
            .field("format", &self.descriptor.format)
            .field("usage", &self.descriptor.usage)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

// Ensure Texture is Send + Sync
static_assertions::assert_impl_all!(Texture: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TextureUsage;

    #[test]
    fn test_texture_debug() {
        let desc = TextureDescriptor::new_2d(
            1920,
            1080,
            TextureFormat::Rgba8Unorm,
            TextureUsage::RENDER_ATTACHMENT,
        );
        let texture = Texture::new(3, desc, GpuTexture::Dummy);
        let debug = format!("{:?}", texture);
        assert!(debug.contains("Texture"));
        assert!(debug.contains("1920"));
    }

    #[test]
    fn test_texture_footprint() {
        let desc = TextureDescriptor::new_2d(
            800,
            600,
            TextureFormat::Rgba8Unorm,
            TextureUsage::TEXTURE_BINDING,
        );
        let texture = Texture::new(1, desc, GpuTexture::Dummy);
        assert_eq!(texture.width(), 800);
        assert_eq!(texture.height(), 600);
        assert_eq!(texture.footprint().row_pitch, 3328);
    }
}
