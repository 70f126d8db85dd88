//! Texture types and descriptors.

use bitflags::bitflags;

use super::{ROW_PITCH_ALIGNMENT, ResourceState, align_up};

/// Texture format enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    /// 8-bit red channel, unsigned normalized.
    R8Unorm,
    /// 8-bit RG channels, unsigned normalized.
    Rg8Unorm,
    /// 8-bit RGBA channels, unsigned normalized.
    #[default]
    Rgba8Unorm,
    /// 8-bit BGRA channels, unsigned normalized.
    Bgra8Unorm,
    /// 32-bit RGBA channels, float.
    Rgba32Float,
    /// 32-bit depth, float.
    Depth32Float,
}

impl TextureFormat {
    /// Returns true if this is a depth format.
    pub fn is_depth(&self) -> bool {
        matches!(self, Self::Depth32Float)
    }

    /// Bytes per texel.
    pub fn block_size(&self) -> u32 {
        match self {
            Self::R8Unorm => 1,
            Self::Rg8Unorm => 2,
            Self::Rgba8Unorm | Self::Bgra8Unorm | Self::Depth32Float => 4,
            Self::Rgba32Float => 16,
        }
    }

    /// Number of channels per texel.
    pub fn channel_count(&self) -> u32 {
        match self {
            Self::R8Unorm | Self::Depth32Float => 1,
            Self::Rg8Unorm => 2,
            Self::Rgba8Unorm | Self::Bgra8Unorm | Self::Rgba32Float => 4,
        }
    }

    /// The 8-bit unorm format holding `components` channels, if one exists.
    ///
    /// Three-channel images have no matching format and must be expanded.
    pub fn from_components(components: u32) -> Option<Self> {
        match components {
            1 => Some(Self::R8Unorm),
            2 => Some(Self::Rg8Unorm),
            4 => Some(Self::Rgba8Unorm),
            _ => None,
        }
    }

    /// Whether color blending works on this format without optional
    /// device features.
    pub fn is_blendable(&self) -> bool {
        !matches!(self, Self::Rgba32Float | Self::Depth32Float)
    }
}

bitflags! {
    /// Usage flags for textures.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Texture can be copied from.
        const COPY_SRC = 1 << 0;
        /// Texture can be copied to.
        const COPY_DST = 1 << 1;
        /// Texture can be sampled in shaders.
        const TEXTURE_BINDING = 1 << 2;
        /// Texture can be used as a render target or depth target.
        const RENDER_ATTACHMENT = 1 << 3;
    }
}

impl Default for TextureUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Descriptor for creating a 2D texture.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TextureDescriptor {
    /// Debug label for the texture.
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
    /// State the texture is created in.
    pub initial_state: ResourceState,
}

impl TextureDescriptor {
    /// Create a 2D texture descriptor. Depth textures start in
    /// [`ResourceState::DepthWrite`], everything else in
    /// [`ResourceState::Common`].
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            label: None,
            width,
            height,
            format,
            usage,
            initial_state: if format.is_depth() {
                ResourceState::DepthWrite
            } else {
                ResourceState::Common
            },
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the state the texture is created in.
    pub fn with_initial_state(mut self, state: ResourceState) -> Self {
        self.initial_state = state;
        self
    }

    /// Layout of this texture's single subresource in a linear buffer.
    pub fn footprint(&self) -> Footprint {
        Footprint::for_texture(self.width, self.height, self.format)
    }
}

/// Placement of a texture subresource inside a buffer.
///
/// Rows are `row_pitch` bytes apart; `row_pitch` is `row_size` rounded up
/// to [`ROW_PITCH_ALIGNMENT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Footprint {
    /// Byte offset of the first row in the buffer.
    pub offset: u64,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    /// Distance between rows in the buffer.
    pub row_pitch: u64,
    /// Meaningful bytes per row (`width * block_size`).
    pub row_size: u64,
    /// Buffer bytes needed to hold the whole footprint.
    pub total_size: u64,
}

impl Footprint {
    /// Copyable footprint of a `width` x `height` texture at offset 0.
    pub fn for_texture(width: u32, height: u32, format: TextureFormat) -> Self {
        let row_size = u64::from(width) * u64::from(format.block_size());
        let row_pitch = align_up(row_size.max(1), ROW_PITCH_ALIGNMENT);
        let total_size = match height {
            0 => 0,
            h => row_pitch * u64::from(h - 1) + row_size,
        };
        Self {
            offset: 0,
            width,
            height,
            format,
            row_pitch,
            row_size,
            total_size,
        }
    }

    /// Byte range of row `y` inside the buffer.
    pub fn row_range(&self, y: u32) -> std::ops::Range<usize> {
        let start = (self.offset + self.row_pitch * u64::from(y)) as usize;
        start..start + self.row_size as usize
    }
}
