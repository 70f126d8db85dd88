//! Common types shared across the graphics system.

/// Row pitch alignment for buffer/texture copies, in bytes.
pub const ROW_PITCH_ALIGNMENT: u64 = 256;

/// Size granularity of constant buffers, in bytes.
pub const CONSTANT_BUFFER_ALIGNMENT: u64 = 256;

/// Round `value` up to the next multiple of `alignment` (a power of two).
pub const fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}

// ============================================================================
// Viewport
// ============================================================================

/// Viewport configuration for rendering.
///
/// Uses the D3D/wgpu convention: depth range `[0, 1]`, origin at the
/// top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// X coordinate of the viewport's top-left corner.
    pub x: f32,
    /// Y coordinate of the viewport's top-left corner.
    pub y: f32,
    /// Width of the viewport.
    pub width: f32,
    /// Height of the viewport.
    pub height: f32,
    /// Minimum depth value (default: 0.0).
    pub min_depth: f32,
    /// Maximum depth value (default: 1.0).
    pub max_depth: f32,
}

impl Viewport {
    /// Create a viewport with the default `[0, 1]` depth range.
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    /// A viewport covering a whole `width` x `height` target.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f32, height as f32)
    }
}

/// Scissor rectangle, in pixels. `right` and `bottom` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScissorRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl ScissorRect {
    /// A scissor covering a whole `width` x `height` target.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            left: 0,
            top: 0,
            right: width,
            bottom: height,
        }
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(2400, 256), 2560);
        assert_eq!(align_up(6, 4), 8);
    }

    #[test]
    fn test_full_viewport_and_scissor() {
        let vp = Viewport::full(600, 400);
        assert_eq!((vp.width, vp.height, vp.max_depth), (600.0, 400.0, 1.0));
        let sc = ScissorRect::full(600, 400);
        assert_eq!((sc.width(), sc.height()), (600, 400));
    }
}
