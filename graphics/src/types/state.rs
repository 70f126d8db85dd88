//! Resource states and fixed-function pipeline state.

/// State a resource is in, as tracked by explicit barriers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceState {
    /// Shared by any queue; also the presentable state.
    #[default]
    Common,
    CopyDest,
    CopySource,
    /// Every read-only state at once. Upload heap resources live here.
    GenericRead,
    VertexAndConstantBuffer,
    IndexBuffer,
    PixelShaderResource,
    RenderTarget,
    DepthWrite,
}

impl ResourceState {
    /// The presentable state.
    pub const PRESENT: Self = Self::Common;

    /// Whether a resource in this state may be read as `usage`.
    ///
    /// [`GenericRead`](Self::GenericRead) covers every read-only state.
    pub fn allows_read_as(self, usage: Self) -> bool {
        self == usage
            || (self == Self::GenericRead
                && matches!(
                    usage,
                    Self::VertexAndConstantBuffer
                        | Self::IndexBuffer
                        | Self::PixelShaderResource
                        | Self::CopySource
                ))
    }

    /// Whether a copy may read from a resource in this state. `Common`
    /// is implicitly promoted.
    pub fn allows_copy_source(self) -> bool {
        matches!(self, Self::CopySource | Self::GenericRead | Self::Common)
    }

    /// Whether a copy may write to a resource in this state. `Common`
    /// is implicitly promoted.
    pub fn allows_copy_dest(self) -> bool {
        matches!(self, Self::CopyDest | Self::Common)
    }
}

/// Source/destination factor of a blend equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
}

/// Blend operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOp {
    Add,
}

/// Render target blend state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub enabled: bool,
    pub src_color: BlendFactor,
    pub dst_color: BlendFactor,
    pub color_op: BlendOp,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
    pub alpha_op: BlendOp,
}

impl BlendState {
    /// Blending disabled; the source replaces the destination.
    pub const fn opaque() -> Self {
        Self {
            enabled: false,
            src_color: BlendFactor::One,
            dst_color: BlendFactor::Zero,
            color_op: BlendOp::Add,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::Zero,
            alpha_op: BlendOp::Add,
        }
    }

    /// Classic `src * a + dst * (1 - a)`; alpha is written through.
    pub const fn alpha_blending() -> Self {
        Self {
            enabled: true,
            src_color: BlendFactor::SrcAlpha,
            dst_color: BlendFactor::OneMinusSrcAlpha,
            ..Self::opaque()
        }
    }
}

impl Default for BlendState {
    fn default() -> Self {
        Self::opaque()
    }
}

/// Face culling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    None,
    #[default]
    Back,
    Front,
}

/// Rasterizer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterizerState {
    pub cull_mode: CullMode,
    pub front_counter_clockwise: bool,
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self {
            cull_mode: CullMode::Back,
            front_counter_clockwise: false,
        }
    }
}

/// Depth comparison function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunction {
    #[default]
    Less,
    LessEqual,
    Always,
}

/// Depth test state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub compare: CompareFunction,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            compare: CompareFunction::Less,
        }
    }
}

/// How vertices are assembled into primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
}

/// Primitive class a pipeline is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopologyClass {
    Point,
    Line,
    Triangle,
}

impl PrimitiveTopology {
    pub fn class(self) -> TopologyClass {
        match self {
            Self::PointList => TopologyClass::Point,
            Self::LineList | Self::LineStrip => TopologyClass::Line,
            Self::TriangleList | Self::TriangleStrip => TopologyClass::Triangle,
        }
    }
}

/// Index buffer element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    Uint8,
    Uint16,
    Uint32,
}

impl IndexFormat {
    /// Size of one index in bytes.
    pub fn size(self) -> u64 {
        match self {
            Self::Uint8 => 1,
            Self::Uint16 => 2,
            Self::Uint32 => 4,
        }
    }
}

/// Scalar type of one vertex attribute component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexComponent {
    Sint8,
    Uint8,
    Sint16,
    Uint16,
    Uint32,
    Float32,
}

impl VertexComponent {
    pub fn size(self) -> u32 {
        match self {
            Self::Sint8 | Self::Uint8 => 1,
            Self::Sint16 | Self::Uint16 => 2,
            Self::Uint32 | Self::Float32 => 4,
        }
    }
}

/// Format of a vertex attribute: `count` components of one scalar type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexFormat {
    pub component: VertexComponent,
    pub count: u8,
    /// Integer components are read as normalized floats.
    pub normalized: bool,
}

impl VertexFormat {
    pub const fn new(component: VertexComponent, count: u8, normalized: bool) -> Self {
        Self {
            component,
            count,
            normalized,
        }
    }

    /// `count` 32-bit floats.
    pub const fn float32(count: u8) -> Self {
        Self::new(VertexComponent::Float32, count, false)
    }

    /// Size of one element in bytes.
    pub fn size(&self) -> u32 {
        self.component.size() * u32::from(self.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_read_covers_reads() {
        let state = ResourceState::GenericRead;
        assert!(state.allows_read_as(ResourceState::IndexBuffer));
        assert!(state.allows_read_as(ResourceState::PixelShaderResource));
        assert!(!state.allows_read_as(ResourceState::RenderTarget));
        assert!(!ResourceState::CopyDest.allows_read_as(ResourceState::IndexBuffer));
    }

    #[test]
    fn test_copy_promotion_from_common() {
        assert!(ResourceState::Common.allows_copy_source());
        assert!(ResourceState::Common.allows_copy_dest());
        assert!(!ResourceState::RenderTarget.allows_copy_source());
        assert!(!ResourceState::GenericRead.allows_copy_dest());
    }

    #[test]
    fn test_alpha_blending_factors() {
        let blend = BlendState::alpha_blending();
        assert!(blend.enabled);
        assert_eq!(blend.dst_color, BlendFactor::OneMinusSrcAlpha);
        assert_eq!(blend.src_alpha, BlendFactor::One);
        assert_eq!(blend.dst_alpha, BlendFactor::Zero);
        assert!(!BlendState::opaque().enabled);
    }

    #[test]
    fn test_topology_class() {
        assert_eq!(PrimitiveTopology::LineStrip.class(), TopologyClass::Line);
        assert_eq!(PrimitiveTopology::TriangleStrip.class(), TopologyClass::Triangle);
        assert_eq!(PrimitiveTopology::PointList.class(), TopologyClass::Point);
    }

    #[test]
    fn test_vertex_format_size() {
        assert_eq!(VertexFormat::float32(3).size(), 12);
        assert_eq!(VertexFormat::new(VertexComponent::Uint16, 4, true).size(), 8);
    }
}
