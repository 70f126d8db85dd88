//! Type conversions between RenderLab types and wgpu types.

use crate::error::GraphicsError;
use crate::types::{
    AddressMode, BlendFactor, BlendOp, BlendState, BufferUsage, CompareFunction, CullMode,
    FilterMode, IndexFormat, PrimitiveTopology, TextureFormat, TextureUsage, VertexComponent,
    VertexFormat,
};

/// Convert BufferUsage flags to wgpu buffer usages.
///
/// `MAP_WRITE` is dropped: upload buffers are written through the queue,
/// so they get `COPY_DST` instead.
pub fn convert_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
    let mut result = wgpu::BufferUsages::empty();

    if usage.contains(BufferUsage::VERTEX) {
        result |= wgpu::BufferUsages::VERTEX;
    }
    if usage.contains(BufferUsage::INDEX) {
        result |= wgpu::BufferUsages::INDEX;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        result |= wgpu::BufferUsages::UNIFORM;
    }
    if usage.contains(BufferUsage::COPY_SRC) {
        result |= wgpu::BufferUsages::COPY_SRC;
    }
    if usage.intersects(BufferUsage::COPY_DST | BufferUsage::MAP_WRITE) {
        result |= wgpu::BufferUsages::COPY_DST;
    }
    if usage.contains(BufferUsage::MAP_READ) {
        result |= wgpu::BufferUsages::MAP_READ;
    }

    result
}

/// Convert TextureFormat to wgpu format.
pub fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
        TextureFormat::Rg8Unorm => wgpu::TextureFormat::Rg8Unorm,
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
    }
}

/// Map a surface format back to ours, if we can render to it.
pub fn surface_format(format: wgpu::TextureFormat) -> Option<TextureFormat> {
    match format {
        wgpu::TextureFormat::Bgra8Unorm => Some(TextureFormat::Bgra8Unorm),
        wgpu::TextureFormat::Rgba8Unorm => Some(TextureFormat::Rgba8Unorm),
        _ => None,
    }
}

/// Convert TextureUsage flags to wgpu texture usages.
pub fn convert_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
    let mut result = wgpu::TextureUsages::empty();

    if usage.contains(TextureUsage::COPY_SRC) {
        result |= wgpu::TextureUsages::COPY_SRC;
    }
    if usage.contains(TextureUsage::COPY_DST) {
        result |= wgpu::TextureUsages::COPY_DST;
    }
    if usage.contains(TextureUsage::TEXTURE_BINDING) {
        result |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
        result |= wgpu::TextureUsages::RENDER_ATTACHMENT;
    }

    result
}

/// Convert AddressMode to wgpu address mode.
pub fn convert_address_mode(mode: AddressMode) -> wgpu::AddressMode {
    match mode {
        AddressMode::Wrap => wgpu::AddressMode::Repeat,
        AddressMode::Clamp => wgpu::AddressMode::ClampToEdge,
        AddressMode::Mirror => wgpu::AddressMode::MirrorRepeat,
    }
}

/// Convert FilterMode to wgpu filter mode.
pub fn convert_filter_mode(mode: FilterMode) -> wgpu::FilterMode {
    match mode {
        FilterMode::Point => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

/// Convert FilterMode to wgpu mipmap filter mode.
pub fn convert_mipmap_filter_mode(mode: FilterMode) -> wgpu::MipmapFilterMode {
    match mode {
        FilterMode::Point => wgpu::MipmapFilterMode::Nearest,
        FilterMode::Linear => wgpu::MipmapFilterMode::Linear,
    }
}

/// Convert CompareFunction to wgpu compare function.
pub fn convert_compare_function(func: CompareFunction) -> wgpu::CompareFunction {
    match func {
        CompareFunction::Less => wgpu::CompareFunction::Less,
        CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareFunction::Always => wgpu::CompareFunction::Always,
    }
}

fn convert_blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
    }
}

fn convert_blend_op(op: BlendOp) -> wgpu::BlendOperation {
    match op {
        BlendOp::Add => wgpu::BlendOperation::Add,
    }
}

/// Convert BlendState to a wgpu blend state. Disabled blending is `None`.
pub fn convert_blend_state(blend: &BlendState) -> Option<wgpu::BlendState> {
    if !blend.enabled {
        return None;
    }
    Some(wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: convert_blend_factor(blend.src_color),
            dst_factor: convert_blend_factor(blend.dst_color),
            operation: convert_blend_op(blend.color_op),
        },
        alpha: wgpu::BlendComponent {
            src_factor: convert_blend_factor(blend.src_alpha),
            dst_factor: convert_blend_factor(blend.dst_alpha),
            operation: convert_blend_op(blend.alpha_op),
        },
    })
}

pub fn convert_cull_mode(mode: CullMode) -> Option<wgpu::Face> {
    match mode {
        CullMode::None => None,
        CullMode::Back => Some(wgpu::Face::Back),
        CullMode::Front => Some(wgpu::Face::Front),
    }
}

pub fn convert_front_face(front_counter_clockwise: bool) -> wgpu::FrontFace {
    if front_counter_clockwise {
        wgpu::FrontFace::Ccw
    } else {
        wgpu::FrontFace::Cw
    }
}

/// Convert PrimitiveTopology to wgpu primitive topology.
pub fn convert_topology(topology: PrimitiveTopology) -> wgpu::PrimitiveTopology {
    match topology {
        PrimitiveTopology::PointList => wgpu::PrimitiveTopology::PointList,
        PrimitiveTopology::LineList => wgpu::PrimitiveTopology::LineList,
        PrimitiveTopology::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        PrimitiveTopology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
        PrimitiveTopology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
    }
}

pub fn convert_index_format(format: IndexFormat) -> Result<wgpu::IndexFormat, GraphicsError> {
    match format {
        IndexFormat::Uint16 => Ok(wgpu::IndexFormat::Uint16),
        IndexFormat::Uint32 => Ok(wgpu::IndexFormat::Uint32),
        IndexFormat::Uint8 => Err(GraphicsError::FeatureNotSupported(
            "8-bit index buffers".to_string(),
        )),
    }
}

/// Convert VertexFormat to wgpu vertex format.
///
/// wgpu has no three-component 8 or 16-bit formats.
pub fn convert_vertex_format(format: VertexFormat) -> Result<wgpu::VertexFormat, GraphicsError> {
    use VertexComponent::*;
    use wgpu::VertexFormat as F;

    let converted = match (format.component, format.count, format.normalized) {
        (Float32, 1, _) => F::Float32,
        (Float32, 2, _) => F::Float32x2,
        (Float32, 3, _) => F::Float32x3,
        (Float32, 4, _) => F::Float32x4,
        (Uint32, 1, _) => F::Uint32,
        (Uint32, 2, _) => F::Uint32x2,
        (Uint32, 3, _) => F::Uint32x3,
        (Uint32, 4, _) => F::Uint32x4,
        (Uint8, 1, true) => F::Unorm8,
        (Uint8, 2, true) => F::Unorm8x2,
        (Uint8, 4, true) => F::Unorm8x4,
        (Uint8, 1, false) => F::Uint8,
        (Uint8, 2, false) => F::Uint8x2,
        (Uint8, 4, false) => F::Uint8x4,
        (Sint8, 1, true) => F::Snorm8,
        (Sint8, 2, true) => F::Snorm8x2,
        (Sint8, 4, true) => F::Snorm8x4,
        (Sint8, 1, false) => F::Sint8,
        (Sint8, 2, false) => F::Sint8x2,
        (Sint8, 4, false) => F::Sint8x4,
        (Uint16, 1, true) => F::Unorm16,
        (Uint16, 2, true) => F::Unorm16x2,
        (Uint16, 4, true) => F::Unorm16x4,
        (Uint16, 1, false) => F::Uint16,
        (Uint16, 2, false) => F::Uint16x2,
        (Uint16, 4, false) => F::Uint16x4,
        (Sint16, 1, true) => F::Snorm16,
        (Sint16, 2, true) => F::Snorm16x2,
        (Sint16, 4, true) => F::Snorm16x4,
        (Sint16, 1, false) => F::Sint16,
        (Sint16, 2, false) => F::Sint16x2,
        (Sint16, 4, false) => F::Sint16x4,
        _ => {
            return Err(GraphicsError::FeatureNotSupported(format!(
                "vertex format {format:?}"
            )));
        }
    };
    Ok(converted)
}

pub fn convert_color(color: [f32; 4]) -> wgpu::Color {
    wgpu::Color {
        r: f64::from(color[0]),
        g: f64::from(color[1]),
        b: f64::from(color[2]),
        a: f64::from(color[3]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_usage_becomes_copy_dst() {
        let usage = convert_buffer_usage(BufferUsage::UNIFORM | BufferUsage::MAP_WRITE);
        assert!(usage.contains(wgpu::BufferUsages::COPY_DST));
        assert!(!usage.contains(wgpu::BufferUsages::MAP_WRITE));
    }

    #[test]
    fn test_three_component_bytes_are_rejected() {
        let format = VertexFormat::new(VertexComponent::Uint8, 3, true);
        assert!(convert_vertex_format(format).is_err());
        let format = VertexFormat::new(VertexComponent::Uint16, 2, true);
        assert_eq!(convert_vertex_format(format).unwrap(), wgpu::VertexFormat::Unorm16x2);
    }

    #[test]
    fn test_opaque_blend_is_none() {
        assert!(convert_blend_state(&BlendState::opaque()).is_none());
        assert!(convert_blend_state(&BlendState::alpha_blending()).is_some());
    }
}
