//! Sampler types and descriptors.

/// Filtering for one stage of texture sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    #[default]
    Point,
    Linear,
}

/// Combined min/mag/mip filter, named after the D3D12 filter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Filter {
    MinMagMipPoint,
    MinMagPointMipLinear,
    MinPointMagLinearMipPoint,
    MinPointMagMipLinear,
    MinLinearMagMipPoint,
    MinLinearMagPointMipLinear,
    #[default]
    MinMagLinearMipPoint,
    MinMagMipLinear,
}

impl Filter {
    /// Build the filter from its three stages.
    pub fn from_modes(min: FilterMode, mag: FilterMode, mip: FilterMode) -> Self {
        use FilterMode::{Linear, Point};
        match (min, mag, mip) {
            (Point, Point, Point) => Self::MinMagMipPoint,
            (Point, Point, Linear) => Self::MinMagPointMipLinear,
            (Point, Linear, Point) => Self::MinPointMagLinearMipPoint,
            (Point, Linear, Linear) => Self::MinPointMagMipLinear,
            (Linear, Point, Point) => Self::MinLinearMagMipPoint,
            (Linear, Point, Linear) => Self::MinLinearMagPointMipLinear,
            (Linear, Linear, Point) => Self::MinMagLinearMipPoint,
            (Linear, Linear, Linear) => Self::MinMagMipLinear,
        }
    }

    /// Minification stage.
    pub fn min(self) -> FilterMode {
        match self {
            Self::MinMagMipPoint
            | Self::MinMagPointMipLinear
            | Self::MinPointMagLinearMipPoint
            | Self::MinPointMagMipLinear => FilterMode::Point,
            _ => FilterMode::Linear,
        }
    }

    /// Magnification stage.
    pub fn mag(self) -> FilterMode {
        match self {
            Self::MinMagMipPoint
            | Self::MinMagPointMipLinear
            | Self::MinLinearMagMipPoint
            | Self::MinLinearMagPointMipLinear => FilterMode::Point,
            _ => FilterMode::Linear,
        }
    }

    /// Mip selection stage.
    pub fn mip(self) -> FilterMode {
        match self {
            Self::MinMagPointMipLinear
            | Self::MinPointMagMipLinear
            | Self::MinLinearMagPointMipLinear
            | Self::MinMagMipLinear => FilterMode::Linear,
            _ => FilterMode::Point,
        }
    }
}

/// Texture address mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    #[default]
    Wrap,
    Clamp,
    Mirror,
}

/// Descriptor for creating a sampler.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerDescriptor {
    /// Debug label for the sampler.
    pub label: Option<String>,
    pub filter: Filter,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
    pub min_lod: f32,
    pub max_lod: f32,
}

impl SamplerDescriptor {
    /// Upper LOD clamp used for every sampler.
    pub const MAX_LOD: f32 = 256.0;

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            filter: Filter::default(),
            address_u: AddressMode::Wrap,
            address_v: AddressMode::Wrap,
            address_w: AddressMode::Wrap,
            min_lod: 0.0,
            max_lod: Self::MAX_LOD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_stage_decomposition() {
        for min in [FilterMode::Point, FilterMode::Linear] {
            for mag in [FilterMode::Point, FilterMode::Linear] {
                for mip in [FilterMode::Point, FilterMode::Linear] {
                    let filter = Filter::from_modes(min, mag, mip);
                    assert_eq!((filter.min(), filter.mag(), filter.mip()), (min, mag, mip));
                }
            }
        }
    }

    #[test]
    fn test_default_sampler() {
        let desc = SamplerDescriptor::default();
        assert_eq!(desc.filter, Filter::MinMagLinearMipPoint);
        assert_eq!(desc.max_lod, 256.0);
        assert_eq!(desc.address_w, AddressMode::Wrap);
    }
}
