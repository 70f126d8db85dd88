//! GPU state derived from document materials.
//!
//! Each material gets:
//!
//! - a blend state (opaque or alpha blending; `MASK` falls back to opaque)
//!   and a rasterizer state (double-sided disables culling);
//! - a 256-byte constant buffer of [`MaterialConstants`];
//! - a shader resource table and a parallel sampler table of
//!   [`MATERIAL_TABLE_SIZE`] slots, base color in slot 0 and
//!   metallic-roughness in slot 1.
//!
//! glTF sampler filters are mapped onto the nearest supported
//! min/mag/mip combination by [`filter_from_gl`].

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use renderlab_core::scene::{
    AlphaMode, DocumentMaterial, DocumentSampler, SceneDocument, TextureRef, gl,
};

use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::renderer::{AssetError, Diagnostics};
use crate::resources::{
    Buffer, DescriptorSlot, DescriptorTable, DescriptorTableDescriptor, DescriptorTableKind,
    Sampler,
};
use crate::types::{
    AddressMode, BlendState, BufferDescriptor, BufferUsage, CONSTANT_BUFFER_ALIGNMENT, CullMode,
    Filter, RasterizerState, SamplerDescriptor, align_up,
};

use super::resource_table::ResourceTable;

/// Number of slots in each material descriptor table.
pub const MATERIAL_TABLE_SIZE: usize = 5;
/// Table slot of the base color texture and sampler.
pub const BASE_COLOR_SLOT: usize = 0;
/// Table slot of the metallic-roughness texture and sampler.
pub const METALLIC_ROUGHNESS_SLOT: usize = 1;
/// (texture, sampler) pair of an absent texture.
pub const ABSENT_SLOTS: [i32; 2] = [-1, -1];

/// Material factors as laid out in the shader's `Material` block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialConstants {
    pub base_color_factor: [f32; 4],
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    /// (texture slot, sampler slot), or [`ABSENT_SLOTS`].
    pub base_color_slots: [i32; 2],
    pub metallic_roughness_slots: [i32; 2],
    pub _padding: [f32; 2],
}

static_assertions::const_assert_eq!(std::mem::size_of::<MaterialConstants>(), 48);

/// Size of a material constant buffer.
pub const MATERIAL_BUFFER_SIZE: u64 = align_up(
    std::mem::size_of::<MaterialConstants>() as u64,
    CONSTANT_BUFFER_ALIGNMENT,
);

/// Blend state for a glTF alpha mode. `MASK` is reported and rendered
/// opaque.
pub fn blend_state(alpha_mode: AlphaMode, diagnostics: &mut Diagnostics) -> BlendState {
    match alpha_mode {
        AlphaMode::Opaque => BlendState::opaque(),
        AlphaMode::Blend => BlendState::alpha_blending(),
        AlphaMode::Mask => {
            diagnostics.unsupported("alpha mode MASK, rendering opaque");
            BlendState::opaque()
        }
    }
}

/// Rasterizer state for a material. glTF front faces wind counter-clockwise.
pub fn rasterizer_state(double_sided: bool) -> RasterizerState {
    RasterizerState {
        cull_mode: if double_sided {
            CullMode::None
        } else {
            CullMode::Back
        },
        front_counter_clockwise: true,
    }
}

/// Map glTF min/mag filters to a sampler filter.
pub fn filter_from_gl(min_filter: Option<u32>, mag_filter: Option<u32>) -> Filter {
    let mag_nearest = mag_filter == Some(gl::NEAREST);
    match min_filter {
        Some(gl::NEAREST) if mag_nearest => Filter::MinMagMipPoint,
        Some(gl::NEAREST) => Filter::MinMagMipLinear,
        Some(gl::LINEAR) if mag_nearest => Filter::MinLinearMagMipPoint,
        Some(gl::LINEAR) => Filter::MinMagLinearMipPoint,
        Some(gl::NEAREST_MIPMAP_NEAREST) if mag_nearest => Filter::MinMagMipPoint,
        Some(gl::NEAREST_MIPMAP_NEAREST) => Filter::MinPointMagLinearMipPoint,
        Some(gl::LINEAR_MIPMAP_NEAREST) if mag_nearest => Filter::MinLinearMagMipPoint,
        Some(gl::LINEAR_MIPMAP_NEAREST) => Filter::MinMagLinearMipPoint,
        Some(gl::NEAREST_MIPMAP_LINEAR) if mag_nearest => Filter::MinMagPointMipLinear,
        Some(gl::NEAREST_MIPMAP_LINEAR) => Filter::MinPointMagMipLinear,
        Some(gl::LINEAR_MIPMAP_LINEAR) if mag_nearest => Filter::MinLinearMagPointMipLinear,
        Some(gl::LINEAR_MIPMAP_LINEAR) => Filter::MinMagMipLinear,
        _ => Filter::MinMagLinearMipPoint,
    }
}

/// Map a glTF wrap mode to an address mode, if it is a known one.
pub fn address_mode_from_gl(wrap: u32) -> Option<AddressMode> {
    match wrap {
        gl::REPEAT => Some(AddressMode::Wrap),
        gl::CLAMP_TO_EDGE => Some(AddressMode::Clamp),
        gl::MIRRORED_REPEAT => Some(AddressMode::Mirror),
        _ => None,
    }
}

/// Sampler descriptor for a document sampler. Unknown wrap modes are
/// reported and wrap.
pub fn sampler_descriptor(sampler: &DocumentSampler, diagnostics: &mut Diagnostics) -> SamplerDescriptor {
    let mut address = |wrap: u32, axis: &str| {
        address_mode_from_gl(wrap).unwrap_or_else(|| {
            diagnostics.unsupported(format!("wrap mode {wrap} on {axis}, using REPEAT"));
            AddressMode::Wrap
        })
    };
    let address_u = address(sampler.wrap_s, "S");
    let address_v = address(sampler.wrap_t, "T");
    SamplerDescriptor {
        filter: filter_from_gl(sampler.min_filter, sampler.mag_filter),
        address_u,
        address_v,
        address_w: AddressMode::Wrap,
        min_lod: 0.0,
        max_lod: SamplerDescriptor::MAX_LOD,
        ..SamplerDescriptor::default()
    }
}

/// GPU state of one material.
#[derive(Debug, Clone)]
pub struct GpuMaterial {
    pub name: Option<String>,
    pub blend: BlendState,
    pub rasterizer: RasterizerState,
    pub constants: MaterialConstants,
    pub constant_buffer: Arc<Buffer>,
    pub texture_table: Arc<DescriptorTable>,
    pub sampler_table: Arc<DescriptorTable>,
}

/// Materials indexed like the document. A material that failed to build
/// has no entry.
#[derive(Debug, Default)]
pub struct MaterialBank {
    materials: Vec<Option<GpuMaterial>>,
    samplers: Vec<Arc<Sampler>>,
}

impl MaterialBank {
    /// Build every material of `document` against the uploaded `table`.
    ///
    /// Failures are recorded in `diagnostics` and leave the material out.
    pub fn build(
        device: &GraphicsDevice,
        document: &SceneDocument,
        table: &ResourceTable,
        diagnostics: &mut Diagnostics,
    ) -> Result<Self, GraphicsError> {
        let mut samplers = Vec::with_capacity(document.samplers.len() + 1);
        samplers.push(device.create_sampler(
            &SamplerDescriptor::default().with_label("default sampler"),
        )?);
        for (index, sampler) in document.samplers.iter().enumerate() {
            let descriptor =
                sampler_descriptor(sampler, diagnostics).with_label(format!("sampler {index}"));
            samplers.push(device.create_sampler(&descriptor)?);
        }

        let mut bank = Self {
            materials: Vec::with_capacity(document.materials.len()),
            samplers,
        };
        for (index, material) in document.materials.iter().enumerate() {
            match bank.build_material(device, document, table, index, material, diagnostics) {
                Ok(gpu) => bank.materials.push(Some(gpu)),
                Err(source) => {
                    diagnostics.skipped(&AssetError::Material {
                        material: index,
                        source,
                    });
                    bank.materials.push(None);
                }
            }
        }

        log::debug!(
            "MaterialBank: {} of {} materials built, {} samplers",
            bank.materials.iter().flatten().count(),
            bank.materials.len(),
            bank.samplers.len()
        );
        Ok(bank)
    }

    /// The material at `index`, if it exists and built.
    pub fn get(&self, index: usize) -> Option<&GpuMaterial> {
        self.materials.get(index).and_then(Option::as_ref)
    }

    /// Number of materials, built or not.
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    /// Sampler used for textures without a document sampler.
    pub fn default_sampler(&self) -> Option<&Arc<Sampler>> {
        self.samplers.first()
    }

    fn document_sampler(&self, index: Option<usize>) -> Option<&Arc<Sampler>> {
        match index {
            Some(i) => self.samplers.get(i + 1),
            None => self.default_sampler(),
        }
    }

    fn build_material(
        &self,
        device: &GraphicsDevice,
        document: &SceneDocument,
        table: &ResourceTable,
        index: usize,
        material: &DocumentMaterial,
        diagnostics: &mut Diagnostics,
    ) -> Result<GpuMaterial, GraphicsError> {
        let label = match &material.name {
            Some(name) => format!("material {index} ({name})"),
            None => format!("material {index}"),
        };
        let blend = blend_state(material.alpha_mode, diagnostics);
        let rasterizer = rasterizer_state(material.double_sided);

        let mut textures = DescriptorTableDescriptor::new(
            DescriptorTableKind::ShaderResource,
            MATERIAL_TABLE_SIZE,
        )
        .with_label(format!("{label} textures"));
        let mut samplers =
            DescriptorTableDescriptor::new(DescriptorTableKind::Sampler, MATERIAL_TABLE_SIZE)
                .with_label(format!("{label} samplers"));

        let mut slots = |reference: Option<&TextureRef>, slot: usize, what: &str| -> [i32; 2] {
            let Some(reference) = reference else {
                return ABSENT_SLOTS;
            };
            if reference.tex_coord != 0 {
                diagnostics.unsupported(format!(
                    "{label}: {what} uses TEXCOORD_{}, sampling with TEXCOORD_0",
                    reference.tex_coord
                ));
            }
            let resolved = document.textures.get(reference.texture).and_then(|texture| {
                Some((
                    table.texture(texture.image)?,
                    self.document_sampler(texture.sampler)?,
                ))
            });
            let Some((texture, sampler)) = resolved else {
                diagnostics.unsupported(format!(
                    "{label}: {what} texture {} is missing, leaving it unsampled",
                    reference.texture
                ));
                return ABSENT_SLOTS;
            };
            textures.slots[slot] = DescriptorSlot::Texture(Arc::clone(texture));
            samplers.slots[slot] = DescriptorSlot::Sampler(Arc::clone(sampler));
            [slot as i32, slot as i32]
        };
        let base_color_slots = slots(material.base_color_texture.as_ref(), BASE_COLOR_SLOT, "base color");
        let metallic_roughness_slots = slots(
            material.metallic_roughness_texture.as_ref(),
            METALLIC_ROUGHNESS_SLOT,
            "metallic-roughness",
        );

        let constants = MaterialConstants {
            base_color_factor: material.base_color_factor,
            metallic_factor: material.metallic_factor,
            roughness_factor: material.roughness_factor,
            base_color_slots,
            metallic_roughness_slots,
            _padding: [0.0; 2],
        };
        let constant_buffer = device.create_buffer(
            &BufferDescriptor::upload(MATERIAL_BUFFER_SIZE, BufferUsage::UNIFORM)
                .with_label(format!("{label} constants")),
        )?;
        device.write_buffer(&constant_buffer, 0, bytemuck::bytes_of(&constants))?;

        let texture_table = device.create_descriptor_table(&textures)?;
        let sampler_table = device.create_descriptor_table(&samplers)?;

        log::trace!(
            "MaterialBank: built {label} ({}, cull {:?})",
            material.alpha_mode,
            rasterizer.cull_mode
        );

        Ok(GpuMaterial {
            name: material.name.clone(),
            blend,
            rasterizer,
            constants,
            constant_buffer,
            texture_table,
            sampler_table,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::renderer::DiagnosticKind;
    use crate::scene::upload::UploadBatch;
    use renderlab_core::scene::{DocumentImage, DocumentTexture};
    use rstest::rstest;

    #[rstest]
    #[case(Some(gl::NEAREST), Some(gl::NEAREST), Filter::MinMagMipPoint)]
    #[case(Some(gl::NEAREST), Some(gl::LINEAR), Filter::MinMagMipLinear)]
    #[case(Some(gl::LINEAR), Some(gl::NEAREST), Filter::MinLinearMagMipPoint)]
    #[case(Some(gl::LINEAR), None, Filter::MinMagLinearMipPoint)]
    #[case(Some(gl::NEAREST_MIPMAP_NEAREST), Some(gl::NEAREST), Filter::MinMagMipPoint)]
    #[case(
        Some(gl::NEAREST_MIPMAP_NEAREST),
        Some(gl::LINEAR),
        Filter::MinPointMagLinearMipPoint
    )]
    #[case(Some(gl::LINEAR_MIPMAP_NEAREST), Some(gl::NEAREST), Filter::MinLinearMagMipPoint)]
    #[case(Some(gl::LINEAR_MIPMAP_NEAREST), Some(gl::LINEAR), Filter::MinMagLinearMipPoint)]
    #[case(Some(gl::NEAREST_MIPMAP_LINEAR), Some(gl::NEAREST), Filter::MinMagPointMipLinear)]
    #[case(Some(gl::NEAREST_MIPMAP_LINEAR), Some(gl::LINEAR), Filter::MinPointMagMipLinear)]
    #[case(
        Some(gl::LINEAR_MIPMAP_LINEAR),
        Some(gl::NEAREST),
        Filter::MinLinearMagPointMipLinear
    )]
    #[case(Some(gl::LINEAR_MIPMAP_LINEAR), Some(gl::LINEAR), Filter::MinMagMipLinear)]
    #[case(None, Some(gl::NEAREST), Filter::MinMagLinearMipPoint)]
    #[case(Some(1234), Some(gl::LINEAR), Filter::MinMagLinearMipPoint)]
    fn test_filter_table(
        #[case] min: Option<u32>,
        #[case] mag: Option<u32>,
        #[case] expected: Filter,
    ) {
        assert_eq!(filter_from_gl(min, mag), expected);
    }

    #[rstest]
    #[case(gl::REPEAT, Some(AddressMode::Wrap))]
    #[case(gl::CLAMP_TO_EDGE, Some(AddressMode::Clamp))]
    #[case(gl::MIRRORED_REPEAT, Some(AddressMode::Mirror))]
    #[case(0, None)]
    fn test_wrap_modes(#[case] wrap: u32, #[case] expected: Option<AddressMode>) {
        assert_eq!(address_mode_from_gl(wrap), expected);
    }

    #[test]
    fn test_unknown_wrap_mode_is_reported() {
        let mut diagnostics = Diagnostics::new();
        let desc = sampler_descriptor(
            &DocumentSampler {
                mag_filter: None,
                min_filter: None,
                wrap_s: 42,
                wrap_t: gl::CLAMP_TO_EDGE,
            },
            &mut diagnostics,
        );
        assert_eq!(desc.address_u, AddressMode::Wrap);
        assert_eq!(desc.address_v, AddressMode::Clamp);
        assert_eq!(desc.address_w, AddressMode::Wrap);
        assert_eq!(desc.max_lod, 256.0);
        assert_eq!(diagnostics.count(DiagnosticKind::UnsupportedFeature), 1);
    }

    #[test]
    fn test_mask_falls_back_to_opaque() {
        let mut diagnostics = Diagnostics::new();
        assert_eq!(blend_state(AlphaMode::Mask, &mut diagnostics), BlendState::opaque());
        assert_eq!(diagnostics.len(), 1);
        assert!(blend_state(AlphaMode::Blend, &mut diagnostics).enabled);
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_double_sided_disables_culling() {
        assert_eq!(rasterizer_state(true).cull_mode, CullMode::None);
        assert_eq!(rasterizer_state(false).cull_mode, CullMode::Back);
    }

    #[test]
    fn test_constant_buffer_is_rounded_to_256() {
        assert_eq!(MATERIAL_BUFFER_SIZE, 256);
    }

    #[test]
    fn test_material_slots() {
        let backend = Arc::new(DummyBackend::new());
        let device = GraphicsDevice::new(Arc::clone(&backend) as Arc<dyn crate::backend::GpuBackend>);

        let mut document = SceneDocument::new();
        let image = document.add_image(DocumentImage::rgba8(1, 1, vec![255; 4]));
        document.textures.push(DocumentTexture {
            image,
            sampler: None,
        });
        document.add_material(DocumentMaterial {
            base_color_texture: Some(TextureRef {
                texture: 0,
                tex_coord: 0,
            }),
            ..DocumentMaterial::default()
        });
        document.add_material(DocumentMaterial {
            metallic_roughness_texture: Some(TextureRef {
                texture: 7,
                tex_coord: 0,
            }),
            double_sided: true,
            ..DocumentMaterial::default()
        });

        let mut batch = UploadBatch::new(&device, "test").unwrap();
        let table = ResourceTable::stage(&document, &mut batch).unwrap();
        batch.submit().unwrap().finish().unwrap();

        let mut diagnostics = Diagnostics::new();
        let bank = MaterialBank::build(&device, &document, &table, &mut diagnostics).unwrap();
        assert_eq!(bank.len(), 2);

        let first = bank.get(0).unwrap();
        assert_eq!(first.constants.base_color_slots, [0, 0]);
        assert_eq!(first.constants.metallic_roughness_slots, ABSENT_SLOTS);
        assert_eq!(first.texture_table.len(), MATERIAL_TABLE_SIZE);
        assert!(matches!(
            first.texture_table.slots()[BASE_COLOR_SLOT],
            DescriptorSlot::Texture(_)
        ));
        assert!(first.sampler_table.slots()[METALLIC_ROUGHNESS_SLOT].is_empty());

        let second = bank.get(1).unwrap();
        assert_eq!(second.constants.metallic_roughness_slots, ABSENT_SLOTS);
        assert_eq!(second.rasterizer.cull_mode, CullMode::None);
        assert_eq!(diagnostics.count(DiagnosticKind::UnsupportedFeature), 1);
        assert!(bank.get(2).is_none());
    }
}
