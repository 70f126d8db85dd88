//! Resource creation for the wgpu backend.

use std::sync::OnceLock;

use crate::error::GraphicsError;
use crate::resources::{
    DescriptorSlot, DescriptorTableDescriptor, DescriptorTableKind, PipelineStateDescriptor,
    RootParameter, RootSignatureDescriptor,
};
use crate::types::{
    BufferDescriptor, MemoryLocation, SamplerDescriptor, TextureDescriptor, align_up,
};

use super::super::{
    GpuBuffer, GpuDescriptorTable, GpuPipelineState, GpuRootSignature, GpuSampler, GpuTexture,
};
use super::conversion::{
    convert_address_mode, convert_blend_state, convert_buffer_usage, convert_compare_function,
    convert_cull_mode, convert_filter_mode, convert_front_face, convert_mipmap_filter_mode,
    convert_texture_format, convert_texture_usage, convert_topology, convert_vertex_format,
};
use super::{LayoutKey, WgpuBackend};

/// Bindings used for empty descriptor table slots.
pub(super) struct DefaultBindings {
    #[allow(dead_code)]
    texture: wgpu::Texture,
    pub(super) view: wgpu::TextureView,
    pub(super) sampler: wgpu::Sampler,
}

impl DefaultBindings {
    /// A 1x1 opaque white texture and a linear wrapping sampler.
    pub(super) fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let size = wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Default White Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &[255; 4],
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: Some(1),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Default Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        Self {
            texture,
            view,
            sampler,
        }
    }
}

impl WgpuBackend {
    /// Create a buffer resource.
    ///
    /// Sizes are padded to the copy granularity. Readback buffers are
    /// mappable; upload buffers are written through the queue.
    pub(super) fn create_buffer_resource(
        &self,
        descriptor: &BufferDescriptor,
    ) -> Result<GpuBuffer, GraphicsError> {
        let mut usage = convert_buffer_usage(descriptor.usage);
        match descriptor.memory {
            MemoryLocation::Upload => usage |= wgpu::BufferUsages::COPY_DST,
            MemoryLocation::Readback => {
                usage |= wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST
            }
            MemoryLocation::GpuOnly => {}
        }
        let size = align_up(descriptor.size.max(1), wgpu::COPY_BUFFER_ALIGNMENT);

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: descriptor.label.as_deref(),
            size,
            usage,
            mapped_at_creation: false,
        });

        Ok(GpuBuffer::Wgpu {
            buffer,
            constant_group: OnceLock::new(),
        })
    }

    /// Create a texture resource.
    pub(super) fn create_texture_resource(
        &self,
        descriptor: &TextureDescriptor,
    ) -> Result<GpuTexture, GraphicsError> {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: descriptor.label.as_deref(),
            size: wgpu::Extent3d {
                width: descriptor.width,
                height: descriptor.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: convert_texture_format(descriptor.format),
            usage: convert_texture_usage(descriptor.usage),
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(GpuTexture::Wgpu { texture, view })
    }

    /// Create a sampler resource.
    pub(super) fn create_sampler_resource(
        &self,
        descriptor: &SamplerDescriptor,
    ) -> Result<GpuSampler, GraphicsError> {
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: descriptor.label.as_deref(),
            address_mode_u: convert_address_mode(descriptor.address_u),
            address_mode_v: convert_address_mode(descriptor.address_v),
            address_mode_w: convert_address_mode(descriptor.address_w),
            mag_filter: convert_filter_mode(descriptor.filter.mag()),
            min_filter: convert_filter_mode(descriptor.filter.min()),
            mipmap_filter: convert_mipmap_filter_mode(descriptor.filter.mip()),
            lod_min_clamp: descriptor.min_lod,
            lod_max_clamp: descriptor.max_lod,
            compare: None,
            anisotropy_clamp: 1,
            border_color: None,
        });

        Ok(GpuSampler::Wgpu(sampler))
    }

    /// Bind group layout for one root parameter, shared by every root
    /// signature with the same parameter shape.
    pub(super) fn layout_for(&self, key: LayoutKey) -> wgpu::BindGroupLayout {
        let mut layouts = self.layouts.lock();
        layouts
            .entry(key)
            .or_insert_with(|| {
                let entries: Vec<wgpu::BindGroupLayoutEntry> = match key {
                    LayoutKey::ConstantBuffer => vec![wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    }],
                    LayoutKey::Table(kind, count) => (0..count)
                        .map(|binding| wgpu::BindGroupLayoutEntry {
                            binding,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: match kind {
                                DescriptorTableKind::ShaderResource => wgpu::BindingType::Texture {
                                    sample_type: wgpu::TextureSampleType::Float {
                                        filterable: true,
                                    },
                                    view_dimension: wgpu::TextureViewDimension::D2,
                                    multisampled: false,
                                },
                                DescriptorTableKind::Sampler => wgpu::BindingType::Sampler(
                                    wgpu::SamplerBindingType::Filtering,
                                ),
                            },
                            count: None,
                        })
                        .collect(),
                };
                self.device
                    .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some(match key {
                            LayoutKey::ConstantBuffer => "Constant Buffer Layout",
                            LayoutKey::Table(DescriptorTableKind::ShaderResource, _) => {
                                "Texture Table Layout"
                            }
                            LayoutKey::Table(DescriptorTableKind::Sampler, _) => {
                                "Sampler Table Layout"
                            }
                        }),
                        entries: &entries,
                    })
            })
            .clone()
    }

    /// Bind group for `buffer` bound as a root constant buffer.
    pub(super) fn constant_buffer_group<'a>(
        &self,
        buffer: &'a crate::resources::Buffer,
    ) -> Result<&'a wgpu::BindGroup, GraphicsError> {
        let GpuBuffer::Wgpu {
            buffer: handle,
            constant_group,
        } = buffer.handle()
        else {
            return Err(GraphicsError::Internal(format!(
                "buffer '{}' has no wgpu handle",
                buffer.debug_name()
            )));
        };
        Ok(constant_group.get_or_init(|| {
            let layout = self.layout_for(LayoutKey::ConstantBuffer);
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: buffer.label(),
                layout: &layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: handle.as_entire_binding(),
                }],
            })
        }))
    }

    /// Create the pipeline layout behind a root signature.
    pub(super) fn create_root_signature_layout(
        &self,
        descriptor: &RootSignatureDescriptor,
    ) -> Result<GpuRootSignature, GraphicsError> {
        let bind_group_layouts: Vec<wgpu::BindGroupLayout> = descriptor
            .parameters
            .iter()
            .map(|parameter| {
                self.layout_for(match *parameter {
                    RootParameter::ConstantBufferView { .. } => LayoutKey::ConstantBuffer,
                    RootParameter::DescriptorTable { kind, count } => LayoutKey::Table(kind, count),
                })
            })
            .collect();

        let refs: Vec<&wgpu::BindGroupLayout> = bind_group_layouts.iter().collect();
        let layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: descriptor.label.as_deref(),
                bind_group_layouts: &refs,
                immediate_size: 0,
            });

        Ok(GpuRootSignature::Wgpu {
            layout,
            bind_group_layouts,
        })
    }

    /// Create the bind group behind a descriptor table. Empty slots bind
    /// the default texture or sampler.
    pub(super) fn create_table_bind_group(
        &self,
        descriptor: &DescriptorTableDescriptor,
    ) -> Result<GpuDescriptorTable, GraphicsError> {
        let layout = self.layout_for(LayoutKey::Table(
            descriptor.kind,
            descriptor.slots.len() as u32,
        ));

        let mut entries = Vec::with_capacity(descriptor.slots.len());
        for (binding, slot) in descriptor.slots.iter().enumerate() {
            let resource = match (descriptor.kind, slot) {
                (DescriptorTableKind::ShaderResource, DescriptorSlot::Texture(texture)) => {
                    let GpuTexture::Wgpu { view, .. } = texture.handle() else {
                        return Err(GraphicsError::Internal(format!(
                            "texture '{}' has no wgpu handle",
                            texture.debug_name()
                        )));
                    };
                    wgpu::BindingResource::TextureView(view)
                }
                (DescriptorTableKind::Sampler, DescriptorSlot::Sampler(sampler)) => {
                    let GpuSampler::Wgpu(handle) = sampler.handle() else {
                        return Err(GraphicsError::Internal(
                            "sampler has no wgpu handle".to_string(),
                        ));
                    };
                    wgpu::BindingResource::Sampler(handle)
                }
                (DescriptorTableKind::ShaderResource, _) => {
                    wgpu::BindingResource::TextureView(&self.defaults.view)
                }
                (DescriptorTableKind::Sampler, _) => {
                    wgpu::BindingResource::Sampler(&self.defaults.sampler)
                }
            };
            entries.push(wgpu::BindGroupEntry {
                binding: binding as u32,
                resource,
            });
        }

        let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: descriptor.label.as_deref(),
            layout: &layout,
            entries: &entries,
        });
        Ok(GpuDescriptorTable::Wgpu(group))
    }

    /// Compile a render pipeline from WGSL vertex and pixel shaders.
    pub(super) fn create_render_pipeline(
        &self,
        descriptor: &PipelineStateDescriptor,
    ) -> Result<GpuPipelineState, GraphicsError> {
        let GpuRootSignature::Wgpu { layout, .. } = descriptor.root_signature.handle() else {
            return Err(GraphicsError::Internal(
                "root signature has no wgpu handle".to_string(),
            ));
        };

        let module = |bytecode: &crate::shader::ShaderBytecode| {
            let source = std::str::from_utf8(&bytecode.code).map_err(|e| {
                GraphicsError::ResourceCreationFailed(format!("Invalid UTF-8 in shader: {e}"))
            })?;
            Ok::<_, GraphicsError>(self.device.create_shader_module(
                wgpu::ShaderModuleDescriptor {
                    label: descriptor.label.as_deref(),
                    source: wgpu::ShaderSource::Wgsl(source.into()),
                },
            ))
        };
        let vertex_module = module(&descriptor.vertex_shader)?;
        let fragment_module = module(&descriptor.pixel_shader)?;

        // One buffer layout per slot, one attribute per buffer.
        let slot_count = descriptor
            .input_layout
            .iter()
            .map(|element| element.slot + 1)
            .max()
            .unwrap_or(0) as usize;
        let mut attributes: Vec<Vec<wgpu::VertexAttribute>> = vec![Vec::new(); slot_count];
        let mut strides = vec![0u64; slot_count];
        for element in &descriptor.input_layout {
            let slot = element.slot as usize;
            attributes[slot].push(wgpu::VertexAttribute {
                format: convert_vertex_format(element.format)?,
                offset: 0,
                shader_location: element.location,
            });
            strides[slot] = u64::from(element.stride);
        }
        let vertex_buffer_layouts: Vec<wgpu::VertexBufferLayout> = attributes
            .iter()
            .zip(&strides)
            .map(|(attributes, stride)| wgpu::VertexBufferLayout {
                array_stride: *stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes,
            })
            .collect();

        let blend = if self.capabilities.can_blend(descriptor.color_format) {
            convert_blend_state(&descriptor.blend)
        } else {
            if descriptor.blend.enabled {
                log::warn!(
                    "{:?} render targets cannot blend; pipeline {:?} renders opaque",
                    descriptor.color_format,
                    descriptor.label
                );
            }
            None
        };
        let color_targets = [Some(wgpu::ColorTargetState {
            format: convert_texture_format(descriptor.color_format),
            blend,
            write_mask: wgpu::ColorWrites::ALL,
        })];

        let depth = descriptor.depth_stencil;
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: descriptor.label.as_deref(),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module: &vertex_module,
                    entry_point: Some(&descriptor.vertex_shader.entry_point),
                    buffers: &vertex_buffer_layouts,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &fragment_module,
                    entry_point: Some(&descriptor.pixel_shader.entry_point),
                    targets: &color_targets,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: convert_topology(descriptor.topology),
                    strip_index_format: None,
                    front_face: convert_front_face(descriptor.rasterizer.front_counter_clockwise),
                    cull_mode: convert_cull_mode(descriptor.rasterizer.cull_mode),
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: convert_texture_format(descriptor.depth_format),
                    depth_write_enabled: depth.depth_write,
                    depth_compare: if depth.depth_test {
                        convert_compare_function(depth.compare)
                    } else {
                        wgpu::CompareFunction::Always
                    },
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            });

        Ok(GpuPipelineState::Wgpu(pipeline))
    }
}
