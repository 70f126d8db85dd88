//! Command list encoding for the wgpu backend.
//!
//! wgpu records draws inside render passes with fixed attachments, while a
//! command list sets render targets, clears and draws freely. Encoding
//! splits the list into segments:
//!
//! - a render pass starts at the first draw after the targets changed and
//!   ends at the next target change, clear, or transfer;
//! - clears recorded before a pass become its load operations; clears
//!   nobody draws to afterwards get a pass of their own;
//! - copies are encoded between passes, in list order.
//!
//! Every draw re-applies the full binding state, so no state leaks between
//! passes.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::command::{Command, IndexBufferView, QueueKind, VertexBufferView};
use crate::error::GraphicsError;
use crate::resources::{Buffer, DescriptorTable, PipelineState, RootSignature, Texture};
use crate::types::{Footprint, PrimitiveTopology, ScissorRect, Viewport, align_up};

use super::super::{GpuBuffer, GpuDescriptorTable, GpuPipelineState, GpuTexture};
use super::WgpuBackend;
use super::conversion::{convert_color, convert_index_format};

#[derive(Clone)]
enum RootBinding {
    ConstantBuffer(Arc<Buffer>),
    Table(Arc<DescriptorTable>),
}

#[derive(Clone, Copy)]
enum DrawKind {
    Vertices {
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    },
    Indexed {
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    },
}

/// Everything one draw needs, captured at record time.
struct DrawCall {
    pipeline: Arc<PipelineState>,
    roots: Vec<RootBinding>,
    vertex_buffers: Vec<(u32, VertexBufferView)>,
    index_buffer: Option<IndexBufferView>,
    viewport: Option<Viewport>,
    scissor: Option<ScissorRect>,
    kind: DrawKind,
}

struct RenderSegment {
    color: Option<Arc<Texture>>,
    depth: Option<Arc<Texture>>,
    clear_color: Option<[f32; 4]>,
    clear_depth: Option<f32>,
    draws: Vec<DrawCall>,
}

enum Segment {
    Render(RenderSegment),
    Transfer(Command),
}

#[derive(Default)]
struct BindingState {
    pipeline: Option<Arc<PipelineState>>,
    root_signature: Option<Arc<RootSignature>>,
    topology: Option<PrimitiveTopology>,
    vertex_buffers: BTreeMap<u32, VertexBufferView>,
    index_buffer: Option<IndexBufferView>,
    roots: BTreeMap<u32, RootBinding>,
    color: Option<Arc<Texture>>,
    depth: Option<Arc<Texture>>,
    viewport: Option<Viewport>,
    scissor: Option<ScissorRect>,
}

impl BindingState {
    fn capture(&self, kind: DrawKind) -> Result<DrawCall, GraphicsError> {
        let pipeline = self.pipeline.clone().ok_or_else(|| {
            GraphicsError::InvalidCommandList("draw without a pipeline state".into())
        })?;
        let signature = self.root_signature.as_ref().ok_or_else(|| {
            GraphicsError::InvalidCommandList("draw without a root signature".into())
        })?;
        if signature.id() != pipeline.root_signature().id() {
            return Err(GraphicsError::InvalidCommandList(
                "bound root signature differs from the pipeline's".into(),
            ));
        }
        // wgpu bakes the exact topology into the pipeline.
        if self.topology != Some(pipeline.descriptor().topology) {
            return Err(GraphicsError::InvalidCommandList(format!(
                "topology {:?} does not match pipeline topology {:?}",
                self.topology,
                pipeline.descriptor().topology
            )));
        }

        let roots = (0..signature.parameters().len() as u32)
            .map(|index| {
                self.roots.get(&index).cloned().ok_or_else(|| {
                    GraphicsError::InvalidCommandList(format!(
                        "root parameter {index} is not bound"
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DrawCall {
            pipeline,
            roots,
            vertex_buffers: self
                .vertex_buffers
                .iter()
                .map(|(slot, view)| (*slot, view.clone()))
                .collect(),
            index_buffer: self.index_buffer.clone(),
            viewport: self.viewport,
            scissor: self.scissor,
            kind,
        })
    }
}

fn wgpu_texture(texture: &Texture) -> Result<(&wgpu::Texture, &wgpu::TextureView), GraphicsError> {
    match texture.handle() {
        GpuTexture::Wgpu { texture, view } => Ok((texture, view)),
        GpuTexture::Dummy => Err(GraphicsError::Internal(format!(
            "texture '{}' has no wgpu handle",
            texture.debug_name()
        ))),
    }
}

fn wgpu_buffer(buffer: &Buffer) -> Result<&wgpu::Buffer, GraphicsError> {
    match buffer.handle() {
        GpuBuffer::Wgpu { buffer, .. } => Ok(buffer),
        GpuBuffer::Dummy => Err(GraphicsError::Internal(format!(
            "buffer '{}' has no wgpu handle",
            buffer.debug_name()
        ))),
    }
}

/// Split a command list into render and transfer segments.
fn segment(commands: &[Command]) -> Result<Vec<Segment>, GraphicsError> {
    let mut segments = Vec::new();
    let mut state = BindingState::default();
    let mut current: Option<RenderSegment> = None;
    // Clears not yet folded into a pass, keyed by texture id.
    let mut clears: BTreeMap<u64, (Arc<Texture>, ClearValue)> = BTreeMap::new();

    fn flush_clears(
        segments: &mut Vec<Segment>,
        clears: &mut BTreeMap<u64, (Arc<Texture>, ClearValue)>,
    ) {
        for (_, (texture, value)) in std::mem::take(clears) {
            let (color, depth, clear_color, clear_depth) = match value {
                ClearValue::Color(c) => (Some(texture), None, Some(c), None),
                ClearValue::Depth(d) => (None, Some(texture), None, Some(d)),
            };
            segments.push(Segment::Render(RenderSegment {
                color,
                depth,
                clear_color,
                clear_depth,
                draws: Vec::new(),
            }));
        }
    }

    for command in commands {
        match command {
            Command::ResourceBarrier(_) => {}
            Command::CopyBufferRegion { .. }
            | Command::CopyBufferToTexture { .. }
            | Command::CopyTextureToBuffer { .. } => {
                segments.extend(current.take().map(Segment::Render));
                flush_clears(&mut segments, &mut clears);
                segments.push(Segment::Transfer(command.clone()));
            }
            Command::SetViewport(viewport) => state.viewport = Some(*viewport),
            Command::SetScissorRect(rect) => state.scissor = Some(*rect),
            Command::SetRenderTargets { color, depth } => {
                segments.extend(current.take().map(Segment::Render));
                state.color = color.clone();
                state.depth = depth.clone();
            }
            Command::ClearRenderTarget { target, color } => {
                segments.extend(current.take().map(Segment::Render));
                clears.insert(target.id(), (Arc::clone(target), ClearValue::Color(*color)));
            }
            Command::ClearDepthStencil { target, depth } => {
                segments.extend(current.take().map(Segment::Render));
                clears.insert(target.id(), (Arc::clone(target), ClearValue::Depth(*depth)));
            }
            Command::SetPipelineState(pipeline) => state.pipeline = Some(Arc::clone(pipeline)),
            Command::SetGraphicsRootSignature(signature) => {
                state.root_signature = Some(Arc::clone(signature));
                state.roots.clear();
            }
            Command::SetPrimitiveTopology(topology) => state.topology = Some(*topology),
            Command::SetVertexBuffers { start_slot, views } => {
                for (slot, view) in (*start_slot..).zip(views) {
                    state.vertex_buffers.insert(slot, view.clone());
                }
            }
            Command::SetIndexBuffer(view) => state.index_buffer = view.clone(),
            Command::SetGraphicsRootConstantBufferView { parameter, buffer } => {
                state
                    .roots
                    .insert(*parameter, RootBinding::ConstantBuffer(Arc::clone(buffer)));
            }
            Command::SetGraphicsRootDescriptorTable { parameter, table } => {
                state
                    .roots
                    .insert(*parameter, RootBinding::Table(Arc::clone(table)));
            }
            Command::DrawInstanced {
                vertex_count,
                instance_count,
                start_vertex,
                start_instance,
            } => {
                let draw = state.capture(DrawKind::Vertices {
                    vertex_count: *vertex_count,
                    instance_count: *instance_count,
                    start_vertex: *start_vertex,
                    start_instance: *start_instance,
                })?;
                begin_segment(&mut current, &state, &mut clears).draws.push(draw);
            }
            Command::DrawIndexedInstanced {
                index_count,
                instance_count,
                start_index,
                base_vertex,
                start_instance,
            } => {
                let draw = state.capture(DrawKind::Indexed {
                    index_count: *index_count,
                    instance_count: *instance_count,
                    start_index: *start_index,
                    base_vertex: *base_vertex,
                    start_instance: *start_instance,
                })?;
                begin_segment(&mut current, &state, &mut clears).draws.push(draw);
            }
        }
    }
    segments.extend(current.take().map(Segment::Render));
    flush_clears(&mut segments, &mut clears);
    Ok(segments)
}

#[derive(Clone, Copy)]
enum ClearValue {
    Color([f32; 4]),
    Depth(f32),
}

/// The open render segment, started from the bound targets if needed.
fn begin_segment<'a>(
    current: &'a mut Option<RenderSegment>,
    state: &BindingState,
    clears: &mut BTreeMap<u64, (Arc<Texture>, ClearValue)>,
) -> &'a mut RenderSegment {
    current.get_or_insert_with(|| {
        let mut take_clear = |texture: &Option<Arc<Texture>>| {
            texture
                .as_ref()
                .and_then(|texture| clears.remove(&texture.id()))
                .map(|(_, value)| value)
        };
        let clear_color = match take_clear(&state.color) {
            Some(ClearValue::Color(color)) => Some(color),
            _ => None,
        };
        let clear_depth = match take_clear(&state.depth) {
            Some(ClearValue::Depth(depth)) => Some(depth),
            _ => None,
        };
        RenderSegment {
            color: state.color.clone(),
            depth: state.depth.clone(),
            clear_color,
            clear_depth,
            draws: Vec::new(),
        }
    })
}

fn texel_copy_layout(footprint: &Footprint) -> wgpu::TexelCopyBufferLayout {
    wgpu::TexelCopyBufferLayout {
        offset: footprint.offset,
        bytes_per_row: Some(footprint.row_pitch as u32),
        rows_per_image: Some(footprint.height),
    }
}

fn texture_extent(footprint: &Footprint) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: footprint.width,
        height: footprint.height,
        depth_or_array_layers: 1,
    }
}

impl WgpuBackend {
    /// Encode one closed command list into a wgpu command buffer.
    pub(super) fn encode(
        &self,
        queue: QueueKind,
        commands: &[Command],
    ) -> Result<wgpu::CommandBuffer, GraphicsError> {
        let segments = segment(commands)?;
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(match queue {
                    QueueKind::Direct => "Direct List Encoder",
                    QueueKind::Copy => "Copy List Encoder",
                }),
            });

        for segment in &segments {
            match segment {
                Segment::Transfer(command) => self.encode_transfer(&mut encoder, command)?,
                Segment::Render(render) => self.encode_render(&mut encoder, render)?,
            }
        }
        Ok(encoder.finish())
    }

    fn encode_transfer(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        command: &Command,
    ) -> Result<(), GraphicsError> {
        match command {
            Command::CopyBufferRegion {
                dst,
                dst_offset,
                src,
                src_offset,
                size,
            } => {
                if src_offset % wgpu::COPY_BUFFER_ALIGNMENT != 0
                    || dst_offset % wgpu::COPY_BUFFER_ALIGNMENT != 0
                {
                    return Err(GraphicsError::InvalidParameter(format!(
                        "copy from '{}' to '{}' at unaligned offsets",
                        src.debug_name(),
                        dst.debug_name()
                    )));
                }
                // Buffers are padded, so rounding the size up stays in range.
                encoder.copy_buffer_to_buffer(
                    wgpu_buffer(src)?,
                    *src_offset,
                    wgpu_buffer(dst)?,
                    *dst_offset,
                    align_up(*size, wgpu::COPY_BUFFER_ALIGNMENT),
                );
            }
            Command::CopyBufferToTexture {
                dst,
                src,
                footprint,
            } => {
                let (texture, _) = wgpu_texture(dst)?;
                encoder.copy_buffer_to_texture(
                    wgpu::TexelCopyBufferInfo {
                        buffer: wgpu_buffer(src)?,
                        layout: texel_copy_layout(footprint),
                    },
                    wgpu::TexelCopyTextureInfo {
                        texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    texture_extent(footprint),
                );
            }
            Command::CopyTextureToBuffer {
                dst,
                footprint,
                src,
            } => {
                let (texture, _) = wgpu_texture(src)?;
                encoder.copy_texture_to_buffer(
                    wgpu::TexelCopyTextureInfo {
                        texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    wgpu::TexelCopyBufferInfo {
                        buffer: wgpu_buffer(dst)?,
                        layout: texel_copy_layout(footprint),
                    },
                    texture_extent(footprint),
                );
            }
            other => {
                return Err(GraphicsError::Internal(format!(
                    "{} is not a transfer",
                    other.name()
                )));
            }
        }
        Ok(())
    }

    fn encode_render(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        segment: &RenderSegment,
    ) -> Result<(), GraphicsError> {
        let color_attachment = match &segment.color {
            Some(color) => {
                let (_, view) = wgpu_texture(color)?;
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: segment
                            .clear_color
                            .map_or(wgpu::LoadOp::Load, |c| wgpu::LoadOp::Clear(convert_color(c))),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })
            }
            None => None,
        };
        let depth_stencil_attachment = match &segment.depth {
            Some(depth) => {
                let (_, view) = wgpu_texture(depth)?;
                Some(wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: segment
                            .clear_depth
                            .map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                })
            }
            None => None,
        };

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> =
            color_attachment.into_iter().map(Some).collect();
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Command List Pass"),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        for draw in &segment.draws {
            self.encode_draw(&mut pass, draw)?;
        }
        Ok(())
    }

    fn encode_draw(&self, pass: &mut wgpu::RenderPass<'_>, draw: &DrawCall) -> Result<(), GraphicsError> {
        let GpuPipelineState::Wgpu(pipeline) = draw.pipeline.handle() else {
            return Err(GraphicsError::Internal(
                "pipeline state has no wgpu handle".to_string(),
            ));
        };
        pass.set_pipeline(pipeline);

        if let Some(viewport) = draw.viewport {
            pass.set_viewport(
                viewport.x,
                viewport.y,
                viewport.width,
                viewport.height,
                viewport.min_depth,
                viewport.max_depth,
            );
        }
        if let Some(rect) = draw.scissor {
            pass.set_scissor_rect(rect.left, rect.top, rect.width(), rect.height());
        }

        for (index, root) in draw.roots.iter().enumerate() {
            let group = match root {
                RootBinding::ConstantBuffer(buffer) => self.constant_buffer_group(buffer)?,
                RootBinding::Table(table) => match table.handle() {
                    GpuDescriptorTable::Wgpu(group) => group,
                    GpuDescriptorTable::Dummy => {
                        return Err(GraphicsError::Internal(
                            "descriptor table has no wgpu handle".to_string(),
                        ));
                    }
                },
            };
            pass.set_bind_group(index as u32, group, &[]);
        }

        for (slot, view) in &draw.vertex_buffers {
            let buffer = wgpu_buffer(&view.buffer)?;
            pass.set_vertex_buffer(*slot, buffer.slice(view.offset..view.offset + view.size));
        }

        match draw.kind {
            DrawKind::Vertices {
                vertex_count,
                instance_count,
                start_vertex,
                start_instance,
            } => {
                pass.draw(
                    start_vertex..start_vertex + vertex_count,
                    start_instance..start_instance + instance_count,
                );
            }
            DrawKind::Indexed {
                index_count,
                instance_count,
                start_index,
                base_vertex,
                start_instance,
            } => {
                let view = draw.index_buffer.as_ref().ok_or_else(|| {
                    GraphicsError::InvalidCommandList(
                        "indexed draw without an index buffer".into(),
                    )
                })?;
                let buffer = wgpu_buffer(&view.buffer)?;
                pass.set_index_buffer(
                    buffer.slice(view.offset..view.offset + view.size),
                    convert_index_format(view.format)?,
                );
                pass.draw_indexed(
                    start_index..start_index + index_count,
                    base_vertex,
                    start_instance..start_instance + instance_count,
                );
            }
        }
        Ok(())
    }
}
