//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't talk to a GPU. It emulates the explicit API on the
//! CPU closely enough to test code written against it:
//!
//! - buffer and texture contents are stored, and copies and clears really
//!   move bytes, so uploads and readbacks can be verified;
//! - every submission is validated against the tracked resource states:
//!   barrier `before` states, copy source and destination states, draw
//!   bindings and render target states;
//! - writes are tracked per queue until the CPU observes the fence signal
//!   covering them, and touching such a resource from the other queue (or
//!   reading it on the CPU) is reported as a [`GraphicsError::Hazard`];
//! - draws are recorded instead of rasterized.
//!
//! In [deferred](DummyBackend::with_deferred_execution) mode, submitted
//! work only executes when a fence wait needs it, which makes missing waits
//! observable: a fence nobody waited on is never reached.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::command::{Command, IndexBufferView, QueueKind, VertexBufferView};
use crate::device::DeviceCapabilities;
use crate::error::GraphicsError;
use crate::resources::{
    Buffer, DescriptorSlot, DescriptorTable, DescriptorTableDescriptor, PipelineState,
    PipelineStateDescriptor, RootParameter, RootSignature, RootSignatureDescriptor, Texture,
};
use crate::sync::Fence;
use crate::types::{
    BufferDescriptor, Footprint, IndexFormat, MemoryLocation, PrimitiveTopology, ResourceState,
    SamplerDescriptor, TextureDescriptor, TextureFormat,
};

use super::{
    GpuBackend, GpuBuffer, GpuDescriptorTable, GpuPipelineState, GpuRootSignature, GpuSampler,
    GpuTexture, WindowTarget,
};

/// A draw accepted by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawRecord {
    pub queue: QueueKind,
    pub indexed: bool,
    /// Vertex count, or index count for indexed draws.
    pub count: u32,
    pub instances: u32,
    /// Id of the pipeline state bound for the draw.
    pub pipeline: u64,
    /// `(root parameter, buffer id)` of every bound constant buffer view.
    pub constant_buffers: Vec<(u32, u64)>,
}

impl DrawRecord {
    /// Id of the buffer bound to a constant-buffer root parameter.
    pub fn constant_buffer(&self, parameter: u32) -> Option<u64> {
        self.constant_buffers
            .iter()
            .find(|(p, _)| *p == parameter)
            .map(|(_, id)| *id)
    }
}

/// A state transition accepted by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierRecord {
    pub queue: QueueKind,
    pub resource: u64,
    pub before: ResourceState,
    pub after: ResourceState,
}

/// A completed CPU fence wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitRecord {
    pub fence: String,
    pub value: u64,
}

enum QueuedWork {
    Execute(Vec<Command>),
    Signal(Arc<Fence>, u64),
}

/// A GPU write the CPU has not observed yet.
#[derive(Debug, Clone, Copy)]
struct PendingWrite {
    queue: QueueKind,
    /// Fence id and value of the first signal after the write.
    signal: Option<(u64, u64)>,
}

#[derive(Default)]
struct DummyState {
    buffers: HashMap<u64, Vec<u8>>,
    textures: HashMap<u64, Vec<u8>>,
    states: HashMap<u64, ResourceState>,
    pending_writes: HashMap<u64, PendingWrite>,
    direct_work: VecDeque<QueuedWork>,
    copy_work: VecDeque<QueuedWork>,
    draws: Vec<DrawRecord>,
    barriers: Vec<BarrierRecord>,
    presents: Vec<u64>,
    waits: Vec<WaitRecord>,
}

impl DummyState {
    fn work(&mut self, queue: QueueKind) -> &mut VecDeque<QueuedWork> {
        match queue {
            QueueKind::Direct => &mut self.direct_work,
            QueueKind::Copy => &mut self.copy_work,
        }
    }

    fn hazard(&self, queue: QueueKind, id: u64, name: &str) -> Result<(), GraphicsError> {
        match self.pending_writes.get(&id) {
            Some(write) if write.queue != queue => Err(GraphicsError::Hazard(format!(
                "{queue} queue used '{name}' before the {} queue write to it was observed",
                write.queue
            ))),
            _ => Ok(()),
        }
    }

    /// Pop and run queued work on `queue` until `fence` reaches `value` or
    /// the queue is empty.
    fn drain(&mut self, queue: QueueKind, target: Option<(&Fence, u64)>) {
        while let Some(item) = self.work(queue).pop_front() {
            match item {
                QueuedWork::Execute(commands) => self.run_effects(&commands),
                QueuedWork::Signal(fence, value) => {
                    fence.advance_to(value);
                    if let Some((target, target_value)) = target
                        && target.id() == fence.id()
                        && value >= target_value
                    {
                        break;
                    }
                }
            }
        }
    }

    /// Apply the data effects of an accepted submission.
    fn run_effects(&mut self, commands: &[Command]) {
        for command in commands {
            match command {
                Command::CopyBufferRegion {
                    dst,
                    dst_offset,
                    src,
                    src_offset,
                    size,
                } => {
                    let (src_offset, dst_offset, size) =
                        (*src_offset as usize, *dst_offset as usize, *size as usize);
                    let Some(data) = self
                        .buffers
                        .get(&src.id())
                        .map(|b| b[src_offset..src_offset + size].to_vec())
                    else {
                        continue;
                    };
                    if let Some(target) = self.buffers.get_mut(&dst.id()) {
                        target[dst_offset..dst_offset + size].copy_from_slice(&data);
                    }
                }
                Command::CopyBufferToTexture {
                    dst,
                    src,
                    footprint,
                } => {
                    let Some(data) = self.buffers.get(&src.id()).cloned() else {
                        continue;
                    };
                    if let Some(texels) = self.textures.get_mut(&dst.id()) {
                        let row = footprint.row_size as usize;
                        for y in 0..footprint.height {
                            let start = y as usize * row;
                            texels[start..start + row]
                                .copy_from_slice(&data[footprint.row_range(y)]);
                        }
                    }
                }
                Command::CopyTextureToBuffer {
                    dst,
                    footprint,
                    src,
                } => {
                    let Some(texels) = self.textures.get(&src.id()).cloned() else {
                        continue;
                    };
                    if let Some(data) = self.buffers.get_mut(&dst.id()) {
                        let row = footprint.row_size as usize;
                        for y in 0..footprint.height {
                            let start = y as usize * row;
                            data[footprint.row_range(y)]
                                .copy_from_slice(&texels[start..start + row]);
                        }
                    }
                }
                Command::ClearRenderTarget { target, color } => {
                    if let Some(texels) = self.textures.get_mut(&target.id()) {
                        fill(texels, &encode_clear(target.format(), *color));
                    }
                }
                Command::ClearDepthStencil { target, depth } => {
                    if let Some(texels) = self.textures.get_mut(&target.id()) {
                        fill(texels, &depth.to_le_bytes());
                    }
                }
                _ => {}
            }
        }
    }
}

fn fill(texels: &mut [u8], texel: &[u8]) {
    for chunk in texels.chunks_exact_mut(texel.len()) {
        chunk.copy_from_slice(texel);
    }
}

/// Bytes of one texel cleared to `color`.
fn encode_clear(format: TextureFormat, color: [f32; 4]) -> Vec<u8> {
    let unorm = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    match format {
        TextureFormat::R8Unorm => vec![unorm(color[0])],
        TextureFormat::Rg8Unorm => vec![unorm(color[0]), unorm(color[1])],
        TextureFormat::Rgba8Unorm => color.iter().map(|&v| unorm(v)).collect(),
        TextureFormat::Bgra8Unorm => [color[2], color[1], color[0], color[3]]
            .iter()
            .map(|&v| unorm(v))
            .collect(),
        TextureFormat::Rgba32Float => color.iter().flat_map(|v| v.to_le_bytes()).collect(),
        TextureFormat::Depth32Float => color[0].to_le_bytes().to_vec(),
    }
}

#[derive(Clone)]
enum RootBinding {
    ConstantBuffer(Arc<Buffer>),
    Table(Arc<DescriptorTable>),
}

/// Pipeline bindings of one command list. They do not carry over between
/// lists.
#[derive(Default)]
struct Bindings {
    pipeline: Option<Arc<PipelineState>>,
    root_signature: Option<Arc<RootSignature>>,
    topology: Option<PrimitiveTopology>,
    vertex_buffers: BTreeMap<u32, VertexBufferView>,
    index_buffer: Option<IndexBufferView>,
    roots: BTreeMap<u32, RootBinding>,
    color: Option<Arc<Texture>>,
    depth: Option<Arc<Texture>>,
}

/// Validates one submission against the tracked state without touching
/// it. Accepted changes are committed all at once.
struct Validator<'a> {
    state: &'a DummyState,
    queue: QueueKind,
    overlay: HashMap<u64, ResourceState>,
    writes: Vec<u64>,
    barriers: Vec<BarrierRecord>,
    draws: Vec<DrawRecord>,
    bindings: Bindings,
}

impl<'a> Validator<'a> {
    fn new(state: &'a DummyState, queue: QueueKind) -> Self {
        Self {
            state,
            queue,
            overlay: HashMap::new(),
            writes: Vec::new(),
            barriers: Vec::new(),
            draws: Vec::new(),
            bindings: Bindings::default(),
        }
    }

    fn current(&self, id: u64) -> ResourceState {
        self.overlay
            .get(&id)
            .or_else(|| self.state.states.get(&id))
            .copied()
            .unwrap_or_default()
    }

    fn hazard(&self, id: u64, name: impl FnOnce() -> String) -> Result<(), GraphicsError> {
        if self.state.pending_writes.contains_key(&id) {
            self.state.hazard(self.queue, id, &name())
        } else {
            Ok(())
        }
    }

    fn expect_state(
        &self,
        id: u64,
        name: impl FnOnce() -> String,
        expected: ResourceState,
        allowed: impl FnOnce(ResourceState) -> bool,
    ) -> Result<(), GraphicsError> {
        let actual = self.current(id);
        if allowed(actual) {
            Ok(())
        } else {
            Err(GraphicsError::ResourceStateMismatch {
                resource: name(),
                expected,
                actual,
            })
        }
    }

    fn read_buffer_as(&self, buffer: &Buffer, usage: ResourceState) -> Result<(), GraphicsError> {
        self.hazard(buffer.id(), || buffer.debug_name())?;
        self.expect_state(buffer.id(), || buffer.debug_name(), usage, |s| {
            s.allows_read_as(usage)
        })
    }

    fn check_footprint(
        texture: &Texture,
        buffer: &Buffer,
        footprint: &Footprint,
    ) -> Result<(), GraphicsError> {
        if footprint.width != texture.width()
            || footprint.height != texture.height()
            || footprint.format != texture.format()
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "footprint {}x{} {:?} does not match texture '{}'",
                footprint.width,
                footprint.height,
                footprint.format,
                texture.debug_name()
            )));
        }
        if footprint.offset + footprint.total_size > buffer.size() {
            return Err(GraphicsError::InvalidParameter(format!(
                "footprint of '{}' exceeds buffer '{}'",
                texture.debug_name(),
                buffer.debug_name()
            )));
        }
        Ok(())
    }

    fn validate(&mut self, command: &Command) -> Result<(), GraphicsError> {
        match command {
            Command::ResourceBarrier(barriers) => {
                for barrier in barriers {
                    let id = barrier.resource.id();
                    self.hazard(id, || barrier.resource.debug_name())?;
                    let actual = self.current(id);
                    if actual != barrier.before {
                        return Err(GraphicsError::ResourceStateMismatch {
                            resource: barrier.resource.debug_name(),
                            expected: barrier.before,
                            actual,
                        });
                    }
                    self.overlay.insert(id, barrier.after);
                    self.barriers.push(BarrierRecord {
                        queue: self.queue,
                        resource: id,
                        before: barrier.before,
                        after: barrier.after,
                    });
                }
            }
            Command::CopyBufferRegion {
                dst,
                dst_offset,
                src,
                src_offset,
                size,
            } => {
                if src_offset + size > src.size() || dst_offset + size > dst.size() {
                    return Err(GraphicsError::InvalidParameter(format!(
                        "copy of {size} bytes from '{}' to '{}' is out of range",
                        src.debug_name(),
                        dst.debug_name()
                    )));
                }
                self.hazard(src.id(), || src.debug_name())?;
                self.hazard(dst.id(), || dst.debug_name())?;
                self.expect_state(
                    src.id(),
                    || src.debug_name(),
                    ResourceState::CopySource,
                    ResourceState::allows_copy_source,
                )?;
                self.expect_state(
                    dst.id(),
                    || dst.debug_name(),
                    ResourceState::CopyDest,
                    ResourceState::allows_copy_dest,
                )?;
                self.writes.push(dst.id());
            }
            Command::CopyBufferToTexture {
                dst,
                src,
                footprint,
            } => {
                Self::check_footprint(dst, src, footprint)?;
                self.hazard(src.id(), || src.debug_name())?;
                self.hazard(dst.id(), || dst.debug_name())?;
                self.expect_state(
                    src.id(),
                    || src.debug_name(),
                    ResourceState::CopySource,
                    ResourceState::allows_copy_source,
                )?;
                self.expect_state(
                    dst.id(),
                    || dst.debug_name(),
                    ResourceState::CopyDest,
                    ResourceState::allows_copy_dest,
                )?;
                self.writes.push(dst.id());
            }
            Command::CopyTextureToBuffer {
                dst,
                footprint,
                src,
            } => {
                Self::check_footprint(src, dst, footprint)?;
                self.hazard(src.id(), || src.debug_name())?;
                self.hazard(dst.id(), || dst.debug_name())?;
                self.expect_state(
                    src.id(),
                    || src.debug_name(),
                    ResourceState::CopySource,
                    ResourceState::allows_copy_source,
                )?;
                self.expect_state(
                    dst.id(),
                    || dst.debug_name(),
                    ResourceState::CopyDest,
                    ResourceState::allows_copy_dest,
                )?;
                self.writes.push(dst.id());
            }
            Command::SetViewport(_) | Command::SetScissorRect(_) => {}
            Command::SetRenderTargets { color, depth } => {
                self.bindings.color = color.clone();
                self.bindings.depth = depth.clone();
            }
            Command::ClearRenderTarget { target, .. } => {
                self.hazard(target.id(), || target.debug_name())?;
                self.expect_state(
                    target.id(),
                    || target.debug_name(),
                    ResourceState::RenderTarget,
                    |s| s == ResourceState::RenderTarget,
                )?;
                self.writes.push(target.id());
            }
            Command::ClearDepthStencil { target, .. } => {
                if !target.format().is_depth() {
                    return Err(GraphicsError::InvalidParameter(format!(
                        "depth clear of color texture '{}'",
                        target.debug_name()
                    )));
                }
                self.hazard(target.id(), || target.debug_name())?;
                self.expect_state(
                    target.id(),
                    || target.debug_name(),
                    ResourceState::DepthWrite,
                    |s| s == ResourceState::DepthWrite,
                )?;
                self.writes.push(target.id());
            }
            Command::SetPipelineState(pipeline) => {
                self.bindings.pipeline = Some(Arc::clone(pipeline));
            }
            Command::SetGraphicsRootSignature(signature) => {
                self.bindings.root_signature = Some(Arc::clone(signature));
                self.bindings.roots.clear();
            }
            Command::SetPrimitiveTopology(topology) => {
                self.bindings.topology = Some(*topology);
            }
            Command::SetVertexBuffers { start_slot, views } => {
                for (slot, view) in (*start_slot..).zip(views) {
                    self.bindings.vertex_buffers.insert(slot, view.clone());
                }
            }
            Command::SetIndexBuffer(view) => {
                self.bindings.index_buffer = view.clone();
            }
            Command::SetGraphicsRootConstantBufferView { parameter, buffer } => {
                match self.root_parameter(*parameter)? {
                    RootParameter::ConstantBufferView { .. } => {}
                    other => {
                        return Err(GraphicsError::InvalidCommandList(format!(
                            "root parameter {parameter} is {other:?}, not a constant buffer"
                        )));
                    }
                }
                self.bindings
                    .roots
                    .insert(*parameter, RootBinding::ConstantBuffer(Arc::clone(buffer)));
            }
            Command::SetGraphicsRootDescriptorTable { parameter, table } => {
                match self.root_parameter(*parameter)? {
                    RootParameter::DescriptorTable { kind, count }
                        if kind == table.kind() && table.len() >= count as usize => {}
                    other => {
                        return Err(GraphicsError::InvalidCommandList(format!(
                            "root parameter {parameter} ({other:?}) does not accept a {:?} table of {}",
                            table.kind(),
                            table.len()
                        )));
                    }
                }
                self.bindings
                    .roots
                    .insert(*parameter, RootBinding::Table(Arc::clone(table)));
            }
            Command::DrawInstanced {
                vertex_count,
                instance_count,
                start_vertex,
                ..
            } => {
                let pipeline = self.validate_draw_state()?;
                self.validate_vertex_range(&pipeline, *start_vertex, *vertex_count)?;
                self.draws.push(DrawRecord {
                    queue: self.queue,
                    indexed: false,
                    count: *vertex_count,
                    instances: *instance_count,
                    pipeline: pipeline.id(),
                    constant_buffers: self.bound_constant_buffers(),
                });
            }
            Command::DrawIndexedInstanced {
                index_count,
                instance_count,
                start_index,
                ..
            } => {
                let pipeline = self.validate_draw_state()?;
                self.validate_index_range(*start_index, *index_count)?;
                self.draws.push(DrawRecord {
                    queue: self.queue,
                    indexed: true,
                    count: *index_count,
                    instances: *instance_count,
                    pipeline: pipeline.id(),
                    constant_buffers: self.bound_constant_buffers(),
                });
            }
        }
        Ok(())
    }

    fn bound_constant_buffers(&self) -> Vec<(u32, u64)> {
        self.bindings
            .roots
            .iter()
            .filter_map(|(parameter, binding)| match binding {
                RootBinding::ConstantBuffer(buffer) => Some((*parameter, buffer.id())),
                RootBinding::Table(_) => None,
            })
            .collect()
    }

    fn root_parameter(&self, parameter: u32) -> Result<RootParameter, GraphicsError> {
        let signature = self.bindings.root_signature.as_ref().ok_or_else(|| {
            GraphicsError::InvalidCommandList("root argument set without a root signature".into())
        })?;
        signature.parameter(parameter).ok_or_else(|| {
            GraphicsError::InvalidCommandList(format!(
                "root signature has no parameter {parameter}"
            ))
        })
    }

    /// Checks shared by both draw kinds. Returns the bound pipeline.
    fn validate_draw_state(&mut self) -> Result<Arc<PipelineState>, GraphicsError> {
        let pipeline = self.bindings.pipeline.clone().ok_or_else(|| {
            GraphicsError::InvalidCommandList("draw without a pipeline state".into())
        })?;
        let signature = self.bindings.root_signature.clone().ok_or_else(|| {
            GraphicsError::InvalidCommandList("draw without a root signature".into())
        })?;
        if signature.id() != pipeline.root_signature().id() {
            return Err(GraphicsError::InvalidCommandList(
                "bound root signature differs from the pipeline's".into(),
            ));
        }
        match self.bindings.topology {
            Some(topology) if topology.class() == pipeline.topology_class() => {}
            Some(topology) => {
                return Err(GraphicsError::InvalidCommandList(format!(
                    "topology {topology:?} does not match pipeline class {:?}",
                    pipeline.topology_class()
                )));
            }
            None => {
                return Err(GraphicsError::InvalidCommandList(
                    "draw without a primitive topology".into(),
                ));
            }
        }

        let desc = pipeline.descriptor();
        let color = self.bindings.color.clone().ok_or_else(|| {
            GraphicsError::InvalidCommandList("draw without a render target".into())
        })?;
        if color.format() != desc.color_format {
            return Err(GraphicsError::InvalidCommandList(format!(
                "render target '{}' is {:?}, pipeline expects {:?}",
                color.debug_name(),
                color.format(),
                desc.color_format
            )));
        }
        self.hazard(color.id(), || color.debug_name())?;
        self.expect_state(
            color.id(),
            || color.debug_name(),
            ResourceState::RenderTarget,
            |s| s == ResourceState::RenderTarget,
        )?;
        self.writes.push(color.id());

        if let Some(depth) = self.bindings.depth.clone() {
            if depth.format() != desc.depth_format {
                return Err(GraphicsError::InvalidCommandList(format!(
                    "depth target '{}' is {:?}, pipeline expects {:?}",
                    depth.debug_name(),
                    depth.format(),
                    desc.depth_format
                )));
            }
            self.hazard(depth.id(), || depth.debug_name())?;
            self.expect_state(
                depth.id(),
                || depth.debug_name(),
                ResourceState::DepthWrite,
                |s| s == ResourceState::DepthWrite,
            )?;
            self.writes.push(depth.id());
        }

        for element in pipeline.input_layout() {
            let view = self.bindings.vertex_buffers.get(&element.slot).ok_or_else(|| {
                GraphicsError::InvalidCommandList(format!(
                    "no vertex buffer bound for {} (slot {})",
                    element.semantic, element.slot
                ))
            })?;
            if view.offset + view.size > view.buffer.size() {
                return Err(GraphicsError::InvalidParameter(format!(
                    "vertex view of '{}' exceeds the buffer",
                    view.buffer.debug_name()
                )));
            }
            self.read_buffer_as(&view.buffer, ResourceState::VertexAndConstantBuffer)?;
        }

        for (index, parameter) in signature.parameters().iter().enumerate() {
            let index = index as u32;
            match (parameter, self.bindings.roots.get(&index)) {
                (RootParameter::ConstantBufferView { .. }, Some(RootBinding::ConstantBuffer(b))) => {
                    self.read_buffer_as(b, ResourceState::VertexAndConstantBuffer)?;
                }
                (RootParameter::DescriptorTable { .. }, Some(RootBinding::Table(table))) => {
                    for slot in table.slots() {
                        if let DescriptorSlot::Texture(texture) = slot {
                            self.hazard(texture.id(), || texture.debug_name())?;
                            self.expect_state(
                                texture.id(),
                                || texture.debug_name(),
                                ResourceState::PixelShaderResource,
                                |s| s.allows_read_as(ResourceState::PixelShaderResource),
                            )?;
                        }
                    }
                }
                _ => {
                    return Err(GraphicsError::InvalidCommandList(format!(
                        "root parameter {index} is not bound"
                    )));
                }
            }
        }
        Ok(pipeline)
    }

    fn validate_vertex_range(
        &self,
        pipeline: &PipelineState,
        start: u32,
        count: u32,
    ) -> Result<(), GraphicsError> {
        if count == 0 {
            return Ok(());
        }
        for element in pipeline.input_layout() {
            let Some(view) = self.bindings.vertex_buffers.get(&element.slot) else {
                continue;
            };
            let last = u64::from(start + count - 1);
            let end = last * u64::from(view.stride) + u64::from(element.format.size());
            if end > view.size {
                return Err(GraphicsError::InvalidParameter(format!(
                    "draw reads {end} bytes of {} from a {}-byte view",
                    element.semantic, view.size
                )));
            }
        }
        Ok(())
    }

    fn validate_index_range(&self, start: u32, count: u32) -> Result<(), GraphicsError> {
        let view = self.bindings.index_buffer.as_ref().ok_or_else(|| {
            GraphicsError::InvalidCommandList("indexed draw without an index buffer".into())
        })?;
        if view.format == IndexFormat::Uint8 {
            return Err(GraphicsError::FeatureNotSupported(
                "8-bit index buffers".into(),
            ));
        }
        if view.offset + view.size > view.buffer.size() {
            return Err(GraphicsError::InvalidParameter(format!(
                "index view of '{}' exceeds the buffer",
                view.buffer.debug_name()
            )));
        }
        let end = u64::from(start + count) * view.format.size();
        if end > view.size {
            return Err(GraphicsError::InvalidParameter(format!(
                "draw reads {end} index bytes from a {}-byte view",
                view.size
            )));
        }
        self.read_buffer_as(&view.buffer, ResourceState::IndexBuffer)
    }
}

/// Dummy GPU backend.
pub struct DummyBackend {
    deferred: bool,
    capabilities: DeviceCapabilities,
    state: Mutex<DummyState>,
}

impl DummyBackend {
    /// Create a new dummy backend that executes work at submission.
    pub fn new() -> Self {
        Self {
            deferred: false,
            capabilities: DeviceCapabilities::default(),
            state: Mutex::new(DummyState::default()),
        }
    }

    /// Report `capabilities` instead of the defaults.
    pub fn with_capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Hold submitted work until a fence wait needs it.
    pub fn with_deferred_execution(mut self) -> Self {
        self.deferred = true;
        self
    }

    pub fn is_deferred(&self) -> bool {
        self.deferred
    }

    /// Draws accepted so far.
    pub fn draws(&self) -> Vec<DrawRecord> {
        self.state.lock().draws.clone()
    }

    /// Barriers accepted so far.
    pub fn barriers(&self) -> Vec<BarrierRecord> {
        self.state.lock().barriers.clone()
    }

    /// Ids of presented textures, in order.
    pub fn presents(&self) -> Vec<u64> {
        self.state.lock().presents.clone()
    }

    /// CPU fence waits, in order.
    pub fn waits(&self) -> Vec<WaitRecord> {
        self.state.lock().waits.clone()
    }

    /// Forget recorded draws, barriers, presents and waits.
    pub fn clear_records(&self) {
        let mut state = self.state.lock();
        state.draws.clear();
        state.barriers.clear();
        state.presents.clear();
        state.waits.clear();
    }

    /// Tracked state of a resource.
    pub fn resource_state(&self, id: u64) -> Option<ResourceState> {
        self.state.lock().states.get(&id).copied()
    }

    /// Current contents of a buffer, bypassing heap and hazard checks.
    pub fn buffer_contents(&self, id: u64) -> Option<Vec<u8>> {
        self.state.lock().buffers.get(&id).cloned()
    }

    /// Current texels of a texture, tightly packed row by row.
    pub fn texture_contents(&self, id: u64) -> Option<Vec<u8>> {
        self.state.lock().textures.get(&id).cloned()
    }

    /// Number of submissions and signals waiting to execute on `queue`.
    pub fn queued_work(&self, queue: QueueKind) -> usize {
        self.state.lock().work(queue).len()
    }

    /// Run all queued work, as if the GPU caught up. Nothing counts as
    /// observed by the CPU until it waits.
    pub fn flush(&self) {
        let mut state = self.state.lock();
        state.drain(QueueKind::Copy, None);
        state.drain(QueueKind::Direct, None);
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DummyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DummyBackend")
            .field("deferred", &self.deferred)
            .finish_non_exhaustive()
    }
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn create_buffer(
        &self,
        id: u64,
        descriptor: &BufferDescriptor,
    ) -> Result<GpuBuffer, GraphicsError> {
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            descriptor.label,
            descriptor.size
        );
        let mut state = self.state.lock();
        state.buffers.insert(id, vec![0; descriptor.size as usize]);
        state.states.insert(id, descriptor.initial_state);
        Ok(GpuBuffer::Dummy)
    }

    fn create_texture(
        &self,
        id: u64,
        descriptor: &TextureDescriptor,
    ) -> Result<GpuTexture, GraphicsError> {
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{})",
            descriptor.label,
            descriptor.width,
            descriptor.height
        );
        let size = descriptor.width as usize
            * descriptor.height as usize
            * descriptor.format.block_size() as usize;
        let mut state = self.state.lock();
        state.textures.insert(id, vec![0; size]);
        state.states.insert(id, descriptor.initial_state);
        Ok(GpuTexture::Dummy)
    }

    fn create_sampler(
        &self,
        _id: u64,
        descriptor: &SamplerDescriptor,
    ) -> Result<GpuSampler, GraphicsError> {
        log::trace!("DummyBackend: creating sampler {:?}", descriptor.label);
        Ok(GpuSampler::Dummy)
    }

    fn create_root_signature(
        &self,
        _id: u64,
        descriptor: &RootSignatureDescriptor,
    ) -> Result<GpuRootSignature, GraphicsError> {
        log::trace!(
            "DummyBackend: creating root signature {:?} ({} parameters)",
            descriptor.label,
            descriptor.parameters.len()
        );
        Ok(GpuRootSignature::Dummy)
    }

    fn create_pipeline_state(
        &self,
        _id: u64,
        descriptor: &PipelineStateDescriptor,
    ) -> Result<GpuPipelineState, GraphicsError> {
        log::trace!("DummyBackend: creating pipeline {:?}", descriptor.label);
        Ok(GpuPipelineState::Dummy)
    }

    fn create_descriptor_table(
        &self,
        _id: u64,
        descriptor: &DescriptorTableDescriptor,
    ) -> Result<GpuDescriptorTable, GraphicsError> {
        log::trace!(
            "DummyBackend: creating {:?} table {:?}",
            descriptor.kind,
            descriptor.label
        );
        Ok(GpuDescriptorTable::Dummy)
    }

    fn write_buffer(&self, buffer: &Buffer, offset: u64, data: &[u8]) -> Result<(), GraphicsError> {
        if buffer.memory() != MemoryLocation::Upload {
            return Err(GraphicsError::InvalidParameter(format!(
                "CPU write to '{}' outside the upload heap",
                buffer.debug_name()
            )));
        }
        let mut state = self.state.lock();
        let storage = state.buffers.get_mut(&buffer.id()).ok_or_else(|| {
            GraphicsError::Internal(format!("unknown buffer '{}'", buffer.debug_name()))
        })?;
        let start = offset as usize;
        storage[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&self, buffer: &Buffer, offset: u64, size: u64) -> Result<Vec<u8>, GraphicsError> {
        if buffer.memory() != MemoryLocation::Readback {
            return Err(GraphicsError::InvalidParameter(format!(
                "CPU read of '{}' outside the readback heap",
                buffer.debug_name()
            )));
        }
        let state = self.state.lock();
        if let Some(write) = state.pending_writes.get(&buffer.id()) {
            return Err(GraphicsError::Hazard(format!(
                "CPU read of '{}' before the {} queue write to it was observed",
                buffer.debug_name(),
                write.queue
            )));
        }
        let storage = state.buffers.get(&buffer.id()).ok_or_else(|| {
            GraphicsError::Internal(format!("unknown buffer '{}'", buffer.debug_name()))
        })?;
        Ok(storage[offset as usize..(offset + size) as usize].to_vec())
    }

    fn execute(&self, queue: QueueKind, commands: &[Command]) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();

        let mut validator = Validator::new(&state, queue);
        for command in commands {
            validator.validate(command)?;
        }
        let Validator {
            overlay,
            writes,
            barriers,
            draws,
            ..
        } = validator;

        state.states.extend(overlay);
        for id in writes {
            state.pending_writes.insert(
                id,
                PendingWrite {
                    queue,
                    signal: None,
                },
            );
        }
        state.barriers.extend(barriers);
        state.draws.extend(draws);

        if self.deferred {
            state.work(queue).push_back(QueuedWork::Execute(commands.to_vec()));
        } else {
            state.run_effects(commands);
        }
        Ok(())
    }

    fn signal(&self, queue: QueueKind, fence: &Arc<Fence>, value: u64) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        for write in state.pending_writes.values_mut() {
            if write.queue == queue && write.signal.is_none() {
                write.signal = Some((fence.id(), value));
            }
        }
        if self.deferred {
            state
                .work(queue)
                .push_back(QueuedWork::Signal(Arc::clone(fence), value));
        } else {
            fence.advance_to(value);
        }
        Ok(())
    }

    fn wait_for_fence_value(&self, fence: &Fence, value: u64) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        if !fence.is_reached(value) {
            let queue = [QueueKind::Direct, QueueKind::Copy].into_iter().find(|&q| {
                state.work(q).iter().any(|item| {
                    matches!(item, QueuedWork::Signal(f, v) if f.id() == fence.id() && *v >= value)
                })
            });
            let Some(queue) = queue else {
                return Err(GraphicsError::FenceNeverSignaled {
                    fence: fence.label().to_string(),
                    value,
                });
            };
            state.drain(queue, Some((fence, value)));
        }

        state.pending_writes.retain(|_, write| {
            !matches!(write.signal, Some((id, v)) if id == fence.id() && v <= value)
        });
        state.waits.push(WaitRecord {
            fence: fence.label().to_string(),
            value,
        });
        Ok(())
    }

    fn configure_surface(
        &self,
        _window: Arc<dyn WindowTarget>,
        width: u32,
        height: u32,
    ) -> Result<TextureFormat, GraphicsError> {
        log::debug!("DummyBackend: surface configured at {}x{}", width, height);
        Ok(TextureFormat::Rgba8Unorm)
    }

    fn present(&self, texture: &Texture) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        let actual = state
            .states
            .get(&texture.id())
            .copied()
            .unwrap_or_default();
        if actual != ResourceState::PRESENT {
            return Err(GraphicsError::ResourceStateMismatch {
                resource: texture.debug_name(),
                expected: ResourceState::PRESENT,
                actual,
            });
        }
        state.presents.push(texture.id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BufferUsage, TextureUsage};

    fn buffer(backend: &DummyBackend, id: u64, desc: BufferDescriptor) -> Arc<Buffer> {
        let handle = backend.create_buffer(id, &desc).unwrap();
        Arc::new(Buffer::new(id, desc, handle))
    }

    fn texture(backend: &DummyBackend, id: u64, desc: TextureDescriptor) -> Arc<Texture> {
        let handle = backend.create_texture(id, &desc).unwrap();
        Arc::new(Texture::new(id, desc, handle))
    }

    #[test]
    fn test_encode_clear() {
        let color = [0.0, 0.2, 0.4, 1.0];
        assert_eq!(encode_clear(TextureFormat::Rgba8Unorm, color), vec![0, 51, 102, 255]);
        assert_eq!(encode_clear(TextureFormat::Bgra8Unorm, color), vec![102, 51, 0, 255]);
        assert_eq!(encode_clear(TextureFormat::Rgba32Float, color).len(), 16);
    }

    #[test]
    fn test_copy_moves_bytes() {
        let backend = DummyBackend::new();
        let staging = buffer(&backend, 1, BufferDescriptor::upload(8, BufferUsage::COPY_SRC));
        let readback = buffer(&backend, 2, BufferDescriptor::readback(8));
        backend.write_buffer(&staging, 0, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();

        let copy = Command::CopyBufferRegion {
            dst: Arc::clone(&readback),
            dst_offset: 0,
            src: Arc::clone(&staging),
            src_offset: 0,
            size: 8,
        };
        backend.execute(QueueKind::Copy, &[copy]).unwrap();

        // Unobserved write.
        assert!(matches!(
            backend.read_buffer(&readback, 0, 8),
            Err(GraphicsError::Hazard(_))
        ));

        let fence = Arc::new(Fence::new(3, "copy"));
        backend.signal(QueueKind::Copy, &fence, 1).unwrap();
        backend.wait_for_fence_value(&fence, 1).unwrap();
        assert_eq!(backend.read_buffer(&readback, 0, 8).unwrap(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_barrier_before_state_is_checked() {
        let backend = DummyBackend::new();
        let target = texture(
            &backend,
            1,
            TextureDescriptor::new_2d(4, 4, TextureFormat::Rgba8Unorm, TextureUsage::RENDER_ATTACHMENT),
        );
        let barrier = Command::ResourceBarrier(vec![crate::command::ResourceBarrier::transition(
            &target,
            ResourceState::RenderTarget,
            ResourceState::Common,
        )]);
        let err = backend.execute(QueueKind::Direct, &[barrier]).unwrap_err();
        assert!(matches!(
            err,
            GraphicsError::ResourceStateMismatch {
                expected: ResourceState::RenderTarget,
                actual: ResourceState::Common,
                ..
            }
        ));
        // Rejected submissions leave tracked state alone.
        assert_eq!(backend.resource_state(1), Some(ResourceState::Common));
    }

    #[test]
    fn test_deferred_fence_is_only_reached_by_waiting() {
        let backend = DummyBackend::new().with_deferred_execution();
        let fence = Arc::new(Fence::new(1, "direct"));
        backend.signal(QueueKind::Direct, &fence, 1).unwrap();
        assert!(!fence.is_reached(1));
        assert_eq!(backend.queued_work(QueueKind::Direct), 1);

        assert_eq!(
            backend.wait_for_fence_value(&fence, 2),
            Err(GraphicsError::FenceNeverSignaled {
                fence: "direct".into(),
                value: 2,
            })
        );
        backend.wait_for_fence_value(&fence, 1).unwrap();
        assert!(fence.is_reached(1));
        assert_eq!(backend.waits().len(), 1);
    }
}
