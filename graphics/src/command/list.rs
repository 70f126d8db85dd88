//! Command lists.

use std::sync::Arc;

use crate::error::GraphicsError;
use crate::resources::{Buffer, DescriptorTable, PipelineState, RootSignature, Texture};
use crate::types::{Footprint, PrimitiveTopology, ResourceState, ScissorRect, Viewport};

use super::{
    Command, CommandAllocator, IndexBufferView, QueueKind, ResourceBarrier, ResourceRef,
    VertexBufferView,
};

/// A list of recorded commands.
///
/// A list is created open. Recording methods never fail on their own;
/// misuse (recording into a closed list, recording a graphics command on a
/// copy list) is remembered and reported by [`close`](Self::close), so
/// long recording sequences stay free of `?` noise.
///
/// # Example
///
/// ```ignore
/// let allocator = device.create_command_allocator(QueueKind::Direct, "frame0");
/// let mut list = device.create_command_list(QueueKind::Direct, &allocator, "frame")?;
/// list.transition(&color, ResourceState::Common, ResourceState::RenderTarget);
/// list.clear_render_target(&color, [0.0, 0.2, 0.4, 1.0]);
/// list.transition(&color, ResourceState::RenderTarget, ResourceState::Common);
/// list.close()?;
/// device.direct_queue().execute_command_lists(&[&list])?;
/// ```
pub struct CommandList {
    id: u64,
    kind: QueueKind,
    label: String,
    allocator: Arc<CommandAllocator>,
    commands: Vec<Command>,
    closed: bool,
    error: Option<GraphicsError>,
}

impl CommandList {
    pub(crate) fn new(
        id: u64,
        kind: QueueKind,
        allocator: &Arc<CommandAllocator>,
        label: impl Into<String>,
    ) -> Result<Self, GraphicsError> {
        let label = label.into();
        if allocator.kind() != kind {
            return Err(GraphicsError::InvalidCommandList(format!(
                "{kind} list '{label}' created with {} allocator '{}'",
                allocator.kind(),
                allocator.label()
            )));
        }
        Ok(Self {
            id,
            kind,
            label,
            allocator: Arc::clone(allocator),
            commands: Vec::new(),
            closed: false,
            error: None,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn allocator(&self) -> &Arc<CommandAllocator> {
        &self.allocator
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Commands recorded so far.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Number of draw commands recorded so far.
    pub fn draw_count(&self) -> usize {
        self.commands.iter().filter(|c| c.is_draw()).count()
    }

    /// Reopen a closed list on `allocator`, dropping previous commands.
    ///
    /// # Errors
    ///
    /// Returns an error if the list is still open or the allocator belongs
    /// to another queue kind.
    pub fn reset(&mut self, allocator: &Arc<CommandAllocator>) -> Result<(), GraphicsError> {
        if !self.closed {
            return Err(GraphicsError::InvalidCommandList(format!(
                "list '{}' reset while still open",
                self.label
            )));
        }
        if allocator.kind() != self.kind {
            return Err(GraphicsError::InvalidCommandList(format!(
                "{} list '{}' reset onto {} allocator '{}'",
                self.kind,
                self.label,
                allocator.kind(),
                allocator.label()
            )));
        }
        self.allocator = Arc::clone(allocator);
        self.commands.clear();
        self.closed = false;
        self.error = None;
        Ok(())
    }

    /// Finish recording.
    ///
    /// # Errors
    ///
    /// Returns the first recording error, if any. The list is closed either
    /// way and must be reset before it is reused.
    pub fn close(&mut self) -> Result<(), GraphicsError> {
        if self.closed {
            return Err(GraphicsError::InvalidCommandList(format!(
                "list '{}' closed twice",
                self.label
            )));
        }
        self.closed = true;
        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn record(&mut self, command: Command) {
        if self.error.is_some() {
            return;
        }
        if self.closed {
            self.error = Some(GraphicsError::InvalidCommandList(format!(
                "{} recorded into closed list '{}'",
                command.name(),
                self.label
            )));
            return;
        }
        if self.kind == QueueKind::Copy && !command.allowed_on_copy_queue() {
            self.error = Some(GraphicsError::InvalidCommandList(format!(
                "{} is not allowed on copy list '{}'",
                command.name(),
                self.label
            )));
            return;
        }
        self.commands.push(command);
    }

    pub fn resource_barrier(&mut self, barriers: &[ResourceBarrier]) {
        if barriers.is_empty() {
            return;
        }
        self.record(Command::ResourceBarrier(barriers.to_vec()));
    }

    /// Record a single transition barrier.
    pub fn transition(
        &mut self,
        resource: impl Into<ResourceRef>,
        before: ResourceState,
        after: ResourceState,
    ) {
        self.record(Command::ResourceBarrier(vec![ResourceBarrier::transition(
            resource, before, after,
        )]));
    }

    pub fn copy_buffer_region(
        &mut self,
        dst: &Arc<Buffer>,
        dst_offset: u64,
        src: &Arc<Buffer>,
        src_offset: u64,
        size: u64,
    ) {
        self.record(Command::CopyBufferRegion {
            dst: Arc::clone(dst),
            dst_offset,
            src: Arc::clone(src),
            src_offset,
            size,
        });
    }

    /// Copy the placed footprint in `src` into `dst`.
    pub fn copy_buffer_to_texture(
        &mut self,
        dst: &Arc<Texture>,
        src: &Arc<Buffer>,
        footprint: Footprint,
    ) {
        self.record(Command::CopyBufferToTexture {
            dst: Arc::clone(dst),
            src: Arc::clone(src),
            footprint,
        });
    }

    /// Copy `src` into the placed footprint in `dst`.
    pub fn copy_texture_to_buffer(
        &mut self,
        dst: &Arc<Buffer>,
        footprint: Footprint,
        src: &Arc<Texture>,
    ) {
        self.record(Command::CopyTextureToBuffer {
            dst: Arc::clone(dst),
            footprint,
            src: Arc::clone(src),
        });
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.record(Command::SetViewport(viewport));
    }

    pub fn set_scissor_rect(&mut self, rect: ScissorRect) {
        self.record(Command::SetScissorRect(rect));
    }

    pub fn set_render_targets(&mut self, color: Option<&Arc<Texture>>, depth: Option<&Arc<Texture>>) {
        self.record(Command::SetRenderTargets {
            color: color.cloned(),
            depth: depth.cloned(),
        });
    }

    pub fn clear_render_target(&mut self, target: &Arc<Texture>, color: [f32; 4]) {
        self.record(Command::ClearRenderTarget {
            target: Arc::clone(target),
            color,
        });
    }

    pub fn clear_depth_stencil(&mut self, target: &Arc<Texture>, depth: f32) {
        self.record(Command::ClearDepthStencil {
            target: Arc::clone(target),
            depth,
        });
    }

    pub fn set_pipeline_state(&mut self, pipeline: &Arc<PipelineState>) {
        self.record(Command::SetPipelineState(Arc::clone(pipeline)));
    }

    pub fn set_graphics_root_signature(&mut self, signature: &Arc<RootSignature>) {
        self.record(Command::SetGraphicsRootSignature(Arc::clone(signature)));
    }

    pub fn set_primitive_topology(&mut self, topology: PrimitiveTopology) {
        self.record(Command::SetPrimitiveTopology(topology));
    }

    /// Bind `views` to consecutive slots starting at `start_slot`.
    pub fn set_vertex_buffers(&mut self, start_slot: u32, views: &[VertexBufferView]) {
        self.record(Command::SetVertexBuffers {
            start_slot,
            views: views.to_vec(),
        });
    }

    pub fn set_index_buffer(&mut self, view: Option<&IndexBufferView>) {
        self.record(Command::SetIndexBuffer(view.cloned()));
    }

    pub fn set_graphics_root_constant_buffer_view(&mut self, parameter: u32, buffer: &Arc<Buffer>) {
        self.record(Command::SetGraphicsRootConstantBufferView {
            parameter,
            buffer: Arc::clone(buffer),
        });
    }

    pub fn set_graphics_root_descriptor_table(
        &mut self,
        parameter: u32,
        table: &Arc<DescriptorTable>,
    ) {
        self.record(Command::SetGraphicsRootDescriptorTable {
            parameter,
            table: Arc::clone(table),
        });
    }

    pub fn draw_instanced(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    ) {
        self.record(Command::DrawInstanced {
            vertex_count,
            instance_count,
            start_vertex,
            start_instance,
        });
    }

    pub fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    ) {
        self.record(Command::DrawIndexedInstanced {
            index_count,
            instance_count,
            start_index,
            base_vertex,
            start_instance,
        });
    }
}

impl std::fmt::Debug for CommandList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandList")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("commands", &self.commands.len())
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(kind: QueueKind) -> CommandList {
        let allocator = Arc::new(CommandAllocator::new(1, kind, "alloc"));
        CommandList::new(2, kind, &allocator, "list").unwrap()
    }

    #[test]
    fn test_copy_list_rejects_draws() {
        let mut list = list(QueueKind::Copy);
        list.draw_instanced(3, 1, 0, 0);
        let err = list.close().unwrap_err();
        assert!(matches!(err, GraphicsError::InvalidCommandList(msg) if msg.contains("DrawInstanced")));
        assert!(list.is_closed());
    }

    #[test]
    fn test_recording_into_closed_list_is_reported() {
        let mut list = list(QueueKind::Direct);
        list.close().unwrap();
        list.draw_instanced(3, 1, 0, 0);
        assert!(list.commands().is_empty());

        let allocator = Arc::clone(list.allocator());
        list.reset(&allocator).unwrap();
        list.draw_instanced(3, 1, 0, 0);
        assert_eq!(list.draw_count(), 1);
        list.close().unwrap();
    }

    #[test]
    fn test_reset_requires_closed_list_and_matching_allocator() {
        let mut list = list(QueueKind::Direct);
        let copy_allocator = Arc::new(CommandAllocator::new(3, QueueKind::Copy, "copy"));
        assert!(list.reset(&copy_allocator).is_err());
        list.close().unwrap();
        assert!(list.reset(&copy_allocator).is_err());
    }

    #[test]
    fn test_mismatched_allocator_rejected_at_creation() {
        let allocator = Arc::new(CommandAllocator::new(1, QueueKind::Copy, "copy"));
        assert!(CommandList::new(2, QueueKind::Direct, &allocator, "direct").is_err());
    }
}
