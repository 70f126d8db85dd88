//! Frame resource rotation.
//!
//! A [`FrameRotator`] owns `frame_count` [`FrameSlot`]s and one direct
//! command list. Frame `N` records into slot `N % frame_count`:
//!
//! ```text
//! Idle ──begin_frame──► Recording ──submit──► Submitted ──fence──► Idle
//! ```
//!
//! [`begin_frame`](FrameRotator::begin_frame) never resets a slot's
//! allocator before the fence value of that slot's previous submission has
//! completed; it blocks on the fence when the GPU is behind.

use std::sync::Arc;

use crate::command::{CommandAllocator, CommandList, QueueKind};
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::resources::{Buffer, Texture};
use crate::types::{
    BufferDescriptor, Footprint, ResourceState, TextureDescriptor, TextureFormat, TextureUsage,
    align_up,
};

/// Lifecycle of a frame slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotState {
    Idle,
    Recording,
    Submitted,
}

/// Why a frame submission failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// A command failed to record; nothing was executed.
    Record(GraphicsError),
    /// The queue rejected the list or the signal.
    Execute(GraphicsError),
}

impl SubmitError {
    pub fn into_inner(self) -> GraphicsError {
        match self {
            Self::Record(e) | Self::Execute(e) => e,
        }
    }
}

impl std::fmt::Display for SubmitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Record(e) => write!(f, "recording failed: {e}"),
            Self::Execute(e) => write!(f, "execution failed: {e}"),
        }
    }
}

impl std::error::Error for SubmitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Record(e) | Self::Execute(e) => Some(e),
        }
    }
}

/// Render targets shared by every slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTargets {
    pub width: u32,
    pub height: u32,
    pub color_format: TextureFormat,
    pub depth_format: TextureFormat,
    /// Give every slot a readback buffer for its color target.
    pub readback: bool,
}

impl FrameTargets {
    /// Usage of the color targets.
    pub fn color_usage(&self) -> TextureUsage {
        TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC
    }
}

/// Per-frame resources.
#[derive(Debug)]
pub struct FrameSlot {
    pub index: usize,
    pub allocator: Arc<CommandAllocator>,
    /// Rests in [`ResourceState::Common`] between frames.
    pub color: Arc<Texture>,
    /// Always in [`ResourceState::DepthWrite`].
    pub depth: Arc<Texture>,
    pub readback: Option<Arc<Buffer>>,
    /// Direct-queue fence value of the last submission, 0 if none.
    pub fence_value: u64,
    pub state: SlotState,
}

impl FrameSlot {
    /// Placement of the color target inside the readback buffer.
    pub fn color_footprint(&self) -> Footprint {
        self.color.footprint()
    }
}

/// Cycles frames through a fixed set of slots.
pub struct FrameRotator {
    device: Arc<GraphicsDevice>,
    targets: FrameTargets,
    slots: Vec<FrameSlot>,
    list: CommandList,
    frame: u64,
    waits: u64,
}

impl FrameRotator {
    /// Create `frame_count` slots.
    ///
    /// # Errors
    ///
    /// Fails if `frame_count` is 0 or a target cannot be created.
    pub fn new(
        device: Arc<GraphicsDevice>,
        targets: FrameTargets,
        frame_count: usize,
    ) -> Result<Self, GraphicsError> {
        if frame_count == 0 {
            return Err(GraphicsError::InvalidParameter(
                "frame count must be at least 1".into(),
            ));
        }

        let slots = (0..frame_count)
            .map(|index| Self::create_slot(&device, &targets, index))
            .collect::<Result<Vec<_>, _>>()?;

        let mut list =
            device.create_command_list(QueueKind::Direct, &slots[0].allocator, "frame")?;
        // Lists are created open; the rotator expects it closed between frames.
        list.close()?;

        log::debug!(
            "FrameRotator: {} slots of {}x{} {:?}{}",
            frame_count,
            targets.width,
            targets.height,
            targets.color_format,
            if targets.readback { " with readback" } else { "" }
        );

        Ok(Self {
            device,
            targets,
            slots,
            list,
            frame: 0,
            waits: 0,
        })
    }

    fn create_slot(
        device: &GraphicsDevice,
        targets: &FrameTargets,
        index: usize,
    ) -> Result<FrameSlot, GraphicsError> {
        let color = device.create_texture(
            &TextureDescriptor::new_2d(
                targets.width,
                targets.height,
                targets.color_format,
                targets.color_usage(),
            )
            .with_label(format!("frame {index} color"))
            .with_initial_state(ResourceState::Common),
        )?;
        let depth = device.create_texture(
            &TextureDescriptor::new_2d(
                targets.width,
                targets.height,
                targets.depth_format,
                TextureUsage::RENDER_ATTACHMENT,
            )
            .with_label(format!("frame {index} depth")),
        )?;
        let readback = if targets.readback {
            let footprint = color.footprint();
            let size = align_up(footprint.offset + footprint.total_size, 4);
            Some(device.create_buffer(
                &BufferDescriptor::readback(size).with_label(format!("frame {index} readback")),
            )?)
        } else {
            None
        };

        Ok(FrameSlot {
            index,
            allocator: device
                .create_command_allocator(QueueKind::Direct, format!("frame {index} allocator")),
            color,
            depth,
            readback,
            fence_value: 0,
            state: SlotState::Idle,
        })
    }

    pub fn targets(&self) -> &FrameTargets {
        &self.targets
    }

    pub fn frame_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of the next frame to begin.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Slot of the current or next frame.
    pub fn current_index(&self) -> usize {
        (self.frame % self.slots.len() as u64) as usize
    }

    pub fn slot(&self, index: usize) -> Option<&FrameSlot> {
        self.slots.get(index)
    }

    pub fn slots(&self) -> &[FrameSlot] {
        &self.slots
    }

    /// Number of times `begin_frame` had to block on the fence.
    pub fn fence_waits(&self) -> u64 {
        self.waits
    }

    /// Acquire the current slot and reopen the command list on its
    /// allocator.
    ///
    /// Returns the frame number and the slot index.
    pub fn begin_frame(&mut self) -> Result<(u64, usize), GraphicsError> {
        let index = self.current_index();
        let fence = self.device.direct_queue().fence();
        let slot = &mut self.slots[index];

        if slot.fence_value > fence.completed_value() {
            log::trace!(
                "FrameRotator: slot {index} waiting for fence {} (at {})",
                slot.fence_value,
                fence.completed_value()
            );
            self.device.wait_for_fence_value(fence, slot.fence_value)?;
            self.waits += 1;
        }
        slot.state = SlotState::Idle;

        slot.allocator.reset()?;
        if !self.list.is_closed() {
            // Left open by an abandoned frame; its commands are discarded.
            if let Err(e) = self.list.close() {
                log::trace!("FrameRotator: discarding abandoned frame list: {e}");
            }
        }
        self.list.reset(&slot.allocator)?;
        slot.state = SlotState::Recording;
        Ok((self.frame, index))
    }

    /// The command list of the frame being recorded.
    pub fn list(&mut self) -> &mut CommandList {
        &mut self.list
    }

    pub fn current_slot(&self) -> &FrameSlot {
        &self.slots[self.current_index()]
    }

    /// Close and execute the frame's list, then signal the direct fence.
    ///
    /// The fence is signaled even when closing or execution fails, and the
    /// rotation advances either way. Returns the signaled value.
    pub fn submit(&mut self) -> Result<u64, SubmitError> {
        let queue = self.device.direct_queue();
        let executed = match self.list.close() {
            Ok(()) => queue
                .execute_command_lists(&[&self.list])
                .map_err(SubmitError::Execute),
            Err(e) => Err(SubmitError::Record(e)),
        };
        let signaled = queue.signal();

        let index = self.current_index();
        let slot = &mut self.slots[index];
        if let Ok(value) = signaled {
            slot.fence_value = value;
        }
        slot.state = SlotState::Submitted;
        self.frame += 1;

        executed?;
        signaled.map_err(SubmitError::Execute)
    }
}

impl std::fmt::Debug for FrameRotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameRotator")
            .field("targets", &self.targets)
            .field("slots", &self.slots.len())
            .field("frame", &self.frame)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyBackend, GpuBackend};

    fn targets(readback: bool) -> FrameTargets {
        FrameTargets {
            width: 4,
            height: 2,
            color_format: TextureFormat::Rgba32Float,
            depth_format: TextureFormat::Depth32Float,
            readback,
        }
    }

    fn clear_frame(rotator: &mut FrameRotator) {
        let slot = rotator.current_slot();
        let color = Arc::clone(&slot.color);
        let list = rotator.list();
        list.transition(&color, ResourceState::Common, ResourceState::RenderTarget);
        list.clear_render_target(&color, [0.0, 0.2, 0.4, 1.0]);
        list.transition(&color, ResourceState::RenderTarget, ResourceState::Common);
    }

    #[test]
    fn test_slots_alternate() {
        let device = GraphicsDevice::new(Arc::new(DummyBackend::new()));
        let mut rotator = FrameRotator::new(device, targets(true), 2).unwrap();

        for frame in 0..4u64 {
            let (number, slot) = rotator.begin_frame().unwrap();
            assert_eq!(number, frame);
            assert_eq!(slot, (frame % 2) as usize);
            clear_frame(&mut rotator);
            let value = rotator.submit().unwrap();
            assert_eq!(rotator.slot(slot).unwrap().fence_value, value);
            assert_eq!(rotator.slot(slot).unwrap().state, SlotState::Submitted);
        }
        assert_eq!(rotator.slot(0).unwrap().allocator.reset_count(), 2);
        assert!(rotator.slot(1).unwrap().readback.is_some());
    }

    #[test]
    fn test_begin_frame_waits_for_the_slot_fence() {
        let backend = Arc::new(DummyBackend::new().with_deferred_execution());
        let device = GraphicsDevice::new(Arc::clone(&backend) as Arc<dyn GpuBackend>);
        let mut rotator = FrameRotator::new(Arc::clone(&device), targets(false), 2).unwrap();

        for _ in 0..2 {
            rotator.begin_frame().unwrap();
            clear_frame(&mut rotator);
            rotator.submit().unwrap();
        }
        let slot0 = rotator.slot(0).unwrap();
        assert!(!device.direct_queue().fence().is_reached(slot0.fence_value));

        rotator.begin_frame().unwrap();
        assert_eq!(rotator.fence_waits(), 1);
        let slot0 = rotator.slot(0).unwrap();
        assert!(device.direct_queue().fence().is_reached(slot0.fence_value));
        assert_eq!(slot0.state, SlotState::Recording);
    }

    #[test]
    fn test_failed_frame_still_signals() {
        let device = GraphicsDevice::new(Arc::new(DummyBackend::new()));
        let mut rotator = FrameRotator::new(Arc::clone(&device), targets(false), 2).unwrap();

        rotator.begin_frame().unwrap();
        let color = Arc::clone(&rotator.current_slot().color);
        // Wrong `before` state.
        rotator
            .list()
            .transition(&color, ResourceState::RenderTarget, ResourceState::Common);
        assert!(matches!(rotator.submit(), Err(SubmitError::Execute(_))));
        assert_eq!(rotator.slot(0).unwrap().fence_value, 1);
        assert_eq!(device.direct_queue().last_signaled_value(), 1);

        for _ in 0..2 {
            rotator.begin_frame().unwrap();
            clear_frame(&mut rotator);
            rotator.submit().unwrap();
        }
    }

    #[test]
    fn test_abandoned_frame_is_discarded() {
        let device = GraphicsDevice::new(Arc::new(DummyBackend::new()));
        let mut rotator = FrameRotator::new(Arc::clone(&device), targets(false), 2).unwrap();

        rotator.begin_frame().unwrap();
        clear_frame(&mut rotator);
        assert!(!rotator.list().commands().is_empty());

        // Never submitted: the same frame and slot are handed out again.
        assert_eq!(rotator.begin_frame().unwrap(), (0, 0));
        assert!(rotator.list().commands().is_empty());
        clear_frame(&mut rotator);
        assert_eq!(rotator.submit().unwrap(), 1);
    }

    #[test]
    fn test_zero_frame_count_is_rejected() {
        let device = GraphicsDevice::new(Arc::new(DummyBackend::new()));
        assert!(FrameRotator::new(device, targets(false), 0).is_err());
    }
}
