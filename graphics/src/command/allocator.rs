//! Command allocators.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::GraphicsError;
use crate::sync::Fence;

use super::QueueKind;

#[derive(Debug, Default)]
struct AllocatorState {
    /// Fence value covering the last submission recorded from this allocator.
    pending: Option<(Arc<Fence>, u64)>,
    resets: u64,
}

/// Backing storage for recorded commands.
///
/// An allocator may only be reset once the GPU has finished every
/// submission recorded from it. [`reset`](Self::reset) enforces that
/// against the fence value the queue assigned at submission time.
pub struct CommandAllocator {
    id: u64,
    kind: QueueKind,
    label: String,
    state: Mutex<AllocatorState>,
}

impl CommandAllocator {
    pub(crate) fn new(id: u64, kind: QueueKind, label: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            label: label.into(),
            state: Mutex::new(AllocatorState::default()),
        }
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

    /// Number of successful resets so far.
    pub fn reset_count(&self) -> u64 {
        self.state.lock().resets
    }

    /// Fence value the last submission from this allocator will signal,
    /// if it has not been observed as complete by a reset yet.
    pub fn pending_value(&self) -> Option<u64> {
        self.state.lock().pending.as_ref().map(|(_, value)| *value)
    }

    /// Whether the GPU is done with everything recorded from this allocator.
    pub fn is_idle(&self) -> bool {
        match &self.state.lock().pending {
            Some((fence, value)) => fence.is_reached(*value),
            None => true,
        }
    }

    /// Reclaim the allocator's memory.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::AllocatorInUse`] if the last submission's
    /// fence value has not completed yet.
    pub fn reset(&self) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        if let Some((fence, value)) = &state.pending {
            let completed = fence.completed_value();
            if completed < *value {
                return Err(GraphicsError::AllocatorInUse {
                    allocator: self.label.clone(),
                    pending: *value,
                    completed,
                });
            }
        }
        state.pending = None;
        state.resets += 1;
        log::trace!("CommandAllocator '{}' reset ({})", self.label, state.resets);
        Ok(())
    }

    /// Record that a list from this allocator was submitted and will be
    /// complete once `fence` reaches `value`.
    pub(crate) fn mark_submitted(&self, fence: &Arc<Fence>, value: u64) {
        self.state.lock().pending = Some((Arc::clone(fence), value));
    }
}

impl std::fmt::Debug for CommandAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandAllocator")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(CommandAllocator: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_before_completion_fails() {
        let fence = Arc::new(Fence::new(1, "direct"));
        let allocator = CommandAllocator::new(2, QueueKind::Direct, "frame0");
        allocator.mark_submitted(&fence, 1);
        assert!(!allocator.is_idle());

        let err = allocator.reset().unwrap_err();
        assert_eq!(
            err,
            GraphicsError::AllocatorInUse {
                allocator: "frame0".into(),
                pending: 1,
                completed: 0,
            }
        );
        assert_eq!(allocator.reset_count(), 0);

        fence.advance_to(1);
        allocator.reset().unwrap();
        assert_eq!(allocator.reset_count(), 1);
        assert_eq!(allocator.pending_value(), None);
    }

    #[test]
    fn test_fresh_allocator_resets() {
        let allocator = CommandAllocator::new(1, QueueKind::Copy, "upload");
        assert!(allocator.is_idle());
        allocator.reset().unwrap();
    }
}
