//! Command queues.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::GpuBackend;
use crate::error::GraphicsError;
use crate::sync::Fence;

use super::{CommandList, QueueKind};

/// A GPU command queue with its own timeline fence.
///
/// Submissions run in order. [`signal`](Self::signal) hands out strictly
/// increasing fence values starting at 1.
pub struct CommandQueue {
    kind: QueueKind,
    backend: Arc<dyn GpuBackend>,
    fence: Arc<Fence>,
    /// Value the next signal will use.
    next_value: Mutex<u64>,
}

impl CommandQueue {
    pub(crate) fn new(kind: QueueKind, backend: Arc<dyn GpuBackend>, fence: Fence) -> Self {
        Self {
            kind,
            backend,
            fence: Arc::new(fence),
            next_value: Mutex::new(1),
        }
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    /// The queue's timeline fence.
    pub fn fence(&self) -> &Arc<Fence> {
        &self.fence
    }

    /// Last value handed out by [`signal`](Self::signal), 0 if none yet.
    pub fn last_signaled_value(&self) -> u64 {
        *self.next_value.lock() - 1
    }

    /// Submit closed command lists in order.
    ///
    /// Each list's allocator becomes busy until the next signal of this
    /// queue completes.
    ///
    /// # Errors
    ///
    /// Fails if a list is still open, belongs to another queue kind, or the
    /// backend rejects its commands. Lists after a failing one are not
    /// submitted.
    pub fn execute_command_lists(&self, lists: &[&CommandList]) -> Result<(), GraphicsError> {
        let next_value = self.next_value.lock();
        for list in lists {
            if !list.is_closed() {
                return Err(GraphicsError::InvalidCommandList(format!(
                    "list '{}' submitted while open",
                    list.label()
                )));
            }
            if list.kind() != self.kind {
                return Err(GraphicsError::InvalidCommandList(format!(
                    "{} list '{}' submitted to {} queue",
                    list.kind(),
                    list.label(),
                    self.kind
                )));
            }
            // Covered by the next signal whether or not execution succeeds.
            list.allocator().mark_submitted(&self.fence, *next_value);
            log::trace!(
                "{} queue: executing '{}' ({} commands)",
                self.kind,
                list.label(),
                list.commands().len()
            );
            self.backend.execute(self.kind, list.commands())?;
        }
        Ok(())
    }

    /// Signal the queue's fence once all previously submitted work is done.
    ///
    /// Returns the value that will be signaled.
    pub fn signal(&self) -> Result<u64, GraphicsError> {
        let mut next_value = self.next_value.lock();
        let value = *next_value;
        self.backend.signal(self.kind, &self.fence, value)?;
        *next_value += 1;
        log::trace!("{} queue: signal {}", self.kind, value);
        Ok(value)
    }

    /// Signal and block until everything submitted so far has completed.
    pub fn wait_idle(&self) -> Result<(), GraphicsError> {
        let value = self.signal()?;
        self.backend.wait_for_fence_value(&self.fence, value)
    }
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("kind", &self.kind)
            .field("backend", &self.backend.name())
            .field("fence", &self.fence)
            .finish_non_exhaustive()
    }
}
