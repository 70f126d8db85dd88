//! GPU synchronization primitives.
//!
//! A [`Fence`] is a monotonically increasing 64-bit counter shared between
//! the CPU and one command queue. The queue signals a value once all work
//! submitted before the signal has finished executing; the CPU observes the
//! completed value or blocks on it through
//! [`GraphicsDevice::wait_for_fence_value`](crate::GraphicsDevice::wait_for_fence_value).

use std::sync::atomic::{AtomicU64, Ordering};

/// CPU-GPU timeline fence.
///
/// The completed value only ever moves forward.
#[derive(Debug)]
pub struct Fence {
    id: u64,
    label: String,
    completed: AtomicU64,
}

impl Fence {
    pub(crate) fn new(id: u64, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            completed: AtomicU64::new(0),
        }
    }

    /// Unique identifier for debugging.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Highest value the GPU has signaled so far (non-blocking).
    pub fn completed_value(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Whether `value` has been reached.
    pub fn is_reached(&self, value: u64) -> bool {
        self.completed_value() >= value
    }

    /// Move the completed value forward to `value`. Lower values are ignored.
    pub(crate) fn advance_to(&self, value: u64) {
        self.completed.fetch_max(value, Ordering::AcqRel);
    }
}

static_assertions::assert_impl_all!(Fence: Send, Sync);
