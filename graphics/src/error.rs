//! Graphics error types.

use std::fmt;

use crate::types::ResourceState;

/// Errors that can occur in the graphics system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// Failed to initialize the graphics system.
    InitializationFailed(String),
    /// Failed to create a resource.
    ResourceCreationFailed(String),
    /// A requested feature is not supported.
    FeatureNotSupported(String),
    /// Out of GPU memory.
    OutOfMemory,
    /// An invalid parameter was provided.
    InvalidParameter(String),
    /// An internal error occurred.
    Internal(String),
    /// The surface is outdated and needs to be reconfigured.
    SurfaceOutdated,
    /// The surface was lost and needs to be recreated.
    SurfaceLost,
    /// A command allocator was reset while its last submission is still
    /// pending on the GPU.
    AllocatorInUse {
        /// Allocator label.
        allocator: String,
        /// Fence value the submission will signal.
        pending: u64,
        /// Value the fence has completed so far.
        completed: u64,
    },
    /// A resource was used in a state other than the one it is in.
    ResourceStateMismatch {
        /// Resource label.
        resource: String,
        /// State the command expected.
        expected: ResourceState,
        /// State the resource is actually in.
        actual: ResourceState,
    },
    /// One queue referenced a resource another queue is still writing.
    Hazard(String),
    /// A fence value was waited on that no submitted work will signal.
    FenceNeverSignaled {
        /// Fence label.
        fence: String,
        /// Requested value.
        value: u64,
    },
    /// A command list was used out of order (recorded while closed,
    /// submitted while open, wrong queue type).
    InvalidCommandList(String),
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitializationFailed(msg) => write!(f, "initialization failed: {msg}"),
            Self::ResourceCreationFailed(msg) => write!(f, "resource creation failed: {msg}"),
            Self::FeatureNotSupported(msg) => write!(f, "feature not supported: {msg}"),
            Self::OutOfMemory => write!(f, "out of GPU memory"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
            Self::SurfaceOutdated => write!(f, "surface outdated, needs reconfiguration"),
            Self::SurfaceLost => write!(f, "surface lost, needs recreation"),
            Self::AllocatorInUse {
                allocator,
                pending,
                completed,
            } => write!(
                f,
                "command allocator '{allocator}' reset while fence value {pending} is pending (completed {completed})"
            ),
            Self::ResourceStateMismatch {
                resource,
                expected,
                actual,
            } => write!(
                f,
                "resource '{resource}' is in state {actual:?}, expected {expected:?}"
            ),
            Self::Hazard(msg) => write!(f, "cross-queue hazard: {msg}"),
            Self::FenceNeverSignaled { fence, value } => {
                write!(f, "fence '{fence}' value {value} is never signaled")
            }
            Self::InvalidCommandList(msg) => write!(f, "invalid command list usage: {msg}"),
        }
    }
}

impl std::error::Error for GraphicsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphicsError::OutOfMemory;
        assert_eq!(err.to_string(), "out of GPU memory");

        let err = GraphicsError::InitializationFailed("no GPU found".to_string());
        assert_eq!(err.to_string(), "initialization failed: no GPU found");
    }

    #[test]
    fn test_allocator_in_use_display() {
        let err = GraphicsError::AllocatorInUse {
            allocator: "frame 0".to_string(),
            pending: 3,
            completed: 2,
        };
        assert_eq!(
            err.to_string(),
            "command allocator 'frame 0' reset while fence value 3 is pending (completed 2)"
        );
    }
}
