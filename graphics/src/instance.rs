//! Graphics instance.
//!
//! The [`GraphicsInstance`] is the top-level entry point for the graphics
//! system. It holds the [`InstanceParameters`] and creates
//! [`GraphicsDevice`]s on the backend they select.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::backend;
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;

/// Which GPU backend to create devices on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendType {
    /// wgpu if a GPU is available, otherwise the dummy backend.
    #[default]
    Auto,
    /// CPU emulation, no GPU required.
    Dummy,
    /// wgpu; fails if no adapter is available.
    Wgpu,
}

/// Native API used under wgpu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WgpuBackendType {
    /// Let wgpu pick the primary API of the platform.
    #[default]
    Auto,
    Vulkan,
    Metal,
    Dx12,
    Gl,
}

impl WgpuBackendType {
    /// The wgpu backend set to enable.
    #[cfg(feature = "wgpu-backend")]
    pub fn to_wgpu_backends(self) -> wgpu::Backends {
        match self {
            Self::Auto => wgpu::Backends::PRIMARY,
            Self::Vulkan => wgpu::Backends::VULKAN,
            Self::Metal => wgpu::Backends::METAL,
            Self::Dx12 => wgpu::Backends::DX12,
            Self::Gl => wgpu::Backends::GL,
        }
    }
}

/// Adapter selection hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PowerPreference {
    #[default]
    HighPerformance,
    LowPower,
}

/// Parameters for creating a [`GraphicsInstance`].
///
/// # Example
///
/// ```ignore
/// let params = InstanceParameters::new()
///     .with_backend(BackendType::Wgpu)
///     .with_validation(true);
/// let instance = GraphicsInstance::with_parameters(params);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InstanceParameters {
    pub backend: BackendType,
    pub wgpu_backend: WgpuBackendType,
    /// Enable API validation layers.
    pub validation: bool,
    /// Enable debug labels and markers.
    pub debug: bool,
    pub power_preference: PowerPreference,
}

impl InstanceParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: BackendType) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_wgpu_backend(mut self, wgpu_backend: WgpuBackendType) -> Self {
        self.wgpu_backend = wgpu_backend;
        self
    }

    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_power_preference(mut self, power_preference: PowerPreference) -> Self {
        self.power_preference = power_preference;
        self
    }
}

/// The graphics instance creates devices.
///
/// # Thread Safety
///
/// `GraphicsInstance` is `Send + Sync` and can be safely shared across threads.
///
/// # Example
///
/// ```ignore
/// let instance = GraphicsInstance::new();
/// let device = instance.create_device()?;
/// ```
pub struct GraphicsInstance {
    parameters: InstanceParameters,
    /// Devices created by this instance that are still alive.
    devices: RwLock<Vec<Weak<GraphicsDevice>>>,
}

impl GraphicsInstance {
    /// Create an instance with default parameters.
    pub fn new() -> Arc<Self> {
        Self::with_parameters(InstanceParameters::default())
    }

    /// Create an instance with custom parameters.
    pub fn with_parameters(parameters: InstanceParameters) -> Arc<Self> {
        log::info!(
            "Creating GraphicsInstance (backend: {:?}, validation: {})",
            parameters.backend,
            parameters.validation
        );
        Arc::new(Self {
            parameters,
            devices: RwLock::new(Vec::new()),
        })
    }

    pub fn parameters(&self) -> &InstanceParameters {
        &self.parameters
    }

    /// Create a graphics device on the configured backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be initialized.
    pub fn create_device(&self) -> Result<Arc<GraphicsDevice>, GraphicsError> {
        let backend = backend::create_backend(&self.parameters)?;
        log::info!("Using GPU backend: {}", backend.name());

        let device = GraphicsDevice::new(backend);
        let mut devices = self.devices.write();
        devices.retain(|d| d.strong_count() > 0);
        devices.push(Arc::downgrade(&device));
        Ok(device)
    }

    /// Get the number of live devices created by this instance.
    pub fn device_count(&self) -> usize {
        self.devices
            .read()
            .iter()
            .filter(|d| d.strong_count() > 0)
            .count()
    }
}

impl std::fmt::Debug for GraphicsInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsInstance")
            .field("parameters", &self.parameters)
            .field("device_count", &self.device_count())
            .finish()
    }
}

// Ensure GraphicsInstance is Send + Sync
static_assertions::assert_impl_all!(GraphicsInstance: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_instance() -> Arc<GraphicsInstance> {
        GraphicsInstance::with_parameters(InstanceParameters::new().with_backend(BackendType::Dummy))
    }

    #[test]
    fn test_instance_creation() {
        let instance = dummy_instance();
        assert_eq!(instance.device_count(), 0);
        assert_eq!(instance.parameters().backend, BackendType::Dummy);
    }

    #[test]
    fn test_create_device() {
        let instance = dummy_instance();
        let device = instance.create_device().unwrap();
        assert_eq!(device.name(), "Dummy Backend");
        assert_eq!(instance.device_count(), 1);
    }

    #[test]
    fn test_dropped_devices_are_not_counted() {
        let instance = dummy_instance();
        let device1 = instance.create_device().unwrap();
        {
            let _device2 = instance.create_device().unwrap();
            assert_eq!(instance.device_count(), 2);
        }
        assert_eq!(instance.device_count(), 1);
        drop(device1);
        assert_eq!(instance.device_count(), 0);
    }

    #[test]
    fn test_parameter_builders() {
        let params = InstanceParameters::new()
            .with_wgpu_backend(WgpuBackendType::Vulkan)
            .with_validation(true)
            .with_power_preference(PowerPreference::LowPower);
        assert_eq!(params.backend, BackendType::Auto);
        assert_eq!(params.wgpu_backend, WgpuBackendType::Vulkan);
        assert!(params.validation);
        assert!(!params.debug);
        assert_eq!(params.power_preference, PowerPreference::LowPower);
    }
}
