//! Orbiting camera and its constant buffer.

use bytemuck::{Pod, Zeroable};
use renderlab_core::math::{Mat4, Vec3, look_at_lh, mat4_to_cols_array_2d, perspective_lh};

use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::resources::Buffer;
use crate::types::{BufferDescriptor, BufferUsage, CONSTANT_BUFFER_ALIGNMENT, align_up};

const NEAR_PLANE: f32 = 0.1;
const FAR_PLANE: f32 = 100.0;

/// Camera matrices as laid out in the shader's `Camera` block.
///
/// Matrices are stored column by column, which is the transpose of their
/// row-major form.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraConstants {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub view_projection: [[f32; 4]; 4],
}

static_assertions::const_assert_eq!(std::mem::size_of::<CameraConstants>(), 192);

/// Size of the camera constant buffer.
pub const CAMERA_BUFFER_SIZE: u64 = align_up(
    std::mem::size_of::<CameraConstants>() as u64,
    CONSTANT_BUFFER_ALIGNMENT,
);

/// Orbit parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitParams {
    /// Angular rate in degrees per second.
    pub rate: f32,
    pub radius: f32,
    /// Height of the orbit plane above the origin.
    pub height: f32,
    /// Vertical field of view in degrees.
    pub fov: f32,
}

impl Default for OrbitParams {
    fn default() -> Self {
        Self {
            rate: 10.0,
            radius: 5.0,
            height: 2.0,
            fov: 60.0,
        }
    }
}

/// A camera circling the origin at a fixed radius and height.
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitCamera {
    params: OrbitParams,
    aspect: f32,
    /// Degrees, in [0, 360).
    angle: f32,
}

impl OrbitCamera {
    pub fn new(params: OrbitParams, width: u32, height: u32) -> Self {
        Self {
            params,
            aspect: width as f32 / height.max(1) as f32,
            angle: 0.0,
        }
    }

    pub fn params(&self) -> &OrbitParams {
        &self.params
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }

    /// Advance the orbit by `rate * dt` degrees.
    pub fn advance(&mut self, dt: f32) {
        self.angle = (self.angle + self.params.rate * dt).rem_euclid(360.0);
    }

    pub fn eye(&self) -> Vec3 {
        let radians = self.angle.to_radians();
        Vec3::new(
            self.params.radius * radians.cos(),
            self.params.height,
            self.params.radius * radians.sin(),
        )
    }

    pub fn view(&self) -> Mat4 {
        look_at_lh(&self.eye(), &Vec3::zeros(), &Vec3::y())
    }

    pub fn projection(&self) -> Mat4 {
        perspective_lh(self.params.fov.to_radians(), self.aspect, NEAR_PLANE, FAR_PLANE)
    }

    pub fn constants(&self) -> CameraConstants {
        let view = self.view();
        let projection = self.projection();
        CameraConstants {
            view: mat4_to_cols_array_2d(&view),
            projection: mat4_to_cols_array_2d(&projection),
            view_projection: mat4_to_cols_array_2d(&(projection * view)),
        }
    }
}

/// Create the upload-heap camera constant buffer.
pub fn create_camera_buffer(
    device: &GraphicsDevice,
) -> Result<std::sync::Arc<Buffer>, GraphicsError> {
    device.create_buffer(
        &BufferDescriptor::upload(CAMERA_BUFFER_SIZE, BufferUsage::UNIFORM)
            .with_label("camera constants"),
    )
}

/// Write the camera's current matrices into `buffer`.
pub fn write_camera(
    device: &GraphicsDevice,
    buffer: &Buffer,
    camera: &OrbitCamera,
) -> Result<(), GraphicsError> {
    device.write_buffer(buffer, 0, bytemuck::bytes_of(&camera.constants()))
}
