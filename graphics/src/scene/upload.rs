//! Staged uploads through the copy queue.
//!
//! Every upload goes through a CPU-visible staging buffer that a copy-queue
//! list copies into a GPU-only destination. Destinations are created in
//! [`ResourceState::CopyDest`]; once the copy fence is observed,
//! [`PendingUpload::finish`] moves them to their read states on the direct
//! queue.
//!
//! ```ignore
//! let mut batch = UploadBatch::new(&device, "scene upload")?;
//! let vertices = batch.upload_buffer(&bytes, BufferUsage::VERTEX, "vertices")?;
//! batch.submit()?.finish()?;
//! ```

use std::sync::Arc;

use renderlab_core::scene::DocumentImage;

use crate::command::{CommandAllocator, CommandList, QueueKind, ResourceBarrier};
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::resources::{Buffer, Texture};
use crate::types::{
    BufferDescriptor, BufferUsage, ResourceState, TextureDescriptor, TextureFormat, TextureUsage,
    align_up,
};

/// Size granularity of buffer copies.
pub const COPY_GRANULARITY: u64 = 4;

/// State uploaded buffers are left in: every read-only usage at once, so
/// one source buffer may feed vertices, indices and constants.
pub const UPLOADED_BUFFER_STATE: ResourceState = ResourceState::GenericRead;

/// State uploaded textures are left in.
pub const UPLOADED_TEXTURE_STATE: ResourceState = ResourceState::PixelShaderResource;

/// A copy-queue list collecting staged uploads.
pub struct UploadBatch {
    device: Arc<GraphicsDevice>,
    allocator: Arc<CommandAllocator>,
    list: CommandList,
    staging: Vec<Arc<Buffer>>,
    buffers: Vec<Arc<Buffer>>,
    textures: Vec<Arc<Texture>>,
    bytes: u64,
}

impl UploadBatch {
    /// Open an upload list on the copy queue.
    pub fn new(device: &Arc<GraphicsDevice>, label: &str) -> Result<Self, GraphicsError> {
        let allocator = device.create_command_allocator(QueueKind::Copy, format!("{label} allocator"));
        let list = device.create_command_list(QueueKind::Copy, &allocator, label)?;
        Ok(Self {
            device: Arc::clone(device),
            allocator,
            list,
            staging: Vec::new(),
            buffers: Vec::new(),
            textures: Vec::new(),
            bytes: 0,
        })
    }

    /// Number of staged bytes so far.
    pub fn staged_bytes(&self) -> u64 {
        self.bytes
    }

    /// Stage `data` and record its copy into a new GPU-only buffer.
    ///
    /// The destination is padded to the copy granularity; the padding is
    /// zero.
    pub fn upload_buffer(
        &mut self,
        data: &[u8],
        usage: BufferUsage,
        label: &str,
    ) -> Result<Arc<Buffer>, GraphicsError> {
        let size = align_up((data.len() as u64).max(1), COPY_GRANULARITY);

        let staging = self.device.create_buffer(
            &BufferDescriptor::upload(size, BufferUsage::COPY_SRC)
                .with_label(format!("{label} (staging)")),
        )?;
        self.device.write_buffer(&staging, 0, data)?;

        let destination = self.device.create_buffer(
            &BufferDescriptor::new(size, usage | BufferUsage::COPY_DST)
                .with_label(label)
                .with_initial_state(ResourceState::CopyDest),
        )?;
        self.list
            .copy_buffer_region(&destination, 0, &staging, 0, size);

        self.bytes += size;
        self.staging.push(staging);
        self.buffers.push(Arc::clone(&destination));
        Ok(destination)
    }

    /// Stage `image` and record its copy into a new sampled texture.
    ///
    /// Rows are laid out at the texture's row pitch. Three-channel images
    /// are expanded to RGBA with opaque alpha.
    pub fn upload_image(
        &mut self,
        image: &DocumentImage,
        label: &str,
    ) -> Result<Arc<Texture>, GraphicsError> {
        let expected = image.row_size() * image.height as usize;
        if image.pixels.len() != expected {
            return Err(GraphicsError::InvalidParameter(format!(
                "image '{label}' holds {} bytes, {}x{}x{} needs {expected}",
                image.pixels.len(),
                image.width,
                image.height,
                image.components
            )));
        }

        let expanded;
        let (pixels, components) = if image.components == 3 {
            expanded = expand_rgb(&image.pixels);
            (expanded.as_slice(), 4)
        } else {
            (image.pixels.as_slice(), image.components)
        };
        let format = TextureFormat::from_components(components).ok_or_else(|| {
            GraphicsError::FeatureNotSupported(format!(
                "image '{label}' has {components} channels"
            ))
        })?;

        let descriptor = TextureDescriptor::new_2d(
            image.width,
            image.height,
            format,
            TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST | TextureUsage::COPY_SRC,
        )
        .with_label(label)
        .with_initial_state(ResourceState::CopyDest);
        let footprint = descriptor.footprint();

        let staging_size = align_up(footprint.offset + footprint.total_size, COPY_GRANULARITY);
        let staging = self.device.create_buffer(
            &BufferDescriptor::upload(staging_size, BufferUsage::COPY_SRC)
                .with_label(format!("{label} (staging)")),
        )?;

        let row_size = footprint.row_size as usize;
        let mut placed = vec![0u8; staging_size as usize];
        for (y, row) in pixels.chunks_exact(row_size).enumerate() {
            placed[footprint.row_range(y as u32)].copy_from_slice(row);
        }
        self.device.write_buffer(&staging, 0, &placed)?;

        let texture = self.device.create_texture(&descriptor)?;
        self.list.copy_buffer_to_texture(&texture, &staging, footprint);

        self.bytes += staging_size;
        self.staging.push(staging);
        self.textures.push(Arc::clone(&texture));
        Ok(texture)
    }

    /// Close the list, submit it on the copy queue and signal the copy
    /// fence.
    pub fn submit(mut self) -> Result<PendingUpload, GraphicsError> {
        self.list.close()?;
        let queue = self.device.copy_queue();
        queue.execute_command_lists(&[&self.list])?;
        let fence_value = queue.signal()?;

        log::debug!(
            "Upload submitted: {} buffers, {} textures, {} staged bytes (copy fence {})",
            self.buffers.len(),
            self.textures.len(),
            self.bytes,
            fence_value
        );

        Ok(PendingUpload {
            device: self.device,
            allocator: self.allocator,
            fence_value,
            staging: self.staging,
            buffers: self.buffers,
            textures: self.textures,
        })
    }
}

impl std::fmt::Debug for UploadBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadBatch")
            .field("buffers", &self.buffers.len())
            .field("textures", &self.textures.len())
            .field("bytes", &self.bytes)
            .finish()
    }
}

/// Submitted uploads whose copy fence has not been observed yet.
///
/// Holds the staging buffers alive until [`finish`](Self::finish).
#[must_use = "destinations are unusable until the upload is finished"]
pub struct PendingUpload {
    device: Arc<GraphicsDevice>,
    allocator: Arc<CommandAllocator>,
    fence_value: u64,
    staging: Vec<Arc<Buffer>>,
    buffers: Vec<Arc<Buffer>>,
    textures: Vec<Arc<Texture>>,
}

impl PendingUpload {
    /// Copy fence value covering the uploads.
    pub fn fence_value(&self) -> u64 {
        self.fence_value
    }

    /// Block on the copy fence, release the staging buffers and transition
    /// every destination to its read state on the direct queue.
    ///
    /// Returns the direct fence value covering the transitions.
    pub fn finish(self) -> Result<u64, GraphicsError> {
        let copy_queue = self.device.copy_queue();
        self.device
            .wait_for_fence_value(copy_queue.fence(), self.fence_value)?;
        self.allocator.reset()?;
        drop(self.staging);

        let barriers: Vec<_> = self
            .buffers
            .iter()
            .map(|b| ResourceBarrier::transition(b, ResourceState::CopyDest, UPLOADED_BUFFER_STATE))
            .chain(self.textures.iter().map(|t| {
                ResourceBarrier::transition(t, ResourceState::CopyDest, UPLOADED_TEXTURE_STATE)
            }))
            .collect();

        let direct = self.device.direct_queue();
        if barriers.is_empty() {
            return Ok(direct.last_signaled_value());
        }

        let allocator = self
            .device
            .create_command_allocator(QueueKind::Direct, "upload transitions");
        let mut list =
            self.device
                .create_command_list(QueueKind::Direct, &allocator, "upload transitions")?;
        list.resource_barrier(&barriers);
        list.close()?;
        direct.execute_command_lists(&[&list])?;
        let value = direct.signal()?;

        log::trace!(
            "Upload finished at copy fence {}, {} transitions (direct fence {})",
            self.fence_value,
            barriers.len(),
            value
        );
        Ok(value)
    }
}

impl std::fmt::Debug for PendingUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingUpload")
            .field("fence_value", &self.fence_value)
            .field("buffers", &self.buffers.len())
            .field("textures", &self.textures.len())
            .finish()
    }
}

fn expand_rgb(pixels: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixels.len() / 3 * 4);
    for texel in pixels.chunks_exact(3) {
        out.extend_from_slice(texel);
        out.push(u8::MAX);
    }
    out
}

/// Copy `size` bytes of `buffer` back to the CPU through the copy queue.
///
/// `state` is the buffer's current state; it is restored afterwards. The
/// caller must have observed every write to the buffer.
pub fn read_back_buffer(
    device: &Arc<GraphicsDevice>,
    buffer: &Arc<Buffer>,
    state: ResourceState,
    size: u64,
) -> Result<Vec<u8>, GraphicsError> {
    let readback_size = align_up(size.max(1), COPY_GRANULARITY);
    let readback = device.create_buffer(
        &BufferDescriptor::readback(readback_size).with_label(format!("{} (readback)", buffer.debug_name())),
    )?;

    let allocator = device.create_command_allocator(QueueKind::Copy, "readback");
    let mut list = device.create_command_list(QueueKind::Copy, &allocator, "readback")?;
    let transition = !state.allows_copy_source();
    if transition {
        list.transition(buffer, state, ResourceState::CopySource);
    }
    list.copy_buffer_region(&readback, 0, buffer, 0, readback_size.min(buffer.size()));
    if transition {
        list.transition(buffer, ResourceState::CopySource, state);
    }
    submit_and_wait(device, &mut list)?;

    device.read_buffer(&readback, 0, size)
}

/// Copy `texture` back to the CPU through the copy queue.
///
/// Returns tightly packed rows. `state` is the texture's current state; it
/// is restored afterwards.
pub fn read_back_texture(
    device: &Arc<GraphicsDevice>,
    texture: &Arc<Texture>,
    state: ResourceState,
) -> Result<Vec<u8>, GraphicsError> {
    let footprint = texture.footprint();
    let readback_size = align_up(footprint.offset + footprint.total_size, COPY_GRANULARITY);
    let readback = device.create_buffer(
        &BufferDescriptor::readback(readback_size)
            .with_label(format!("{} (readback)", texture.debug_name())),
    )?;

    let allocator = device.create_command_allocator(QueueKind::Copy, "readback");
    let mut list = device.create_command_list(QueueKind::Copy, &allocator, "readback")?;
    let transition = !state.allows_copy_source();
    if transition {
        list.transition(texture, state, ResourceState::CopySource);
    }
    list.copy_texture_to_buffer(&readback, footprint, texture);
    if transition {
        list.transition(texture, ResourceState::CopySource, state);
    }
    submit_and_wait(device, &mut list)?;

    let placed = device.read_buffer(&readback, 0, readback_size)?;
    let mut rows = Vec::with_capacity(footprint.row_size as usize * footprint.height as usize);
    for y in 0..footprint.height {
        rows.extend_from_slice(&placed[footprint.row_range(y)]);
    }
    Ok(rows)
}

fn submit_and_wait(device: &GraphicsDevice, list: &mut CommandList) -> Result<(), GraphicsError> {
    list.close()?;
    let queue = device.copy_queue();
    queue.execute_command_lists(&[list])?;
    let value = queue.signal()?;
    device.wait_for_fence_value(queue.fence(), value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyBackend, GpuBackend};

    fn device() -> (Arc<DummyBackend>, Arc<GraphicsDevice>) {
        let backend = Arc::new(DummyBackend::new());
        let device = GraphicsDevice::new(Arc::clone(&backend) as Arc<dyn GpuBackend>);
        (backend, device)
    }

    #[test]
    fn test_buffer_is_padded_and_transitioned() {
        let (backend, device) = device();
        let mut batch = UploadBatch::new(&device, "test").unwrap();
        let buffer = batch
            .upload_buffer(&[1, 2, 3, 4, 5], BufferUsage::VERTEX, "vertices")
            .unwrap();
        assert_eq!(buffer.size(), 8);
        assert_eq!(batch.staged_bytes(), 8);

        batch.submit().unwrap().finish().unwrap();
        assert_eq!(backend.resource_state(buffer.id()), Some(UPLOADED_BUFFER_STATE));
        assert_eq!(
            backend.buffer_contents(buffer.id()).unwrap(),
            vec![1, 2, 3, 4, 5, 0, 0, 0]
        );
    }

    #[test]
    fn test_rgb_image_is_expanded() {
        let (_backend, device) = device();
        let image = DocumentImage {
            name: None,
            width: 2,
            height: 1,
            components: 3,
            pixels: vec![10, 20, 30, 40, 50, 60],
        };
        let mut batch = UploadBatch::new(&device, "test").unwrap();
        let texture = batch.upload_image(&image, "rgb").unwrap();
        assert_eq!(texture.format(), TextureFormat::Rgba8Unorm);
        batch.submit().unwrap().finish().unwrap();

        let rows = read_back_texture(&device, &texture, UPLOADED_TEXTURE_STATE).unwrap();
        assert_eq!(rows, vec![10, 20, 30, 255, 40, 50, 60, 255]);
    }

    #[test]
    fn test_image_size_mismatch_is_rejected() {
        let (_backend, device) = device();
        let image = DocumentImage {
            name: None,
            width: 4,
            height: 4,
            components: 4,
            pixels: vec![0; 10],
        };
        let mut batch = UploadBatch::new(&device, "test").unwrap();
        assert!(matches!(
            batch.upload_image(&image, "broken"),
            Err(GraphicsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_reading_before_finish_is_a_hazard() {
        let backend = Arc::new(DummyBackend::new());
        let device = GraphicsDevice::new(Arc::clone(&backend) as Arc<dyn GpuBackend>);
        let mut batch = UploadBatch::new(&device, "test").unwrap();
        let buffer = batch.upload_buffer(&[7; 16], BufferUsage::VERTEX, "early").unwrap();
        let pending = batch.submit().unwrap();

        // The direct queue touches the destination before the copy fence
        // was observed.
        let allocator = device.create_command_allocator(QueueKind::Direct, "early");
        let mut list = device
            .create_command_list(QueueKind::Direct, &allocator, "early")
            .unwrap();
        list.transition(&buffer, ResourceState::CopyDest, UPLOADED_BUFFER_STATE);
        list.close().unwrap();
        assert!(matches!(
            device.direct_queue().execute_command_lists(&[&list]),
            Err(GraphicsError::Hazard(_))
        ));

        pending.finish().unwrap();
    }
}
