//! Upload and readback integration tests.
//!
//! Buffer tests run on every available backend; unavailable backends are
//! skipped. Image tests run on the dummy backend.
//!
//! Run with: `cargo test -p renderlab-graphics --test upload_tests`

mod common;

use renderlab_core::scene::DocumentImage;
use renderlab_graphics::scene::{
    ResourceTable, UPLOADED_BUFFER_STATE, UPLOADED_TEXTURE_STATE, UploadBatch, read_back_buffer,
    read_back_texture,
};
use renderlab_graphics::{BufferUsage, InitError};
use rstest::rstest;

use common::*;

// ============================================================================
// Buffers
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::wgpu(Backend::Wgpu)]
fn test_uploaded_buffer_reads_back_identical(#[case] backend: Backend) {
    init_logging();
    let Some(device) = backend.create_device() else {
        eprintln!("Skipping: {backend:?} backend not available");
        return;
    };

    let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
    let mut batch = UploadBatch::new(&device, "roundtrip").unwrap();
    let buffer = batch
        .upload_buffer(&data, BufferUsage::VERTEX | BufferUsage::COPY_SRC, "roundtrip")
        .unwrap();
    batch.submit().unwrap().finish().unwrap();
    device.wait_idle().unwrap();

    let read = read_back_buffer(&device, &buffer, UPLOADED_BUFFER_STATE, data.len() as u64)
        .unwrap();
    assert_eq!(read, data);
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::wgpu(Backend::Wgpu)]
fn test_unaligned_buffer_is_padded(#[case] backend: Backend) {
    let Some(device) = backend.create_device() else {
        eprintln!("Skipping: {backend:?} backend not available");
        return;
    };

    let mut batch = UploadBatch::new(&device, "padded").unwrap();
    let buffer = batch
        .upload_buffer(&[9, 8, 7], BufferUsage::INDEX | BufferUsage::COPY_SRC, "padded")
        .unwrap();
    assert_eq!(buffer.size(), 4);
    batch.submit().unwrap().finish().unwrap();
    device.wait_idle().unwrap();

    let read = read_back_buffer(&device, &buffer, UPLOADED_BUFFER_STATE, 4).unwrap();
    assert_eq!(read, vec![9, 8, 7, 0]);
}

#[test]
fn test_upload_waits_on_copy_fence() {
    let (backend, device) = deferred_dummy_device();
    let mut batch = UploadBatch::new(&device, "deferred").unwrap();
    let buffer = batch
        .upload_buffer(&[1, 2, 3, 4], BufferUsage::VERTEX, "deferred")
        .unwrap();
    let pending = batch.submit().unwrap();
    assert_eq!(pending.fence_value(), 1);
    assert!(backend.buffer_contents(buffer.id()).is_none_or(|c| c != [1, 2, 3, 4]));

    pending.finish().unwrap();
    assert_eq!(backend.buffer_contents(buffer.id()).unwrap(), vec![1, 2, 3, 4]);
    assert_eq!(backend.waits().len(), 1);
    assert_eq!(backend.waits()[0].value, 1);
}

// ============================================================================
// Images
// ============================================================================

#[test]
fn test_uploaded_image_reads_back_identical() {
    let (_backend, device) = dummy_device();
    let pixels: Vec<u8> = (0..5 * 3 * 4).map(|i| (i * 7 % 256) as u8).collect();
    let image = DocumentImage::rgba8(5, 3, pixels.clone());

    let mut batch = UploadBatch::new(&device, "image").unwrap();
    let texture = batch.upload_image(&image, "image").unwrap();
    batch.submit().unwrap().finish().unwrap();

    let read = read_back_texture(&device, &texture, UPLOADED_TEXTURE_STATE).unwrap();
    assert_eq!(read, pixels);
}

#[test]
fn test_resource_table_mirrors_document_order() {
    let (backend, device) = dummy_device();
    let mut document = quad_document(renderlab_core::scene::AlphaMode::Opaque);
    document.add_image(DocumentImage::rgba8(1, 1, vec![1, 2, 3, 4]));

    let mut batch = UploadBatch::new(&device, "table").unwrap();
    let table = ResourceTable::stage(&document, &mut batch).unwrap();
    batch.submit().unwrap().finish().unwrap();

    assert_eq!(table.buffers().len(), document.buffers.len());
    assert_eq!(table.textures().len(), 1);
    for (buffer, data) in table.buffers().iter().zip(&document.buffers) {
        let contents = backend.buffer_contents(buffer.id()).unwrap();
        assert_eq!(&contents[..data.len()], data.as_slice());
        assert_eq!(
            backend.resource_state(buffer.id()),
            Some(UPLOADED_BUFFER_STATE)
        );
    }
}

#[test]
fn test_malformed_image_fails_init() {
    let (_backend, device) = dummy_device();
    let mut document = triangle_document();
    document.add_image(DocumentImage::rgba8(4, 4, vec![0; 3]));

    let mut batch = UploadBatch::new(&device, "bad image").unwrap();
    let result = ResourceTable::stage(&document, &mut batch);
    assert!(matches!(
        result,
        Err(InitError::Upload { ref resource, .. }) if resource == "image 0"
    ));
}
