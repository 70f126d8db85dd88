//! Device-resident copies of a document's buffers and images.

use std::sync::Arc;

use renderlab_core::scene::SceneDocument;

use crate::renderer::InitError;
use crate::resources::{Buffer, Texture};
use crate::types::BufferUsage;

use super::upload::UploadBatch;

/// Usage of uploaded document buffers. A glTF buffer may hold vertices and
/// indices side by side.
const DOCUMENT_BUFFER_USAGE: BufferUsage = BufferUsage::VERTEX
    .union(BufferUsage::INDEX)
    .union(BufferUsage::COPY_SRC);

/// One GPU buffer per document buffer and one GPU texture per document
/// image, indexed like the document.
#[derive(Debug, Default)]
pub struct ResourceTable {
    buffers: Vec<Arc<Buffer>>,
    textures: Vec<Arc<Texture>>,
}

impl ResourceTable {
    /// Stage every buffer and image of `document` into `batch`.
    ///
    /// The resources are unusable until the batch is submitted and
    /// finished.
    pub fn stage(document: &SceneDocument, batch: &mut UploadBatch) -> Result<Self, InitError> {
        let mut buffers = Vec::with_capacity(document.buffers.len());
        for (index, data) in document.buffers.iter().enumerate() {
            let label = format!("buffer {index}");
            let buffer = batch
                .upload_buffer(data, DOCUMENT_BUFFER_USAGE, &label)
                .map_err(|source| InitError::Upload {
                    resource: label,
                    source,
                })?;
            buffers.push(buffer);
        }

        let mut textures = Vec::with_capacity(document.images.len());
        for (index, image) in document.images.iter().enumerate() {
            let label = match &image.name {
                Some(name) => format!("image {index} ({name})"),
                None => format!("image {index}"),
            };
            let texture = batch
                .upload_image(image, &label)
                .map_err(|source| InitError::Upload {
                    resource: label,
                    source,
                })?;
            textures.push(texture);
        }

        log::debug!(
            "ResourceTable: staged {} buffers and {} textures",
            buffers.len(),
            textures.len()
        );
        Ok(Self { buffers, textures })
    }

    pub fn buffer(&self, index: usize) -> Option<&Arc<Buffer>> {
        self.buffers.get(index)
    }

    pub fn texture(&self, index: usize) -> Option<&Arc<Texture>> {
        self.textures.get(index)
    }

    pub fn buffers(&self) -> &[Arc<Buffer>] {
        &self.buffers
    }

    pub fn textures(&self) -> &[Arc<Texture>] {
        &self.textures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyBackend, GpuBackend};
    use crate::device::GraphicsDevice;
    use crate::scene::upload::{UPLOADED_TEXTURE_STATE, read_back_texture};
    use renderlab_core::scene::DocumentImage;

    #[test]
    fn test_table_is_indexed_like_the_document() {
        let backend = Arc::new(DummyBackend::new());
        let device = GraphicsDevice::new(Arc::clone(&backend) as Arc<dyn GpuBackend>);

        let mut document = SceneDocument::new();
        document.add_buffer(vec![1; 12]);
        document.add_buffer(vec![2; 7]);
        document.add_image(DocumentImage::rgba8(1, 1, vec![9, 8, 7, 6]));

        let mut batch = UploadBatch::new(&device, "test").unwrap();
        let table = ResourceTable::stage(&document, &mut batch).unwrap();
        batch.submit().unwrap().finish().unwrap();

        assert_eq!(table.buffers().len(), 2);
        assert_eq!(table.buffer(1).unwrap().size(), 8);
        assert!(table.buffer(2).is_none());
        assert_eq!(
            backend.buffer_contents(table.buffer(0).unwrap().id()).unwrap(),
            vec![1; 12]
        );
        let texels =
            read_back_texture(&device, table.texture(0).unwrap(), UPLOADED_TEXTURE_STATE).unwrap();
        assert_eq!(texels, vec![9, 8, 7, 6]);
    }

    #[test]
    fn test_bad_image_aborts_with_upload_error() {
        let device = GraphicsDevice::new(Arc::new(DummyBackend::new()));
        let mut document = SceneDocument::new();
        document.add_image(DocumentImage {
            name: Some("broken".into()),
            width: 2,
            height: 2,
            components: 4,
            pixels: vec![0; 3],
        });

        let mut batch = UploadBatch::new(&device, "test").unwrap();
        let err = ResourceTable::stage(&document, &mut batch).unwrap_err();
        assert!(matches!(
            err,
            InitError::Upload { ref resource, .. } if resource == "image 0 (broken)"
        ));
    }
}
