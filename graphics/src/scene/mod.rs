//! GPU-side scene data built from a [`SceneDocument`].
//!
//! Initialization runs in this order:
//!
//! 1. [`ResourceTable`] stages every document buffer and image into an
//!    [`UploadBatch`], and [`MeshBuilder`] turns meshes into
//!    [`GpuMesh`]es over those buffers.
//! 2. The batch is submitted on the copy queue. [`PendingUpload::finish`]
//!    waits for the copy fence and transitions the uploads on the direct
//!    queue.
//! 3. [`MaterialBank`] builds blend, rasterizer, constants and descriptor
//!    tables per material.
//! 4. [`PipelineCache`] attaches a pipeline to every primitive.
//! 5. [`NodeBuffers`] and the [`OrbitCamera`] buffer are created.
//!
//! [`SceneDocument`]: renderlab_core::scene::SceneDocument

mod camera;
mod material_bank;
mod mesh;
mod nodes;
mod pipeline_cache;
mod resource_table;
mod upload;

pub use camera::{
    CAMERA_BUFFER_SIZE, CameraConstants, OrbitCamera, OrbitParams, create_camera_buffer,
    write_camera,
};
pub use material_bank::{
    ABSENT_SLOTS, BASE_COLOR_SLOT, GpuMaterial, MATERIAL_BUFFER_SIZE, MATERIAL_TABLE_SIZE,
    METALLIC_ROUGHNESS_SLOT, MaterialBank, MaterialConstants, address_mode_from_gl, blend_state,
    filter_from_gl, rasterizer_state, sampler_descriptor,
};
pub use mesh::{
    GpuMesh, GpuPrimitive, MeshBuilder, PrimitiveId, VertexAttribute, topology_for_mode,
    vertex_format,
};
pub use nodes::{NODE_BUFFER_SIZE, NodeBuffers, NodeConstants};
pub use pipeline_cache::{
    CAMERA_PARAMETER, DEPTH_FORMAT, MATERIAL_PARAMETER, NODE_PARAMETER, PipelineCache,
    PrimitivePipeline, SAMPLER_TABLE_PARAMETER, TEXTURE_TABLE_PARAMETER, input_layout,
    root_signature_descriptor,
};
pub use resource_table::ResourceTable;
pub use upload::{
    COPY_GRANULARITY, PendingUpload, UPLOADED_BUFFER_STATE, UPLOADED_TEXTURE_STATE, UploadBatch,
    read_back_buffer, read_back_texture,
};
