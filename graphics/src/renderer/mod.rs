//! The scene renderer.
//!
//! [`SceneRenderer`] ties the scene components to a frame loop:
//!
//! ```ignore
//! let mut renderer = SceneRenderer::new(device, compiler, RendererConfig::new());
//! renderer.set_window(window)?;
//! renderer.init(&document)?;
//! loop {
//!     renderer.update(dt)?;
//!     let report = renderer.render()?;
//! }
//! ```
//!
//! Failures fall into three classes: [`InitError`] aborts initialization,
//! [`AssetError`] skips one asset and is recorded in [`Diagnostics`], and
//! [`FrameError`] abandons one frame while keeping the rotation intact.

mod config;
mod error;

use std::path::PathBuf;
use std::sync::Arc;

use renderlab_core::codec::write_png;
use renderlab_core::scene::{SceneDocument, SceneNode};

use crate::backend::WindowTarget;
use crate::command::{CommandAllocator, CommandList, QueueKind};
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::frame::{FrameRotator, FrameTargets, SubmitError};
use crate::resources::{Buffer, Texture};
use crate::scene::{
    CAMERA_PARAMETER, DEPTH_FORMAT, GpuMesh, GpuPrimitive, MATERIAL_PARAMETER, MaterialBank,
    MeshBuilder, NODE_PARAMETER, NodeBuffers, OrbitCamera, PipelineCache, ResourceTable,
    SAMPLER_TABLE_PARAMETER, TEXTURE_TABLE_PARAMETER, UploadBatch, create_camera_buffer,
    write_camera,
};
use crate::shader::ShaderCompiler;
use crate::types::{ResourceState, ScissorRect, TextureFormat, Viewport};

pub use config::{OutputMode, RendererConfig};
pub use error::{AssetError, Diagnostic, DiagnosticKind, Diagnostics, FrameError, InitError};

/// Color format of headless frames.
pub const READBACK_COLOR_FORMAT: TextureFormat = TextureFormat::Rgba32Float;

/// Outcome of one rendered frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameReport {
    pub frame: u64,
    pub slot: usize,
    pub draws: usize,
    /// Primitives reached by the traversal but not drawn.
    pub skipped: usize,
    /// The PNG written in readback mode.
    pub image_path: Option<PathBuf>,
}

/// Everything built by `init()`.
struct SceneState {
    graph: Vec<SceneNode>,
    roots: Vec<usize>,
    table: ResourceTable,
    materials: MaterialBank,
    meshes: Vec<GpuMesh>,
    pipelines: PipelineCache,
    nodes: NodeBuffers,
    camera_buffer: Arc<Buffer>,
    frames: FrameRotator,
    readback: Option<ReadbackStream>,
    depth_limit_reported: bool,
}

/// Copy-queue list used to read frames back.
struct ReadbackStream {
    allocator: Arc<CommandAllocator>,
    list: CommandList,
}

#[derive(Debug, Default)]
struct TraversalStats {
    draws: usize,
    skipped: usize,
    too_deep: Option<usize>,
}

/// Read-only inputs of the draw traversal.
struct DrawContext<'a> {
    graph: &'a [SceneNode],
    meshes: &'a [GpuMesh],
    materials: &'a MaterialBank,
    nodes: &'a NodeBuffers,
    camera_buffer: &'a Arc<Buffer>,
    max_depth: usize,
}

/// Renders a glTF scene with an orbiting camera.
pub struct SceneRenderer {
    device: Arc<GraphicsDevice>,
    compiler: Arc<dyn ShaderCompiler>,
    config: RendererConfig,
    window: Option<Arc<dyn WindowTarget>>,
    camera: OrbitCamera,
    diagnostics: Diagnostics,
    scene: Option<SceneState>,
    destroyed: bool,
}

impl SceneRenderer {
    pub fn new(
        device: Arc<GraphicsDevice>,
        compiler: Arc<dyn ShaderCompiler>,
        config: RendererConfig,
    ) -> Self {
        let camera = OrbitCamera::new(config.orbit, config.width, config.height);
        Self {
            device,
            compiler,
            config,
            window: None,
            camera,
            diagnostics: Diagnostics::new(),
            scene: None,
            destroyed: false,
        }
    }

    pub fn width(&self) -> u32 {
        self.config.width
    }

    pub fn height(&self) -> u32 {
        self.config.height
    }

    pub fn title(&self) -> &str {
        &self.config.title
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn device(&self) -> &Arc<GraphicsDevice> {
        &self.device
    }

    pub fn camera(&self) -> &OrbitCamera {
        &self.camera
    }

    /// Warnings collected so far.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn is_initialized(&self) -> bool {
        self.scene.is_some()
    }

    /// Number of frames submitted.
    pub fn frame_number(&self) -> u64 {
        self.scene.as_ref().map_or(0, |s| s.frames.frame())
    }

    /// Number of times a frame had to wait for its slot's fence.
    pub fn fence_waits(&self) -> u64 {
        self.scene.as_ref().map_or(0, |s| s.frames.fence_waits())
    }

    /// Meshes built by `init()`.
    pub fn meshes(&self) -> &[GpuMesh] {
        self.scene
            .as_ref()
            .map(|s| s.meshes.as_slice())
            .unwrap_or_default()
    }

    /// Number of distinct pipeline-state objects built by `init()`.
    pub fn pipeline_count(&self) -> usize {
        self.scene
            .as_ref()
            .map_or(0, |s| s.pipelines.pipeline_count())
    }

    /// Uploaded document buffers and textures, once initialized.
    pub fn resource_table(&self) -> Option<&ResourceTable> {
        self.scene.as_ref().map(|s| &s.table)
    }

    /// The camera constant buffer, once initialized.
    pub fn camera_buffer(&self) -> Option<&Arc<Buffer>> {
        self.scene.as_ref().map(|s| &s.camera_buffer)
    }

    /// Constant buffer of a document node, once initialized.
    pub fn node_buffer(&self, node: usize) -> Option<&Arc<Buffer>> {
        self.scene.as_ref().and_then(|s| s.nodes.get(node))
    }

    /// Color target of a frame slot, once initialized.
    pub fn color_target(&self, slot: usize) -> Option<&Arc<Texture>> {
        self.scene
            .as_ref()
            .and_then(|s| s.frames.slot(slot))
            .map(|s| &s.color)
    }

    /// Set the window presented to. Must be called before `init()`.
    pub fn set_window(&mut self, window: Arc<dyn WindowTarget>) -> Result<(), InitError> {
        if self.scene.is_some() {
            return Err(InitError::AlreadyInitialized);
        }
        self.window = Some(window);
        Ok(())
    }

    /// Upload `document` and build everything needed to draw it.
    ///
    /// Assets that fail to build are skipped and recorded in
    /// [`diagnostics`](Self::diagnostics).
    pub fn init(&mut self, document: &SceneDocument) -> Result<(), InitError> {
        if self.scene.is_some() {
            return Err(InitError::AlreadyInitialized);
        }
        self.config.validate()?;

        let color_format = match &self.config.output {
            OutputMode::Present => {
                let window = self.window.clone().ok_or_else(|| {
                    InitError::InvalidConfig("present output needs a window".into())
                })?;
                self.device
                    .configure_surface(window, self.config.width, self.config.height)
                    .map_err(InitError::Surface)?
            }
            OutputMode::Readback { .. } => READBACK_COLOR_FORMAT,
        };

        let mut batch = UploadBatch::new(&self.device, "scene upload")
            .map_err(resource_error("scene upload list"))?;
        let table = ResourceTable::stage(document, &mut batch)?;
        let mut meshes = MeshBuilder::new(document, &table, *self.device.capabilities())
            .build_all(&mut batch, &mut self.diagnostics);
        let staged = batch.staged_bytes();
        batch
            .submit()
            .and_then(|pending| pending.finish())
            .map_err(|source| InitError::Upload {
                resource: "scene".into(),
                source,
            })?;

        let materials = MaterialBank::build(&self.device, document, &table, &mut self.diagnostics)
            .map_err(resource_error("material bank"))?;

        let mut pipelines = PipelineCache::new(
            Arc::clone(&self.device),
            Arc::clone(&self.compiler),
            self.config.shader_path.clone(),
            color_format,
        );
        pipelines.prepare_meshes(&mut meshes, &materials, &mut self.diagnostics);

        let nodes =
            NodeBuffers::build(&self.device, document).map_err(resource_error("node constants"))?;
        let camera_buffer =
            create_camera_buffer(&self.device).map_err(resource_error("camera constants"))?;
        write_camera(&self.device, &camera_buffer, &self.camera)
            .map_err(resource_error("camera constants"))?;

        let headless = self.config.is_headless();
        let frames = FrameRotator::new(
            Arc::clone(&self.device),
            FrameTargets {
                width: self.config.width,
                height: self.config.height,
                color_format,
                depth_format: DEPTH_FORMAT,
                readback: headless,
            },
            self.config.frame_count,
        )
        .map_err(resource_error("frame targets"))?;
        let readback = if headless {
            Some(self.create_readback_stream().map_err(resource_error("readback list"))?)
        } else {
            None
        };

        let roots = match document.active_scene() {
            Some(scene) => scene.nodes.clone(),
            None => {
                log::info!("SceneRenderer: document has no scene, frames will be empty");
                Vec::new()
            }
        };

        log::info!(
            "SceneRenderer initialized: {} KiB uploaded, {} meshes, {} materials, {} pipelines, {} frames of {}x{} {:?}",
            staged / 1024,
            meshes.len(),
            materials.len(),
            pipelines.pipeline_count(),
            frames.frame_count(),
            self.config.width,
            self.config.height,
            color_format
        );

        self.scene = Some(SceneState {
            graph: document.nodes.clone(),
            roots,
            table,
            materials,
            meshes,
            pipelines,
            nodes,
            camera_buffer,
            frames,
            readback,
            depth_limit_reported: false,
        });
        Ok(())
    }

    fn create_readback_stream(&self) -> Result<ReadbackStream, GraphicsError> {
        let allocator = self
            .device
            .create_command_allocator(QueueKind::Copy, "frame readback allocator");
        let mut list =
            self.device
                .create_command_list(QueueKind::Copy, &allocator, "frame readback")?;
        list.close()?;
        Ok(ReadbackStream { allocator, list })
    }

    /// Advance the orbit by `dt` seconds and write the camera constants.
    ///
    /// Every frame reads the same camera buffer, so this blocks until the
    /// last direct submission has completed before overwriting it.
    pub fn update(&mut self, dt: f32) -> Result<(), FrameError> {
        let scene = self.scene.as_ref().ok_or(FrameError::NotInitialized)?;
        let queue = self.device.direct_queue();
        let last = queue.last_signaled_value();
        if !queue.fence().is_reached(last) {
            self.device
                .wait_for_fence_value(queue.fence(), last)
                .map_err(FrameError::Camera)?;
        }
        self.camera.advance(dt);
        write_camera(&self.device, &scene.camera_buffer, &self.camera).map_err(FrameError::Camera)
    }

    /// Record, submit and output one frame.
    pub fn render(&mut self) -> Result<FrameReport, FrameError> {
        let result = self.render_frame();
        if let Err(e) = &result {
            log::error!("Abandoned frame: {e}");
        }
        result
    }

    fn render_frame(&mut self) -> Result<FrameReport, FrameError> {
        let scene = self.scene.as_mut().ok_or(FrameError::NotInitialized)?;
        let SceneState {
            graph,
            roots,
            materials,
            meshes,
            nodes,
            camera_buffer,
            frames,
            readback,
            depth_limit_reported,
            ..
        } = scene;

        let frame = frames.frame();
        let (frame, slot_index) = frames
            .begin_frame()
            .map_err(|source| FrameError::Rotation { frame, source })?;
        let slot = frames.current_slot();
        let color = Arc::clone(&slot.color);
        let depth = Arc::clone(&slot.depth);
        let readback_buffer = slot.readback.clone();

        let context = DrawContext {
            graph: graph.as_slice(),
            meshes: meshes.as_slice(),
            materials: &*materials,
            nodes: &*nodes,
            camera_buffer: &*camera_buffer,
            max_depth: self.config.max_depth,
        };
        let (width, height) = (self.config.width, self.config.height);
        let list = frames.list();
        list.set_viewport(Viewport::full(width, height));
        list.set_scissor_rect(ScissorRect::full(width, height));
        list.transition(&color, ResourceState::Common, ResourceState::RenderTarget);
        list.set_render_targets(Some(&color), Some(&depth));
        list.clear_render_target(&color, self.config.clear_color);
        list.clear_depth_stencil(&depth, 1.0);

        let mut stats = TraversalStats::default();
        for &root in roots.iter() {
            record_node(list, &context, root, 0, &mut stats);
        }
        list.transition(&color, ResourceState::RenderTarget, ResourceState::Common);

        if let Some(node) = stats.too_deep
            && !*depth_limit_reported
        {
            *depth_limit_reported = true;
            self.diagnostics.unsupported(format!(
                "node {node} is nested deeper than {} levels, the graph may be cyclic; skipping it",
                self.config.max_depth
            ));
        }

        let value = frames.submit().map_err(|e| match e {
            SubmitError::Record(source) => FrameError::Record { frame, source },
            SubmitError::Execute(source) => FrameError::Submit { frame, source },
        })?;
        log::trace!(
            "Frame {frame}: slot {slot_index}, {} draws, {} skipped, fence {value}",
            stats.draws,
            stats.skipped
        );

        let image_path = match (&self.config.output, readback, readback_buffer) {
            (OutputMode::Readback { directory }, Some(stream), Some(buffer)) => {
                let pixels = read_back_frame(&self.device, stream, &color, &buffer, value)
                    .map_err(|source| FrameError::Readback { frame, source })?;
                let path = directory.join(format!("output{frame}.png"));
                write_png(&path, width, height, 4, &pixels).map_err(|source| {
                    FrameError::Encode {
                        frame,
                        path: path.clone(),
                        source,
                    }
                })?;
                Some(path)
            }
            _ => {
                self.device
                    .present(&color)
                    .map_err(|source| FrameError::Present { frame, source })?;
                None
            }
        };

        Ok(FrameReport {
            frame,
            slot: slot_index,
            draws: stats.draws,
            skipped: stats.skipped,
            image_path,
        })
    }

    /// Wait for both queues to drain. Resources are released on drop.
    pub fn destroy(&mut self) -> Result<(), GraphicsError> {
        if self.destroyed {
            return Ok(());
        }
        self.destroyed = true;
        let result = self.device.wait_idle();
        self.scene = None;
        log::info!("SceneRenderer destroyed");
        result
    }
}

impl Drop for SceneRenderer {
    fn drop(&mut self) {
        if let Err(e) = self.destroy() {
            log::error!("Failed to drain queues on drop: {e}");
        }
    }
}

impl std::fmt::Debug for SceneRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneRenderer")
            .field("config", &self.config)
            .field("initialized", &self.scene.is_some())
            .field("diagnostics", &self.diagnostics.len())
            .finish_non_exhaustive()
    }
}

fn resource_error(resource: &'static str) -> impl Fn(GraphicsError) -> InitError {
    move |source| InitError::Resource {
        resource: resource.to_string(),
        source,
    }
}

/// Pre-order draw traversal. Parent transforms are not applied to children.
fn record_node(
    list: &mut CommandList,
    context: &DrawContext<'_>,
    node_index: usize,
    depth: usize,
    stats: &mut TraversalStats,
) {
    if depth > context.max_depth {
        stats.too_deep.get_or_insert(node_index);
        return;
    }
    let Some(node) = context.graph.get(node_index) else {
        log::warn!("Skipping dangling node index {node_index}");
        return;
    };

    if let Some(mesh) = node.mesh.and_then(|m| context.meshes.get(m)) {
        stats.skipped += mesh.skipped;
        match context.nodes.get(node_index) {
            Some(node_buffer) => {
                for primitive in &mesh.primitives {
                    if record_primitive(list, context, node_buffer, primitive) {
                        stats.draws += 1;
                    } else {
                        stats.skipped += 1;
                    }
                }
            }
            None => stats.skipped += mesh.primitives.len(),
        }
    }

    for &child in &node.children {
        record_node(list, context, child, depth + 1, stats);
    }
}

/// Bind everything `primitive` needs and draw it. Returns false if the
/// primitive has no pipeline.
fn record_primitive(
    list: &mut CommandList,
    context: &DrawContext<'_>,
    node_buffer: &Arc<Buffer>,
    primitive: &GpuPrimitive,
) -> bool {
    let Some(pipeline) = &primitive.pipeline else {
        return false;
    };

    list.set_pipeline_state(&pipeline.pipeline_state);
    list.set_graphics_root_signature(&pipeline.root_signature);
    list.set_primitive_topology(primitive.topology);
    list.set_vertex_buffers(0, primitive.vertex_buffers());
    list.set_index_buffer(primitive.index_buffer.as_ref());
    list.set_graphics_root_constant_buffer_view(CAMERA_PARAMETER, context.camera_buffer);
    list.set_graphics_root_constant_buffer_view(NODE_PARAMETER, node_buffer);
    if let Some(material) = primitive.material.and_then(|m| context.materials.get(m)) {
        list.set_graphics_root_constant_buffer_view(MATERIAL_PARAMETER, &material.constant_buffer);
        list.set_graphics_root_descriptor_table(TEXTURE_TABLE_PARAMETER, &material.texture_table);
        list.set_graphics_root_descriptor_table(SAMPLER_TABLE_PARAMETER, &material.sampler_table);
    }

    if primitive.is_indexed() {
        list.draw_indexed_instanced(primitive.index_count, 1, 0, 0, 0);
    } else {
        list.draw_instanced(primitive.vertex_count, 1, 0, 0);
    }
    true
}

/// Copy a finished frame into its readback buffer on the copy queue and
/// convert it to 8-bit RGBA.
fn read_back_frame(
    device: &GraphicsDevice,
    stream: &mut ReadbackStream,
    color: &Arc<Texture>,
    buffer: &Arc<Buffer>,
    frame_value: u64,
) -> Result<Vec<u8>, GraphicsError> {
    device.wait_for_fence_value(device.direct_queue().fence(), frame_value)?;

    stream.allocator.reset()?;
    stream.list.reset(&stream.allocator)?;
    let footprint = color.footprint();
    stream.list.copy_texture_to_buffer(buffer, footprint, color);
    stream.list.close()?;

    let queue = device.copy_queue();
    queue.execute_command_lists(&[&stream.list])?;
    let value = queue.signal()?;
    device.wait_for_fence_value(queue.fence(), value)?;

    let placed = device.read_buffer(buffer, 0, buffer.size())?;
    let mut pixels = Vec::with_capacity(footprint.width as usize * footprint.height as usize * 4);
    for y in 0..footprint.height {
        let row = &placed[footprint.row_range(y)];
        pixels.extend(row.chunks_exact(4).map(|c| {
            let v = f32::from_le_bytes([c[0], c[1], c[2], c[3]]);
            (v * 255.0) as u8
        }));
    }
    Ok(pixels)
}
