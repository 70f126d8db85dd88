//! Scene renderer integration tests.
//!
//! Every test runs headless on the dummy backend, which records draws,
//! barriers and fence waits for inspection.
//!
//! Run with: `cargo test -p renderlab-graphics --test renderer_tests`

mod common;

use std::sync::Arc;

use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
};
use renderlab_core::codec::decode_png;
use renderlab_core::scene::{
    AccessorDimensions, AlphaMode, ComponentType, DocumentMaterial, DocumentMesh,
    DocumentPrimitive, Scene, SceneDocument, SceneNode,
};
use renderlab_graphics::scene::{CAMERA_PARAMETER, NODE_PARAMETER};
use renderlab_graphics::types::BlendState;
use renderlab_graphics::{
    DeviceCapabilities, DiagnosticKind, DummyBackend, FrameError, GpuBackend, GraphicsDevice,
    InitError, OutputMode, QueueKind, RendererConfig, SceneRenderer,
};
use rstest::rstest;

use common::*;

/// A window the dummy surface accepts without looking at its handles.
struct HeadlessWindow;

impl HasWindowHandle for HeadlessWindow {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        Err(HandleError::Unavailable)
    }
}

impl HasDisplayHandle for HeadlessWindow {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        Err(HandleError::Unavailable)
    }
}

fn presenting_renderer(
    device: Arc<GraphicsDevice>,
    frame_count: usize,
) -> SceneRenderer {
    let config = RendererConfig::new()
        .with_size(8, 6)
        .with_frame_count(frame_count)
        .with_output(OutputMode::Present);
    let mut renderer = SceneRenderer::new(device, Arc::new(StubCompiler::default()), config);
    renderer.set_window(Arc::new(HeadlessWindow)).unwrap();
    renderer
}

// ============================================================================
// Draw traversal
// ============================================================================

#[test]
fn test_triangle_is_one_draw_of_three_vertices() {
    init_logging();
    let (backend, device) = dummy_device();
    let mut renderer = headless_renderer(device, "triangle");
    renderer.init(&triangle_document()).unwrap();
    assert!(renderer.diagnostics().is_empty());

    let report = renderer.render().unwrap();
    assert_eq!((report.frame, report.slot), (0, 0));
    assert_eq!(report.draws, 1);
    assert_eq!(report.skipped, 0);

    let draws = backend.draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].queue, QueueKind::Direct);
    assert!(!draws[0].indexed);
    assert_eq!((draws[0].count, draws[0].instances), (3, 1));
}

#[test]
fn test_mask_material_is_reported_and_drawn_opaque() {
    init_logging();
    let (backend, device) = dummy_device();
    let mut renderer = headless_renderer(device, "mask");
    renderer.init(&quad_document(AlphaMode::Mask)).unwrap();

    let diagnostics = renderer.diagnostics();
    assert_eq!(diagnostics.count(DiagnosticKind::UnsupportedFeature), 1);
    assert_eq!(diagnostics.count(DiagnosticKind::SkippedAsset), 0);
    assert!(diagnostics.entries()[0].message.contains("MASK"));

    let pipeline = renderer.meshes()[0].primitives[0]
        .pipeline
        .as_ref()
        .expect("quad has a pipeline");
    assert_eq!(*pipeline.pipeline_state.blend(), BlendState::opaque());
    let pipeline_id = pipeline.pipeline_state.id();

    renderer.render().unwrap();
    let draws = backend.draws();
    assert_eq!(draws.len(), 1);
    assert!(draws[0].indexed);
    assert_eq!(draws[0].count, 6);
    assert_eq!(draws[0].pipeline, pipeline_id);
}

#[test]
fn test_blend_material_enables_blending() {
    let (_backend, device) = dummy_device();
    let mut renderer = headless_renderer(device, "blend");
    renderer.init(&quad_document(AlphaMode::Blend)).unwrap();
    assert!(renderer.diagnostics().is_empty());

    let pipeline = renderer.meshes()[0].primitives[0].pipeline.as_ref().unwrap();
    assert!(pipeline.pipeline_state.blend().enabled);
}

#[test]
fn test_blend_without_float_blending_is_reported() {
    let backend = DummyBackend::new().with_capabilities(DeviceCapabilities {
        float32_blendable: false,
        ..DeviceCapabilities::default()
    });
    let device = GraphicsDevice::new(Arc::new(backend) as Arc<dyn GpuBackend>);
    let mut renderer = headless_renderer(device, "blend-unsupported");
    renderer.init(&quad_document(AlphaMode::Blend)).unwrap();

    let diagnostics = renderer.diagnostics();
    assert_eq!(diagnostics.count(DiagnosticKind::UnsupportedFeature), 1);
    assert!(diagnostics.entries()[0].message.contains("BLEND"));
    let pipeline = renderer.meshes()[0].primitives[0].pipeline.as_ref().unwrap();
    assert_eq!(*pipeline.pipeline_state.blend(), BlendState::opaque());
}

#[test]
fn test_parent_is_drawn_before_child_with_its_own_transform() {
    let (backend, device) = dummy_device();
    let mut document = SceneDocument::new();
    let triangle = add_positions(&mut document, &TRIANGLE_POSITIONS);
    let quad = add_positions(&mut document, &QUAD_POSITIONS);
    let quad_indices = add_accessor(
        &mut document,
        bytemuck::cast_slice(&QUAD_INDICES).to_vec(),
        ComponentType::U16,
        AccessorDimensions::Scalar,
        QUAD_INDICES.len(),
    );
    let parent_mesh = document.add_mesh(DocumentMesh {
        name: Some("parent".into()),
        primitives: vec![position_only(triangle)],
    });
    let child_mesh = document.add_mesh(DocumentMesh {
        name: Some("child".into()),
        primitives: vec![DocumentPrimitive {
            indices: Some(quad_indices),
            ..position_only(quad)
        }],
    });

    let mut child_matrix = SceneNode::IDENTITY;
    child_matrix[12] = 2.0;
    let mut parent_matrix = SceneNode::IDENTITY;
    parent_matrix[13] = 3.0;
    // The child comes first in the node list, so list order and draw
    // order differ.
    let child = document.add_node(
        SceneNode::new()
            .with_mesh(child_mesh)
            .with_matrix(child_matrix),
    );
    let parent = document.add_node(
        SceneNode::new()
            .with_mesh(parent_mesh)
            .with_matrix(parent_matrix)
            .with_children(vec![child]),
    );
    document.add_scene(Scene {
        name: None,
        nodes: vec![parent],
    });

    let mut renderer = headless_renderer(device, "pre-order");
    renderer.init(&document).unwrap();
    assert_eq!(renderer.render().unwrap().draws, 2);

    let draws = backend.draws();
    assert_eq!((draws[0].indexed, draws[0].count), (false, 3));
    assert_eq!((draws[1].indexed, draws[1].count), (true, 6));
    let parent_buffer = renderer.node_buffer(parent).unwrap().id();
    let child_buffer = renderer.node_buffer(child).unwrap().id();
    assert_eq!(draws[0].constant_buffer(NODE_PARAMETER), Some(parent_buffer));
    assert_eq!(draws[1].constant_buffer(NODE_PARAMETER), Some(child_buffer));
    let camera = renderer.camera_buffer().unwrap().id();
    assert!(
        draws
            .iter()
            .all(|d| d.constant_buffer(CAMERA_PARAMETER) == Some(camera))
    );

    // The child keeps its local transform; the parent's is not applied.
    let contents = backend.buffer_contents(child_buffer).unwrap();
    let world: [f32; 16] = bytemuck::pod_read_unaligned(&contents[..64]);
    assert_eq!(world, child_matrix);
}

#[test]
fn test_meshless_node_records_no_draws() {
    let (backend, device) = dummy_device();
    let mut document = SceneDocument::new();
    let root = document.add_node(SceneNode::new());
    document.add_scene(Scene {
        name: None,
        nodes: vec![root],
    });

    let mut renderer = headless_renderer(device, "empty-node");
    renderer.init(&document).unwrap();
    let report = renderer.render().unwrap();
    assert_eq!(report.draws, 0);
    assert!(backend.draws().is_empty());
    assert!(report.image_path.is_some());
}

#[test]
fn test_document_without_scene_renders_empty_frames() {
    let (backend, device) = dummy_device();
    let mut document = triangle_document();
    document.scenes.clear();
    document.default_scene = None;

    let mut renderer = headless_renderer(device, "no-scene");
    renderer.init(&document).unwrap();
    assert_eq!(renderer.render().unwrap().draws, 0);
    assert!(backend.draws().is_empty());
}

#[test]
fn test_cyclic_graph_is_cut_and_reported_once() {
    init_logging();
    let (backend, device) = dummy_device();
    let config = headless_config(output_dir("cycle")).with_max_depth(4);
    let mut renderer = SceneRenderer::new(device, Arc::new(StubCompiler::default()), config);
    renderer.init(&cyclic_document()).unwrap();

    let first = renderer.render().unwrap();
    // Node 0 sits at depths 0, 2 and 4.
    assert_eq!(first.draws, 3);
    renderer.render().unwrap();
    assert_eq!(backend.draws().len(), 6);

    let reports = renderer
        .diagnostics()
        .entries()
        .iter()
        .filter(|d| d.message.contains("deeper than 4"))
        .count();
    assert_eq!(reports, 1);
}

#[test]
fn test_failed_shader_skips_only_that_primitive() {
    let (backend, device) = dummy_device();
    let mut document = SceneDocument::new();
    let position = add_positions(&mut document, &TRIANGLE_POSITIONS);
    let material = document.add_material(DocumentMaterial::default());
    let shaded = DocumentPrimitive {
        material: Some(material),
        ..position_only(position)
    };
    let document = with_scene(
        document,
        vec![
            DocumentMesh {
                name: Some("plain".into()),
                primitives: vec![position_only(position)],
            },
            DocumentMesh {
                name: Some("shaded".into()),
                primitives: vec![shaded],
            },
        ],
    );

    let compiler = Arc::new(StubCompiler::failing_on("HAS_MATERIAL"));
    let mut renderer = SceneRenderer::new(
        device,
        compiler,
        headless_config(output_dir("shader-failure")),
    );
    renderer.init(&document).unwrap();
    assert_eq!(
        renderer.diagnostics().count(DiagnosticKind::SkippedAsset),
        1
    );
    assert!(renderer.meshes()[0].primitives[0].is_renderable());
    assert!(!renderer.meshes()[1].primitives[0].is_renderable());

    let report = renderer.render().unwrap();
    assert_eq!(report.draws, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(backend.draws().len(), 1);
}

// ============================================================================
// Camera
// ============================================================================

#[test]
fn test_zero_update_keeps_camera_constants() {
    let (backend, device) = dummy_device();
    let mut renderer = headless_renderer(device, "camera-zero");
    renderer.init(&triangle_document()).unwrap();
    let id = renderer.camera_buffer().unwrap().id();

    let before = backend.buffer_contents(id).unwrap();
    renderer.update(0.0).unwrap();
    assert_eq!(backend.buffer_contents(id).unwrap(), before);

    renderer.update(0.5).unwrap();
    assert_ne!(backend.buffer_contents(id).unwrap(), before);
}

#[test]
fn test_update_waits_for_the_frame_reading_the_camera() {
    let (backend, device) = deferred_dummy_device();
    let mut renderer = presenting_renderer(device, 2);
    renderer.init(&triangle_document()).unwrap();
    let id = renderer.camera_buffer().unwrap().id();

    renderer.render().unwrap();
    assert!(backend.queued_work(QueueKind::Direct) > 0);
    backend.clear_records();
    let before = backend.buffer_contents(id).unwrap();

    renderer.update(1.0).unwrap();
    // The frame signaled direct value 2 and must have run first.
    assert_eq!(
        backend.waits().iter().map(|w| w.value).collect::<Vec<_>>(),
        vec![2]
    );
    assert_eq!(backend.queued_work(QueueKind::Direct), 0);
    assert_ne!(backend.buffer_contents(id).unwrap(), before);

    // Nothing in flight, so a second update does not wait.
    renderer.update(1.0).unwrap();
    assert_eq!(backend.waits().len(), 1);
}

#[test]
fn test_full_orbit_returns_to_start() {
    let (backend, device) = dummy_device();
    let mut renderer = headless_renderer(device, "camera-orbit");
    renderer.init(&triangle_document()).unwrap();
    let id = renderer.camera_buffer().unwrap().id();
    let start = renderer.camera().eye();

    for _ in 0..36 {
        renderer.update(1.0).unwrap();
    }
    let end = renderer.camera().eye();
    assert!((end - start).norm() < 1e-3, "{start:?} vs {end:?}");
    assert!(backend.buffer_contents(id).is_some());
}

// ============================================================================
// Frame rotation
// ============================================================================

#[rstest]
#[case::double_buffered(2)]
#[case::triple_buffered(3)]
fn test_slots_rotate(#[case] frame_count: usize) {
    let (_backend, device) = dummy_device();
    let mut renderer = presenting_renderer(device, frame_count);
    renderer.init(&triangle_document()).unwrap();

    for frame in 0..(frame_count as u64 * 2) {
        let report = renderer.render().unwrap();
        assert_eq!(report.frame, frame);
        assert_eq!(report.slot, frame as usize % frame_count);
        assert!(report.image_path.is_none());
    }
    assert_eq!(renderer.frame_number(), frame_count as u64 * 2);
}

#[test]
fn test_slot_reuse_waits_for_its_fence() {
    let (backend, device) = deferred_dummy_device();
    let mut renderer = presenting_renderer(device, 2);
    renderer.init(&triangle_document()).unwrap();
    backend.clear_records();

    // Deferred queues only run when a fence wait demands it, so every
    // allocator reset from the third frame on must be preceded by a wait.
    for _ in 0..5 {
        renderer.render().unwrap();
    }
    assert_eq!(renderer.fence_waits(), 3);
    let waits = backend.waits();
    // Direct fence value 1 covers the upload transitions.
    assert_eq!(
        waits.iter().map(|w| w.value).collect::<Vec<_>>(),
        vec![2, 3, 4]
    );
    assert_eq!(backend.presents().len(), 5);
}

#[test]
fn test_presented_target_is_in_present_state() {
    let (backend, device) = dummy_device();
    let mut renderer = presenting_renderer(device, 2);
    renderer.init(&triangle_document()).unwrap();
    renderer.render().unwrap();

    let color = renderer.color_target(0).unwrap();
    assert_eq!(backend.presents(), vec![color.id()]);
    assert_eq!(
        backend.resource_state(color.id()),
        Some(renderlab_graphics::ResourceState::PRESENT)
    );
}

// ============================================================================
// Readback
// ============================================================================

#[test]
fn test_readback_writes_clear_color_png() {
    let (_backend, device) = dummy_device();
    let directory = output_dir("png");
    let mut renderer = SceneRenderer::new(
        device,
        Arc::new(StubCompiler::default()),
        headless_config(directory.clone()),
    );
    renderer.init(&SceneDocument::new()).unwrap();

    let first = renderer.render().unwrap();
    let second = renderer.render().unwrap();
    assert_eq!(first.image_path, Some(directory.join("output0.png")));
    assert_eq!(second.image_path, Some(directory.join("output1.png")));

    let bytes = std::fs::read(directory.join("output0.png")).unwrap();
    let image = decode_png(&bytes).unwrap();
    assert_eq!((image.width, image.height, image.components), (8, 6, 4));
    for pixel in image.pixels.chunks_exact(4) {
        assert_eq!(pixel, [0, 51, 102, 255]);
    }

    let _ = std::fs::remove_dir_all(&directory);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_init_twice_fails() {
    let (_backend, device) = dummy_device();
    let mut renderer = headless_renderer(device, "init-twice");
    renderer.init(&triangle_document()).unwrap();
    assert_eq!(
        renderer.init(&triangle_document()),
        Err(InitError::AlreadyInitialized)
    );
    assert_eq!(
        renderer.set_window(Arc::new(HeadlessWindow)),
        Err(InitError::AlreadyInitialized)
    );
}

#[test]
fn test_frame_calls_before_init_fail() {
    let (_backend, device) = dummy_device();
    let mut renderer = headless_renderer(device, "not-initialized");
    assert!(!renderer.is_initialized());
    assert!(matches!(renderer.update(0.1), Err(FrameError::NotInitialized)));
    assert!(matches!(renderer.render(), Err(FrameError::NotInitialized)));
}

#[test]
fn test_present_without_window_is_invalid() {
    let (_backend, device) = dummy_device();
    let mut renderer = SceneRenderer::new(
        device,
        Arc::new(StubCompiler::default()),
        RendererConfig::new(),
    );
    assert!(matches!(
        renderer.init(&triangle_document()),
        Err(InitError::InvalidConfig(_))
    ));
    assert!(!renderer.is_initialized());
}

#[test]
fn test_destroy_drains_queues() {
    let (backend, device) = deferred_dummy_device();
    let mut renderer = presenting_renderer(device, 2);
    renderer.init(&triangle_document()).unwrap();
    renderer.render().unwrap();
    assert!(backend.queued_work(QueueKind::Direct) > 0);

    renderer.destroy().unwrap();
    assert_eq!(backend.queued_work(QueueKind::Direct), 0);
    assert!(!renderer.is_initialized());
    // Second destroy is a no-op.
    renderer.destroy().unwrap();
}
