//! # Window Viewer
//!
//! Orbits a model in a window, presenting every frame.
//!
//! ```text
//! window_viewer Cube/Cube.gltf --width 800 --height 600
//! ```

use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use renderlab_core::scene::SceneDocument;
use renderlab_demos::{DemoArgs, init_logging};
use renderlab_graphics::{GlslShaderCompiler, GraphicsDevice, SceneRenderer};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

/// Main application state
struct App {
    args: DemoArgs,
    document: SceneDocument,
    device: Arc<GraphicsDevice>,
    window: Option<Arc<Window>>,
    renderer: Option<SceneRenderer>,
    last_frame: Instant,
}

impl App {
    fn new(args: DemoArgs, document: SceneDocument, device: Arc<GraphicsDevice>) -> Self {
        Self {
            args,
            document,
            device,
            window: None,
            renderer: None,
            last_frame: Instant::now(),
        }
    }

    /// Builds the renderer for the freshly created window.
    fn create_renderer(&self, window: Arc<Window>) -> Option<SceneRenderer> {
        let mut renderer = SceneRenderer::new(
            Arc::clone(&self.device),
            Arc::new(GlslShaderCompiler::new()),
            self.args.renderer_config(),
        );
        if let Err(e) = renderer.set_window(window) {
            log::error!("Failed to attach window: {e}");
            return None;
        }
        match renderer.init(&self.document) {
            Ok(()) => Some(renderer),
            Err(e) => {
                log::error!("Failed to initialize renderer: {e}");
                None
            }
        }
    }

    /// Renders a single frame.
    fn render_frame(&mut self) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;

        if let Err(e) = renderer.update(dt) {
            log::error!("Camera update failed: {e}");
            return;
        }
        // Failed frames are logged by the renderer; the next one retries.
        let _ = renderer.render();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let config = self.args.renderer_config();
        let window_attributes = Window::default_attributes()
            .with_title(config.title.clone())
            .with_inner_size(winit::dpi::PhysicalSize::new(config.width, config.height))
            .with_resizable(false);

        match event_loop.create_window(window_attributes) {
            Ok(window) => {
                log::info!("Window created successfully");
                let window = Arc::new(window);
                self.renderer = self.create_renderer(Arc::clone(&window));
                if self.renderer.is_none() {
                    event_loop.exit();
                    return;
                }
                self.last_frame = Instant::now();
                window.request_redraw();
                self.window = Some(window);
            }
            Err(e) => {
                log::error!("Failed to create window: {}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, exiting...");
                if let Some(mut renderer) = self.renderer.take()
                    && let Err(e) = renderer.destroy()
                {
                    log::error!("Failed to drain queues: {e}");
                }
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                self.render_frame();
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}

fn main() {
    init_logging();
    let args = DemoArgs::parse();

    let document = match args.load_document() {
        Ok(document) => document,
        Err(e) => {
            log::error!("Failed to load model: {e}");
            std::process::exit(1);
        }
    };
    let device = match args.create_device() {
        Ok(device) => device,
        Err(e) => {
            log::error!("Failed to create device: {e}");
            std::process::exit(1);
        }
    };

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            log::error!("Failed to create event loop: {e}");
            std::process::exit(1);
        }
    };
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(args, document, device);
    if let Err(e) = event_loop.run_app(&mut app) {
        log::error!("Event loop error: {e}");
    }
}
