//! # Headless Orbit
//!
//! Renders a model offscreen and writes every frame as `output{N}.png`.
//!
//! ```text
//! headless_orbit Cube/Cube.gltf --frames 36 --dt 1.0 --output frames
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use renderlab_demos::{DemoArgs, init_logging};
use renderlab_graphics::{GlslShaderCompiler, SceneRenderer};

#[derive(Debug, Parser)]
#[command(about = "Render a glTF model offscreen and write the frames as PNG files")]
struct Args {
    #[command(flatten)]
    demo: DemoArgs,

    /// Number of frames to render.
    #[arg(long, default_value_t = 8)]
    frames: u64,

    /// Simulated seconds between frames.
    #[arg(long, default_value_t = 1.0 / 60.0)]
    dt: f32,

    /// Directory the PNG files are written into.
    #[arg(long, default_value = "output")]
    output: PathBuf,
}

fn main() -> ExitCode {
    init_logging();
    let args = Args::parse();

    let document = match args.demo.load_document() {
        Ok(document) => document,
        Err(e) => {
            log::error!("Failed to load model: {e}");
            return ExitCode::FAILURE;
        }
    };
    let device = match args.demo.create_device() {
        Ok(device) => device,
        Err(e) => {
            log::error!("Failed to create device: {e}");
            return ExitCode::FAILURE;
        }
    };

    let config = args
        .demo
        .renderer_config()
        .with_title("RenderLab - Headless Orbit")
        .with_readback(&args.output);
    let mut renderer = SceneRenderer::new(device, Arc::new(GlslShaderCompiler::new()), config);
    if let Err(e) = renderer.init(&document) {
        log::error!("Failed to initialize renderer: {e}");
        return ExitCode::FAILURE;
    }
    for diagnostic in renderer.diagnostics().entries() {
        log::debug!("{:?}: {}", diagnostic.kind, diagnostic.message);
    }

    let mut failed = 0;
    for _ in 0..args.frames {
        if let Err(e) = renderer.update(args.dt) {
            log::error!("Camera update failed: {e}");
            return ExitCode::FAILURE;
        }
        match renderer.render() {
            Ok(report) => {
                if let Some(path) = &report.image_path {
                    log::info!(
                        "Frame {}: {} draws, {} skipped -> {}",
                        report.frame,
                        report.draws,
                        report.skipped,
                        path.display()
                    );
                }
            }
            // Already logged by the renderer.
            Err(_) => failed += 1,
        }
    }

    if let Err(e) = renderer.destroy() {
        log::error!("Failed to drain queues: {e}");
    }
    log::info!(
        "Rendered {} of {} frames into {}",
        args.frames - failed,
        args.frames,
        args.output.display()
    );
    if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
