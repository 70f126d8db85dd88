//! wgpu surface implementation.
//!
//! Frames are rendered into the renderer's own color targets. Present
//! copies the finished target onto the current surface texture, so the
//! surface is configured with the same format and `COPY_DST` usage.

use std::sync::Arc;

use crate::error::GraphicsError;
use crate::resources::Texture;
use crate::types::TextureFormat;

use super::super::{GpuTexture, WindowTarget};
use super::WgpuBackend;
use super::conversion::surface_format;

pub(super) struct SurfaceState {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
}

impl WgpuBackend {
    pub(super) fn configure_window_surface(
        &self,
        window: Arc<dyn WindowTarget>,
        width: u32,
        height: u32,
    ) -> Result<TextureFormat, GraphicsError> {
        let surface = self.instance.create_surface(window).map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("Failed to create wgpu surface: {e}"))
        })?;

        let caps = surface.get_capabilities(&self.adapter);
        let (format, wgpu_format) = caps
            .formats
            .iter()
            .find_map(|f| surface_format(*f).map(|ours| (ours, *f)))
            .ok_or_else(|| {
                GraphicsError::FeatureNotSupported(format!(
                    "no 8-bit unorm surface format among {:?}",
                    caps.formats
                ))
            })?;
        if !caps.usages.contains(wgpu::TextureUsages::COPY_DST) {
            return Err(GraphicsError::FeatureNotSupported(
                "surface textures cannot be copy destinations".to_string(),
            ));
        }

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_DST,
            format: wgpu_format,
            width,
            height,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&self.device, &config);
        log::info!("Configured wgpu surface: {width}x{height} {format:?}");

        *self.surface.lock() = Some(SurfaceState { surface, config });
        Ok(format)
    }

    pub(super) fn present_to_surface(&self, texture: &Texture) -> Result<(), GraphicsError> {
        let guard = self.surface.lock();
        let state = guard.as_ref().ok_or_else(|| {
            GraphicsError::InvalidParameter("present without a configured surface".to_string())
        })?;

        let frame = match state.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Outdated) => {
                state.surface.configure(&self.device, &state.config);
                return Err(GraphicsError::SurfaceOutdated);
            }
            Err(wgpu::SurfaceError::Lost) => return Err(GraphicsError::SurfaceLost),
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(GraphicsError::OutOfMemory),
            Err(e) => {
                return Err(GraphicsError::Internal(format!(
                    "Failed to acquire surface texture: {e}"
                )));
            }
        };

        let GpuTexture::Wgpu { texture: source, .. } = texture.handle() else {
            return Err(GraphicsError::Internal(format!(
                "texture '{}' has no wgpu handle",
                texture.debug_name()
            )));
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Present Copy Encoder"),
            });
        encoder.copy_texture_to_texture(
            source.as_image_copy(),
            frame.texture.as_image_copy(),
            wgpu::Extent3d {
                width: texture.width().min(state.config.width),
                height: texture.height().min(state.config.height),
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }
}
