//! Application context.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use ash::vk;
use ember_render::{Renderer, RendererConfig};
use winit::window::Window;

const RENDERER_INIT_FAILED: &str = "Failed to initialize renderer";

/// State shared with every [`EmberApp`](crate::EmberApp) callback.
pub struct AppContext {
    /// The window handle.
    pub window: Arc<Window>,
    /// Renderer drawing into the window.
    pub renderer: Renderer,
    /// Time of last frame (for delta time calculation).
    pub(crate) last_frame_time: Instant,
}

impl AppContext {
    /// Create the renderer for `window`.
    pub(crate) fn new(window: Arc<Window>, config: RendererConfig) -> anyhow::Result<Self> {
        let size = window.inner_size();
        let renderer = Renderer::new(
            window.as_ref(),
            size.width.max(1),
            size.height.max(1),
            config,
        )
        .context(RENDERER_INIT_FAILED)?;

        Ok(Self {
            window,
            renderer,
            last_frame_time: Instant::now(),
        })
    }

    /// Current swapchain extent, or the window size while no swapchain exists.
    pub fn extent(&self) -> vk::Extent2D {
        self.renderer.swapchain_extent().unwrap_or_else(|| {
            let size = self.window.inner_size();
            vk::Extent2D {
                width: size.width,
                height: size.height,
            }
        })
    }

    /// Frames submitted so far.
    pub const fn frame_count(&self) -> u64 {
        self.renderer.frame_number()
    }
}
