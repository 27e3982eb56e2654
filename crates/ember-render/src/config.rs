//! Renderer configuration.

use ash::vk;
use std::path::PathBuf;
use std::time::Duration;

/// Number of frames that may be in flight on the GPU at once.
pub const FRAME_OVERLAP: usize = 2;

/// Edge length of the background compute shaders' square workgroup.
pub const WORKGROUP_SIZE: u32 = 16;

/// Renderer configuration.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Application name reported to the driver.
    pub app_name: String,
    /// Format of the off-screen draw target.
    pub draw_format: vk::Format,
    /// Bound on the wait for a frame slot's fence.
    pub fence_timeout: Duration,
    /// Bound on the wait for a swapchain image.
    pub acquire_timeout: Duration,
    /// Bound on the wait for an immediate submission.
    pub immediate_timeout: Duration,
    /// Directory holding the compiled `.spv` shaders.
    pub shader_dir: PathBuf,
    /// Enable Vulkan validation layers.
    pub validation: bool,
    /// Present with FIFO.
    pub vsync: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            app_name: "Ember".to_string(),
            draw_format: vk::Format::R16G16B16A16_SFLOAT,
            fence_timeout: Duration::from_secs(1),
            acquire_timeout: Duration::from_secs(1),
            immediate_timeout: Duration::from_secs(1),
            shader_dir: PathBuf::from("shaders"),
            validation: cfg!(debug_assertions),
            vsync: true,
        }
    }
}

impl RendererConfig {
    /// Set the application name.
    #[must_use]
    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Set the shader directory.
    #[must_use]
    pub fn with_shader_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shader_dir = dir.into();
        self
    }

    /// Enable or disable validation layers.
    #[must_use]
    pub const fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Enable or disable vsync.
    #[must_use]
    pub const fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }
}
