//! Hook for an immediate-mode debug UI drawn over the presented image.

use crate::effects::EffectRegistry;
use ash::vk;
use ember_gpu::Result;

/// A UI drawn on top of the swapchain image every frame.
pub trait UiOverlay {
    /// Start a new UI frame, build its widgets and finish it.
    ///
    /// Runs before the frame slot is throttled. Widgets may edit the
    /// background effects.
    fn prepare(&mut self, effects: &mut EffectRegistry) -> Result<()>;

    /// Emit the prepared draw data into `cmd`.
    ///
    /// Called inside a rendering scope targeting the swapchain image.
    fn record(&mut self, cmd: vk::CommandBuffer) -> Result<()>;
}

/// Overlay that draws nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOverlay;

impl UiOverlay for NoOverlay {
    fn prepare(&mut self, _effects: &mut EffectRegistry) -> Result<()> {
        Ok(())
    }

    fn record(&mut self, _cmd: vk::CommandBuffer) -> Result<()> {
        Ok(())
    }
}
