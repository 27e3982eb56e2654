//! `EmberApp` trait definition.

use crate::context::AppContext;
use ember_render::UiOverlay;
use winit::event::WindowEvent;
use winit::window::Window;

/// Trait for Ember applications.
///
/// The framework owns the window and renderer, draws one frame per redraw
/// and recreates the swapchain when needed. The application supplies the
/// overlay drawn on top of each frame and may edit renderer state.
pub trait EmberApp: Sized {
    /// Initialize the application.
    ///
    /// Called once after the window and renderer have been created.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Update application state before a frame is drawn.
    ///
    /// Default implementation does nothing.
    #[allow(unused_variables)]
    fn update(&mut self, ctx: &mut AppContext, dt: f32) {}

    /// The overlay drawn over every presented frame.
    fn overlay(&mut self) -> &mut dyn UiOverlay;

    /// Handle window events.
    ///
    /// Return `true` if the event was consumed and should not be processed
    /// further. Default implementation returns `false`.
    #[allow(unused_variables)]
    fn on_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        false
    }

    /// Called after the swapchain has been recreated.
    ///
    /// Default implementation does nothing.
    #[allow(unused_variables)]
    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Release GPU resources before the renderer is torn down.
    ///
    /// The GPU is idle when this is called. Default implementation does nothing.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
