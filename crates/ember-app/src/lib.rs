//! Application framework for the Ember renderer.
//!
//! Handles the boilerplate around a [`Renderer`](ember_render::Renderer):
//! - Logging initialization
//! - Window creation
//! - Swapchain recreation on resize and on out-of-date reports
//! - Fatal error reporting
//! - Frame statistics and pacing
//!
//! # Example
//!
//! ```no_run
//! use ember_app::{run_app, AppConfig, AppContext, EmberApp};
//! use ember_render::{NoOverlay, UiOverlay};
//!
//! struct Headless {
//!     overlay: NoOverlay,
//! }
//!
//! impl EmberApp for Headless {
//!     fn init(_ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(Self { overlay: NoOverlay })
//!     }
//!
//!     fn overlay(&mut self) -> &mut dyn UiOverlay {
//!         &mut self.overlay
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<Headless>(AppConfig::default())
//! }
//! ```

mod app;
mod context;
mod runner;

pub use app::EmberApp;
pub use context::AppContext;
pub use runner::{run_app, AppConfig, FrameStats};

// Re-export commonly used types for convenience
pub use ember_gpu::{GpuContext, GpuError};
pub use ember_render::{FrameStatus, Renderer, RendererConfig, UiOverlay};
pub use winit::event::WindowEvent;
pub use winit::window::Window;
