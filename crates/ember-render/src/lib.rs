//! Per-frame GPU command orchestration for the Ember renderer.
//!
//! This crate provides:
//! - A ring of frame slots with fence and semaphore pacing
//! - Layout-checked frame plans: compute background, geometry, blit, overlay
//! - Blocking immediate submission for one-off GPU work
//! - Selectable background compute effects
//! - The windowed [`Renderer`] tying it all to a swapchain

pub mod config;
pub mod device;
pub mod effects;
pub mod frame;
pub mod frame_loop;
pub mod immediate;
pub mod overlay;
pub mod plan;
pub mod renderer;

#[cfg(test)]
mod testing;

pub use config::{RendererConfig, FRAME_OVERLAP, WORKGROUP_SIZE};
pub use device::{FrameDevice, Submission, VulkanFrameDevice};
pub use effects::{BackgroundEffect, ComputePushConstants, EffectRegistry};
pub use frame::FrameSlot;
pub use frame_loop::{FrameLoop, FrameResources, FrameStatus};
pub use immediate::ImmediateSubmit;
pub use overlay::{NoOverlay, UiOverlay};
pub use plan::{FrameCommand, FrameInputs, FramePlan, ImageTarget};
pub use renderer::Renderer;
