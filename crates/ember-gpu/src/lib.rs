//! Vulkan abstraction layer for the Ember renderer.
//!
//! This crate provides:
//! - Vulkan instance, debug messenger and device management
//! - GPU capability detection
//! - Memory allocation via gpu-allocator
//! - Command pools and synchronization2 submission
//! - Descriptor, pipeline, shader and image helpers
//! - Swapchain handling
//! - A LIFO deletion queue for GPU objects

pub mod capabilities;
pub mod command;
pub mod context;
pub mod deletion;
pub mod descriptors;
pub mod error;
pub mod image;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use capabilities::{GpuCapabilities, GpuVendor};
pub use command::{CommandPool, SemaphoreSubmit};
pub use context::{GpuContext, GpuContextBuilder};
pub use deletion::{DeletionQueue, GpuResource, ReleaseGuard, ResourceReleaser};
pub use descriptors::{DescriptorAllocator, DescriptorLayoutBuilder, PoolSizeRatio};
pub use error::{GpuError, Result};
pub use memory::{GpuAllocator, GpuImage};
pub use pipeline::GraphicsPipelineConfig;
pub use surface::{SurfaceCapabilities, SurfaceContext};
pub use swapchain::{AcquiredImage, Swapchain};
