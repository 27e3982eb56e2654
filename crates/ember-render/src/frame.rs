//! Per-frame resources.

use ash::vk;
use ember_gpu::command::CommandPool;
use ember_gpu::sync::{create_fence, create_semaphore};
use ember_gpu::{DeletionQueue, GpuContext, GpuResource, ReleaseGuard, ResourceReleaser, Result};

/// Everything one in-flight frame records and synchronizes with.
///
/// The slot's command buffer, semaphores and deletion queue are only touched
/// after `render_fence` has signaled for the slot's previous use.
#[derive(Debug)]
pub struct FrameSlot {
    pub command_pool: vk::CommandPool,
    pub command_buffer: vk::CommandBuffer,
    /// Signaled by the swapchain when the acquired image may be written.
    pub image_available: vk::Semaphore,
    /// Signaled by the queue when the frame's commands have executed.
    pub render_finished: vk::Semaphore,
    /// Signaled when the frame's submission retires. Created signaled.
    pub render_fence: vk::Fence,
    /// Resources released when this slot is next reused.
    pub deletion_queue: DeletionQueue,
}

impl FrameSlot {
    /// Create a slot with its own command pool on the graphics queue family.
    ///
    /// Objects created before a failure are destroyed again.
    ///
    /// # Safety
    /// The GPU context must be valid.
    pub unsafe fn new(gpu: &GpuContext) -> Result<Self> {
        let device = gpu.device();
        let mut guard = ReleaseGuard::new(gpu);

        let pool = unsafe { CommandPool::new(device, gpu.graphics_queue_family())? };
        guard.push(GpuResource::CommandPool(pool.handle()));
        let command_buffer = unsafe { pool.allocate_command_buffer(device)? };

        let image_available = unsafe { create_semaphore(device)? };
        guard.push(GpuResource::Semaphore(image_available));
        let render_finished = unsafe { create_semaphore(device)? };
        guard.push(GpuResource::Semaphore(render_finished));
        let render_fence = unsafe { create_fence(device, true)? };
        guard.disarm();

        Ok(Self {
            command_pool: pool.handle(),
            command_buffer,
            image_available,
            render_finished,
            render_fence,
            deletion_queue: DeletionQueue::new(),
        })
    }

    /// Destroy the slot: command pool, fence, both semaphores, then
    /// whatever is still in its deletion queue.
    ///
    /// The device must be idle.
    pub fn release(mut self, releaser: &impl ResourceReleaser) -> Result<()> {
        releaser.release(GpuResource::CommandPool(self.command_pool))?;
        releaser.release(GpuResource::Fence(self.render_fence))?;
        releaser.release(GpuResource::Semaphore(self.render_finished))?;
        releaser.release(GpuResource::Semaphore(self.image_available))?;
        self.deletion_queue.flush(releaser)
    }
}
