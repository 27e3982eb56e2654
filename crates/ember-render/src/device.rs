//! The device operations the frame loop drives.
//!
//! [`FrameDevice`] is the seam between frame orchestration and Vulkan:
//! [`VulkanFrameDevice`] forwards to ash, tests substitute a simulated device.

use crate::plan::FrameCommand;
use ash::vk;
use ember_gpu::command::{begin_command_buffer, end_command_buffer, submit_command_buffer};
use ember_gpu::image::{copy_image_to_image, subresource_range, transition_image};
use ember_gpu::sync::{reset_fence, wait_for_fence};
use ember_gpu::{
    AcquiredImage, GpuContext, GpuResource, ResourceReleaser, Result, SemaphoreSubmit, Swapchain,
};
use std::time::Duration;

/// One queue submission of a single command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    pub command_buffer: vk::CommandBuffer,
    pub wait: Option<SemaphoreSubmit>,
    pub signal: Option<SemaphoreSubmit>,
    /// Signaled when the submission retires.
    pub fence: vk::Fence,
}

/// Device operations used by the frame loop and immediate submission.
pub trait FrameDevice: ResourceReleaser {
    /// Block until `fence` signals. Expiry is a fatal [`Timeout`](ember_gpu::GpuError::Timeout).
    fn wait_for_fence(&self, fence: vk::Fence, timeout: Duration) -> Result<()>;

    /// Return `fence` to the unsignaled state.
    fn reset_fence(&self, fence: vk::Fence) -> Result<()>;

    /// Acquire the next swapchain image, signaling `semaphore` once it is usable.
    fn acquire_next_image(&self, semaphore: vk::Semaphore, timeout: Duration)
        -> Result<AcquiredImage>;

    /// Return a command buffer to the initial state.
    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> Result<()>;

    /// Start recording a one-time-submit command buffer.
    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> Result<()>;

    /// Finish recording.
    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> Result<()>;

    /// Encode one command. [`FrameCommand::Overlay`] is left to the overlay.
    fn record(&self, cmd: vk::CommandBuffer, command: &FrameCommand);

    /// Submit to the graphics queue.
    fn submit(&self, submission: &Submission) -> Result<()>;

    /// Present `image_index` once `wait` has signaled. Returns `true` if suboptimal.
    fn present(&self, image_index: u32, wait: vk::Semaphore) -> Result<bool>;
}

/// [`FrameDevice`] backed by a real GPU and swapchain.
pub struct VulkanFrameDevice<'a> {
    gpu: &'a GpuContext,
    swapchain_loader: &'a ash::khr::swapchain::Device,
    swapchain: &'a Swapchain,
}

impl<'a> VulkanFrameDevice<'a> {
    /// Borrow the context and swapchain for one frame.
    pub const fn new(
        gpu: &'a GpuContext,
        swapchain_loader: &'a ash::khr::swapchain::Device,
        swapchain: &'a Swapchain,
    ) -> Self {
        Self {
            gpu,
            swapchain_loader,
            swapchain,
        }
    }

    fn begin_rendering(&self, cmd: vk::CommandBuffer, view: vk::ImageView, extent: vk::Extent2D) {
        let color_attachments = [vk::RenderingAttachmentInfo::default()
            .image_view(view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::LOAD)
            .store_op(vk::AttachmentStoreOp::STORE)];

        let rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent,
            })
            .layer_count(1)
            .color_attachments(&color_attachments);

        unsafe { self.gpu.device().cmd_begin_rendering(cmd, &rendering_info) };
    }

    #[allow(clippy::cast_precision_loss)]
    fn draw(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline, extent: vk::Extent2D, vertex_count: u32) {
        let device = self.gpu.device();
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent,
        };

        unsafe {
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);
            device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.cmd_set_scissor(cmd, 0, &[scissor]);
            device.cmd_draw(cmd, vertex_count, 1, 0, 0);
        }
    }
}

impl ResourceReleaser for VulkanFrameDevice<'_> {
    fn release(&self, resource: GpuResource) -> Result<()> {
        self.gpu.release(resource)
    }
}

impl FrameDevice for VulkanFrameDevice<'_> {
    fn wait_for_fence(&self, fence: vk::Fence, timeout: Duration) -> Result<()> {
        unsafe { wait_for_fence(self.gpu.device(), fence, timeout) }
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        unsafe { reset_fence(self.gpu.device(), fence) }
    }

    fn acquire_next_image(
        &self,
        semaphore: vk::Semaphore,
        timeout: Duration,
    ) -> Result<AcquiredImage> {
        unsafe {
            self.swapchain
                .acquire_next_image(self.swapchain_loader, semaphore, timeout)
        }
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> Result<()> {
        unsafe {
            self.gpu
                .device()
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
        }
        Ok(())
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> Result<()> {
        unsafe { begin_command_buffer(self.gpu.device(), cmd) }
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> Result<()> {
        unsafe { end_command_buffer(self.gpu.device(), cmd) }
    }

    fn record(&self, cmd: vk::CommandBuffer, command: &FrameCommand) {
        let device = self.gpu.device();
        match *command {
            FrameCommand::Transition { image, old, new } => unsafe {
                transition_image(device, cmd, image, old, new);
            },
            FrameCommand::Clear { image, color } => unsafe {
                let clear = vk::ClearColorValue { float32: color };
                device.cmd_clear_color_image(
                    cmd,
                    image,
                    vk::ImageLayout::GENERAL,
                    &clear,
                    &[subresource_range(vk::ImageAspectFlags::COLOR)],
                );
            },
            FrameCommand::Dispatch {
                pipeline,
                layout,
                descriptor_set,
                push,
                groups,
                ..
            } => unsafe {
                device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, pipeline);
                device.cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::COMPUTE,
                    layout,
                    0,
                    &[descriptor_set],
                    &[],
                );
                device.cmd_push_constants(
                    cmd,
                    layout,
                    vk::ShaderStageFlags::COMPUTE,
                    0,
                    bytemuck::bytes_of(&push),
                );
                device.cmd_dispatch(cmd, groups[0], groups[1], groups[2]);
            },
            FrameCommand::BeginRendering { view, extent, .. } => {
                self.begin_rendering(cmd, view, extent);
            }
            FrameCommand::Draw {
                pipeline,
                extent,
                vertex_count,
            } => self.draw(cmd, pipeline, extent, vertex_count),
            // Emitted by the overlay itself
            FrameCommand::Overlay => {}
            FrameCommand::EndRendering => unsafe { device.cmd_end_rendering(cmd) },
            FrameCommand::Blit {
                src,
                dst,
                src_extent,
                dst_extent,
            } => unsafe {
                copy_image_to_image(device, cmd, src, dst, src_extent, dst_extent);
            },
        }
    }

    fn submit(&self, submission: &Submission) -> Result<()> {
        unsafe {
            submit_command_buffer(
                self.gpu.device(),
                self.gpu.graphics_queue(),
                submission.command_buffer,
                submission.wait,
                submission.signal,
                submission.fence,
            )
        }
    }

    fn present(&self, image_index: u32, wait: vk::Semaphore) -> Result<bool> {
        unsafe {
            self.swapchain.present(
                self.swapchain_loader,
                self.gpu.graphics_queue(),
                image_index,
                &[wait],
            )
        }
    }
}
