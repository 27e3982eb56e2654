//! Blocking one-off GPU work outside the frame loop.

use crate::device::{FrameDevice, Submission};
use ash::vk;
use ember_gpu::command::CommandPool;
use ember_gpu::sync::create_fence;
use ember_gpu::{GpuContext, GpuResource, ReleaseGuard, Result};
use std::time::Duration;

/// Dedicated command buffer and fence for synchronous submissions such as
/// startup clears and uploads.
#[derive(Debug)]
pub struct ImmediateSubmit {
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
    timeout: Duration,
}

impl ImmediateSubmit {
    /// Create the pool, command buffer and fence on the graphics queue family.
    ///
    /// The pool is destroyed again if a later step fails.
    ///
    /// # Safety
    /// The GPU context must be valid.
    pub unsafe fn new(gpu: &GpuContext, timeout: Duration) -> Result<Self> {
        let device = gpu.device();
        let mut guard = ReleaseGuard::new(gpu);

        let pool = unsafe { CommandPool::new(device, gpu.graphics_queue_family())? };
        guard.push(GpuResource::CommandPool(pool.handle()));
        let command_buffer = unsafe { pool.allocate_command_buffer(device)? };
        let fence = unsafe { create_fence(device, true)? };
        guard.disarm();

        Ok(Self::from_handles(pool.handle(), command_buffer, fence, timeout))
    }

    /// Wrap existing handles. `fence` must be signaled.
    pub const fn from_handles(
        command_pool: vk::CommandPool,
        command_buffer: vk::CommandBuffer,
        fence: vk::Fence,
        timeout: Duration,
    ) -> Self {
        Self {
            command_pool,
            command_buffer,
            fence,
            timeout,
        }
    }

    /// The command pool, shared with UI renderers that upload through it.
    pub const fn command_pool(&self) -> vk::CommandPool {
        self.command_pool
    }

    pub const fn fence(&self) -> vk::Fence {
        self.fence
    }

    /// Record `record` into the dedicated command buffer, submit it and block
    /// until the GPU has finished.
    ///
    /// Failing to finish within the timeout is a fatal
    /// [`Timeout`](ember_gpu::GpuError::Timeout).
    pub fn submit<D, F>(&self, device: &D, record: F) -> Result<()>
    where
        D: FrameDevice,
        F: FnOnce(&D, vk::CommandBuffer) -> Result<()>,
    {
        let cmd = self.command_buffer;

        device.reset_fence(self.fence)?;
        device.reset_command_buffer(cmd)?;
        device.begin_command_buffer(cmd)?;
        record(device, cmd)?;
        device.end_command_buffer(cmd)?;

        device.submit(&Submission {
            command_buffer: cmd,
            wait: None,
            signal: None,
            fence: self.fence,
        })?;
        device.wait_for_fence(self.fence, self.timeout)?;

        tracing::trace!("Immediate submission complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::FrameCommand;
    use crate::testing::{Event, MockDevice};
    use ember_gpu::GpuError;

    #[test]
    fn submission_is_fenced_and_waited() {
        let device = MockDevice::new(2);
        let immediate = device.immediate_submit();

        immediate
            .submit(&device, |device, cmd| {
                device.record(
                    cmd,
                    &FrameCommand::Clear {
                        image: vk::Image::null(),
                        color: [0.0; 4],
                    },
                );
                Ok(())
            })
            .unwrap();

        let cmd = immediate.command_buffer;
        let fence = immediate.fence;
        assert_eq!(
            device.events(),
            vec![
                Event::ResetFence(fence),
                Event::ResetCommandBuffer(cmd),
                Event::Begin(cmd),
                Event::Record(FrameCommand::Clear {
                    image: vk::Image::null(),
                    color: [0.0; 4],
                }),
                Event::End(cmd),
                Event::Submit(Submission {
                    command_buffer: cmd,
                    wait: None,
                    signal: None,
                    fence,
                }),
                Event::WaitFence(fence),
            ]
        );
    }

    #[test]
    fn can_be_reused() {
        let device = MockDevice::new(2);
        let immediate = device.immediate_submit();
        for _ in 0..3 {
            immediate.submit(&device, |_, _| Ok(())).unwrap();
        }
    }

    #[test]
    fn hung_gpu_times_out() {
        let device = MockDevice::new(2);
        device.hang();
        let immediate = device.immediate_submit();

        let err = immediate.submit(&device, |_, _| Ok(())).unwrap_err();
        assert!(matches!(err, GpuError::Timeout { .. }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn recording_error_skips_submission() {
        let device = MockDevice::new(2);
        let immediate = device.immediate_submit();

        let result = immediate.submit(&device, |_, _| {
            Err(GpuError::InvalidState("upload failed".to_string()))
        });

        assert!(result.is_err());
        assert!(!device
            .events()
            .iter()
            .any(|event| matches!(event, Event::Submit(_))));
    }
}
