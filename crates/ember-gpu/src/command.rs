//! Command buffer management.

use crate::error::Result;
use ash::vk;

/// Command pool for allocating command buffers.
pub struct CommandPool {
    pool: vk::CommandPool,
    queue_family: u32,
}

impl CommandPool {
    /// Create a pool whose buffers can be reset individually.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(device: &ash::Device, queue_family: u32) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { device.create_command_pool(&create_info, None)? };

        Ok(Self { pool, queue_family })
    }

    /// Get the raw pool handle.
    pub const fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Get the queue family index.
    pub const fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Allocate a single primary command buffer.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate_command_buffer(&self, device: &ash::Device) -> Result<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { device.allocate_command_buffers(&alloc_info)? };
        Ok(buffers[0])
    }
}

/// Begin recording a command buffer that will be submitted exactly once.
///
/// # Safety
/// The device and command buffer must be valid, and the buffer must be in
/// the initial state.
pub unsafe fn begin_command_buffer(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    let begin_info =
        vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    unsafe { device.begin_command_buffer(cmd, &begin_info)? };
    Ok(())
}

/// End recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn end_command_buffer(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    unsafe { device.end_command_buffer(cmd)? };
    Ok(())
}

/// A semaphore dependency of a submission, scoped to a pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemaphoreSubmit {
    pub semaphore: vk::Semaphore,
    pub stage: vk::PipelineStageFlags2,
}

impl SemaphoreSubmit {
    /// Create a dependency on `semaphore` at `stage`.
    pub const fn new(semaphore: vk::Semaphore, stage: vk::PipelineStageFlags2) -> Self {
        Self { semaphore, stage }
    }

    fn info(self) -> vk::SemaphoreSubmitInfo<'static> {
        vk::SemaphoreSubmitInfo::default()
            .semaphore(self.semaphore)
            .stage_mask(self.stage)
            .device_index(0)
            .value(1)
    }
}

/// Submit one command buffer with optional wait and signal semaphores.
///
/// `fence` is signaled when the submission retires; pass a null fence if
/// nothing waits on it.
///
/// # Safety
/// All handles must be valid and the command buffer must be executable.
pub unsafe fn submit_command_buffer(
    device: &ash::Device,
    queue: vk::Queue,
    cmd: vk::CommandBuffer,
    wait: Option<SemaphoreSubmit>,
    signal: Option<SemaphoreSubmit>,
    fence: vk::Fence,
) -> Result<()> {
    let cmd_infos = [vk::CommandBufferSubmitInfo::default()
        .command_buffer(cmd)
        .device_mask(0)];
    let wait_infos: Vec<_> = wait.into_iter().map(SemaphoreSubmit::info).collect();
    let signal_infos: Vec<_> = signal.into_iter().map(SemaphoreSubmit::info).collect();

    let submit_info = vk::SubmitInfo2::default()
        .command_buffer_infos(&cmd_infos)
        .wait_semaphore_infos(&wait_infos)
        .signal_semaphore_infos(&signal_infos);

    unsafe { device.queue_submit2(queue, &[submit_info], fence)? };
    Ok(())
}
