//! Per-frame orchestration over a ring of frame slots.
//!
//! Each frame waits on its slot's fence before touching anything the slot
//! owns, acquires a swapchain image, records the frame plan into the slot's
//! command buffer, submits it and presents. With [`FRAME_OVERLAP`] slots the
//! CPU records frame `n + 1` while the GPU is still executing frame `n`.

use crate::config::FRAME_OVERLAP;
use crate::device::{FrameDevice, Submission};
use crate::effects::EffectRegistry;
use crate::frame::FrameSlot;
use crate::overlay::UiOverlay;
use crate::plan::{FrameCommand, FrameInputs, FramePlan, ImageTarget};
use ash::vk;
use ember_gpu::{GpuError, GpuResource, Result, SemaphoreSubmit};
use std::time::Duration;

/// Outcome of a frame that reached the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// Presented to a swapchain that still matches the surface.
    Presented,
    /// Presented, but the swapchain should be recreated.
    Suboptimal,
}

/// Resources every frame draws with.
#[derive(Debug)]
pub struct FrameResources {
    /// Off-screen target, sized at startup.
    pub draw: ImageTarget,
    /// Binds `draw` as a storage image for the background effects.
    pub descriptor_set: vk::DescriptorSet,
    pub geometry_pipeline: vk::Pipeline,
    pub effects: EffectRegistry,
}

/// Drives the per-frame record, submit and present cycle.
#[derive(Debug)]
pub struct FrameLoop {
    slots: Vec<FrameSlot>,
    frame_number: u64,
    resources: FrameResources,
    present_targets: Vec<ImageTarget>,
    fence_timeout: Duration,
    acquire_timeout: Duration,
}

impl FrameLoop {
    /// Create a loop over exactly [`FRAME_OVERLAP`] slots.
    pub fn new(
        slots: Vec<FrameSlot>,
        resources: FrameResources,
        fence_timeout: Duration,
        acquire_timeout: Duration,
    ) -> Result<Self> {
        if slots.len() != FRAME_OVERLAP {
            return Err(GpuError::InvalidState(format!(
                "frame loop needs {FRAME_OVERLAP} slots, got {}",
                slots.len()
            )));
        }

        Ok(Self {
            slots,
            frame_number: 0,
            resources,
            present_targets: Vec::new(),
            fence_timeout,
            acquire_timeout,
        })
    }

    /// Frames submitted so far. A frame abandoned before submission does
    /// not count.
    pub const fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Slot the next frame will use.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn current_slot_index(&self) -> usize {
        (self.frame_number % FRAME_OVERLAP as u64) as usize
    }

    pub const fn draw_extent(&self) -> vk::Extent2D {
        self.resources.draw.extent
    }

    pub const fn effects(&self) -> &EffectRegistry {
        &self.resources.effects
    }

    pub fn effects_mut(&mut self) -> &mut EffectRegistry {
        &mut self.resources.effects
    }

    /// Slot of the most recently submitted frame.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn last_submitted_slot_index(&self) -> usize {
        ((self.frame_number + FRAME_OVERLAP as u64 - 1) % FRAME_OVERLAP as u64) as usize
    }

    /// Release `resource` once the most recently submitted frame has
    /// finished on the GPU.
    ///
    /// The resource goes into that frame's slot, which is flushed only after
    /// its fence has been waited on.
    pub fn defer_release(&mut self, resource: GpuResource) {
        let index = self.last_submitted_slot_index();
        if let Some(slot) = self.slots.get_mut(index) {
            slot.deletion_queue.push(resource);
        }
    }

    /// Point the loop at a (new) swapchain.
    pub fn set_swapchain_targets(
        &mut self,
        images: &[vk::Image],
        views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> Result<()> {
        if images.len() != views.len() {
            return Err(GpuError::InvalidState(format!(
                "{} swapchain images but {} views",
                images.len(),
                views.len()
            )));
        }

        self.present_targets = images
            .iter()
            .zip(views)
            .map(|(&image, &view)| ImageTarget { image, view, extent })
            .collect();
        Ok(())
    }

    /// Forget the swapchain images, e.g. while the swapchain is rebuilt.
    pub fn clear_swapchain_targets(&mut self) {
        self.present_targets.clear();
    }

    /// Remove the frame slots for destruction. The loop cannot draw afterwards.
    pub fn take_slots(&mut self) -> Vec<FrameSlot> {
        std::mem::take(&mut self.slots)
    }

    /// Record, submit and present one frame.
    ///
    /// A recoverable error from acquire leaves the slot untouched and its
    /// fence signaled, so the caller may rebuild the swapchain and call again.
    /// The frame counter advances once the frame has been submitted, whatever
    /// present reports.
    pub fn draw_frame<D: FrameDevice>(
        &mut self,
        device: &D,
        overlay: &mut dyn UiOverlay,
    ) -> Result<FrameStatus> {
        overlay.prepare(&mut self.resources.effects)?;

        let slot_index = self.current_slot_index();
        let frame_number = self.frame_number;
        let slot = self.slots.get_mut(slot_index).ok_or_else(|| {
            GpuError::InvalidState("frame loop has no slots left".to_string())
        })?;
        let cmd = slot.command_buffer;
        let image_available = slot.image_available;
        let render_finished = slot.render_finished;
        let fence = slot.render_fence;

        device.wait_for_fence(fence, self.fence_timeout)?;
        slot.deletion_queue.flush(device)?;

        let effect = self.resources.effects.current().ok_or_else(|| {
            GpuError::InvalidState("no background effect registered".to_string())
        })?;

        let acquired = device.acquire_next_image(image_available, self.acquire_timeout)?;
        let present = usize::try_from(acquired.index)
            .ok()
            .and_then(|index| self.present_targets.get(index))
            .copied()
            .ok_or(GpuError::OutOfRange {
                index: i64::from(acquired.index),
                len: self.present_targets.len(),
            })?;

        let plan = FramePlan::for_frame(&FrameInputs {
            draw: self.resources.draw,
            present,
            effect,
            descriptor_set: self.resources.descriptor_set,
            geometry_pipeline: self.resources.geometry_pipeline,
        });
        plan.validate(present.image)?;

        device.reset_fence(fence)?;
        device.reset_command_buffer(cmd)?;
        device.begin_command_buffer(cmd)?;
        for command in plan.commands() {
            match command {
                FrameCommand::Overlay => overlay.record(cmd)?,
                _ => device.record(cmd, command),
            }
        }
        device.end_command_buffer(cmd)?;

        device.submit(&Submission {
            command_buffer: cmd,
            wait: Some(SemaphoreSubmit::new(
                image_available,
                vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            )),
            signal: Some(SemaphoreSubmit::new(
                render_finished,
                vk::PipelineStageFlags2::ALL_GRAPHICS,
            )),
            fence,
        })?;

        let presented = device.present(acquired.index, render_finished);
        self.frame_number += 1;
        let present_suboptimal = presented?;

        tracing::trace!(
            frame = frame_number,
            slot = slot_index,
            image = acquired.index,
            "Frame presented"
        );

        if acquired.suboptimal || present_suboptimal {
            Ok(FrameStatus::Suboptimal)
        } else {
            Ok(FrameStatus::Presented)
        }
    }
}
