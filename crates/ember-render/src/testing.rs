//! Simulated device for exercising frame orchestration without a GPU.
//!
//! The mock tracks fence, semaphore and command buffer states the way a
//! driver would and rejects misuse (resetting an in-flight fence, waiting on
//! a semaphore nobody signaled, recording into a buffer that is not
//! recording). Submitted work only completes when its fence is waited on.

use crate::device::{FrameDevice, Submission};
use crate::effects::{BackgroundEffect, ComputePushConstants, EffectRegistry};
use crate::frame::FrameSlot;
use crate::frame_loop::{FrameLoop, FrameResources};
use crate::immediate::ImmediateSubmit;
use crate::overlay::UiOverlay;
use crate::plan::{FrameCommand, ImageTarget};
use ash::vk;
use ash::vk::Handle;
use ember_gpu::{AcquiredImage, DeletionQueue, GpuError, GpuResource, ResourceReleaser, Result};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

pub const DRAW_EXTENT: vk::Extent2D = vk::Extent2D {
    width: 800,
    height: 600,
};

/// Everything the device was asked to do, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    WaitFence(vk::Fence),
    ResetFence(vk::Fence),
    Acquire(vk::Semaphore),
    ResetCommandBuffer(vk::CommandBuffer),
    Begin(vk::CommandBuffer),
    End(vk::CommandBuffer),
    Record(FrameCommand),
    Submit(Submission),
    Present { index: u32, wait: vk::Semaphore },
    Release(&'static str),
    OverlayPrepare,
    OverlayRecord(vk::CommandBuffer),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FenceState {
    Signaled,
    Unsignaled,
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandState {
    Initial,
    Recording,
    Executable,
    Pending,
    Invalid,
}

#[derive(Debug, Default)]
struct State {
    fences: HashMap<vk::Fence, FenceState>,
    semaphores: HashMap<vk::Semaphore, bool>,
    commands: HashMap<vk::CommandBuffer, CommandState>,
    in_flight: HashMap<vk::Fence, vk::CommandBuffer>,
    acquire_results: VecDeque<Result<AcquiredImage>>,
    present_results: VecDeque<Result<bool>>,
    next_image: u32,
}

/// A [`FrameDevice`] that simulates a queue, swapchain and object states.
pub struct MockDevice {
    image_count: u32,
    next_handle: Cell<u64>,
    hung: Cell<bool>,
    state: RefCell<State>,
    events: Rc<RefCell<Vec<Event>>>,
}

impl MockDevice {
    pub fn new(image_count: u32) -> Self {
        Self {
            image_count,
            next_handle: Cell::new(0x1000),
            hung: Cell::new(false),
            state: RefCell::new(State::default()),
            events: Rc::new(RefCell::new(Vec::new())),
        }
    }

    fn handle(&self) -> u64 {
        let raw = self.next_handle.get();
        self.next_handle.set(raw + 1);
        raw
    }

    fn log(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }

    /// Submitted work never completes from now on.
    pub fn hang(&self) {
        self.hung.set(true);
    }

    /// Make the next acquire return `result` instead of the next image.
    pub fn queue_acquire(&self, result: Result<AcquiredImage>) {
        self.state.borrow_mut().acquire_results.push_back(result);
    }

    /// Make the next present return `result` instead of success.
    pub fn queue_present(&self, result: Result<bool>) {
        self.state.borrow_mut().present_results.push_back(result);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn clear_events(&self) {
        self.events.borrow_mut().clear();
    }

    /// Kinds of every released resource, in release order.
    pub fn released(&self) -> Vec<&'static str> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                Event::Release(kind) => Some(*kind),
                _ => None,
            })
            .collect()
    }

    pub fn is_fence_signaled(&self, fence: vk::Fence) -> bool {
        self.state.borrow().fences.get(&fence) == Some(&FenceState::Signaled)
    }

    fn new_fence(&self, signaled: bool) -> vk::Fence {
        let fence = vk::Fence::from_raw(self.handle());
        let state = if signaled {
            FenceState::Signaled
        } else {
            FenceState::Unsignaled
        };
        self.state.borrow_mut().fences.insert(fence, state);
        fence
    }

    fn new_semaphore(&self) -> vk::Semaphore {
        let semaphore = vk::Semaphore::from_raw(self.handle());
        self.state.borrow_mut().semaphores.insert(semaphore, false);
        semaphore
    }

    fn new_command_buffer(&self) -> vk::CommandBuffer {
        let cmd = vk::CommandBuffer::from_raw(self.handle());
        self.state
            .borrow_mut()
            .commands
            .insert(cmd, CommandState::Initial);
        cmd
    }

    /// A frame slot whose fence starts signaled.
    pub fn frame_slot(&self, _index: usize) -> FrameSlot {
        FrameSlot {
            command_pool: vk::CommandPool::from_raw(self.handle()),
            command_buffer: self.new_command_buffer(),
            image_available: self.new_semaphore(),
            render_finished: self.new_semaphore(),
            render_fence: self.new_fence(true),
            deletion_queue: DeletionQueue::new(),
        }
    }

    pub fn immediate_submit(&self) -> ImmediateSubmit {
        ImmediateSubmit::from_handles(
            vk::CommandPool::from_raw(self.handle()),
            self.new_command_buffer(),
            self.new_fence(true),
            Duration::from_secs(1),
        )
    }

    /// Swapchain images and views the acquire results index into.
    pub fn swapchain_images(&self) -> (Vec<vk::Image>, Vec<vk::ImageView>) {
        (0..self.image_count)
            .map(|_| {
                (
                    vk::Image::from_raw(self.handle()),
                    vk::ImageView::from_raw(self.handle()),
                )
            })
            .unzip()
    }

    /// A frame loop with two registered effects over an 800x600 draw target.
    pub fn frame_loop(&self, slot_count: usize) -> Result<FrameLoop> {
        let slots = (0..slot_count).map(|i| self.frame_slot(i)).collect();

        let mut effects = EffectRegistry::new();
        for (name, data) in [
            ("gradient", ComputePushConstants::gradient()),
            ("sky", ComputePushConstants::sky()),
        ] {
            effects.register(BackgroundEffect {
                name: name.to_string(),
                pipeline: vk::Pipeline::from_raw(self.handle()),
                layout: vk::PipelineLayout::from_raw(self.handle()),
                data,
            });
        }

        let resources = FrameResources {
            draw: ImageTarget {
                image: vk::Image::from_raw(self.handle()),
                view: vk::ImageView::from_raw(self.handle()),
                extent: DRAW_EXTENT,
            },
            descriptor_set: vk::DescriptorSet::from_raw(self.handle()),
            geometry_pipeline: vk::Pipeline::from_raw(self.handle()),
            effects,
        };

        let mut frame_loop = FrameLoop::new(
            slots,
            resources,
            Duration::from_secs(1),
            Duration::from_secs(1),
        )?;
        let (images, views) = self.swapchain_images();
        frame_loop.set_swapchain_targets(
            &images,
            &views,
            vk::Extent2D {
                width: 1024,
                height: 768,
            },
        )?;
        Ok(frame_loop)
    }

    /// An overlay that logs into this device's event stream.
    pub fn overlay(&self) -> MockOverlay {
        MockOverlay {
            events: Rc::clone(&self.events),
        }
    }

    fn misuse(what: String) -> GpuError {
        GpuError::InvalidState(what)
    }

    fn command_state(&self, cmd: vk::CommandBuffer) -> CommandState {
        self.state
            .borrow()
            .commands
            .get(&cmd)
            .copied()
            .unwrap_or(CommandState::Invalid)
    }

    fn set_command_state(&self, cmd: vk::CommandBuffer, state: CommandState) {
        self.state.borrow_mut().commands.insert(cmd, state);
    }
}

impl ResourceReleaser for MockDevice {
    fn release(&self, resource: GpuResource) -> Result<()> {
        let kind = resource.kind();
        if let GpuResource::Callback(callback) = resource {
            callback();
        }
        self.log(Event::Release(kind));
        Ok(())
    }
}

impl FrameDevice for MockDevice {
    fn wait_for_fence(&self, fence: vk::Fence, _timeout: Duration) -> Result<()> {
        self.log(Event::WaitFence(fence));
        let mut state = self.state.borrow_mut();
        match state.fences.get(&fence).copied() {
            Some(FenceState::Signaled) => Ok(()),
            Some(FenceState::Pending) if !self.hung.get() => {
                state.fences.insert(fence, FenceState::Signaled);
                if let Some(cmd) = state.in_flight.remove(&fence) {
                    state.commands.insert(cmd, CommandState::Invalid);
                }
                Ok(())
            }
            Some(_) => Err(GpuError::Timeout { what: "fence" }),
            None => Err(Self::misuse(format!("unknown fence {fence:?}"))),
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        self.log(Event::ResetFence(fence));
        let mut state = self.state.borrow_mut();
        match state.fences.get(&fence) {
            Some(FenceState::Pending) => Err(Self::misuse(format!(
                "reset of fence {fence:?} while its work is in flight"
            ))),
            Some(_) => {
                state.fences.insert(fence, FenceState::Unsignaled);
                Ok(())
            }
            None => Err(Self::misuse(format!("unknown fence {fence:?}"))),
        }
    }

    fn acquire_next_image(
        &self,
        semaphore: vk::Semaphore,
        _timeout: Duration,
    ) -> Result<AcquiredImage> {
        self.log(Event::Acquire(semaphore));
        let mut state = self.state.borrow_mut();

        let result = state.acquire_results.pop_front().unwrap_or_else(|| {
            let index = state.next_image;
            state.next_image = (index + 1) % self.image_count;
            Ok(AcquiredImage {
                index,
                suboptimal: false,
            })
        });

        if result.is_ok() {
            if state.semaphores.get(&semaphore) != Some(&false) {
                return Err(Self::misuse(format!(
                    "acquire would signal {semaphore:?} which is already signaled"
                )));
            }
            state.semaphores.insert(semaphore, true);
        }
        result
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> Result<()> {
        self.log(Event::ResetCommandBuffer(cmd));
        if self.command_state(cmd) == CommandState::Pending {
            return Err(Self::misuse(format!("reset of pending {cmd:?}")));
        }
        self.set_command_state(cmd, CommandState::Initial);
        Ok(())
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> Result<()> {
        self.log(Event::Begin(cmd));
        if self.command_state(cmd) != CommandState::Initial {
            return Err(Self::misuse(format!("begin of {cmd:?} without reset")));
        }
        self.set_command_state(cmd, CommandState::Recording);
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> Result<()> {
        self.log(Event::End(cmd));
        if self.command_state(cmd) != CommandState::Recording {
            return Err(Self::misuse(format!("end of {cmd:?} outside recording")));
        }
        self.set_command_state(cmd, CommandState::Executable);
        Ok(())
    }

    fn record(&self, cmd: vk::CommandBuffer, command: &FrameCommand) {
        assert_eq!(
            self.command_state(cmd),
            CommandState::Recording,
            "{command:?} recorded into {cmd:?} outside recording"
        );
        self.log(Event::Record(*command));
    }

    fn submit(&self, submission: &Submission) -> Result<()> {
        self.log(Event::Submit(*submission));
        let cmd = submission.command_buffer;
        if self.command_state(cmd) != CommandState::Executable {
            return Err(Self::misuse(format!("submit of non-executable {cmd:?}")));
        }

        let mut state = self.state.borrow_mut();
        if let Some(wait) = submission.wait {
            if state.semaphores.get(&wait.semaphore) != Some(&true) {
                return Err(Self::misuse(format!(
                    "wait on {:?} which nothing signals",
                    wait.semaphore
                )));
            }
            state.semaphores.insert(wait.semaphore, false);
        }
        if let Some(signal) = submission.signal {
            state.semaphores.insert(signal.semaphore, true);
        }
        if submission.fence != vk::Fence::null() {
            if state.fences.get(&submission.fence) != Some(&FenceState::Unsignaled) {
                return Err(Self::misuse(format!(
                    "submit with fence {:?} that is not unsignaled",
                    submission.fence
                )));
            }
            state.fences.insert(submission.fence, FenceState::Pending);
            state.in_flight.insert(submission.fence, cmd);
        }
        state.commands.insert(cmd, CommandState::Pending);
        Ok(())
    }

    fn present(&self, image_index: u32, wait: vk::Semaphore) -> Result<bool> {
        self.log(Event::Present {
            index: image_index,
            wait,
        });
        let mut state = self.state.borrow_mut();
        if state.semaphores.get(&wait) != Some(&true) {
            return Err(Self::misuse(format!(
                "present waits on {wait:?} which nothing signals"
            )));
        }
        state.semaphores.insert(wait, false);
        state.present_results.pop_front().unwrap_or(Ok(false))
    }
}

/// Overlay that logs its calls into a [`MockDevice`]'s event stream.
pub struct MockOverlay {
    events: Rc<RefCell<Vec<Event>>>,
}

impl UiOverlay for MockOverlay {
    fn prepare(&mut self, effects: &mut EffectRegistry) -> Result<()> {
        assert!(effects.current().is_some());
        self.events.borrow_mut().push(Event::OverlayPrepare);
        Ok(())
    }

    fn record(&mut self, cmd: vk::CommandBuffer) -> Result<()> {
        self.events.borrow_mut().push(Event::OverlayRecord(cmd));
        Ok(())
    }
}
