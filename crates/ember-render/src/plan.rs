//! The command sequence recorded for one frame.
//!
//! A frame is first described as a list of [`FrameCommand`]s, checked
//! against an image layout tracker, and only then encoded into a command
//! buffer. The tracker rejects any sequence in which an image is used in
//! the wrong layout or a transition assumes a layout the image is not in.

use crate::config::WORKGROUP_SIZE;
use crate::effects::{BackgroundEffect, ComputePushConstants};
use ash::vk;
use ember_gpu::{GpuError, Result};
use std::collections::HashMap;

/// Vertices in the hard-coded triangle.
pub const TRIANGLE_VERTEX_COUNT: u32 = 3;

/// Clear color written into the draw target once at startup.
pub const INITIAL_CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// One GPU command of a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameCommand {
    /// Full barrier moving `image` from `old` to `new`.
    Transition {
        image: vk::Image,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },
    /// Clear a color image in `GENERAL` layout.
    Clear { image: vk::Image, color: [f32; 4] },
    /// Run a background effect writing to `image` through `descriptor_set`.
    Dispatch {
        image: vk::Image,
        pipeline: vk::Pipeline,
        layout: vk::PipelineLayout,
        descriptor_set: vk::DescriptorSet,
        push: ComputePushConstants,
        groups: [u32; 3],
    },
    /// Open a rendering scope over `view`, keeping its contents.
    BeginRendering {
        image: vk::Image,
        view: vk::ImageView,
        extent: vk::Extent2D,
    },
    /// Draw non-indexed geometry with viewport and scissor covering `extent`.
    Draw {
        pipeline: vk::Pipeline,
        extent: vk::Extent2D,
        vertex_count: u32,
    },
    /// Placeholder for the UI overlay's draw data.
    Overlay,
    /// Close the current rendering scope.
    EndRendering,
    /// Scaled copy of all of `src` onto all of `dst`.
    Blit {
        src: vk::Image,
        dst: vk::Image,
        src_extent: vk::Extent2D,
        dst_extent: vk::Extent2D,
    },
}

/// Workgroup counts covering `extent` with square workgroups.
pub const fn dispatch_groups(extent: vk::Extent2D) -> [u32; 3] {
    [
        extent.width.div_ceil(WORKGROUP_SIZE),
        extent.height.div_ceil(WORKGROUP_SIZE),
        1,
    ]
}

/// An image the frame reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageTarget {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub extent: vk::Extent2D,
}

/// Everything needed to describe one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameInputs<'a> {
    /// Off-screen image the background and geometry are drawn into.
    pub draw: ImageTarget,
    /// The acquired swapchain image.
    pub present: ImageTarget,
    pub effect: &'a BackgroundEffect,
    /// Binds the draw target as a storage image.
    pub descriptor_set: vk::DescriptorSet,
    pub geometry_pipeline: vk::Pipeline,
}

/// Validated-on-demand list of commands for one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FramePlan {
    commands: Vec<FrameCommand>,
}

impl FramePlan {
    /// Create an empty plan.
    pub const fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    /// Append a command.
    pub fn push(&mut self, command: FrameCommand) -> &mut Self {
        self.commands.push(command);
        self
    }

    /// Append a layout transition.
    pub fn transition(
        &mut self,
        image: vk::Image,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    ) -> &mut Self {
        self.push(FrameCommand::Transition { image, old, new })
    }

    /// The commands in recording order.
    pub fn commands(&self) -> &[FrameCommand] {
        &self.commands
    }

    /// The standard frame: background, geometry, composite, overlay, present.
    pub fn for_frame(inputs: &FrameInputs<'_>) -> Self {
        let draw = inputs.draw;
        let present = inputs.present;
        let mut plan = Self::new();

        plan.transition(draw.image, vk::ImageLayout::UNDEFINED, vk::ImageLayout::GENERAL)
            .push(FrameCommand::Dispatch {
                image: draw.image,
                pipeline: inputs.effect.pipeline,
                layout: inputs.effect.layout,
                descriptor_set: inputs.descriptor_set,
                push: inputs.effect.data,
                groups: dispatch_groups(draw.extent),
            })
            .transition(
                draw.image,
                vk::ImageLayout::GENERAL,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            )
            .push(FrameCommand::BeginRendering {
                image: draw.image,
                view: draw.view,
                extent: draw.extent,
            })
            .push(FrameCommand::Draw {
                pipeline: inputs.geometry_pipeline,
                extent: draw.extent,
                vertex_count: TRIANGLE_VERTEX_COUNT,
            })
            .push(FrameCommand::EndRendering)
            .transition(
                draw.image,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            )
            .transition(
                present.image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )
            .push(FrameCommand::Blit {
                src: draw.image,
                dst: present.image,
                src_extent: draw.extent,
                dst_extent: present.extent,
            })
            .transition(
                present.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            )
            .push(FrameCommand::BeginRendering {
                image: present.image,
                view: present.view,
                extent: present.extent,
            })
            .push(FrameCommand::Overlay)
            .push(FrameCommand::EndRendering)
            .transition(
                present.image,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::ImageLayout::PRESENT_SRC_KHR,
            );

        plan
    }

    /// Check every command against the layouts its images are in.
    ///
    /// Images start out `UNDEFINED`. A transition from `UNDEFINED` is always
    /// allowed since it discards contents; any other transition must start
    /// from the tracked layout. `present_image` must end in `PRESENT_SRC_KHR`.
    pub fn validate(&self, present_image: vk::Image) -> Result<()> {
        let mut tracker = LayoutTracker::default();
        let mut scope: Option<vk::Image> = None;

        for (index, command) in self.commands.iter().enumerate() {
            let fail = |reason: String| {
                Err(GpuError::InvalidState(format!(
                    "frame command {index} ({command:?}): {reason}"
                )))
            };

            match *command {
                FrameCommand::Transition { image, old, new } => {
                    if scope.is_some() {
                        return fail("transition inside a rendering scope".to_string());
                    }
                    let current = tracker.layout(image);
                    if old != vk::ImageLayout::UNDEFINED && old != current {
                        return fail(format!("image is in {current:?}, not {old:?}"));
                    }
                    tracker.set(image, new);
                }
                FrameCommand::Clear { image, .. } | FrameCommand::Dispatch { image, .. } => {
                    if scope.is_some() {
                        return fail("compute work inside a rendering scope".to_string());
                    }
                    tracker.expect(image, vk::ImageLayout::GENERAL).or_else(fail)?;
                }
                FrameCommand::BeginRendering { image, .. } => {
                    if scope.is_some() {
                        return fail("rendering scopes cannot nest".to_string());
                    }
                    tracker
                        .expect(image, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                        .or_else(fail)?;
                    scope = Some(image);
                }
                FrameCommand::Draw { .. } | FrameCommand::Overlay => {
                    if scope.is_none() {
                        return fail("drawing outside a rendering scope".to_string());
                    }
                }
                FrameCommand::EndRendering => {
                    if scope.take().is_none() {
                        return fail("no rendering scope to end".to_string());
                    }
                }
                FrameCommand::Blit { src, dst, .. } => {
                    if scope.is_some() {
                        return fail("blit inside a rendering scope".to_string());
                    }
                    tracker
                        .expect(src, vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                        .or_else(fail)?;
                    tracker
                        .expect(dst, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                        .or_else(fail)?;
                }
            }
        }

        if scope.is_some() {
            return Err(GpuError::InvalidState(
                "frame ends inside a rendering scope".to_string(),
            ));
        }
        let final_layout = tracker.layout(present_image);
        if final_layout != vk::ImageLayout::PRESENT_SRC_KHR {
            return Err(GpuError::InvalidState(format!(
                "swapchain image left in {final_layout:?}, not PRESENT_SRC_KHR"
            )));
        }
        Ok(())
    }

    /// The layout transitions in recording order.
    pub fn transitions(
        &self,
    ) -> impl Iterator<Item = (vk::Image, vk::ImageLayout, vk::ImageLayout)> + '_ {
        self.commands.iter().filter_map(|command| match *command {
            FrameCommand::Transition { image, old, new } => Some((image, old, new)),
            _ => None,
        })
    }
}

/// Current layout of every image a plan touches.
#[derive(Debug, Default)]
struct LayoutTracker {
    layouts: HashMap<vk::Image, vk::ImageLayout>,
}

impl LayoutTracker {
    fn layout(&self, image: vk::Image) -> vk::ImageLayout {
        self.layouts
            .get(&image)
            .copied()
            .unwrap_or(vk::ImageLayout::UNDEFINED)
    }

    fn set(&mut self, image: vk::Image, layout: vk::ImageLayout) {
        self.layouts.insert(image, layout);
    }

    fn expect(&self, image: vk::Image, layout: vk::ImageLayout) -> std::result::Result<(), String> {
        let current = self.layout(image);
        if current == layout {
            Ok(())
        } else {
            Err(format!("image is in {current:?}, needs {layout:?}"))
        }
    }
}
