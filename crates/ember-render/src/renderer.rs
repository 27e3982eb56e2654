//! The windowed renderer: owns the GPU context, swapchain and every
//! resource the frame loop draws with.

use crate::config::{RendererConfig, FRAME_OVERLAP};
use crate::device::{FrameDevice, VulkanFrameDevice};
use crate::effects::{BackgroundEffect, ComputePushConstants, EffectRegistry};
use crate::frame::FrameSlot;
use crate::frame_loop::{FrameLoop, FrameResources, FrameStatus};
use crate::immediate::ImmediateSubmit;
use crate::overlay::UiOverlay;
use crate::plan::{FrameCommand, ImageTarget, INITIAL_CLEAR_COLOR};
use ash::vk;
use ember_gpu::descriptors::write_storage_image;
use ember_gpu::image::{image_create_info, image_view_create_info};
use ember_gpu::pipeline::{create_compute_pipeline, create_pipeline_layout};
use ember_gpu::shader::{load_shader_module, shader_path};
use ember_gpu::{
    DeletionQueue, DescriptorAllocator, DescriptorLayoutBuilder, GpuContext, GpuContextBuilder,
    GpuError, GpuResource, GraphicsPipelineConfig, PoolSizeRatio, ResourceReleaser, Result,
    SurfaceContext, Swapchain,
};
use gpu_allocator::MemoryLocation;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// Descriptor sets the renderer's pool can hand out.
const DESCRIPTOR_POOL_SETS: u32 = 10;

/// Background effects built at startup: name, shader, initial parameters.
const BACKGROUND_EFFECTS: [(&str, &str, ComputePushConstants); 2] = [
    ("gradient", "gradient_color.comp", ComputePushConstants::gradient()),
    ("sky", "sky.comp", ComputePushConstants::sky()),
];

const TRIANGLE_VERTEX_SHADER: &str = "colored_triangle.vert";
const TRIANGLE_FRAGMENT_SHADER: &str = "colored_triangle.frag";

/// Vulkan renderer drawing a compute background, a triangle and an optional
/// UI overlay into a window.
pub struct Renderer {
    frame_loop: FrameLoop,
    immediate: ImmediateSubmit,
    /// Resources living as long as the renderer.
    deletion_queue: DeletionQueue,
    /// `None` while a failed recreation awaits a retry.
    swapchain: Option<Swapchain>,
    swapchain_format: vk::Format,
    surface: SurfaceContext,
    config: RendererConfig,
    torn_down: bool,
    // Dropped last
    gpu: GpuContext,
}

impl Renderer {
    /// Initialize the GPU, swapchain and all frame resources for `window`.
    ///
    /// Anything created before a failure is destroyed again.
    pub fn new<W>(window: &W, width: u32, height: u32, config: RendererConfig) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?
            .as_raw();
        let gpu = GpuContextBuilder::new()
            .app_name(config.app_name.clone())
            .validation(config.validation)
            .display(display)
            .build()?;
        tracing::info!("{}", gpu.capabilities().summary());

        let surface = unsafe { SurfaceContext::from_window(&gpu, window)? };
        let swapchain = match unsafe { surface.create_swapchain(&gpu, width, height, config.vsync) }
        {
            Ok(swapchain) => swapchain,
            Err(e) => {
                unsafe { surface.destroy() };
                return Err(e);
            }
        };

        let mut deletion_queue = DeletionQueue::new();
        match init_resources(&gpu, &surface, &swapchain, &config, &mut deletion_queue) {
            Ok((frame_loop, immediate)) => {
                tracing::info!(
                    width = swapchain.extent.width,
                    height = swapchain.extent.height,
                    format = ?swapchain.format,
                    "Renderer initialized"
                );
                Ok(Self {
                    frame_loop,
                    immediate,
                    deletion_queue,
                    swapchain_format: swapchain.format,
                    swapchain: Some(swapchain),
                    surface,
                    config,
                    torn_down: false,
                    gpu,
                })
            }
            Err(e) => {
                tracing::error!("Renderer initialization failed: {e}");
                if let Err(idle_err) = gpu.wait_idle() {
                    tracing::warn!("Device did not go idle: {idle_err}");
                }
                if let Err(flush_err) = deletion_queue.flush(&gpu) {
                    tracing::warn!("Cleanup after failed initialization failed: {flush_err}");
                }
                unsafe {
                    swapchain.destroy(gpu.device(), &surface.swapchain_loader);
                    surface.destroy();
                }
                Err(e)
            }
        }
    }

    /// Draw and present one frame.
    ///
    /// Recoverable errors mean the swapchain must be recreated before the
    /// next call; every other error is fatal.
    pub fn draw_frame(&mut self, overlay: &mut dyn UiOverlay) -> Result<FrameStatus> {
        if self.torn_down {
            return Err(GpuError::InvalidState("renderer was torn down".to_string()));
        }
        let swapchain = self
            .swapchain
            .as_ref()
            .ok_or(GpuError::SwapchainOutOfDate)?;
        let device = VulkanFrameDevice::new(&self.gpu, &self.surface.swapchain_loader, swapchain);
        self.frame_loop.draw_frame(&device, overlay)
    }

    /// Replace the swapchain after a resize or an out-of-date report.
    ///
    /// A zero-sized window (e.g. minimized) is skipped. The draw target keeps
    /// its size; frames are scaled onto the new swapchain.
    pub fn recreate_swapchain(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            tracing::debug!("Skipping swapchain recreation for zero-sized window");
            return Ok(());
        }

        self.gpu.wait_idle()?;
        self.frame_loop.clear_swapchain_targets();
        if let Some(old) = self.swapchain.take() {
            unsafe { old.destroy(self.gpu.device(), &self.surface.swapchain_loader) };
        }

        let swapchain = unsafe {
            self.surface
                .create_swapchain(&self.gpu, width, height, self.config.vsync)?
        };
        self.frame_loop.set_swapchain_targets(
            &swapchain.images,
            &swapchain.image_views,
            swapchain.extent,
        )?;
        self.swapchain_format = swapchain.format;

        tracing::info!(
            width = swapchain.extent.width,
            height = swapchain.extent.height,
            "Swapchain recreated"
        );
        self.swapchain = Some(swapchain);
        Ok(())
    }

    /// Run `record` on the immediate command buffer and wait for it.
    pub fn immediate_submit<F>(&self, record: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer) -> Result<()>,
    {
        let swapchain = self
            .swapchain
            .as_ref()
            .ok_or(GpuError::SwapchainOutOfDate)?;
        let device = VulkanFrameDevice::new(&self.gpu, &self.surface.swapchain_loader, swapchain);
        self.immediate
            .submit(&device, |_, cmd| record(self.gpu.device(), cmd))
    }

    pub const fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    pub const fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Format of the swapchain images, for pipelines drawing onto them.
    pub const fn swapchain_format(&self) -> vk::Format {
        self.swapchain_format
    }

    /// Current swapchain extent, if a swapchain exists.
    pub fn swapchain_extent(&self) -> Option<vk::Extent2D> {
        self.swapchain.as_ref().map(|swapchain| swapchain.extent)
    }

    /// Command pool of the immediate submitter.
    pub const fn immediate_command_pool(&self) -> vk::CommandPool {
        self.immediate.command_pool()
    }

    pub const fn frame_number(&self) -> u64 {
        self.frame_loop.frame_number()
    }

    pub const fn draw_extent(&self) -> vk::Extent2D {
        self.frame_loop.draw_extent()
    }

    pub const fn effects(&self) -> &EffectRegistry {
        self.frame_loop.effects()
    }

    pub fn effects_mut(&mut self) -> &mut EffectRegistry {
        self.frame_loop.effects_mut()
    }

    /// Release `resource` when the renderer is torn down.
    pub fn defer_until_teardown(&mut self, resource: GpuResource) {
        self.deletion_queue.push(resource);
    }

    /// Release `resource` once the most recently submitted frame has finished.
    pub fn defer_release(&mut self, resource: GpuResource) {
        self.frame_loop.defer_release(resource);
    }

    /// Wait for the device to finish all submitted work.
    pub fn wait_idle(&self) -> Result<()> {
        self.gpu.wait_idle()
    }

    /// Destroy everything except the GPU context: long-lived resources
    /// newest first, then the frame slots, the swapchain and the surface.
    ///
    /// Idempotent; also run on drop. Every step is attempted and the first
    /// error is returned.
    pub fn teardown(&mut self) -> Result<()> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;

        let idle = self.gpu.wait_idle();
        if let Err(e) = &idle {
            tracing::error!("Device did not go idle before teardown: {e}");
        }
        let released = release_resources(
            &self.gpu,
            &mut self.deletion_queue,
            self.frame_loop.take_slots(),
        );

        self.frame_loop.clear_swapchain_targets();
        unsafe {
            if let Some(swapchain) = self.swapchain.take() {
                swapchain.destroy(self.gpu.device(), &self.surface.swapchain_loader);
            }
            self.surface.destroy();
        }

        tracing::info!("Renderer torn down");
        idle.and(released)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            tracing::error!("Renderer teardown failed: {e}");
        }
    }
}

/// Flush the long-lived queue, then release every frame slot.
///
/// Every step runs even after a failure; the first error is returned.
fn release_resources(
    releaser: &impl ResourceReleaser,
    deletion_queue: &mut DeletionQueue,
    slots: Vec<FrameSlot>,
) -> Result<()> {
    let mut first_error = None;
    let mut note = |result: Result<()>| {
        if let Err(e) = result {
            tracing::error!("Teardown step failed: {e}");
            first_error.get_or_insert(e);
        }
    };

    note(deletion_queue.flush(releaser));
    for slot in slots {
        note(slot.release(releaser));
    }

    first_error.map_or(Ok(()), Err)
}

/// Build the draw target, descriptors, pipelines and frame slots, pushing
/// each long-lived object onto `deletion_queue` as it is created.
fn init_resources(
    gpu: &GpuContext,
    surface: &SurfaceContext,
    swapchain: &Swapchain,
    config: &RendererConfig,
    deletion_queue: &mut DeletionQueue,
) -> Result<(FrameLoop, ImmediateSubmit)> {
    let device = gpu.device();

    // Draw target
    let draw_usage = vk::ImageUsageFlags::TRANSFER_SRC
        | vk::ImageUsageFlags::TRANSFER_DST
        | vk::ImageUsageFlags::STORAGE
        | vk::ImageUsageFlags::COLOR_ATTACHMENT;
    let draw_image = gpu.allocator().lock().create_image(
        &image_create_info(
            config.draw_format,
            draw_usage,
            vk::Extent3D {
                width: swapchain.extent.width,
                height: swapchain.extent.height,
                depth: 1,
            },
        ),
        MemoryLocation::GpuOnly,
        "draw image",
    )?;
    let draw_handle = draw_image.image;
    let draw_extent = draw_image.extent_2d();
    deletion_queue.push(GpuResource::Image(draw_image));

    let draw_view = unsafe {
        device.create_image_view(
            &image_view_create_info(config.draw_format, draw_handle, vk::ImageAspectFlags::COLOR),
            None,
        )?
    };
    deletion_queue.push(GpuResource::ImageView(draw_view));

    let immediate = unsafe { ImmediateSubmit::new(gpu, config.immediate_timeout)? };
    deletion_queue.push(GpuResource::CommandPool(immediate.command_pool()));
    deletion_queue.push(GpuResource::Fence(immediate.fence()));

    // Descriptors
    let descriptor_allocator = unsafe {
        DescriptorAllocator::new(
            device,
            DESCRIPTOR_POOL_SETS,
            &[PoolSizeRatio {
                descriptor_type: vk::DescriptorType::STORAGE_IMAGE,
                ratio: 1.0,
            }],
        )?
    };
    deletion_queue.push(GpuResource::DescriptorPool(descriptor_allocator.handle()));

    let mut layout_builder = DescriptorLayoutBuilder::new();
    layout_builder.add_binding(0, vk::DescriptorType::STORAGE_IMAGE);
    let draw_set_layout = unsafe { layout_builder.build(device, vk::ShaderStageFlags::COMPUTE)? };
    deletion_queue.push(GpuResource::DescriptorSetLayout(draw_set_layout));

    let descriptor_set = unsafe { descriptor_allocator.allocate(device, draw_set_layout)? };
    unsafe {
        write_storage_image(device, descriptor_set, 0, draw_view, vk::ImageLayout::GENERAL);
    }

    // Background effects
    let compute_layout = unsafe {
        create_pipeline_layout(device, &[draw_set_layout], &[ComputePushConstants::range()])?
    };
    deletion_queue.push(GpuResource::PipelineLayout(compute_layout));

    let mut effects = EffectRegistry::new();
    for (name, shader, data) in BACKGROUND_EFFECTS {
        let module = unsafe { load_shader_module(device, &shader_path(&config.shader_dir, shader))? };
        let pipeline = unsafe { create_compute_pipeline(device, module, compute_layout) };
        unsafe { device.destroy_shader_module(module, None) };
        let pipeline = pipeline?;
        deletion_queue.push(GpuResource::Pipeline(pipeline));

        effects.register(BackgroundEffect {
            name: name.to_string(),
            pipeline,
            layout: compute_layout,
            data,
        });
    }

    // Triangle
    let triangle_layout = unsafe { create_pipeline_layout(device, &[], &[])? };
    deletion_queue.push(GpuResource::PipelineLayout(triangle_layout));

    let vertex_shader = unsafe {
        load_shader_module(device, &shader_path(&config.shader_dir, TRIANGLE_VERTEX_SHADER))?
    };
    let fragment_shader = match unsafe {
        load_shader_module(device, &shader_path(&config.shader_dir, TRIANGLE_FRAGMENT_SHADER))
    } {
        Ok(module) => module,
        Err(e) => {
            unsafe { device.destroy_shader_module(vertex_shader, None) };
            return Err(e);
        }
    };
    let triangle_pipeline = unsafe {
        GraphicsPipelineConfig {
            vertex_shader,
            fragment_shader,
            layout: triangle_layout,
            color_format: config.draw_format,
            ..Default::default()
        }
        .build(device)
    };
    unsafe {
        device.destroy_shader_module(vertex_shader, None);
        device.destroy_shader_module(fragment_shader, None);
    }
    let triangle_pipeline = triangle_pipeline?;
    deletion_queue.push(GpuResource::Pipeline(triangle_pipeline));

    // Start from a defined image
    let frame_device = VulkanFrameDevice::new(gpu, &surface.swapchain_loader, swapchain);
    immediate.submit(&frame_device, |device, cmd| {
        device.record(
            cmd,
            &FrameCommand::Transition {
                image: draw_handle,
                old: vk::ImageLayout::UNDEFINED,
                new: vk::ImageLayout::GENERAL,
            },
        );
        device.record(
            cmd,
            &FrameCommand::Clear {
                image: draw_handle,
                color: INITIAL_CLEAR_COLOR,
            },
        );
        Ok(())
    })?;

    let mut slots = Vec::with_capacity(FRAME_OVERLAP);
    for _ in 0..FRAME_OVERLAP {
        match unsafe { FrameSlot::new(gpu) } {
            Ok(slot) => slots.push(slot),
            Err(e) => {
                for slot in slots {
                    if let Err(release_err) = slot.release(gpu) {
                        tracing::warn!("Failed to release frame slot: {release_err}");
                    }
                }
                return Err(e);
            }
        }
    }

    let resources = FrameResources {
        draw: ImageTarget {
            image: draw_handle,
            view: draw_view,
            extent: draw_extent,
        },
        descriptor_set,
        geometry_pipeline: triangle_pipeline,
        effects,
    };
    let mut frame_loop = FrameLoop::new(slots, resources, config.fence_timeout, config.acquire_timeout)?;
    frame_loop.set_swapchain_targets(&swapchain.images, &swapchain.image_views, swapchain.extent)?;

    tracing::debug!(
        effects = frame_loop.effects().len(),
        slots = FRAME_OVERLAP,
        "Frame resources created"
    );
    Ok((frame_loop, immediate))
}
