//! imgui debug overlay for the background effects.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context as _;
use ash::vk;
use ember_app::{AppContext, GpuError, UiOverlay, Window, WindowEvent};
use ember_render::{EffectRegistry, FRAME_OVERLAP};
use glam::Vec4;
use imgui::Context;
use imgui_rs_vulkan_renderer::{DynamicRendering, Options, Renderer};
use imgui_winit_support::{HiDpiMode, WinitPlatform};

const PARAMETER_LABELS: [&str; 4] = ["data1", "data2", "data3", "data4"];

/// Draws the "background" window onto the swapchain image.
pub struct ImguiOverlay {
    // Holds device objects; dropped before everything else
    renderer: Option<Renderer>,
    platform: WinitPlatform,
    imgui: Context,
    window: Arc<Window>,
    last_frame: Instant,
    /// A frame was started but its draw data not yet consumed.
    frame_pending: bool,
}

impl ImguiOverlay {
    /// Create the imgui context and its Vulkan renderer for the app's swapchain.
    pub fn new(ctx: &AppContext) -> anyhow::Result<Self> {
        let mut imgui = Context::create();
        imgui.set_ini_filename(None);

        let mut platform = WinitPlatform::new(&mut imgui);
        platform.attach_window(imgui.io_mut(), &ctx.window, HiDpiMode::Default);

        let gpu = ctx.renderer.gpu();
        let renderer = Renderer::with_default_allocator(
            gpu.instance(),
            gpu.physical_device(),
            gpu.device().clone(),
            gpu.graphics_queue(),
            ctx.renderer.immediate_command_pool(),
            DynamicRendering {
                color_attachment_format: ctx.renderer.swapchain_format(),
                depth_attachment_format: None,
            },
            &mut imgui,
            Some(Options {
                in_flight_frames: FRAME_OVERLAP,
                ..Default::default()
            }),
        )
        .context("Failed to create imgui renderer")?;

        Ok(Self {
            renderer: Some(renderer),
            platform,
            imgui,
            window: Arc::clone(&ctx.window),
            last_frame: Instant::now(),
            frame_pending: false,
        })
    }

    /// Feed a window event to imgui. Returns `true` if imgui wants the input.
    pub fn handle_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        self.platform.handle_event::<()>(
            self.imgui.io_mut(),
            window,
            &winit::event::Event::WindowEvent {
                window_id: window.id(),
                event: event.clone(),
            },
        );

        let io = self.imgui.io();
        match event {
            WindowEvent::CursorMoved { .. }
            | WindowEvent::MouseInput { .. }
            | WindowEvent::MouseWheel { .. } => io.want_capture_mouse,
            WindowEvent::KeyboardInput { .. } => io.want_capture_keyboard,
            _ => false,
        }
    }

    /// Destroy the Vulkan renderer. The device must be idle.
    pub fn shutdown(&mut self) {
        if self.renderer.take().is_some() {
            tracing::debug!("imgui renderer destroyed");
        }
    }
}

impl UiOverlay for ImguiOverlay {
    fn prepare(&mut self, effects: &mut EffectRegistry) -> ember_gpu::Result<()> {
        if self.frame_pending {
            // The previous frame never reached the command buffer.
            self.imgui.render();
        }

        let now = Instant::now();
        self.imgui
            .io_mut()
            .update_delta_time(now.duration_since(self.last_frame));
        self.last_frame = now;

        self.platform
            .prepare_frame(self.imgui.io_mut(), &self.window)
            .map_err(|e| GpuError::Other(format!("imgui frame preparation failed: {e}")))?;

        let ui = self.imgui.new_frame();
        let last_index = i32::try_from(effects.len().saturating_sub(1)).unwrap_or(i32::MAX);
        let mut index = i32::try_from(effects.current_index()).unwrap_or(0);

        ui.window("background").build(|| {
            if let Some(effect) = effects.current() {
                ui.text(format!("Selected effect: {}", effect.name));
            }
            if ui.slider("Effect Index", 0, last_index, &mut index) {
                effects.select_clamped(index);
            }
            if let Some(effect) = effects.current_mut() {
                for (label, field) in PARAMETER_LABELS.into_iter().zip(effect.data.fields_mut()) {
                    let mut values = field.to_array();
                    if ui.input_float4(label, &mut values).build() {
                        *field = Vec4::from_array(values);
                    }
                }
            }
        });

        self.platform.prepare_render(ui, &self.window);
        self.frame_pending = true;
        Ok(())
    }

    fn record(&mut self, cmd: vk::CommandBuffer) -> ember_gpu::Result<()> {
        if !self.frame_pending {
            return Ok(());
        }
        self.frame_pending = false;

        let draw_data = self.imgui.render();
        if let Some(renderer) = &mut self.renderer {
            renderer
                .cmd_draw(cmd, draw_data)
                .map_err(|e| GpuError::Other(format!("imgui draw failed: {e}")))?;
        }
        Ok(())
    }
}
