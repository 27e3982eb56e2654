//! GPU context management.

use crate::capabilities::GpuCapabilities;
use crate::deletion::{GpuResource, ResourceReleaser};
use crate::error::{GpuError, Result};
use crate::instance::{create_instance, select_physical_device, surface_extensions, DebugMessenger};
use crate::memory::GpuAllocator;
use ash::vk;
use parking_lot::Mutex;
use raw_window_handle::RawDisplayHandle;
use std::ffi::c_char;
use std::sync::Arc;

/// Instance, device, queue and allocator shared by the whole renderer.
///
/// Dropping the context destroys, in order: the allocator's memory, the
/// logical device, the debug messenger and the instance. Everything created
/// from the device must already be gone by then.
pub struct GpuContext {
    entry: ash::Entry,
    instance: ash::Instance,
    debug_messenger: Option<DebugMessenger>,
    physical_device: vk::PhysicalDevice,
    device: Arc<ash::Device>,
    capabilities: GpuCapabilities,
    allocator: Mutex<GpuAllocator>,
    graphics_queue_family: u32,
    graphics_queue: vk::Queue,
}

impl GpuContext {
    /// Get the Vulkan entry point.
    pub const fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// Get the Vulkan instance handle.
    pub const fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Get the physical device handle.
    pub const fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get GPU capabilities.
    pub const fn capabilities(&self) -> &GpuCapabilities {
        &self.capabilities
    }

    /// Get the graphics queue. It is also used for compute and present.
    pub const fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Get the graphics queue family index.
    pub const fn graphics_queue_family(&self) -> u32 {
        self.graphics_queue_family
    }

    /// Get access to the GPU allocator.
    pub const fn allocator(&self) -> &Mutex<GpuAllocator> {
        &self.allocator
    }

    /// Wait for device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl ResourceReleaser for GpuContext {
    fn release(&self, resource: GpuResource) -> Result<()> {
        tracing::trace!(kind = resource.kind(), "Releasing GPU resource");
        unsafe {
            match resource {
                GpuResource::Image(mut image) => self.allocator.lock().free_image(&mut image)?,
                GpuResource::ImageView(view) => self.device.destroy_image_view(view, None),
                GpuResource::Pipeline(pipeline) => self.device.destroy_pipeline(pipeline, None),
                GpuResource::PipelineLayout(layout) => {
                    self.device.destroy_pipeline_layout(layout, None);
                }
                GpuResource::DescriptorSetLayout(layout) => {
                    self.device.destroy_descriptor_set_layout(layout, None);
                }
                GpuResource::DescriptorPool(pool) => {
                    self.device.destroy_descriptor_pool(pool, None);
                }
                GpuResource::CommandPool(pool) => self.device.destroy_command_pool(pool, None),
                GpuResource::Fence(fence) => self.device.destroy_fence(fence, None),
                GpuResource::Semaphore(semaphore) => self.device.destroy_semaphore(semaphore, None),
                GpuResource::Callback(callback) => callback(),
            }
        }
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                tracing::warn!("Device did not go idle before destruction: {e}");
            }

            // Shutdown allocator BEFORE destroying device
            self.allocator.lock().shutdown();

            self.device.destroy_device(None);
            if let Some(messenger) = self.debug_messenger.take() {
                messenger.destroy();
            }
            self.instance.destroy_instance(None);
        }
        tracing::debug!("GPU context destroyed");
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
    display: Option<RawDisplayHandle>,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "Ember".to_string(),
            enable_validation: cfg!(debug_assertions),
            display: None,
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    #[must_use]
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    #[must_use]
    pub const fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Enable the surface extensions for windows on `display`.
    ///
    /// Without a display the context cannot create surfaces.
    #[must_use]
    pub const fn display(mut self, display: RawDisplayHandle) -> Self {
        self.display = Some(display);
        self
    }

    /// Build the GPU context.
    ///
    /// On failure everything created so far is destroyed again.
    pub fn build(self) -> Result<GpuContext> {
        let entry =
            unsafe { ash::Entry::load() }.map_err(|e| GpuError::Loading(e.to_string()))?;

        let extensions: &[*const c_char] = match self.display {
            Some(display) => surface_extensions(display)?,
            None => &[],
        };
        let instance = unsafe {
            create_instance(
                &entry,
                &self.app_name,
                extensions,
                self.enable_validation,
            )
        }?;

        let debug_messenger = if self.enable_validation {
            match unsafe { DebugMessenger::new(&entry, &instance) } {
                Ok(messenger) => Some(messenger),
                Err(e) => {
                    tracing::warn!("Validation messages unavailable: {e}");
                    None
                }
            }
        } else {
            None
        };

        let parts = match unsafe { open_device(&instance) } {
            Ok(parts) => parts,
            Err(e) => {
                unsafe {
                    if let Some(messenger) = &debug_messenger {
                        messenger.destroy();
                    }
                    instance.destroy_instance(None);
                }
                return Err(e);
            }
        };

        Ok(GpuContext {
            entry,
            instance,
            debug_messenger,
            physical_device: parts.physical_device,
            device: parts.device,
            capabilities: parts.capabilities,
            allocator: Mutex::new(parts.allocator),
            graphics_queue_family: parts.graphics_queue_family,
            graphics_queue: parts.graphics_queue,
        })
    }
}

/// Everything created from the instance.
struct DeviceParts {
    physical_device: vk::PhysicalDevice,
    capabilities: GpuCapabilities,
    device: Arc<ash::Device>,
    allocator: GpuAllocator,
    graphics_queue_family: u32,
    graphics_queue: vk::Queue,
}

/// Pick a physical device and create the logical device and allocator.
///
/// The device is destroyed again if the allocator cannot be created.
///
/// # Safety
/// The instance must be valid.
unsafe fn open_device(instance: &ash::Instance) -> Result<DeviceParts> {
    let physical_device = unsafe { select_physical_device(instance) }?;
    let capabilities = unsafe { GpuCapabilities::query(instance, physical_device) };

    if !capabilities.meets_requirements() {
        return Err(GpuError::NoSuitableDevice);
    }

    tracing::info!("Selected GPU: {}", capabilities.summary());

    let graphics_queue_family = unsafe { find_graphics_queue_family(instance, physical_device) }?;
    let device = unsafe { create_device(instance, physical_device, graphics_queue_family)? };
    let graphics_queue = unsafe { device.get_device_queue(graphics_queue_family, 0) };

    let device = Arc::new(device);
    let allocator = match unsafe { GpuAllocator::new(instance, device.clone(), physical_device) } {
        Ok(allocator) => allocator,
        Err(e) => {
            unsafe { device.destroy_device(None) };
            return Err(e);
        }
    };

    Ok(DeviceParts {
        physical_device,
        capabilities,
        device,
        allocator,
        graphics_queue_family,
        graphics_queue,
    })
}

/// Find the first queue family that supports graphics (and therefore compute).
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn find_graphics_queue_family(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<u32> {
    let families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    families
        .iter()
        .position(|family| {
            family
                .queue_flags
                .contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
        })
        .and_then(|index| u32::try_from(index).ok())
        .ok_or(GpuError::NoSuitableDevice)
}

/// Create the logical device with dynamic rendering and synchronization2.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_family: u32,
) -> Result<ash::Device> {
    let queue_priority = [1.0_f32];
    let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(queue_family)
        .queue_priorities(&queue_priority)];

    let extension_names = [ash::khr::swapchain::NAME.as_ptr()];

    let mut vulkan_1_3_features = vk::PhysicalDeviceVulkan13Features::default()
        .dynamic_rendering(true)
        .synchronization2(true);

    let mut features2 =
        vk::PhysicalDeviceFeatures2::default().push_next(&mut vulkan_1_3_features);

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .push_next(&mut features2);

    let device = unsafe { instance.create_device(physical_device, &device_create_info, None)? };

    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_to_headless() {
        let builder = GpuContextBuilder::new().app_name("test").validation(false);
        assert_eq!(builder.app_name, "test");
        assert!(!builder.enable_validation);
        assert!(builder.display.is_none());
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn headless_context_creation() {
        let gpu = GpuContextBuilder::new().validation(false).build().unwrap();
        assert!(gpu.capabilities().meets_requirements());
        gpu.wait_idle().unwrap();
    }
}
