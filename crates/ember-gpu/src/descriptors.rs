//! Descriptor set management.

use crate::deletion::{GpuResource, ResourceReleaser};
use crate::error::Result;
use ash::vk;

/// Accumulates descriptor bindings and builds a set layout from them.
#[derive(Debug, Default)]
pub struct DescriptorLayoutBuilder {
    bindings: Vec<(u32, vk::DescriptorType)>,
}

impl DescriptorLayoutBuilder {
    /// Create an empty builder.
    pub const fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Add a single-descriptor binding. Collisions are not checked.
    pub fn add_binding(&mut self, binding: u32, descriptor_type: vk::DescriptorType) -> &mut Self {
        self.bindings.push((binding, descriptor_type));
        self
    }

    /// Forget all accumulated bindings.
    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    /// The accumulated bindings, all visible to `stages`.
    pub fn layout_bindings(
        &self,
        stages: vk::ShaderStageFlags,
    ) -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
        self.bindings
            .iter()
            .map(|&(binding, descriptor_type)| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding)
                    .descriptor_type(descriptor_type)
                    .descriptor_count(1)
                    .stage_flags(stages)
            })
            .collect()
    }

    /// Build the descriptor set layout.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn build(
        &self,
        device: &ash::Device,
        stages: vk::ShaderStageFlags,
    ) -> Result<vk::DescriptorSetLayout> {
        let bindings = self.layout_bindings(stages);
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);

        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None)? };
        Ok(layout)
    }
}

/// How many descriptors of one type to reserve per set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolSizeRatio {
    pub descriptor_type: vk::DescriptorType,
    pub ratio: f32,
}

/// Pool capacities for `max_sets` sets at the given ratios.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn pool_sizes(max_sets: u32, ratios: &[PoolSizeRatio]) -> Vec<vk::DescriptorPoolSize> {
    ratios
        .iter()
        .map(|ratio| vk::DescriptorPoolSize {
            ty: ratio.descriptor_type,
            descriptor_count: (ratio.ratio * max_sets as f32) as u32,
        })
        .collect()
}

/// Fixed-capacity descriptor pool.
pub struct DescriptorAllocator {
    pool: vk::DescriptorPool,
}

impl DescriptorAllocator {
    /// Create a pool holding `max_sets` sets.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(
        device: &ash::Device,
        max_sets: u32,
        ratios: &[PoolSizeRatio],
    ) -> Result<Self> {
        let sizes = pool_sizes(max_sets, ratios);
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(&sizes);

        let pool = unsafe { device.create_descriptor_pool(&create_info, None)? };
        Ok(Self { pool })
    }

    /// Get the raw pool handle.
    pub const fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Allocate one set. Fails when the pool is exhausted.
    ///
    /// # Safety
    /// The device and layout must be valid.
    pub unsafe fn allocate(
        &self,
        device: &ash::Device,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet> {
        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let sets = unsafe { device.allocate_descriptor_sets(&alloc_info)? };
        Ok(sets[0])
    }

    /// Return every set to the pool without destroying it.
    ///
    /// # Safety
    /// The device must be valid and no set from this pool may be in use.
    pub unsafe fn clear(&self, device: &ash::Device) -> Result<()> {
        unsafe { device.reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty())? };
        Ok(())
    }

    /// Destroy the pool and with it every set allocated from it.
    ///
    /// The pool must not be queued on a [`DeletionQueue`](crate::DeletionQueue)
    /// as well.
    pub fn destroy(self, releaser: &impl ResourceReleaser) -> Result<()> {
        releaser.release(GpuResource::DescriptorPool(self.pool))
    }
}

/// Point a storage image binding at `image_view`.
///
/// # Safety
/// Device and image view must be valid.
pub unsafe fn write_storage_image(
    device: &ash::Device,
    dst_set: vk::DescriptorSet,
    binding: u32,
    image_view: vk::ImageView,
    layout: vk::ImageLayout,
) {
    let image_info = vk::DescriptorImageInfo::default()
        .image_view(image_view)
        .image_layout(layout);

    let write = vk::WriteDescriptorSet::default()
        .dst_set(dst_set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
        .image_info(std::slice::from_ref(&image_info));

    unsafe { device.update_descriptor_sets(&[write], &[]) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bindings_take_the_build_stage_mask() {
        let mut builder = DescriptorLayoutBuilder::new();
        builder
            .add_binding(0, vk::DescriptorType::STORAGE_IMAGE)
            .add_binding(1, vk::DescriptorType::UNIFORM_BUFFER);

        let bindings = builder.layout_bindings(vk::ShaderStageFlags::COMPUTE);
        assert_eq!(bindings.len(), 2);
        assert!(bindings
            .iter()
            .all(|b| b.stage_flags == vk::ShaderStageFlags::COMPUTE && b.descriptor_count == 1));
        assert_eq!(bindings[1].binding, 1);
        assert_eq!(bindings[1].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
    }

    #[test]
    fn clear_leaves_no_bindings_behind() {
        let mut builder = DescriptorLayoutBuilder::new();
        builder.add_binding(0, vk::DescriptorType::STORAGE_IMAGE);
        let _ = builder.layout_bindings(vk::ShaderStageFlags::COMPUTE);

        builder.clear();
        assert!(builder
            .layout_bindings(vk::ShaderStageFlags::FRAGMENT)
            .is_empty());
    }

    #[test]
    fn pool_capacity_is_ratio_times_max_sets() {
        let sizes = pool_sizes(
            10,
            &[
                PoolSizeRatio {
                    descriptor_type: vk::DescriptorType::STORAGE_IMAGE,
                    ratio: 1.0,
                },
                PoolSizeRatio {
                    descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                    ratio: 0.5,
                },
            ],
        );

        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[0].ty, vk::DescriptorType::STORAGE_IMAGE);
        assert_eq!(sizes[0].descriptor_count, 10);
        assert_eq!(sizes[1].descriptor_count, 5);
    }

    #[test]
    fn destroy_releases_the_pool() {
        use ash::vk::Handle;
        use std::cell::RefCell;

        #[derive(Default)]
        struct Released(RefCell<Vec<vk::DescriptorPool>>);

        impl ResourceReleaser for Released {
            fn release(&self, resource: GpuResource) -> Result<()> {
                if let GpuResource::DescriptorPool(pool) = resource {
                    self.0.borrow_mut().push(pool);
                }
                Ok(())
            }
        }

        let released = Released::default();
        let allocator = DescriptorAllocator {
            pool: vk::DescriptorPool::from_raw(42),
        };
        allocator.destroy(&released).unwrap();
        assert_eq!(*released.0.borrow(), vec![vk::DescriptorPool::from_raw(42)]);
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn cleared_pool_can_be_refilled() {
        let gpu = crate::GpuContextBuilder::new()
            .validation(false)
            .build()
            .unwrap();
        let device = gpu.device();
        let ratios = [PoolSizeRatio {
            descriptor_type: vk::DescriptorType::STORAGE_IMAGE,
            ratio: 1.0,
        }];

        unsafe {
            let mut builder = DescriptorLayoutBuilder::new();
            builder.add_binding(0, vk::DescriptorType::STORAGE_IMAGE);
            let layout = builder.build(device, vk::ShaderStageFlags::COMPUTE).unwrap();
            let allocator = DescriptorAllocator::new(device, 1, &ratios).unwrap();

            allocator.allocate(device, layout).unwrap();
            allocator.clear(device).unwrap();
            allocator.allocate(device, layout).unwrap();

            allocator.destroy(&gpu).unwrap();
            device.destroy_descriptor_set_layout(layout, None);
        }
    }
}
