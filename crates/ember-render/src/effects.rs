//! Selectable background compute effects.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use ember_gpu::{GpuError, Result};
use glam::Vec4;

/// Push-constant block shared by every background shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct ComputePushConstants {
    pub data1: Vec4,
    pub data2: Vec4,
    pub data3: Vec4,
    pub data4: Vec4,
}

impl ComputePushConstants {
    /// Size of the block in bytes.
    #[allow(clippy::cast_possible_truncation)]
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    /// The push-constant range compute layouts declare for this block.
    pub const fn range() -> vk::PushConstantRange {
        vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::COMPUTE,
            offset: 0,
            size: Self::SIZE,
        }
    }

    /// Red at the top fading to blue at the bottom.
    pub const fn gradient() -> Self {
        Self {
            data1: Vec4::new(1.0, 0.0, 0.0, 1.0),
            data2: Vec4::new(0.0, 0.0, 1.0, 1.0),
            data3: Vec4::ZERO,
            data4: Vec4::ZERO,
        }
    }

    /// Night sky with a star threshold in `data1.w`.
    pub const fn sky() -> Self {
        Self {
            data1: Vec4::new(0.1, 0.2, 0.4, 0.97),
            data2: Vec4::ZERO,
            data3: Vec4::ZERO,
            data4: Vec4::ZERO,
        }
    }

    /// The four parameter vectors, for editing.
    pub fn fields_mut(&mut self) -> [&mut Vec4; 4] {
        [
            &mut self.data1,
            &mut self.data2,
            &mut self.data3,
            &mut self.data4,
        ]
    }
}

/// A named compute pipeline with its own parameters.
#[derive(Debug, Clone)]
pub struct BackgroundEffect {
    pub name: String,
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub data: ComputePushConstants,
}

/// Ordered list of effects with exactly one selected while non-empty.
#[derive(Debug, Default)]
pub struct EffectRegistry {
    effects: Vec<BackgroundEffect>,
    current: usize,
}

impl EffectRegistry {
    /// Create an empty registry.
    pub const fn new() -> Self {
        Self {
            effects: Vec::new(),
            current: 0,
        }
    }

    /// Append an effect. The first one registered starts out selected.
    pub fn register(&mut self, effect: BackgroundEffect) {
        tracing::debug!(name = %effect.name, index = self.effects.len(), "Registered background effect");
        self.effects.push(effect);
    }

    /// Number of registered effects.
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    /// Whether no effect is registered.
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Index of the selected effect.
    pub const fn current_index(&self) -> usize {
        self.current
    }

    /// The selected effect, if any are registered.
    pub fn current(&self) -> Option<&BackgroundEffect> {
        self.effects.get(self.current)
    }

    /// Mutable access to the selected effect's entry.
    pub fn current_mut(&mut self) -> Option<&mut BackgroundEffect> {
        self.effects.get_mut(self.current)
    }

    /// Select effect `index`, rejecting anything past the end.
    pub fn select(&mut self, index: usize) -> Result<()> {
        if index >= self.effects.len() {
            return Err(GpuError::OutOfRange {
                index: i64::try_from(index).unwrap_or(i64::MAX),
                len: self.effects.len(),
            });
        }
        self.current = index;
        Ok(())
    }

    /// Select the effect nearest to `index`, as a UI slider would.
    ///
    /// Returns the index actually selected. Does nothing while empty.
    pub fn select_clamped(&mut self, index: i32) -> usize {
        if let Some(last) = self.effects.len().checked_sub(1) {
            self.current = usize::try_from(index).map_or(0, |index| index.min(last));
        }
        self.current
    }

    /// Iterate over the registered effects in order.
    pub fn iter(&self) -> impl Iterator<Item = &BackgroundEffect> {
        self.effects.iter()
    }
}
