//! Deferred resource deletion.
//!
//! GPU objects are pushed as they are created and released in reverse order
//! on flush, so dependents always go before the objects they were built from.
//! One queue lives for the whole renderer and is flushed at shutdown; each
//! frame slot owns another that is flushed once the slot's fence has signaled.

use crate::error::Result;
use crate::memory::GpuImage;
use ash::vk;
use std::fmt;

/// A GPU object (or arbitrary action) waiting to be released.
pub enum GpuResource {
    Image(GpuImage),
    ImageView(vk::ImageView),
    Pipeline(vk::Pipeline),
    PipelineLayout(vk::PipelineLayout),
    DescriptorSetLayout(vk::DescriptorSetLayout),
    DescriptorPool(vk::DescriptorPool),
    CommandPool(vk::CommandPool),
    Fence(vk::Fence),
    Semaphore(vk::Semaphore),
    /// Cleanup that is not a single handle, e.g. shutting down an overlay renderer.
    Callback(Box<dyn FnOnce() + Send>),
}

impl GpuResource {
    /// Short name of the resource kind, for logging.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Image(_) => "image",
            Self::ImageView(_) => "image view",
            Self::Pipeline(_) => "pipeline",
            Self::PipelineLayout(_) => "pipeline layout",
            Self::DescriptorSetLayout(_) => "descriptor set layout",
            Self::DescriptorPool(_) => "descriptor pool",
            Self::CommandPool(_) => "command pool",
            Self::Fence(_) => "fence",
            Self::Semaphore(_) => "semaphore",
            Self::Callback(_) => "callback",
        }
    }
}

impl fmt::Debug for GpuResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image(image) => write!(f, "Image({:?})", image.image),
            Self::ImageView(view) => write!(f, "ImageView({view:?})"),
            Self::Pipeline(pipeline) => write!(f, "Pipeline({pipeline:?})"),
            Self::PipelineLayout(layout) => write!(f, "PipelineLayout({layout:?})"),
            Self::DescriptorSetLayout(layout) => write!(f, "DescriptorSetLayout({layout:?})"),
            Self::DescriptorPool(pool) => write!(f, "DescriptorPool({pool:?})"),
            Self::CommandPool(pool) => write!(f, "CommandPool({pool:?})"),
            Self::Fence(fence) => write!(f, "Fence({fence:?})"),
            Self::Semaphore(semaphore) => write!(f, "Semaphore({semaphore:?})"),
            Self::Callback(_) => f.write_str("Callback"),
        }
    }
}

/// Something that can destroy GPU resources.
///
/// Implemented by [`GpuContext`](crate::GpuContext); tests substitute a
/// recording implementation.
pub trait ResourceReleaser {
    /// Destroy one resource. Called exactly once per pushed resource.
    fn release(&self, resource: GpuResource) -> Result<()>;
}

/// LIFO queue of resources awaiting destruction.
#[derive(Debug, Default)]
pub struct DeletionQueue {
    resources: Vec<GpuResource>,
}

impl DeletionQueue {
    /// Create an empty queue.
    pub const fn new() -> Self {
        Self {
            resources: Vec::new(),
        }
    }

    /// Append a resource to be released on the next flush.
    pub fn push(&mut self, resource: GpuResource) {
        self.resources.push(resource);
    }

    /// Append an arbitrary cleanup action.
    pub fn push_callback(&mut self, callback: impl FnOnce() + Send + 'static) {
        self.resources.push(GpuResource::Callback(Box::new(callback)));
    }

    /// Release every pending resource, most recently pushed first.
    ///
    /// The queue is empty afterwards, so a second flush releases nothing.
    /// A failed release stops the flush and leaves the older entries queued.
    pub fn flush(&mut self, releaser: &impl ResourceReleaser) -> Result<()> {
        if self.resources.is_empty() {
            return Ok(());
        }

        tracing::trace!(count = self.resources.len(), "Flushing deletion queue");
        while let Some(resource) = self.resources.pop() {
            releaser.release(resource)?;
        }
        Ok(())
    }

    /// Number of pending resources.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Releases everything pushed into it when dropped, unless disarmed.
///
/// Hold one while creating a group of objects: an early return through `?`
/// destroys whatever was created before the failure, newest first.
pub struct ReleaseGuard<'a, R: ResourceReleaser> {
    releaser: &'a R,
    queue: DeletionQueue,
}

impl<'a, R: ResourceReleaser> ReleaseGuard<'a, R> {
    pub const fn new(releaser: &'a R) -> Self {
        Self {
            releaser,
            queue: DeletionQueue::new(),
        }
    }

    /// Track `resource` until the guard is disarmed.
    pub fn push(&mut self, resource: GpuResource) {
        self.queue.push(resource);
    }

    /// Creation succeeded; the caller owns every tracked resource.
    pub fn disarm(mut self) {
        self.queue = DeletionQueue::new();
    }
}

impl<R: ResourceReleaser> Drop for ReleaseGuard<'_, R> {
    fn drop(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        tracing::debug!(
            count = self.queue.len(),
            "Releasing partially created resources"
        );
        if let Err(e) = self.queue.flush(self.releaser) {
            tracing::warn!("Failed to release partially created resources: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GpuError;
    use ash::vk::Handle;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct RecordingReleaser {
        released: Mutex<Vec<String>>,
    }

    impl ResourceReleaser for RecordingReleaser {
        fn release(&self, resource: GpuResource) -> Result<()> {
            let entry = match resource {
                GpuResource::Callback(callback) => {
                    callback();
                    "callback".to_string()
                }
                GpuResource::Fence(fence) => format!("fence {}", fence.as_raw()),
                other => other.kind().to_string(),
            };
            self.released.lock().push(entry);
            Ok(())
        }
    }

    #[test]
    fn flush_runs_in_reverse_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut queue = DeletionQueue::new();
        for i in 0..5 {
            let order = order.clone();
            queue.push_callback(move || order.lock().push(i));
        }

        queue.flush(&RecordingReleaser::default()).unwrap();
        assert_eq!(*order.lock(), vec![4, 3, 2, 1, 0]);
    }

    #[test]
    fn second_flush_releases_nothing() {
        let releaser = RecordingReleaser::default();
        let mut queue = DeletionQueue::new();
        queue.push(GpuResource::Fence(vk::Fence::from_raw(1)));
        queue.push(GpuResource::Fence(vk::Fence::from_raw(2)));

        queue.flush(&releaser).unwrap();
        assert!(queue.is_empty());
        queue.flush(&releaser).unwrap();

        assert_eq!(*releaser.released.lock(), vec!["fence 2", "fence 1"]);
    }

    #[test]
    fn dependents_released_before_dependencies() {
        let releaser = RecordingReleaser::default();
        let mut queue = DeletionQueue::new();
        queue.push(GpuResource::PipelineLayout(vk::PipelineLayout::null()));
        queue.push(GpuResource::Pipeline(vk::Pipeline::null()));
        assert_eq!(queue.len(), 2);

        queue.flush(&releaser).unwrap();
        assert_eq!(
            *releaser.released.lock(),
            vec!["pipeline", "pipeline layout"]
        );
    }

    #[test]
    fn failed_release_is_propagated() {
        struct FailingReleaser;
        impl ResourceReleaser for FailingReleaser {
            fn release(&self, _resource: GpuResource) -> Result<()> {
                Err(GpuError::InvalidState("device lost".to_string()))
            }
        }

        let mut queue = DeletionQueue::new();
        queue.push(GpuResource::Semaphore(vk::Semaphore::null()));
        queue.push(GpuResource::Semaphore(vk::Semaphore::null()));

        assert!(queue.flush(&FailingReleaser).is_err());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn guard_releases_on_early_return() {
        fn build(releaser: &RecordingReleaser) -> Result<()> {
            let mut guard = ReleaseGuard::new(releaser);
            guard.push(GpuResource::CommandPool(vk::CommandPool::null()));
            guard.push(GpuResource::Semaphore(vk::Semaphore::null()));
            let fence: Result<vk::Fence> =
                Err(GpuError::InvalidState("fence creation failed".to_string()));
            guard.push(GpuResource::Fence(fence?));
            guard.disarm();
            Ok(())
        }

        let releaser = RecordingReleaser::default();
        assert!(build(&releaser).is_err());
        assert_eq!(*releaser.released.lock(), vec!["semaphore", "command pool"]);
    }

    #[test]
    fn disarmed_guard_releases_nothing() {
        let releaser = RecordingReleaser::default();
        let mut guard = ReleaseGuard::new(&releaser);
        guard.push(GpuResource::Fence(vk::Fence::from_raw(7)));
        guard.disarm();
        assert!(releaser.released.lock().is_empty());
    }
}
