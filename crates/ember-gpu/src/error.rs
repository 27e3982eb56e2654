//! GPU error types.

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// The Vulkan loader could not be found or initialized.
    #[error("Failed to load Vulkan: {0}")]
    Loading(String),

    /// No suitable GPU found.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// A shader binary could not be read.
    #[error("Failed to load shader {}: {source}", path.display())]
    ShaderLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A shader binary is not a whole number of SPIR-V words.
    #[error("Malformed shader {}: {len} bytes is not a multiple of 4", path.display())]
    ShaderMalformed { path: PathBuf, len: usize },

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// A bounded wait expired. The device is assumed to be hung.
    #[error("Timed out waiting for {what}")]
    Timeout { what: &'static str },

    /// The swapchain no longer matches the surface and must be recreated.
    #[error("Swapchain is out of date")]
    SwapchainOutOfDate,

    /// The swapchain still works but no longer matches the surface exactly.
    #[error("Swapchain is suboptimal")]
    SwapchainSuboptimal,

    /// An index fell outside a collection.
    #[error("Index {index} out of range for {len} entries")]
    OutOfRange { index: i64, len: usize },

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl GpuError {
    /// Map a raw Vulkan result to the error taxonomy.
    ///
    /// `what` names the object being waited on when the result is a timeout.
    pub fn from_vk(result: vk::Result, what: &'static str) -> Self {
        match result {
            vk::Result::TIMEOUT | vk::Result::NOT_READY => Self::Timeout { what },
            vk::Result::ERROR_OUT_OF_DATE_KHR => Self::SwapchainOutOfDate,
            vk::Result::SUBOPTIMAL_KHR => Self::SwapchainSuboptimal,
            other => Self::Vulkan(other),
        }
    }

    /// Whether the caller can recover by recreating the swapchain.
    ///
    /// Everything else, including timeouts and device loss, is fatal.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::SwapchainOutOfDate | Self::SwapchainSuboptimal)
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
