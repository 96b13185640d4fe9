//! Vulkan rendering backend
//!
//! Low-level wrappers following RAII ownership: each object destroys the
//! handles it created, in dependent-first order, and nothing else.

use ash::vk;
use thiserror::Error;

pub mod buffer;
pub mod commands;
pub mod context;
pub mod descriptor;
pub mod image;
pub mod pipeline;
pub mod render_pass;
pub mod renderer;
pub mod swapchain;
pub mod sync;

pub use buffer::{Buffer, IndexBuffer, StagingBuffer, UniformBuffer, VertexBuffer};
pub use commands::CommandPool;
pub use context::{
    LogicalDevice, PhysicalDeviceInfo, QueueFamilyIndices, VulkanContext, VulkanInstance,
};
pub use descriptor::{DescriptorPool, DescriptorSetLayout};
pub use image::{ColorTarget, DepthTarget, Image, Texture};
pub use pipeline::{GraphicsPipeline, ShaderModule};
pub use render_pass::RenderPass;
pub use renderer::VulkanRenderer;
pub use swapchain::{Swapchain, SwapchainConfig};
pub use sync::{AcquireOutcome, Fence, FrameScheduler, FrameSync, PresentOutcome, Semaphore};

/// Vulkan-specific error types
///
/// Everything here is fatal for the operation in progress and propagates to
/// the process boundary. Transient surface staleness is deliberately *not*
/// an error: it is reported through [`AcquireOutcome`]/[`PresentOutcome`]
/// and handled by the swapchain rebuild path.
#[derive(Error, Debug)]
pub enum VulkanError {
    /// Raw Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Initialization failed with context
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No physical device satisfied the eligibility requirements
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// A required validation layer is not installed
    #[error("Required validation layer not available: {0}")]
    MissingValidationLayer(String),

    /// No memory type satisfied both the requirement bitmask and the
    /// requested property flags
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// The requested image layout transition is not one of the two
    /// supported setup transitions
    #[error("Unsupported image layout transition: {from:?} -> {to:?}")]
    UnsupportedLayoutTransition {
        /// Source layout
        from: vk::ImageLayout,
        /// Destination layout
        to: vk::ImageLayout,
    },

    /// None of the candidate depth formats is supported by the device
    #[error("No supported depth-stencil format found")]
    NoSupportedDepthFormat,

    /// A shader bytecode blob could not be loaded
    #[error("Failed to load shader '{path}': {source}")]
    ShaderLoad {
        /// Path of the shader file
        path: String,
        /// Underlying IO error
        source: std::io::Error,
    },
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;
