//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error. The raw status is kept so callers can match on it.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// No suitable GPU found.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// Required extension not supported.
    #[error("Required extension not supported: {0}")]
    ExtensionNotSupported(String),

    /// The surface does not offer the requested format / color space pair.
    #[error("Surface format {format:?} / {color_space:?} not supported")]
    FormatNotSupported {
        format: vk::Format,
        color_space: vk::ColorSpaceKHR,
    },

    /// The device queue cannot present to the surface.
    #[error("Queue family {queue_family} cannot present to this surface")]
    SurfaceUnsupported { queue_family: u32 },

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// Shader module creation failed.
    #[error("Shader compilation failed: {0}")]
    ShaderCompilation(String),

    /// Shader bytes are not SPIR-V.
    #[error("Invalid SPIR-V: {0}")]
    InvalidSpirv(String),

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// A staged copy would read or write past the end of a buffer.
    #[error(
        "Copy of {size} bytes out of range (src {src_offset}/{src_len}, dst {dst_offset}/{dst_len})"
    )]
    CopyOutOfBounds {
        size: u64,
        src_offset: u64,
        src_len: u64,
        dst_offset: u64,
        dst_len: u64,
    },

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// I/O error (shader files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl GpuError {
    /// The raw Vulkan status, if this error wraps one.
    pub const fn vk_result(&self) -> Option<vk::Result> {
        match self {
            Self::Vulkan(result) => Some(*result),
            _ => None,
        }
    }

    /// Whether the swapchain no longer matches its surface.
    pub fn is_out_of_date(&self) -> bool {
        self.vk_result() == Some(vk::Result::ERROR_OUT_OF_DATE_KHR)
    }

    /// Whether the surface went away (usually a closing window).
    pub fn is_surface_lost(&self) -> bool {
        self.vk_result() == Some(vk::Result::ERROR_SURFACE_LOST_KHR)
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
