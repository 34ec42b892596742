//! Canvas configuration.

use ash::vk;

/// Format used for the optional depth-stencil attachment.
pub const DEPTH_STENCIL_FORMAT: vk::Format = vk::Format::D32_SFLOAT_S8_UINT;

/// Settings fixed before the canvas is created.
///
/// Clear values, blocking and viewport flipping can still be changed on the
/// canvas afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasConfig {
    pub color_format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    /// Requested sample count. The canvas negotiates it down to what the
    /// device supports.
    pub msaa_samples: vk::SampleCountFlags,
    /// Requested number of frames in flight. The swapchain's image count
    /// replaces it once the canvas is created.
    pub frames_in_flight: u32,
    pub want_depth_stencil: bool,
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
    pub clear_stencil: u32,
    /// Wait for the queue to go idle before every frame.
    pub blocking: bool,
    /// Flip the viewport so +Y points up.
    pub flip_viewport: bool,
    pub present_mode: vk::PresentModeKHR,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            color_format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            msaa_samples: vk::SampleCountFlags::TYPE_1,
            frames_in_flight: 2,
            want_depth_stencil: false,
            clear_color: [0.0, 0.0, 0.5, 1.0],
            clear_depth: 1.0,
            clear_stencil: 0,
            blocking: true,
            flip_viewport: false,
            present_mode: vk::PresentModeKHR::FIFO,
        }
    }
}

impl CanvasConfig {
    /// Set the swapchain color format and color space.
    pub fn with_color_format(mut self, format: vk::Format, color_space: vk::ColorSpaceKHR) -> Self {
        self.color_format = format;
        self.color_space = color_space;
        self
    }

    /// Request a multisample count.
    pub fn with_msaa(mut self, samples: vk::SampleCountFlags) -> Self {
        self.msaa_samples = samples;
        self
    }

    /// Request a number of frames in flight.
    pub fn with_frames_in_flight(mut self, frames: u32) -> Self {
        self.frames_in_flight = frames;
        self
    }

    /// Enable or disable the depth-stencil attachment.
    pub fn with_depth_stencil(mut self, enable: bool) -> Self {
        self.want_depth_stencil = enable;
        self
    }

    /// Set the clear color.
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Set the depth and stencil clear values.
    pub fn with_clear_depth_stencil(mut self, depth: f32, stencil: u32) -> Self {
        self.clear_depth = depth;
        self.clear_stencil = stencil;
        self
    }

    /// Enable or disable blocking submission.
    pub fn with_blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    /// Enable or disable the flipped viewport.
    pub fn with_flip_viewport(mut self, flip: bool) -> Self {
        self.flip_viewport = flip;
        self
    }

    /// Set the preferred present mode.
    pub fn with_present_mode(mut self, mode: vk::PresentModeKHR) -> Self {
        self.present_mode = mode;
        self
    }

    /// Clear values in attachment order: color, then depth-stencil.
    ///
    /// Only the first `AttachmentPlan::clear_value_count` entries are used.
    pub(crate) fn clear_values(&self) -> [vk::ClearValue; 2] {
        [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: self.clear_depth,
                    stencil: self.clear_stencil,
                },
            },
        ]
    }
}
