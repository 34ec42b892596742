//! Device backend seam.
//!
//! Every Vulkan entry point the canvas and the fence wrapper drive goes
//! through [`DeviceBackend`]. [`crate::Device`] implements it on top of `ash`
//! and `gpu-allocator`.
//!
//! # Safety
//!
//! Methods marked `unsafe` take raw handles. Those handles must have been
//! created by the same backend and must not have been destroyed yet; handles
//! being destroyed must not be in use by the GPU.

use crate::error::Result;
use crate::memory::GpuImage;
use ash::vk;

/// Framebuffer sample counts supported by the physical device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleCountLimits {
    pub color: vk::SampleCountFlags,
    pub depth: vk::SampleCountFlags,
    pub stencil: vk::SampleCountFlags,
}

impl SampleCountLimits {
    /// Read the limits out of the physical device limits.
    pub const fn from_limits(limits: &vk::PhysicalDeviceLimits) -> Self {
        Self {
            color: limits.framebuffer_color_sample_counts,
            depth: limits.framebuffer_depth_sample_counts,
            stencil: limits.framebuffer_stencil_sample_counts,
        }
    }

    /// Counts usable by a color attachment, optionally combined with a
    /// depth-stencil attachment.
    pub fn usable(&self, with_depth_stencil: bool) -> vk::SampleCountFlags {
        if with_depth_stencil {
            self.color & self.depth & self.stencil
        } else {
            self.color
        }
    }
}

/// The Vulkan operations needed to run a presentable canvas.
pub trait DeviceBackend {
    /// Queue family used for graphics and presentation.
    fn queue_family_index(&self) -> u32;

    /// Framebuffer sample count limits of the physical device.
    fn sample_count_limits(&self) -> SampleCountLimits;

    unsafe fn surface_support(&self, surface: vk::SurfaceKHR) -> Result<bool>;
    unsafe fn surface_formats(&self, surface: vk::SurfaceKHR) -> Result<Vec<vk::SurfaceFormatKHR>>;
    unsafe fn surface_present_modes(
        &self,
        surface: vk::SurfaceKHR,
    ) -> Result<Vec<vk::PresentModeKHR>>;
    unsafe fn surface_capabilities(
        &self,
        surface: vk::SurfaceKHR,
    ) -> Result<vk::SurfaceCapabilitiesKHR>;

    fn create_semaphore(&self) -> Result<vk::Semaphore>;
    unsafe fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence>;
    unsafe fn destroy_fence(&self, fence: vk::Fence);
    unsafe fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> Result<()>;
    unsafe fn reset_fence(&self, fence: vk::Fence) -> Result<()>;

    /// Allocate primary command buffers from the device's resettable pool.
    fn allocate_command_buffers(&self, count: u32) -> Result<Vec<vk::CommandBuffer>>;
    unsafe fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]);

    unsafe fn create_render_pass(
        &self,
        info: &vk::RenderPassCreateInfo<'_>,
    ) -> Result<vk::RenderPass>;
    unsafe fn destroy_render_pass(&self, render_pass: vk::RenderPass);

    unsafe fn create_framebuffer(
        &self,
        info: &vk::FramebufferCreateInfo<'_>,
    ) -> Result<vk::Framebuffer>;
    unsafe fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    unsafe fn create_image_view(&self, info: &vk::ImageViewCreateInfo<'_>)
        -> Result<vk::ImageView>;
    unsafe fn destroy_image_view(&self, view: vk::ImageView);

    /// Create a device-local image together with its memory.
    fn create_attachment_image(
        &self,
        info: &vk::ImageCreateInfo<'_>,
        name: &str,
    ) -> Result<GpuImage>;
    /// Destroy an image and free its memory. Null images are ignored.
    unsafe fn destroy_attachment_image(&self, image: &mut GpuImage);

    unsafe fn create_swapchain(
        &self,
        info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> Result<vk::SwapchainKHR>;
    unsafe fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> Result<Vec<vk::Image>>;
    unsafe fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);

    /// Acquire the next image. Returns the index and whether the swapchain is
    /// suboptimal. Out-of-date is reported as an error.
    unsafe fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> Result<(u32, bool)>;

    /// Present on the device queue. Returns `true` when the swapchain is
    /// suboptimal or out of date and should be recreated.
    unsafe fn queue_present(&self, info: &vk::PresentInfoKHR<'_>) -> Result<bool>;
    unsafe fn queue_submit(&self, submits: &[vk::SubmitInfo<'_>], fence: vk::Fence) -> Result<()>;
    fn queue_wait_idle(&self) -> Result<()>;

    unsafe fn begin_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> Result<()>;
    unsafe fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()>;
    unsafe fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()>;
    unsafe fn cmd_begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        info: &vk::RenderPassBeginInfo<'_>,
    );
    unsafe fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer);
    unsafe fn cmd_set_viewport(&self, command_buffer: vk::CommandBuffer, viewport: &vk::Viewport);
    unsafe fn cmd_set_scissor(&self, command_buffer: vk::CommandBuffer, scissor: &vk::Rect2D);
}
