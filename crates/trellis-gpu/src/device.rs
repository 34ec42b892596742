//! Logical device, queue and command pool.

use crate::backend::{DeviceBackend, SampleCountLimits};
use crate::error::{GpuError, Result};
use crate::instance::Instance;
use crate::memory::{GpuAllocator, GpuBuffer, GpuImage};
use ash::vk;
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;
use std::sync::Arc;

/// Logical device with one graphics queue and one resettable command pool.
///
/// Canvases, buffers and textures share it through an `Arc`.
pub struct Device {
    instance: Arc<Instance>,
    physical_device: vk::PhysicalDevice,
    limits: vk::PhysicalDeviceLimits,
    device: ash::Device,
    queue: vk::Queue,
    queue_family: u32,
    command_pool: vk::CommandPool,
    allocator: Mutex<GpuAllocator>,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
    anisotropy: bool,
}

impl Device {
    /// Create the logical device on `physical_device`.
    pub fn new(instance: Arc<Instance>, physical_device: vk::PhysicalDevice) -> Result<Self> {
        let raw_instance = instance.raw();
        let properties = unsafe { raw_instance.get_physical_device_properties(physical_device) };
        let features = unsafe { raw_instance.get_physical_device_features(physical_device) };

        let queue_family = unsafe { find_graphics_queue_family(raw_instance, physical_device)? };

        let anisotropy = features.sampler_anisotropy == vk::TRUE;
        let enabled_features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(anisotropy);

        let queue_priority = 1.0_f32;
        let queue_info = vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family)
            .queue_priorities(std::slice::from_ref(&queue_priority));

        let extension_names = [ash::khr::swapchain::NAME.as_ptr()];

        let device_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(std::slice::from_ref(&queue_info))
            .enabled_extension_names(&extension_names)
            .enabled_features(&enabled_features);

        let device = unsafe { raw_instance.create_device(physical_device, &device_info, None)? };
        let queue = unsafe { device.get_device_queue(queue_family, 0) };

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = match unsafe { device.create_command_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };

        let allocator = match unsafe { GpuAllocator::new(raw_instance, &device, physical_device) } {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe {
                    device.destroy_command_pool(command_pool, None);
                    device.destroy_device(None);
                }
                return Err(e);
            }
        };

        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), raw_instance);
        let swapchain_loader = ash::khr::swapchain::Device::new(raw_instance, &device);

        tracing::info!(
            "Device created: queue family {}, anisotropy {}",
            queue_family,
            anisotropy
        );

        Ok(Self {
            instance,
            physical_device,
            limits: properties.limits,
            device,
            queue,
            queue_family,
            command_pool,
            allocator: Mutex::new(allocator),
            surface_loader,
            swapchain_loader,
            anisotropy,
        })
    }

    /// Get the Vulkan device handle.
    pub fn raw(&self) -> &ash::Device {
        &self.device
    }

    /// Get the instance this device was created from.
    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get the physical device limits.
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.limits
    }

    /// Whether `samplerAnisotropy` was enabled.
    pub fn supports_anisotropy(&self) -> bool {
        self.anisotropy
    }

    /// Get the device queue.
    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    /// Get the command pool.
    pub fn command_pool(&self) -> vk::CommandPool {
        self.command_pool
    }

    /// Allocate a buffer together with its memory.
    pub fn create_buffer(
        &self,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<GpuBuffer> {
        self.allocator
            .lock()
            .create_buffer(size, usage, location, name)
    }

    /// Free a buffer and its memory.
    pub fn free_buffer(&self, buffer: &mut GpuBuffer) -> Result<()> {
        self.allocator.lock().free_buffer(buffer)
    }

    /// Allocate an image together with its memory.
    pub fn create_image(
        &self,
        info: &vk::ImageCreateInfo<'_>,
        location: MemoryLocation,
        name: &str,
    ) -> Result<GpuImage> {
        self.allocator.lock().create_image(info, location, name)
    }

    /// Free an image and its memory.
    pub fn free_image(&self, image: &mut GpuImage) -> Result<()> {
        self.allocator.lock().free_image(image)
    }

    /// Wait for device to be idle.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            // Allocator memory has to go before the device does.
            self.allocator.lock().shutdown();

            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
        }
    }
}

/// Index of the first queue family with graphics support.
unsafe fn find_graphics_queue_family(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<u32> {
    unsafe {
        instance
            .get_physical_device_queue_family_properties(physical_device)
            .iter()
            .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .map(|i| i as u32)
            .ok_or(GpuError::NoSuitableDevice)
    }
}

impl DeviceBackend for Device {
    fn queue_family_index(&self) -> u32 {
        self.queue_family
    }

    fn sample_count_limits(&self) -> SampleCountLimits {
        SampleCountLimits::from_limits(&self.limits)
    }

    unsafe fn surface_support(&self, surface: vk::SurfaceKHR) -> Result<bool> {
        unsafe {
            Ok(self.surface_loader.get_physical_device_surface_support(
                self.physical_device,
                self.queue_family,
                surface,
            )?)
        }
    }

    unsafe fn surface_formats(&self, surface: vk::SurfaceKHR) -> Result<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            Ok(self
                .surface_loader
                .get_physical_device_surface_formats(self.physical_device, surface)?)
        }
    }

    unsafe fn surface_present_modes(
        &self,
        surface: vk::SurfaceKHR,
    ) -> Result<Vec<vk::PresentModeKHR>> {
        unsafe {
            Ok(self
                .surface_loader
                .get_physical_device_surface_present_modes(self.physical_device, surface)?)
        }
    }

    unsafe fn surface_capabilities(
        &self,
        surface: vk::SurfaceKHR,
    ) -> Result<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            Ok(self
                .surface_loader
                .get_physical_device_surface_capabilities(self.physical_device, surface)?)
        }
    }

    fn create_semaphore(&self) -> Result<vk::Semaphore> {
        let create_info = vk::SemaphoreCreateInfo::default();
        Ok(unsafe { self.device.create_semaphore(&create_info, None)? })
    }

    unsafe fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe {
            self.device.destroy_semaphore(semaphore, None);
        }
    }

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        Ok(unsafe { self.device.create_fence(&create_info, None)? })
    }

    unsafe fn destroy_fence(&self, fence: vk::Fence) {
        unsafe {
            self.device.destroy_fence(fence, None);
        }
    }

    unsafe fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> Result<()> {
        unsafe {
            self.device.wait_for_fences(&[fence], true, timeout_ns)?;
            Ok(())
        }
    }

    unsafe fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        unsafe {
            self.device.reset_fences(&[fence])?;
            Ok(())
        }
    }

    fn allocate_command_buffers(&self, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        Ok(unsafe { self.device.allocate_command_buffers(&alloc_info)? })
    }

    unsafe fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        unsafe {
            if !command_buffers.is_empty() {
                self.device
                    .free_command_buffers(self.command_pool, command_buffers);
            }
        }
    }

    unsafe fn create_render_pass(
        &self,
        info: &vk::RenderPassCreateInfo<'_>,
    ) -> Result<vk::RenderPass> {
        unsafe {
            Ok(self.device.create_render_pass(info, None)?)
        }
    }

    unsafe fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe {
            self.device.destroy_render_pass(render_pass, None);
        }
    }

    unsafe fn create_framebuffer(
        &self,
        info: &vk::FramebufferCreateInfo<'_>,
    ) -> Result<vk::Framebuffer> {
        unsafe {
            Ok(self.device.create_framebuffer(info, None)?)
        }
    }

    unsafe fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe {
            self.device.destroy_framebuffer(framebuffer, None);
        }
    }

    unsafe fn create_image_view(
        &self,
        info: &vk::ImageViewCreateInfo<'_>,
    ) -> Result<vk::ImageView> {
        unsafe {
            Ok(self.device.create_image_view(info, None)?)
        }
    }

    unsafe fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe {
            self.device.destroy_image_view(view, None);
        }
    }

    fn create_attachment_image(
        &self,
        info: &vk::ImageCreateInfo<'_>,
        name: &str,
    ) -> Result<GpuImage> {
        self.create_image(info, MemoryLocation::GpuOnly, name)
    }

    unsafe fn destroy_attachment_image(&self, image: &mut GpuImage) {
        if let Err(e) = self.free_image(image) {
            tracing::warn!("Failed to free attachment image: {}", e);
        }
    }

    unsafe fn create_swapchain(
        &self,
        info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> Result<vk::SwapchainKHR> {
        unsafe {
            Ok(self.swapchain_loader.create_swapchain(info, None)?)
        }
    }

    unsafe fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> Result<Vec<vk::Image>> {
        unsafe {
            Ok(self.swapchain_loader.get_swapchain_images(swapchain)?)
        }
    }

    unsafe fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe {
            self.swapchain_loader.destroy_swapchain(swapchain, None);
        }
    }

    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    unsafe fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> Result<(u32, bool)> {
        unsafe {
            Ok(self.swapchain_loader.acquire_next_image(
                swapchain,
                timeout_ns,
                semaphore,
                vk::Fence::null(),
            )?)
        }
    }

    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    unsafe fn queue_present(&self, info: &vk::PresentInfoKHR<'_>) -> Result<bool> {
        unsafe {
            match self.swapchain_loader.queue_present(self.queue, info) {
                Ok(suboptimal) => Ok(suboptimal),
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
                Err(e) => Err(e.into()),
            }
        }
    }

    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    unsafe fn queue_submit(&self, submits: &[vk::SubmitInfo<'_>], fence: vk::Fence) -> Result<()> {
        unsafe {
            self.device.queue_submit(self.queue, submits, fence)?;
            Ok(())
        }
    }

    fn queue_wait_idle(&self) -> Result<()> {
        unsafe { self.device.queue_wait_idle(self.queue)? };
        Ok(())
    }

    unsafe fn begin_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> Result<()> {
        unsafe {
            let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
            self.device
                .begin_command_buffer(command_buffer, &begin_info)?;
            Ok(())
        }
    }

    unsafe fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        unsafe {
            self.device.end_command_buffer(command_buffer)?;
            Ok(())
        }
    }

    unsafe fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        unsafe {
            self.device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())?;
            Ok(())
        }
    }

    unsafe fn cmd_begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        info: &vk::RenderPassBeginInfo<'_>,
    ) {
        unsafe {
            self.device
                .cmd_begin_render_pass(command_buffer, info, vk::SubpassContents::INLINE);
        }
    }

    unsafe fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            self.device.cmd_end_render_pass(command_buffer);
        }
    }

    unsafe fn cmd_set_viewport(&self, command_buffer: vk::CommandBuffer, viewport: &vk::Viewport) {
        unsafe {
            self.device
                .cmd_set_viewport(command_buffer, 0, std::slice::from_ref(viewport));
        }
    }

    unsafe fn cmd_set_scissor(&self, command_buffer: vk::CommandBuffer, scissor: &vk::Rect2D) {
        unsafe {
            self.device
                .cmd_set_scissor(command_buffer, 0, std::slice::from_ref(scissor));
        }
    }
}
