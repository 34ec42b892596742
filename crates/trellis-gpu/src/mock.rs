//! Counting mock of [`DeviceBackend`] for unit tests.
//!
//! Hands out unique fake handles, tracks which are alive, emulates fence
//! signal state and records the create infos the canvas passes in.

use std::collections::{HashMap, HashSet};

use ash::vk::{self, Handle};
use parking_lot::{Mutex, MutexGuard};

use crate::backend::{DeviceBackend, SampleCountLimits};
use crate::error::{GpuError, Result};
use crate::memory::GpuImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Semaphore,
    Fence,
    CommandBuffer,
    RenderPass,
    Framebuffer,
    ImageView,
    Image,
    Swapchain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceState {
    Unsignaled,
    Pending,
    Signaled,
}

#[derive(Debug, Clone)]
pub struct RenderPassRecord {
    pub handle: vk::RenderPass,
    pub attachment_samples: Vec<vk::SampleCountFlags>,
    pub final_layouts: Vec<vk::ImageLayout>,
    pub color_attachment_count: u32,
    pub has_depth_ref: bool,
    pub has_resolve_ref: bool,
}

#[derive(Debug, Clone)]
pub struct FramebufferRecord {
    pub handle: vk::Framebuffer,
    pub render_pass: vk::RenderPass,
    pub attachments: Vec<vk::ImageView>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct MockState {
    next_handle: u64,
    live: HashMap<Kind, HashSet<u64>>,

    pub limits: SampleCountLimits,
    pub surface_supported: bool,
    pub surface_lost: bool,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
    pub capabilities: vk::SurfaceCapabilitiesKHR,

    /// Fail the next creation of this kind of object.
    pub fail_create: Option<Kind>,
    /// Number of upcoming acquires that report out-of-date.
    pub acquire_out_of_date: usize,
    /// Number of upcoming acquires that report suboptimal.
    pub acquire_suboptimal: usize,
    /// Number of upcoming presents that report out-of-date.
    pub present_out_of_date: usize,
    /// Number of upcoming submits that fail.
    pub submit_fails: usize,

    pub fences: HashMap<u64, FenceState>,
    pub fence_waits: Vec<vk::Fence>,
    pub render_passes: Vec<RenderPassRecord>,
    pub framebuffers: Vec<FramebufferRecord>,
    pub swapchain_infos: Vec<(u32, vk::Extent2D, vk::PresentModeKHR)>,
    /// Non-null `old_swapchain`s passed to swapchain creation.
    pub retired_swapchains: Vec<vk::SwapchainKHR>,
    pub attachment_images: Vec<(vk::Format, vk::SampleCountFlags, vk::Extent3D)>,
    swapchain_image_counts: HashMap<u64, u32>,
    next_image: u32,

    pub queue_idle_waits: usize,
    pub submits: usize,
    pub presents: usize,
    pub clear_value_counts: Vec<u32>,
    pub viewports: Vec<vk::Viewport>,
    pub scissors: Vec<vk::Rect2D>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            next_handle: 1,
            live: HashMap::new(),
            limits: SampleCountLimits {
                color: vk::SampleCountFlags::TYPE_1
                    | vk::SampleCountFlags::TYPE_2
                    | vk::SampleCountFlags::TYPE_4
                    | vk::SampleCountFlags::TYPE_8,
                depth: vk::SampleCountFlags::TYPE_1
                    | vk::SampleCountFlags::TYPE_2
                    | vk::SampleCountFlags::TYPE_4,
                stencil: vk::SampleCountFlags::TYPE_1
                    | vk::SampleCountFlags::TYPE_2
                    | vk::SampleCountFlags::TYPE_4
                    | vk::SampleCountFlags::TYPE_8,
            },
            surface_supported: true,
            surface_lost: false,
            formats: vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 8,
                current_extent: vk::Extent2D {
                    width: 800,
                    height: 600,
                },
                min_image_extent: vk::Extent2D {
                    width: 1,
                    height: 1,
                },
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                max_image_array_layers: 1,
                supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
                supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            },
            fail_create: None,
            acquire_out_of_date: 0,
            acquire_suboptimal: 0,
            present_out_of_date: 0,
            submit_fails: 0,
            fences: HashMap::new(),
            fence_waits: Vec::new(),
            render_passes: Vec::new(),
            framebuffers: Vec::new(),
            swapchain_infos: Vec::new(),
            retired_swapchains: Vec::new(),
            attachment_images: Vec::new(),
            swapchain_image_counts: HashMap::new(),
            next_image: 0,
            queue_idle_waits: 0,
            submits: 0,
            presents: 0,
            clear_value_counts: Vec::new(),
            viewports: Vec::new(),
            scissors: Vec::new(),
        }
    }
}

impl MockState {
    fn create(&mut self, kind: Kind) -> Result<u64> {
        if self.fail_create == Some(kind) {
            self.fail_create = None;
            return Err(GpuError::Vulkan(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
        }
        let raw = self.next_handle;
        self.next_handle += 1;
        self.live.entry(kind).or_default().insert(raw);
        Ok(raw)
    }

    fn destroy(&mut self, kind: Kind, raw: u64) {
        let removed = self.live.get_mut(&kind).is_some_and(|set| set.remove(&raw));
        assert!(removed, "destroying {kind:?} {raw:#x} which is not alive");
    }

    /// Number of live objects of one kind.
    pub fn live(&self, kind: Kind) -> usize {
        self.live.get(&kind).map_or(0, HashSet::len)
    }

    /// Number of live objects of every kind.
    pub fn total_live(&self) -> usize {
        self.live.values().map(HashSet::len).sum()
    }

    /// Whether the given handle is still alive.
    pub fn is_alive(&self, kind: Kind, raw: u64) -> bool {
        self.live.get(&kind).is_some_and(|set| set.contains(&raw))
    }

    pub fn fence_state(&self, fence: vk::Fence) -> Option<FenceState> {
        self.fences.get(&fence.as_raw()).copied()
    }
}

#[derive(Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(configure: impl FnOnce(&mut MockState)) -> Self {
        let backend = Self::new();
        configure(&mut backend.state.lock());
        backend
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock()
    }
}

impl DeviceBackend for MockBackend {
    fn queue_family_index(&self) -> u32 {
        0
    }

    fn sample_count_limits(&self) -> SampleCountLimits {
        self.state.lock().limits
    }

    unsafe fn surface_support(&self, _surface: vk::SurfaceKHR) -> Result<bool> {
        Ok(self.state.lock().surface_supported)
    }

    unsafe fn surface_formats(
        &self,
        _surface: vk::SurfaceKHR,
    ) -> Result<Vec<vk::SurfaceFormatKHR>> {
        Ok(self.state.lock().formats.clone())
    }

    unsafe fn surface_present_modes(
        &self,
        _surface: vk::SurfaceKHR,
    ) -> Result<Vec<vk::PresentModeKHR>> {
        Ok(self.state.lock().present_modes.clone())
    }

    unsafe fn surface_capabilities(
        &self,
        _surface: vk::SurfaceKHR,
    ) -> Result<vk::SurfaceCapabilitiesKHR> {
        let state = self.state.lock();
        if state.surface_lost {
            return Err(GpuError::Vulkan(vk::Result::ERROR_SURFACE_LOST_KHR));
        }
        Ok(state.capabilities)
    }

    fn create_semaphore(&self) -> Result<vk::Semaphore> {
        let raw = self.state.lock().create(Kind::Semaphore)?;
        Ok(vk::Semaphore::from_raw(raw))
    }

    unsafe fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.state.lock().destroy(Kind::Semaphore, semaphore.as_raw());
    }

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence> {
        let mut state = self.state.lock();
        let raw = state.create(Kind::Fence)?;
        let initial = if signaled {
            FenceState::Signaled
        } else {
            FenceState::Unsignaled
        };
        state.fences.insert(raw, initial);
        Ok(vk::Fence::from_raw(raw))
    }

    unsafe fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state.lock();
        state.destroy(Kind::Fence, fence.as_raw());
        state.fences.remove(&fence.as_raw());
    }

    unsafe fn wait_for_fence(&self, fence: vk::Fence, _timeout_ns: u64) -> Result<()> {
        let mut state = self.state.lock();
        state.fence_waits.push(fence);
        match state.fences.get_mut(&fence.as_raw()) {
            Some(s @ (FenceState::Signaled | FenceState::Pending)) => {
                // Pending work completes while we wait.
                *s = FenceState::Signaled;
                Ok(())
            }
            // Nothing will ever signal it: a real wait would hang.
            Some(FenceState::Unsignaled) => Err(GpuError::Vulkan(vk::Result::TIMEOUT)),
            None => Err(GpuError::InvalidState("wait on unknown fence".to_string())),
        }
    }

    unsafe fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        let mut state = self.state.lock();
        match state.fences.get_mut(&fence.as_raw()) {
            Some(FenceState::Pending) => {
                Err(GpuError::InvalidState("reset of a pending fence".to_string()))
            }
            Some(s) => {
                *s = FenceState::Unsignaled;
                Ok(())
            }
            None => Err(GpuError::InvalidState("reset of unknown fence".to_string())),
        }
    }

    fn allocate_command_buffers(&self, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        let mut state = self.state.lock();
        (0..count)
            .map(|_| state.create(Kind::CommandBuffer).map(vk::CommandBuffer::from_raw))
            .collect()
    }

    unsafe fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        let mut state = self.state.lock();
        for cmd in command_buffers {
            state.destroy(Kind::CommandBuffer, cmd.as_raw());
        }
    }

    unsafe fn create_render_pass(
        &self,
        info: &vk::RenderPassCreateInfo<'_>,
    ) -> Result<vk::RenderPass> {
        let mut state = self.state.lock();
        let handle = vk::RenderPass::from_raw(state.create(Kind::RenderPass)?);

        let attachments = if info.attachment_count == 0 {
            &[][..]
        } else {
            std::slice::from_raw_parts(info.p_attachments, info.attachment_count as usize)
        };
        let subpass = &*info.p_subpasses;

        state.render_passes.push(RenderPassRecord {
            handle,
            attachment_samples: attachments.iter().map(|a| a.samples).collect(),
            final_layouts: attachments.iter().map(|a| a.final_layout).collect(),
            color_attachment_count: subpass.color_attachment_count,
            has_depth_ref: !subpass.p_depth_stencil_attachment.is_null(),
            has_resolve_ref: !subpass.p_resolve_attachments.is_null(),
        });
        Ok(handle)
    }

    unsafe fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.state.lock().destroy(Kind::RenderPass, render_pass.as_raw());
    }

    unsafe fn create_framebuffer(
        &self,
        info: &vk::FramebufferCreateInfo<'_>,
    ) -> Result<vk::Framebuffer> {
        let mut state = self.state.lock();

        let expected = state
            .render_passes
            .iter()
            .find(|rp| rp.handle == info.render_pass)
            .map(|rp| rp.attachment_samples.len());
        if expected != Some(info.attachment_count as usize) {
            // What the validation layers would flag.
            return Err(GpuError::Vulkan(vk::Result::ERROR_INITIALIZATION_FAILED));
        }

        let handle = vk::Framebuffer::from_raw(state.create(Kind::Framebuffer)?);
        let attachments =
            std::slice::from_raw_parts(info.p_attachments, info.attachment_count as usize).to_vec();
        state.framebuffers.push(FramebufferRecord {
            handle,
            render_pass: info.render_pass,
            attachments,
            width: info.width,
            height: info.height,
        });
        Ok(handle)
    }

    unsafe fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.state.lock().destroy(Kind::Framebuffer, framebuffer.as_raw());
    }

    unsafe fn create_image_view(
        &self,
        _info: &vk::ImageViewCreateInfo<'_>,
    ) -> Result<vk::ImageView> {
        let raw = self.state.lock().create(Kind::ImageView)?;
        Ok(vk::ImageView::from_raw(raw))
    }

    unsafe fn destroy_image_view(&self, view: vk::ImageView) {
        self.state.lock().destroy(Kind::ImageView, view.as_raw());
    }

    fn create_attachment_image(
        &self,
        info: &vk::ImageCreateInfo<'_>,
        _name: &str,
    ) -> Result<GpuImage> {
        let mut state = self.state.lock();
        let raw = state.create(Kind::Image)?;
        state
            .attachment_images
            .push((info.format, info.samples, info.extent));
        Ok(GpuImage {
            image: vk::Image::from_raw(raw),
            allocation: None,
            format: info.format,
            extent: info.extent,
        })
    }

    unsafe fn destroy_attachment_image(&self, image: &mut GpuImage) {
        if image.is_null() {
            return;
        }
        self.state.lock().destroy(Kind::Image, image.image.as_raw());
        image.image = vk::Image::null();
    }

    unsafe fn create_swapchain(
        &self,
        info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> Result<vk::SwapchainKHR> {
        let mut state = self.state.lock();
        if info.old_swapchain != vk::SwapchainKHR::null() {
            state.retired_swapchains.push(info.old_swapchain);
        }
        let raw = state.create(Kind::Swapchain)?;
        state
            .swapchain_infos
            .push((info.min_image_count, info.image_extent, info.present_mode));
        state
            .swapchain_image_counts
            .insert(raw, info.min_image_count);
        state.next_image = 0;
        Ok(vk::SwapchainKHR::from_raw(raw))
    }

    unsafe fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> Result<Vec<vk::Image>> {
        let mut state = self.state.lock();
        let count = state
            .swapchain_image_counts
            .get(&swapchain.as_raw())
            .copied()
            .ok_or_else(|| GpuError::InvalidState("unknown swapchain".to_string()))?;
        // Swapchain images are owned by the swapchain; only hand out handles.
        Ok((0..count)
            .map(|_| {
                let raw = state.next_handle;
                state.next_handle += 1;
                vk::Image::from_raw(raw)
            })
            .collect())
    }

    unsafe fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut state = self.state.lock();
        state.destroy(Kind::Swapchain, swapchain.as_raw());
        state.swapchain_image_counts.remove(&swapchain.as_raw());
    }

    unsafe fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _semaphore: vk::Semaphore,
        _timeout_ns: u64,
    ) -> Result<(u32, bool)> {
        let mut state = self.state.lock();
        if state.acquire_out_of_date > 0 {
            state.acquire_out_of_date -= 1;
            return Err(GpuError::Vulkan(vk::Result::ERROR_OUT_OF_DATE_KHR));
        }
        let count = state
            .swapchain_image_counts
            .get(&swapchain.as_raw())
            .copied()
            .ok_or_else(|| GpuError::InvalidState("acquire on unknown swapchain".to_string()))?;
        let index = state.next_image;
        state.next_image = (index + 1) % count;

        let suboptimal = state.acquire_suboptimal > 0;
        if suboptimal {
            state.acquire_suboptimal -= 1;
        }
        Ok((index, suboptimal))
    }

    unsafe fn queue_present(&self, _info: &vk::PresentInfoKHR<'_>) -> Result<bool> {
        let mut state = self.state.lock();
        state.presents += 1;
        if state.present_out_of_date > 0 {
            state.present_out_of_date -= 1;
            return Ok(true);
        }
        Ok(false)
    }

    unsafe fn queue_submit(&self, submits: &[vk::SubmitInfo<'_>], fence: vk::Fence) -> Result<()> {
        let mut state = self.state.lock();
        if state.submit_fails > 0 {
            state.submit_fails -= 1;
            return Err(GpuError::Vulkan(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
        }
        state.submits += submits.len();
        if fence != vk::Fence::null() {
            match state.fences.get_mut(&fence.as_raw()) {
                Some(s @ FenceState::Unsignaled) => *s = FenceState::Pending,
                _ => {
                    return Err(GpuError::InvalidState(
                        "submit with a fence that is not unsignaled".to_string(),
                    ))
                }
            }
        }
        Ok(())
    }

    fn queue_wait_idle(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.queue_idle_waits += 1;
        for s in state.fences.values_mut() {
            if *s == FenceState::Pending {
                *s = FenceState::Signaled;
            }
        }
        Ok(())
    }

    unsafe fn begin_command_buffer(
        &self,
        _command_buffer: vk::CommandBuffer,
        _flags: vk::CommandBufferUsageFlags,
    ) -> Result<()> {
        Ok(())
    }

    unsafe fn end_command_buffer(&self, _command_buffer: vk::CommandBuffer) -> Result<()> {
        Ok(())
    }

    unsafe fn reset_command_buffer(&self, _command_buffer: vk::CommandBuffer) -> Result<()> {
        Ok(())
    }

    unsafe fn cmd_begin_render_pass(
        &self,
        _command_buffer: vk::CommandBuffer,
        info: &vk::RenderPassBeginInfo<'_>,
    ) {
        self.state
            .lock()
            .clear_value_counts
            .push(info.clear_value_count);
    }

    unsafe fn cmd_end_render_pass(&self, _command_buffer: vk::CommandBuffer) {}

    unsafe fn cmd_set_viewport(&self, _command_buffer: vk::CommandBuffer, viewport: &vk::Viewport) {
        self.state.lock().viewports.push(*viewport);
    }

    unsafe fn cmd_set_scissor(&self, _command_buffer: vk::CommandBuffer, scissor: &vk::Rect2D) {
        self.state.lock().scissors.push(*scissor);
    }
}
