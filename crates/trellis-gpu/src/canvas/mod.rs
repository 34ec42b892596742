//! Presentable canvas: swapchain, render pass, framebuffers and the
//! per-frame acquire / record / submit / present cycle.
//!
//! ```text
//! Uninitialized --create_canvas--> Created
//! Created --start_rendering--> Recording --done_rendering--> Created
//! Created --start_rendering (out of date)--> Skipped --done_rendering--> Created
//! ```
//!
//! Out-of-date and suboptimal swapchains are rebuilt internally after the
//! queue has drained. The caller only sees a skipped frame.

mod attachments;
mod config;
mod msaa;

pub use attachments::{AttachmentPlan, AttachmentRole};
pub use config::{CanvasConfig, DEPTH_STENCIL_FORMAT};
pub use msaa::{negotiate_msaa, sample_count_from_u32, viewport_for};

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::backend::DeviceBackend;
use crate::device::Device;
use crate::error::{GpuError, Result};
use crate::memory::GpuImage;
use crate::swapchain::{
    calculate_extent, find_surface_format, select_present_mode, swapchain_create_info,
};
use crate::sync::Fence;

/// Where the canvas is in its frame cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanvasState {
    /// `create_canvas` has not succeeded yet.
    Uninitialized,
    /// Ready for `start_rendering`.
    Created,
    /// A command buffer was handed out; `done_rendering` is next.
    Recording,
    /// `start_rendering` returned `None`; `done_rendering` is next and does
    /// nothing.
    Skipped,
}

/// Per-frame-in-flight resources.
pub struct FrameSlot<D: DeviceBackend = Device> {
    device: Arc<D>,
    command_buffer: vk::CommandBuffer,
    image_available: vk::Semaphore,
    render_finished: vk::Semaphore,
    in_flight: Fence<D>,
}

impl<D: DeviceBackend> FrameSlot<D> {
    fn new(device: &Arc<D>) -> Result<Self> {
        let mut slot = Self {
            device: Arc::clone(device),
            command_buffer: vk::CommandBuffer::null(),
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            in_flight: Fence::new(Arc::clone(device), true)?,
        };
        slot.image_available = device.create_semaphore()?;
        slot.render_finished = device.create_semaphore()?;
        slot.command_buffer = device
            .allocate_command_buffers(1)?
            .into_iter()
            .next()
            .ok_or_else(|| GpuError::InvalidState("No command buffer allocated".to_string()))?;
        Ok(slot)
    }

    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    pub fn image_available(&self) -> vk::Semaphore {
        self.image_available
    }

    pub fn render_finished(&self) -> vk::Semaphore {
        self.render_finished
    }

    pub fn fence(&self) -> &Fence<D> {
        &self.in_flight
    }

    fn release_command_buffer(&mut self) {
        if self.command_buffer != vk::CommandBuffer::null() {
            unsafe { self.device.free_command_buffers(&[self.command_buffer]) };
            self.command_buffer = vk::CommandBuffer::null();
        }
    }

    fn release_semaphores(&mut self) {
        for semaphore in [&mut self.image_available, &mut self.render_finished] {
            if *semaphore != vk::Semaphore::null() {
                unsafe { self.device.destroy_semaphore(*semaphore) };
                *semaphore = vk::Semaphore::null();
            }
        }
    }
}

impl<D: DeviceBackend> Drop for FrameSlot<D> {
    fn drop(&mut self) {
        self.release_command_buffer();
        self.release_semaphores();
    }
}

/// Outcome of a swapchain rebuild attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rebuild {
    Done,
    SurfaceLost,
    ZeroExtent,
}

/// Rendering target bound to a presentable surface.
///
/// The canvas does not own the surface; it must outlive the canvas.
pub struct Canvas<D: DeviceBackend = Device> {
    device: Arc<D>,
    config: CanvasConfig,
    msaa_samples: vk::SampleCountFlags,
    present_mode: vk::PresentModeKHR,

    surface: vk::SurfaceKHR,
    surface_format: vk::SurfaceFormatKHR,
    requested_size: (u32, u32),
    extent: vk::Extent2D,

    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    framebuffers: Vec<vk::Framebuffer>,
    render_pass: vk::RenderPass,

    depth_image: GpuImage,
    depth_view: vk::ImageView,
    msaa_image: GpuImage,
    msaa_view: vk::ImageView,

    frames: Vec<FrameSlot<D>>,
    frames_in_flight: u32,
    current_frame: usize,
    image_index: u32,
    needs_resize: bool,
    /// A rebuild failed part-way; nothing may be acquired until one
    /// succeeds.
    needs_rebuild: bool,
    state: CanvasState,
}

impl<D: DeviceBackend> Canvas<D> {
    /// Create an uninitialized canvas. No Vulkan objects are created until
    /// [`Canvas::create_canvas`].
    pub fn new(device: Arc<D>, config: CanvasConfig) -> Self {
        let msaa_samples = negotiate_msaa(
            config.msaa_samples,
            &device.sample_count_limits(),
            config.want_depth_stencil,
        );
        debug!(
            "MSAA negotiated: requested {:?}, using {:?}",
            config.msaa_samples, msaa_samples
        );

        Self {
            device,
            msaa_samples,
            present_mode: config.present_mode,
            surface: vk::SurfaceKHR::null(),
            surface_format: vk::SurfaceFormatKHR {
                format: config.color_format,
                color_space: config.color_space,
            },
            requested_size: (0, 0),
            extent: vk::Extent2D::default(),
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            framebuffers: Vec::new(),
            render_pass: vk::RenderPass::null(),
            depth_image: GpuImage::null(),
            depth_view: vk::ImageView::null(),
            msaa_image: GpuImage::null(),
            msaa_view: vk::ImageView::null(),
            frames: Vec::new(),
            frames_in_flight: config.frames_in_flight.max(1),
            current_frame: 0,
            image_index: 0,
            needs_resize: false,
            needs_rebuild: false,
            state: CanvasState::Uninitialized,
            config,
        }
    }

    /// Request a new sample count and return the negotiated one.
    pub fn set_msaa(&mut self, samples: vk::SampleCountFlags) -> Result<vk::SampleCountFlags> {
        self.ensure_uninitialized("set_msaa")?;
        self.config.msaa_samples = samples;
        self.renegotiate();
        Ok(self.msaa_samples)
    }

    /// Enable or disable the depth-stencil attachment.
    pub fn set_want_depth_stencil(&mut self, enable: bool) -> Result<()> {
        self.ensure_uninitialized("set_want_depth_stencil")?;
        self.config.want_depth_stencil = enable;
        self.renegotiate();
        Ok(())
    }

    fn renegotiate(&mut self) {
        self.msaa_samples = negotiate_msaa(
            self.config.msaa_samples,
            &self.device.sample_count_limits(),
            self.config.want_depth_stencil,
        );
        debug!("MSAA negotiated: {:?}", self.msaa_samples);
    }

    fn ensure_uninitialized(&self, op: &str) -> Result<()> {
        if self.state == CanvasState::Uninitialized {
            Ok(())
        } else {
            Err(GpuError::InvalidState(format!(
                "{op} is only allowed before create_canvas"
            )))
        }
    }

    /// Bind the canvas to a surface and build every swapchain resource.
    ///
    /// Fails with [`GpuError::FormatNotSupported`] when the configured color
    /// format and color space are not offered by the surface. A failure
    /// part-way through leaves whatever was created for `Drop` to release.
    pub fn create_canvas(
        &mut self,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
    ) -> Result<()> {
        self.ensure_uninitialized("create_canvas")?;

        let queue_family = self.device.queue_family_index();
        if !unsafe { self.device.surface_support(surface)? } {
            return Err(GpuError::SurfaceUnsupported { queue_family });
        }

        let formats = unsafe { self.device.surface_formats(surface)? };
        self.surface_format =
            find_surface_format(&formats, self.config.color_format, self.config.color_space)
                .ok_or(GpuError::FormatNotSupported {
                    format: self.config.color_format,
                    color_space: self.config.color_space,
                })?;

        let modes = unsafe { self.device.surface_present_modes(surface)? };
        self.present_mode = select_present_mode(&modes, self.config.present_mode);
        if self.present_mode != self.config.present_mode {
            warn!(
                "Present mode {:?} not supported, using {:?}",
                self.config.present_mode, self.present_mode
            );
        }

        self.surface = surface;

        for _ in 0..self.frames_in_flight {
            self.frames.push(FrameSlot::new(&self.device)?);
        }

        self.create_render_pass()?;

        match self.rebuild(width, height)? {
            Rebuild::Done => {}
            Rebuild::SurfaceLost => {
                return Err(GpuError::Vulkan(vk::Result::ERROR_SURFACE_LOST_KHR));
            }
            Rebuild::ZeroExtent => {
                return Err(GpuError::SwapchainCreation(
                    "surface has a zero-sized extent".to_string(),
                ));
            }
        }

        self.state = CanvasState::Created;
        info!(
            "Canvas created: {:?}, {:?} samples, depth-stencil {}, {:?}",
            self.surface_format.format,
            self.msaa_samples,
            self.config.want_depth_stencil,
            self.present_mode
        );
        Ok(())
    }

    /// Rebuild the swapchain and everything sized to it.
    ///
    /// When the surface is lost (typically a window that is closing) or has
    /// a zero-sized extent (a minimised window) nothing is touched and
    /// `Ok(())` is returned. Resize events racing with window teardown are
    /// tolerated this way; the canvas still has to be dropped explicitly.
    ///
    /// Called while a frame is being recorded, the rebuild is deferred to
    /// `done_rendering`.
    pub fn resize_canvas(&mut self, width: u32, height: u32) -> Result<()> {
        match self.state {
            CanvasState::Uninitialized => Err(GpuError::InvalidState(
                "resize_canvas before create_canvas".to_string(),
            )),
            CanvasState::Recording | CanvasState::Skipped => {
                self.requested_size = (width, height);
                self.needs_resize = true;
                Ok(())
            }
            CanvasState::Created => self.rebuild(width, height).map(|_| ()),
        }
    }

    /// Wait for the current frame slot, acquire a swapchain image and begin
    /// recording.
    ///
    /// Returns `None` when the swapchain was out of date. The frame is
    /// skipped, but `done_rendering` must still be called.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn start_rendering(&mut self) -> Result<Option<vk::CommandBuffer>> {
        match self.state {
            CanvasState::Created => {}
            CanvasState::Uninitialized => {
                return Err(GpuError::InvalidState(
                    "start_rendering before create_canvas".to_string(),
                ));
            }
            CanvasState::Recording | CanvasState::Skipped => {
                return Err(GpuError::InvalidState(
                    "start_rendering called twice without done_rendering".to_string(),
                ));
            }
        }

        if self.needs_rebuild {
            let (width, height) = self.requested_size;
            if self.rebuild(width, height)? != Rebuild::Done {
                self.state = CanvasState::Skipped;
                return Ok(None);
            }
        }

        let slot = &self.frames[self.current_frame];
        slot.in_flight.wait_forever()?;
        let image_available = slot.image_available;
        let cmd = slot.command_buffer;

        if self.config.blocking {
            self.device.queue_wait_idle()?;
        }

        let acquired =
            unsafe { self.device.acquire_next_image(self.swapchain, image_available, u64::MAX) };
        let (image_index, suboptimal) = match acquired {
            Ok(acquired) => acquired,
            Err(e) if e.is_out_of_date() => {
                debug!("Swapchain out of date on acquire, skipping frame");
                let (width, height) = self.requested_size;
                self.rebuild(width, height)?;
                self.state = CanvasState::Skipped;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if suboptimal {
            self.needs_resize = true;
        }
        self.image_index = image_index;

        if let Err(e) = self.begin_frame(cmd, image_index) {
            self.abandon_frame();
            return Err(e);
        }

        self.state = CanvasState::Recording;
        Ok(Some(cmd))
    }

    /// Begin the command buffer and the render pass for `image_index`.
    fn begin_frame(&self, cmd: vk::CommandBuffer, image_index: u32) -> Result<()> {
        let framebuffer = self
            .framebuffers
            .get(image_index as usize)
            .copied()
            .ok_or_else(|| {
                GpuError::InvalidState(format!("No framebuffer for image {image_index}"))
            })?;

        let render_area = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: self.extent,
        };
        let clear_values = self.config.clear_values();
        let clear_count = self.attachment_plan().clear_value_count() as usize;
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(&clear_values[..clear_count]);
        let viewport = viewport_for(self.extent, self.config.flip_viewport);

        unsafe {
            self.device.reset_command_buffer(cmd)?;
            self.device
                .begin_command_buffer(cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
            self.device.cmd_begin_render_pass(cmd, &begin_info);
            self.device.cmd_set_viewport(cmd, &viewport);
            self.device.cmd_set_scissor(cmd, &render_area);
        }
        Ok(())
    }

    /// Give up on a frame whose image was acquired but never submitted.
    ///
    /// The image-available semaphore may still hold a signal and the fence
    /// may already be reset with no work pending, so both are replaced. The
    /// acquired image is only given back by the rebuild forced on the next
    /// `start_rendering`.
    fn abandon_frame(&mut self) {
        self.needs_rebuild = true;
        if let Err(e) = self.replace_slot_sync() {
            warn!("Failed to recover frame slot {}: {}", self.current_frame, e);
        }
    }

    fn replace_slot_sync(&mut self) -> Result<()> {
        self.device.queue_wait_idle()?;
        let semaphore = self.device.create_semaphore()?;
        let fence = Fence::new(Arc::clone(&self.device), true)?;

        let slot = &mut self.frames[self.current_frame];
        unsafe { self.device.destroy_semaphore(slot.image_available) };
        slot.image_available = semaphore;
        slot.in_flight = fence;
        Ok(())
    }

    /// Finish recording, submit, present and advance to the next frame slot.
    ///
    /// Rebuilds the swapchain after draining the queue when acquire or
    /// present reported it stale, or a resize arrived mid-frame.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn done_rendering(&mut self) -> Result<()> {
        match self.state {
            CanvasState::Recording => {}
            CanvasState::Skipped => {
                self.state = CanvasState::Created;
                if self.needs_resize {
                    self.device.queue_wait_idle()?;
                    let (width, height) = self.requested_size;
                    self.rebuild(width, height)?;
                }
                return Ok(());
            }
            CanvasState::Uninitialized | CanvasState::Created => {
                return Err(GpuError::InvalidState(
                    "done_rendering without start_rendering".to_string(),
                ));
            }
        }
        self.state = CanvasState::Created;

        let slot = &self.frames[self.current_frame];
        let cmds = [slot.command_buffer];
        let wait_semaphores = [slot.image_available];
        let signal_semaphores = [slot.render_finished];
        let fence = slot.in_flight.handle();
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&cmds)
            .signal_semaphores(&signal_semaphores);

        let swapchains = [self.swapchain];
        let image_indices = [self.image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        // The fence is reset only once nothing can fail before the submit
        // that signals it again.
        let submitted = unsafe {
            self.device.cmd_end_render_pass(cmds[0]);
            self.device
                .end_command_buffer(cmds[0])
                .and_then(|()| slot.in_flight.reset())
                .and_then(|()| self.device.queue_submit(&[submit_info], fence))
        };
        if let Err(e) = submitted {
            self.abandon_frame();
            return Err(e);
        }

        let presented = unsafe { self.device.queue_present(&present_info) };
        self.current_frame = (self.current_frame + 1) % self.frames.len();
        let stale = presented?;

        if stale || self.needs_resize {
            self.device.queue_wait_idle()?;
            let (width, height) = self.requested_size;
            self.rebuild(width, height)?;
        }

        Ok(())
    }

    fn rebuild(&mut self, width: u32, height: u32) -> Result<Rebuild> {
        self.requested_size = (width, height);

        let capabilities = match unsafe { self.device.surface_capabilities(self.surface) } {
            Ok(capabilities) => capabilities,
            Err(e) if e.is_surface_lost() => {
                warn!("Surface lost, keeping the current swapchain");
                return Ok(Rebuild::SurfaceLost);
            }
            Err(e) => return Err(e),
        };

        let extent = calculate_extent(&capabilities, width, height);
        if extent.width == 0 || extent.height == 0 {
            warn!("Surface has zero extent, keeping the current swapchain");
            return Ok(Rebuild::ZeroExtent);
        }

        // Frames still in flight may reference everything below.
        self.device.queue_wait_idle()?;
        self.extent = extent;
        self.needs_rebuild = true;
        self.destroy_framebuffers();

        if self.config.want_depth_stencil {
            self.destroy_depth_stencil();
            self.create_depth_stencil()?;
        }

        let create_info = swapchain_create_info(
            self.surface,
            &capabilities,
            self.surface_format,
            self.present_mode,
            extent,
            self.frames_in_flight,
            self.swapchain,
        );
        let created = unsafe { self.device.create_swapchain(&create_info) };
        // The old swapchain is retired even when creation failed.
        self.destroy_swapchain();
        self.swapchain = match created {
            Ok(swapchain) => swapchain,
            Err(e) if e.is_surface_lost() => {
                warn!("Surface lost while creating the swapchain");
                return Ok(Rebuild::SurfaceLost);
            }
            Err(e) => return Err(e),
        };

        self.images = unsafe { self.device.swapchain_images(self.swapchain)? };
        self.resize_frame_slots(self.images.len())?;
        self.create_image_views()?;

        if self.attachment_plan().is_multisampled() {
            self.destroy_msaa_color();
            self.create_msaa_color()?;
        }

        self.create_framebuffers()?;
        self.needs_rebuild = false;
        self.needs_resize = false;

        info!(
            "Swapchain created: {}x{} ({} images)",
            extent.width,
            extent.height,
            self.images.len()
        );
        Ok(Rebuild::Done)
    }

    /// Grow or shrink the frame slots to the swapchain image count.
    fn resize_frame_slots(&mut self, count: usize) -> Result<()> {
        let count = count.max(1);
        if count != self.frames.len() {
            debug!("Frame slots: {} -> {}", self.frames.len(), count);
        }
        while self.frames.len() < count {
            self.frames.push(FrameSlot::new(&self.device)?);
        }
        self.frames.truncate(count);
        self.frames_in_flight = count as u32;
        self.current_frame %= count;
        Ok(())
    }

    fn create_render_pass(&mut self) -> Result<()> {
        let plan = self.attachment_plan();
        let attachments = plan.descriptions(self.surface_format.format, DEPTH_STENCIL_FORMAT);

        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_ref = plan.depth_index().map(|attachment| vk::AttachmentReference {
            attachment,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        });
        let resolve_refs = plan.resolve_index().map(|attachment| {
            [vk::AttachmentReference {
                attachment,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            }]
        });

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if let Some(resolve_refs) = resolve_refs.as_ref() {
            subpass = subpass.resolve_attachments(resolve_refs);
        }
        if let Some(depth_ref) = depth_ref.as_ref() {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }

        let dependencies = [plan.subpass_dependency()];
        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(std::slice::from_ref(&subpass))
            .dependencies(&dependencies);

        self.render_pass = unsafe { self.device.create_render_pass(&create_info)? };
        Ok(())
    }

    fn create_image_views(&mut self) -> Result<()> {
        for &image in &self.images {
            let view_info = image_view_info(
                image,
                self.surface_format.format,
                vk::ImageAspectFlags::COLOR,
            );
            let view = unsafe { self.device.create_image_view(&view_info)? };
            self.image_views.push(view);
        }
        Ok(())
    }

    fn create_framebuffers(&mut self) -> Result<()> {
        let plan = self.attachment_plan();
        for &view in &self.image_views {
            let attachments = plan.framebuffer_views(view, self.depth_view, self.msaa_view);
            let create_info = vk::FramebufferCreateInfo::default()
                .render_pass(self.render_pass)
                .attachments(&attachments)
                .width(self.extent.width)
                .height(self.extent.height)
                .layers(1);
            let framebuffer = unsafe { self.device.create_framebuffer(&create_info)? };
            self.framebuffers.push(framebuffer);
        }
        Ok(())
    }

    fn create_depth_stencil(&mut self) -> Result<()> {
        let image_info = attachment_image_info(
            DEPTH_STENCIL_FORMAT,
            self.extent,
            self.msaa_samples,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        );
        self.depth_image = self
            .device
            .create_attachment_image(&image_info, "canvas depth-stencil")?;

        let view_info = image_view_info(
            self.depth_image.image,
            DEPTH_STENCIL_FORMAT,
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
        );
        self.depth_view = unsafe { self.device.create_image_view(&view_info)? };
        Ok(())
    }

    fn create_msaa_color(&mut self) -> Result<()> {
        let image_info = attachment_image_info(
            self.surface_format.format,
            self.extent,
            self.msaa_samples,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
        );
        self.msaa_image = self
            .device
            .create_attachment_image(&image_info, "canvas msaa color")?;

        let view_info = image_view_info(
            self.msaa_image.image,
            self.surface_format.format,
            vk::ImageAspectFlags::COLOR,
        );
        self.msaa_view = unsafe { self.device.create_image_view(&view_info)? };
        Ok(())
    }

    /// Destroy the swapchain image views and the swapchain.
    fn destroy_swapchain(&mut self) {
        for view in self.image_views.drain(..) {
            unsafe { self.device.destroy_image_view(view) };
        }
        self.images.clear();
        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe { self.device.destroy_swapchain(self.swapchain) };
            self.swapchain = vk::SwapchainKHR::null();
        }
    }

    fn destroy_framebuffers(&mut self) {
        for framebuffer in self.framebuffers.drain(..) {
            unsafe { self.device.destroy_framebuffer(framebuffer) };
        }
    }

    fn destroy_depth_stencil(&mut self) {
        if self.depth_view != vk::ImageView::null() {
            unsafe { self.device.destroy_image_view(self.depth_view) };
            self.depth_view = vk::ImageView::null();
        }
        unsafe { self.device.destroy_attachment_image(&mut self.depth_image) };
    }

    fn destroy_msaa_color(&mut self) {
        if self.msaa_view != vk::ImageView::null() {
            unsafe { self.device.destroy_image_view(self.msaa_view) };
            self.msaa_view = vk::ImageView::null();
        }
        unsafe { self.device.destroy_attachment_image(&mut self.msaa_image) };
    }

    /// The device this canvas renders with.
    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// Attachment order shared by the render pass, framebuffers and
    /// pipelines.
    pub fn attachment_plan(&self) -> AttachmentPlan {
        AttachmentPlan::new(self.msaa_samples, self.config.want_depth_stencil)
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Negotiated sample count.
    pub fn msaa_samples(&self) -> vk::SampleCountFlags {
        self.msaa_samples
    }

    pub fn wants_depth_stencil(&self) -> bool {
        self.config.want_depth_stencil
    }

    /// Present mode actually in use. Differs from the configured one when
    /// the surface did not support it.
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Frames in flight. Equals the swapchain image count once created.
    pub fn frames_in_flight(&self) -> u32 {
        self.frames_in_flight
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Index of the most recently acquired swapchain image.
    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    pub fn color_format(&self) -> vk::Format {
        self.surface_format.format
    }

    pub fn depth_stencil_format(&self) -> vk::Format {
        DEPTH_STENCIL_FORMAT
    }

    pub fn framebuffers(&self) -> &[vk::Framebuffer] {
        &self.framebuffers
    }

    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    pub fn swapchain(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    pub fn state(&self) -> CanvasState {
        self.state
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.config.clear_color = color;
    }

    pub fn set_clear_depth_stencil(&mut self, depth: f32, stencil: u32) {
        self.config.clear_depth = depth;
        self.config.clear_stencil = stencil;
    }

    pub fn set_blocking(&mut self, blocking: bool) {
        self.config.blocking = blocking;
    }

    pub fn set_flip_viewport(&mut self, flip: bool) {
        self.config.flip_viewport = flip;
    }
}

impl<D: DeviceBackend> Drop for Canvas<D> {
    fn drop(&mut self) {
        if let Err(e) = self.device.queue_wait_idle() {
            warn!("Queue wait failed during canvas teardown: {}", e);
        }

        for slot in &mut self.frames {
            slot.release_command_buffer();
        }
        self.destroy_swapchain();
        self.destroy_framebuffers();
        for slot in &mut self.frames {
            slot.release_semaphores();
        }
        // Remaining slot state is the fences.
        self.frames.clear();

        if self.render_pass != vk::RenderPass::null() {
            unsafe { self.device.destroy_render_pass(self.render_pass) };
            self.render_pass = vk::RenderPass::null();
        }
        self.destroy_depth_stencil();
        self.destroy_msaa_color();
    }
}

fn attachment_image_info<'a>(
    format: vk::Format,
    extent: vk::Extent2D,
    samples: vk::SampleCountFlags,
    usage: vk::ImageUsageFlags,
) -> vk::ImageCreateInfo<'a> {
    vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(format)
        .extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(samples)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
}

fn image_view_info<'a>(
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
) -> vk::ImageViewCreateInfo<'a> {
    vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{FenceState, Kind, MockBackend, MockState};
    use crate::pipeline::{GraphicsPipelineOptions, PipelineTarget};
    use approx::assert_relative_eq;
    use ash::vk::Handle;

    const COMBINATIONS: [(bool, bool); 4] =
        [(false, false), (false, true), (true, false), (true, true)];

    fn surface() -> vk::SurfaceKHR {
        vk::SurfaceKHR::from_raw(0x5u64 << 32)
    }

    fn samples(msaa: bool) -> vk::SampleCountFlags {
        if msaa {
            vk::SampleCountFlags::TYPE_4
        } else {
            vk::SampleCountFlags::TYPE_1
        }
    }

    fn canvas_with(
        config: CanvasConfig,
        configure: impl FnOnce(&mut MockState),
    ) -> (Arc<MockBackend>, Canvas<MockBackend>) {
        let device = Arc::new(MockBackend::with(configure));
        let canvas = Canvas::new(Arc::clone(&device), config);
        (device, canvas)
    }

    fn created(config: CanvasConfig) -> (Arc<MockBackend>, Canvas<MockBackend>) {
        let (device, mut canvas) = canvas_with(config, |_| {});
        canvas.create_canvas(surface(), 800, 600).unwrap();
        (device, canvas)
    }

    fn frame(canvas: &mut Canvas<MockBackend>) {
        assert!(canvas.start_rendering().unwrap().is_some());
        canvas.done_rendering().unwrap();
    }

    #[test]
    fn framebuffers_match_render_pass_for_every_combination() {
        for (msaa, depth) in COMBINATIONS {
            let config = CanvasConfig::default()
                .with_msaa(samples(msaa))
                .with_depth_stencil(depth);
            let (device, mut canvas) = created(config);
            canvas.resize_canvas(800, 600).unwrap();

            let plan = canvas.attachment_plan();
            assert_eq!(plan.is_multisampled(), msaa);
            assert_eq!(plan.has_depth_stencil(), depth);

            let state = device.state();
            let render_pass = &state.render_passes[0];
            assert_eq!(render_pass.attachment_samples.len(), plan.attachment_count());
            assert_eq!(render_pass.has_depth_ref, depth);
            assert_eq!(render_pass.has_resolve_ref, msaa);

            // Only the attachment backed by the swapchain image is presented.
            let swapchain_slot = if msaa { plan.attachment_count() - 1 } else { 0 };
            let presented: Vec<_> = render_pass
                .final_layouts
                .iter()
                .enumerate()
                .filter(|(_, &layout)| layout == vk::ImageLayout::PRESENT_SRC_KHR)
                .map(|(index, _)| index)
                .collect();
            assert_eq!(presented, vec![swapchain_slot]);

            let live: Vec<_> = state
                .framebuffers
                .iter()
                .filter(|fb| canvas.framebuffers().contains(&fb.handle))
                .collect();
            assert_eq!(live.len(), canvas.image_views().len());

            for (fb, &view) in live.iter().zip(canvas.image_views()) {
                assert_eq!(fb.render_pass, canvas.render_pass());
                assert_eq!(fb.attachments.len(), plan.attachment_count());
                assert_eq!(fb.attachments[swapchain_slot], view);
            }
            drop(state);

            frame(&mut canvas);
            assert_eq!(
                device.state().clear_value_counts,
                vec![plan.clear_value_count()]
            );
        }
    }

    #[test]
    fn pipeline_targets_match_render_pass_for_every_combination() {
        let options =
            GraphicsPipelineOptions::default().with_depth(true, true, vk::CompareOp::LESS);
        for (msaa, depth) in COMBINATIONS {
            let config = CanvasConfig::default()
                .with_msaa(samples(msaa))
                .with_depth_stencil(depth);
            let (device, canvas) = created(config);
            let target = PipelineTarget::for_canvas(&canvas);

            let state = device.state();
            let render_pass = &state.render_passes[0];
            assert_eq!(target.render_pass, render_pass.handle);
            assert_eq!(target.render_pass, canvas.render_pass());
            assert_eq!(target.subpass, 0);
            assert_eq!(target.samples, render_pass.attachment_samples[0]);
            assert_eq!(target.depth_stencil, render_pass.has_depth_ref);
            assert_eq!(
                target.color_attachment_count,
                render_pass.color_attachment_count
            );

            assert_eq!(
                options.multisample_state(&target).rasterization_samples,
                samples(msaa)
            );
            assert_eq!(options.depth_stencil_state(&target).is_some(), depth);
            assert_eq!(
                options.color_blend_attachments(&target).len(),
                render_pass.color_attachment_count as usize
            );
        }
    }

    #[test]
    fn ten_frames_cycle_through_slots() {
        let config = CanvasConfig::default()
            .with_frames_in_flight(2)
            .with_msaa(vk::SampleCountFlags::TYPE_4)
            .with_depth_stencil(true)
            .with_clear_color([0.0, 0.0, 0.2, 0.0])
            .with_blocking(false);
        let (device, mut canvas) = created(config);
        assert_eq!(canvas.msaa_samples(), vk::SampleCountFlags::TYPE_4);
        assert_eq!(canvas.frames_in_flight(), 2);

        let fences: Vec<vk::Fence> = canvas.frames.iter().map(|s| s.fence().handle()).collect();
        device.state().fence_waits.clear();

        let mut seen = Vec::new();
        for _ in 0..10 {
            seen.push(canvas.current_frame());
            frame(&mut canvas);
        }
        assert_eq!(seen, [0, 1, 0, 1, 0, 1, 0, 1, 0, 1]);

        let state = device.state();
        // Frame N waits on the fence of slot N mod 2 before recording.
        let expected: Vec<_> = (0..10).map(|n| fences[n % 2]).collect();
        assert_eq!(state.fence_waits, expected);
        assert_eq!(state.submits, 10);
        assert_eq!(state.presents, 10);
        assert_eq!(state.swapchain_infos.len(), 1);
    }

    #[test]
    fn out_of_date_acquire_skips_without_deadlock() {
        let (device, mut canvas) = created(CanvasConfig::default());
        device.state().acquire_out_of_date = 1;

        assert_eq!(canvas.start_rendering().unwrap(), None);
        assert_eq!(canvas.state(), CanvasState::Skipped);
        canvas.done_rendering().unwrap();
        assert_eq!(canvas.state(), CanvasState::Created);
        assert_eq!(device.state().swapchain_infos.len(), 2);
        assert_eq!(device.state().submits, 0);

        // The slot's fence was never reset, so this does not hang.
        frame(&mut canvas);
        assert_eq!(device.state().submits, 1);
    }

    #[test]
    fn resize_during_skipped_frame_is_applied_by_done_rendering() {
        let (device, mut canvas) = created(CanvasConfig::default());
        device.state().acquire_out_of_date = 1;
        assert_eq!(canvas.start_rendering().unwrap(), None);

        device.state().capabilities.current_extent = vk::Extent2D {
            width: 640,
            height: 480,
        };
        canvas.resize_canvas(640, 480).unwrap();
        assert_eq!(device.state().swapchain_infos.len(), 2);

        canvas.done_rendering().unwrap();
        assert_eq!(device.state().swapchain_infos.len(), 3);
        assert_eq!(canvas.extent().width, 640);
        frame(&mut canvas);
    }

    #[test]
    fn failed_submit_leaves_the_slot_usable() {
        let (device, mut canvas) = created(CanvasConfig::default().with_blocking(false));
        frame(&mut canvas);
        frame(&mut canvas);

        device.state().submit_fails = 1;
        assert!(canvas.start_rendering().unwrap().is_some());
        // Recording has started but the fence is still signaled.
        let fence = canvas.frames[canvas.current_frame()].fence().handle();
        assert_eq!(
            device.state().fence_state(fence),
            Some(FenceState::Signaled)
        );

        assert!(canvas.done_rendering().is_err());
        assert_eq!(canvas.state(), CanvasState::Created);

        for _ in 0..3 {
            frame(&mut canvas);
        }
        assert_eq!(device.state().submits, 5);

        drop(canvas);
        assert_eq!(device.state().total_live(), 0);
    }

    #[test]
    fn failed_rebuild_is_retried_before_the_next_acquire() {
        let kinds = [
            Kind::Swapchain,
            Kind::ImageView,
            Kind::Image,
            Kind::Framebuffer,
        ];
        for kind in kinds {
            let config = CanvasConfig::default()
                .with_msaa(vk::SampleCountFlags::TYPE_4)
                .with_depth_stencil(true);
            let (device, mut canvas) = created(config);
            frame(&mut canvas);
            let old_swapchain = canvas.swapchain();

            device.state().fail_create = Some(kind);
            assert!(canvas.resize_canvas(800, 600).is_err(), "{kind:?}");
            assert_eq!(canvas.state(), CanvasState::Created);
            if kind == Kind::Swapchain {
                assert_eq!(canvas.swapchain(), vk::SwapchainKHR::null());
                let state = device.state();
                assert_eq!(state.retired_swapchains, vec![old_swapchain]);
                assert!(!state.is_alive(Kind::Swapchain, old_swapchain.as_raw()));
            }

            // The mock rejects acquires on a swapchain it does not know.
            frame(&mut canvas);
            assert_ne!(canvas.swapchain(), vk::SwapchainKHR::null());
            assert_eq!(canvas.framebuffers().len(), canvas.image_views().len());

            drop(canvas);
            assert_eq!(device.state().total_live(), 0, "{kind:?} leaked");
        }
    }

    #[test]
    fn suboptimal_acquire_rebuilds_after_present() {
        let (device, mut canvas) = created(CanvasConfig::default());
        device.state().acquire_suboptimal = 1;

        assert!(canvas.start_rendering().unwrap().is_some());
        assert_eq!(device.state().swapchain_infos.len(), 1);
        canvas.done_rendering().unwrap();
        assert_eq!(device.state().swapchain_infos.len(), 2);
        assert_eq!(device.state().presents, 1);
    }

    #[test]
    fn stale_present_drains_and_rebuilds() {
        let (device, mut canvas) = created(CanvasConfig::default().with_blocking(false));
        device.state().present_out_of_date = 1;
        let idle_before = device.state().queue_idle_waits;

        frame(&mut canvas);
        let state = device.state();
        assert_eq!(state.swapchain_infos.len(), 2);
        assert!(state.queue_idle_waits >= idle_before + 2);
    }

    #[test]
    fn resize_releases_old_handles() {
        let config = CanvasConfig::default()
            .with_msaa(vk::SampleCountFlags::TYPE_4)
            .with_depth_stencil(true);
        let (device, mut canvas) = created(config);
        frame(&mut canvas);

        let old_framebuffers = canvas.framebuffers().to_vec();
        let old_views = canvas.image_views().to_vec();
        let old_swapchain = canvas.swapchain();
        let live_before = device.state().total_live();

        device.state().capabilities.current_extent = vk::Extent2D {
            width: 1024,
            height: 768,
        };
        canvas.resize_canvas(1024, 768).unwrap();
        assert_eq!(
            canvas.extent(),
            vk::Extent2D {
                width: 1024,
                height: 768
            }
        );

        let state = device.state();
        assert_eq!(state.total_live(), live_before);
        assert_eq!(state.retired_swapchains, vec![old_swapchain]);
        assert!(!state.is_alive(Kind::Swapchain, old_swapchain.as_raw()));
        for fb in &old_framebuffers {
            assert!(!state.is_alive(Kind::Framebuffer, fb.as_raw()));
        }
        for view in &old_views {
            assert!(!state.is_alive(Kind::ImageView, view.as_raw()));
        }

        let current: Vec<_> = state
            .framebuffers
            .iter()
            .filter(|fb| canvas.framebuffers().contains(&fb.handle))
            .collect();
        assert_eq!(current.len(), 2);
        assert!(current.iter().all(|fb| fb.width == 1024 && fb.height == 768));

        // Depth-stencil and MSAA color, both rebuilt at the new size.
        assert_eq!(state.live(Kind::Image), 2);
        assert!(state
            .attachment_images
            .iter()
            .rev()
            .take(2)
            .all(|(_, samples, extent)| *samples == vk::SampleCountFlags::TYPE_4
                && extent.width == 1024));
    }

    #[test]
    fn surface_lost_resize_keeps_handles() {
        let (device, mut canvas) = created(CanvasConfig::default().with_depth_stencil(true));
        let framebuffers = canvas.framebuffers().to_vec();
        let views = canvas.image_views().to_vec();
        let swapchain = canvas.swapchain();
        let live = device.state().total_live();

        device.state().surface_lost = true;
        canvas.resize_canvas(1024, 768).unwrap();

        assert_eq!(canvas.framebuffers(), framebuffers.as_slice());
        assert_eq!(canvas.image_views(), views.as_slice());
        assert_eq!(canvas.swapchain(), swapchain);
        assert_eq!(canvas.state(), CanvasState::Created);
        let state = device.state();
        assert_eq!(state.total_live(), live);
        assert_eq!(state.swapchain_infos.len(), 1);
    }

    #[test]
    fn zero_extent_resize_keeps_handles() {
        let (device, mut canvas) = created(CanvasConfig::default());
        let swapchain = canvas.swapchain();

        device.state().capabilities.current_extent = vk::Extent2D::default();
        canvas.resize_canvas(0, 0).unwrap();

        assert_eq!(canvas.swapchain(), swapchain);
        assert_eq!(canvas.extent().width, 800);
        assert_eq!(device.state().swapchain_infos.len(), 1);
    }

    #[test]
    fn failed_creation_is_cleaned_up_by_drop() {
        let kinds = [
            Kind::Fence,
            Kind::Semaphore,
            Kind::CommandBuffer,
            Kind::RenderPass,
            Kind::Image,
            Kind::ImageView,
            Kind::Swapchain,
            Kind::Framebuffer,
        ];
        for kind in kinds {
            let config = CanvasConfig::default()
                .with_msaa(vk::SampleCountFlags::TYPE_4)
                .with_depth_stencil(true);
            let (device, mut canvas) = canvas_with(config, |s| s.fail_create = Some(kind));

            assert!(canvas.create_canvas(surface(), 800, 600).is_err(), "{kind:?}");
            assert_eq!(canvas.state(), CanvasState::Uninitialized);
            drop(canvas);
            assert_eq!(device.state().total_live(), 0, "{kind:?} leaked");
        }
    }

    #[test]
    fn drop_releases_everything() {
        for (msaa, depth) in COMBINATIONS {
            let config = CanvasConfig::default()
                .with_msaa(samples(msaa))
                .with_depth_stencil(depth);
            let (device, mut canvas) = created(config);
            frame(&mut canvas);
            drop(canvas);
            assert_eq!(device.state().total_live(), 0);
        }
    }

    #[test]
    fn frame_slots_follow_image_count() {
        let config = CanvasConfig::default().with_frames_in_flight(5);
        let (device, mut canvas) = canvas_with(config, |s| s.capabilities.max_image_count = 3);
        canvas.create_canvas(surface(), 800, 600).unwrap();

        assert_eq!(canvas.frames_in_flight(), 3);
        assert_eq!(device.state().live(Kind::Fence), 3);
        assert_eq!(device.state().live(Kind::Semaphore), 6);
        assert_eq!(device.state().live(Kind::CommandBuffer), 3);

        frame(&mut canvas);
        frame(&mut canvas);
        assert_eq!(canvas.current_frame(), 2);

        device.state().capabilities.max_image_count = 2;
        canvas.resize_canvas(800, 600).unwrap();
        assert_eq!(canvas.frames_in_flight(), 2);
        assert_eq!(canvas.current_frame(), 0);
        assert_eq!(device.state().live(Kind::Fence), 2);
        assert_eq!(device.state().live(Kind::Semaphore), 4);
        frame(&mut canvas);
    }

    #[test]
    fn single_frame_request_grows_to_surface_minimum() {
        let (device, canvas) = created(CanvasConfig::default().with_frames_in_flight(1));
        assert_eq!(canvas.frames_in_flight(), 2);
        assert_eq!(device.state().live(Kind::Fence), 2);
        assert_eq!(device.state().swapchain_infos[0].0, 2);
    }

    #[test]
    fn msaa_is_negotiated_before_creation() {
        // Mock device: color up to 8 samples, depth up to 4.
        let device = Arc::new(MockBackend::new());
        let mut canvas = Canvas::new(
            Arc::clone(&device),
            CanvasConfig::default().with_msaa(vk::SampleCountFlags::TYPE_64),
        );
        assert_eq!(canvas.msaa_samples(), vk::SampleCountFlags::TYPE_8);

        canvas.set_want_depth_stencil(true).unwrap();
        assert_eq!(canvas.msaa_samples(), vk::SampleCountFlags::TYPE_4);

        assert_eq!(
            canvas.set_msaa(vk::SampleCountFlags::TYPE_1).unwrap(),
            vk::SampleCountFlags::TYPE_1
        );
        assert_eq!(
            canvas.set_msaa(vk::SampleCountFlags::TYPE_2).unwrap(),
            vk::SampleCountFlags::TYPE_2
        );

        canvas.create_canvas(surface(), 800, 600).unwrap();
        assert!(matches!(
            canvas.set_msaa(vk::SampleCountFlags::TYPE_4),
            Err(GpuError::InvalidState(_))
        ));
        assert!(canvas.set_want_depth_stencil(false).is_err());
        assert_eq!(canvas.msaa_samples(), vk::SampleCountFlags::TYPE_2);
    }

    #[test]
    fn flipped_viewport_points_up() {
        let (device, mut canvas) = created(CanvasConfig::default());
        frame(&mut canvas);
        canvas.set_flip_viewport(true);
        frame(&mut canvas);

        let state = device.state();
        let normal = state.viewports[0];
        assert_relative_eq!(normal.y, 0.0);
        assert_relative_eq!(normal.height, 600.0);

        let flipped = state.viewports[1];
        assert_relative_eq!(flipped.y, 600.0);
        assert_relative_eq!(flipped.height, -600.0);
        assert_eq!(state.scissors[1].extent.height, 600);
    }

    #[test]
    fn unsupported_present_mode_falls_back_to_fifo() {
        let config = CanvasConfig::default().with_present_mode(vk::PresentModeKHR::IMMEDIATE);
        let (device, canvas) = created(config);
        assert_eq!(canvas.present_mode(), vk::PresentModeKHR::FIFO);
        assert_eq!(device.state().swapchain_infos[0].2, vk::PresentModeKHR::FIFO);

        let config = CanvasConfig::default().with_present_mode(vk::PresentModeKHR::MAILBOX);
        let (_device, canvas) = created(config);
        assert_eq!(canvas.present_mode(), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn unsupported_format_is_rejected() {
        let config = CanvasConfig::default()
            .with_color_format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let (device, mut canvas) = canvas_with(config, |_| {});

        let err = canvas.create_canvas(surface(), 800, 600).unwrap_err();
        assert!(matches!(
            err,
            GpuError::FormatNotSupported {
                format: vk::Format::R8G8B8A8_UNORM,
                ..
            }
        ));
        drop(canvas);
        assert_eq!(device.state().total_live(), 0);
    }

    #[test]
    fn surface_without_present_support_is_rejected() {
        let (_device, mut canvas) =
            canvas_with(CanvasConfig::default(), |s| s.surface_supported = false);
        assert!(matches!(
            canvas.create_canvas(surface(), 800, 600),
            Err(GpuError::SurfaceUnsupported { queue_family: 0 })
        ));
    }

    #[test]
    fn lost_surface_at_creation_is_an_error() {
        let (_device, mut canvas) = canvas_with(CanvasConfig::default(), |s| s.surface_lost = true);
        let err = canvas.create_canvas(surface(), 800, 600).unwrap_err();
        assert!(err.is_surface_lost());
    }

    #[test]
    fn call_order_is_enforced() {
        let (_device, mut canvas) = canvas_with(CanvasConfig::default(), |_| {});
        assert!(canvas.start_rendering().is_err());
        assert!(canvas.done_rendering().is_err());
        assert!(canvas.resize_canvas(800, 600).is_err());

        canvas.create_canvas(surface(), 800, 600).unwrap();
        assert!(canvas.create_canvas(surface(), 800, 600).is_err());
        assert!(canvas.done_rendering().is_err());

        assert!(canvas.start_rendering().unwrap().is_some());
        assert!(matches!(
            canvas.start_rendering(),
            Err(GpuError::InvalidState(_))
        ));
        canvas.done_rendering().unwrap();
        assert!(canvas.done_rendering().is_err());
    }

    #[test]
    fn resize_while_recording_is_deferred() {
        let (device, mut canvas) = created(CanvasConfig::default());
        assert!(canvas.start_rendering().unwrap().is_some());

        device.state().capabilities.current_extent = vk::Extent2D {
            width: 640,
            height: 480,
        };
        canvas.resize_canvas(640, 480).unwrap();
        assert_eq!(device.state().swapchain_infos.len(), 1);

        canvas.done_rendering().unwrap();
        assert_eq!(device.state().swapchain_infos.len(), 2);
        assert_eq!(canvas.extent().width, 640);
    }

    #[test]
    fn blocking_mode_idles_the_queue_each_frame() {
        let (device, mut canvas) = created(CanvasConfig::default());
        let before = device.state().queue_idle_waits;
        frame(&mut canvas);
        assert_eq!(device.state().queue_idle_waits, before + 1);

        canvas.set_blocking(false);
        frame(&mut canvas);
        assert_eq!(device.state().queue_idle_waits, before + 1);
    }
}
