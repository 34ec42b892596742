//! Application context.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context as _;
use ash::vk;
use raw_window_handle::HasDisplayHandle;
use trellis_gpu::{Canvas, CanvasConfig, Device, Instance, Surface};
use winit::window::Window;

/// Application context shared across all app methods.
///
/// Fields are dropped in declaration order: the canvas goes before the
/// surface it presents to, the surface before the device and instance,
/// and the window last.
pub struct AppContext {
    /// Swapchain, render pass and per-frame state.
    pub canvas: Canvas,
    /// Surface the canvas presents to.
    pub surface: Surface,
    /// Logical device, shared with every resource the app creates.
    pub device: Arc<Device>,
    pub instance: Arc<Instance>,
    /// The window handle.
    pub window: Arc<Window>,
    /// Total frames rendered.
    pub frame_count: u64,
    /// Time of last frame (for delta time calculation).
    pub(crate) last_frame_time: Instant,
}

impl AppContext {
    /// Create the Vulkan objects for `window` and build the canvas at the
    /// window's current size.
    pub(crate) fn new(
        window: Arc<Window>,
        title: &str,
        validation: bool,
        config: CanvasConfig,
    ) -> anyhow::Result<Self> {
        let display = window
            .display_handle()
            .context("Window has no display handle")?
            .as_raw();

        let instance = Arc::new(Instance::new(title, validation, Some(display))?);
        let physical_device = instance.select_physical_device()?;
        let device = Arc::new(Device::new(Arc::clone(&instance), physical_device)?);

        // SAFETY: The window is stored in the context and dropped after the surface.
        let surface = unsafe { Surface::from_window(&instance, window.as_ref())? };

        let size = window.inner_size();
        let mut canvas = Canvas::new(Arc::clone(&device), config);
        canvas.create_canvas(surface.handle(), size.width.max(1), size.height.max(1))?;

        let extent = canvas.extent();
        tracing::info!(
            "Canvas ready: {}x{} ({} frames in flight)",
            extent.width,
            extent.height,
            canvas.frames_in_flight()
        );

        Ok(Self {
            canvas,
            surface,
            device,
            instance,
            window,
            frame_count: 0,
            last_frame_time: Instant::now(),
        })
    }

    /// Get the current canvas extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.canvas.extent()
    }

    pub fn width(&self) -> u32 {
        self.canvas.extent().width
    }

    pub fn height(&self) -> u32 {
        self.canvas.extent().height
    }

    /// Get the aspect ratio (width / height).
    #[allow(clippy::cast_precision_loss)]
    pub fn aspect_ratio(&self) -> f32 {
        let extent = self.canvas.extent();
        extent.width as f32 / extent.height.max(1) as f32
    }

    /// Get the number of frames in flight.
    pub fn frames_in_flight(&self) -> u32 {
        self.canvas.frames_in_flight()
    }
}
