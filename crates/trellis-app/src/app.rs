//! `CanvasApp` trait definition.

use ash::vk;
use winit::event::WindowEvent;

use crate::context::AppContext;

/// Trait for applications drawing into a Trellis canvas.
///
/// The runner owns the window, the Vulkan objects and the canvas. It calls
/// `start_rendering` / `done_rendering` around [`CanvasApp::render`], so an
/// implementation only records draw commands.
pub trait CanvasApp: Sized {
    /// Initialize the application.
    ///
    /// Called once after the window and the canvas have been created.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Update application state.
    ///
    /// Called every frame before rendering.
    ///
    /// # Arguments
    /// * `ctx` - Application context with device and canvas access
    /// * `dt` - Delta time in seconds since last frame
    fn update(&mut self, ctx: &AppContext, dt: f32);

    /// Record draw commands for one frame.
    ///
    /// `cmd` is already inside the canvas render pass, with viewport and
    /// scissor set. Not called for frames the canvas skipped because the
    /// swapchain was out of date.
    fn render(&mut self, ctx: &AppContext, cmd: vk::CommandBuffer) -> anyhow::Result<()>;

    /// Clear color for the next frame, applied before `start_rendering`.
    ///
    /// Default implementation keeps the canvas clear color.
    fn clear_color(&self) -> Option<[f32; 4]> {
        None
    }

    /// Handle window resize.
    ///
    /// Called after the canvas has been asked to resize. Default
    /// implementation does nothing.
    #[allow(unused_variables)]
    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Handle window events.
    ///
    /// Return `true` if the event was handled and should not be processed
    /// further.
    #[allow(unused_variables)]
    fn on_event(&mut self, event: &WindowEvent) -> bool {
        false
    }

    /// Cleanup resources before shutdown.
    ///
    /// The device is idle when this is called.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
