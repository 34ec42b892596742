//! Application runner and event loop.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
#[cfg(feature = "profiling-tracy")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trellis_gpu::CanvasConfig;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::app::CanvasApp;
use crate::context::AppContext;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Window title, also used as the Vulkan application name.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Target frames per second (None for unlimited).
    pub target_fps: Option<u32>,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// Settings for the canvas built on the window.
    pub canvas: CanvasConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Trellis".to_string(),
            width: 1280,
            height: 720,
            target_fps: None,
            validation: cfg!(debug_assertions),
            canvas: CanvasConfig::default(),
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    #[must_use]
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the target FPS.
    #[must_use]
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }

    /// Enable or disable validation layers.
    #[must_use]
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    #[must_use]
    pub fn with_canvas(mut self, canvas: CanvasConfig) -> Self {
        self.canvas = canvas;
        self
    }

    /// Minimum time per frame, if a target rate is set.
    pub fn frame_interval(&self) -> Option<Duration> {
        self.target_fps
            .filter(|&fps| fps > 0)
            .map(|fps| Duration::from_nanos(1_000_000_000 / u64::from(fps)))
    }
}

/// Log filter used when `RUST_LOG` is unset. Tracy builds also keep the
/// per-frame spans of the Trellis crates.
#[cfg(feature = "profiling-tracy")]
const DEFAULT_LOG_FILTER: &str = "info,trellis_gpu=trace,trellis_app=trace";
#[cfg(not(feature = "profiling-tracy"))]
const DEFAULT_LOG_FILTER: &str = "info";

/// Run a [`CanvasApp`] with the given configuration.
///
/// Initializes logging, creates the window and canvas, and runs the event
/// loop until the window is closed.
pub fn run_app<A: CanvasApp + 'static>(config: AppConfig) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    #[cfg(feature = "profiling-tracy")]
    {
        let tracy_layer = tracing_tracy::TracyLayer::default();
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .with(tracy_layer)
            .init();
    }

    #[cfg(not(feature = "profiling-tracy"))]
    {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    info!("{} starting...", config.title);

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner::<A> {
        config,
        state: None,
    };

    if let Err(e) = event_loop.run_app(&mut runner) {
        error!("Event loop error: {e}");
    }

    Ok(())
}

/// Internal application runner that implements winit's `ApplicationHandler`.
struct AppRunner<A: CanvasApp> {
    config: AppConfig,
    state: Option<AppState<A>>,
}

/// Internal application state.
struct AppState<A: CanvasApp> {
    // The app goes first so its resources are released before the canvas.
    app: A,
    ctx: AppContext,
    frame_interval: Option<Duration>,
    fps: FpsStats,
}

impl<A: CanvasApp + 'static> ApplicationHandler for AppRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        info!("Creating application state...");

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready!");
            }
            Err(e) => {
                error!("Failed to initialize application: {e:#}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Some(state) = &mut self.state {
            if state.app.on_event(&event) {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                if let Some(mut state) = self.state.take() {
                    state.cleanup();
                }
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                if let Some(state) = &mut self.state {
                    if let Err(e) = state.render_frame() {
                        error!("Render error: {e:#}");
                    }
                    state.ctx.window.request_redraw();
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    if let Err(e) = state.handle_resize(size.width, size.height) {
                        error!("Resize error: {e:#}");
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.window.request_redraw();
        }
    }
}

impl<A: CanvasApp + 'static> AppRunner<A> {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState<A>> {
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));

        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let mut ctx = AppContext::new(
            window,
            &self.config.title,
            self.config.validation,
            self.config.canvas,
        )?;

        let app = A::init(&mut ctx)?;

        Ok(AppState {
            app,
            ctx,
            frame_interval: self.config.frame_interval(),
            fps: FpsStats::default(),
        })
    }
}

impl<A: CanvasApp> AppState<A> {
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn render_frame(&mut self) -> anyhow::Result<()> {
        let frame_start = Instant::now();

        let dt = frame_start
            .duration_since(self.ctx.last_frame_time)
            .as_secs_f32();
        self.ctx.last_frame_time = frame_start;
        self.fps.record(dt);

        self.app.update(&self.ctx, dt);
        if let Some(color) = self.app.clear_color() {
            self.ctx.canvas.set_clear_color(color);
        }

        if let Some(cmd) = self.ctx.canvas.start_rendering()? {
            let rendered = self.app.render(&self.ctx, cmd);
            // The frame has to be closed even when recording failed.
            self.ctx.canvas.done_rendering()?;
            rendered?;
            self.ctx.frame_count += 1;
        } else {
            self.ctx.canvas.done_rendering()?;
        }

        if let Some(target) = self.frame_interval {
            let elapsed = frame_start.elapsed();
            if elapsed < target {
                thread::sleep(target - elapsed);
            }
        }

        Ok(())
    }

    fn handle_resize(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        // Zero sizes and lost surfaces are tolerated by the canvas.
        self.ctx.canvas.resize_canvas(width, height)?;

        if width > 0 && height > 0 {
            self.app.on_resize(&mut self.ctx, width, height)?;
            info!("Resized to {}x{}", width, height);
        }
        Ok(())
    }

    fn cleanup(&mut self) {
        if let Some(summary) = self.fps.summary() {
            info!("FPS Statistics:");
            info!("  Min: {:.1}", summary.min);
            info!("  Max: {:.1}", summary.max);
            info!("  Avg: {:.1}", summary.avg);
            info!("  Total frames: {}", self.ctx.frame_count);
        }

        info!("Starting cleanup...");
        if let Err(e) = self.ctx.device.wait_idle() {
            error!("Failed to wait idle: {e}");
        }

        self.app.cleanup(&mut self.ctx);
        info!("Cleanup complete");
    }
}

/// Running min / max / average of the frame rate.
#[derive(Debug, Clone, Copy)]
struct FpsStats {
    min: f64,
    max: f64,
    sum: f64,
    samples: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct FpsSummary {
    min: f64,
    max: f64,
    avg: f64,
}

impl Default for FpsStats {
    fn default() -> Self {
        Self {
            min: f64::MAX,
            max: 0.0,
            sum: 0.0,
            samples: 0,
        }
    }
}

impl FpsStats {
    fn record(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let fps = 1.0 / f64::from(dt);
        self.min = self.min.min(fps);
        self.max = self.max.max(fps);
        self.sum += fps;
        self.samples += 1;
    }

    #[allow(clippy::cast_precision_loss)]
    fn summary(&self) -> Option<FpsSummary> {
        (self.samples > 0).then(|| FpsSummary {
            min: self.min,
            max: self.max,
            avg: self.sum / self.samples as f64,
        })
    }
}
