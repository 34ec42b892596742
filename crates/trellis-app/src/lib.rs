//! Application framework for Trellis canvases.
//!
//! This crate provides a trait-based runner that handles:
//! - Window creation and management
//! - Vulkan instance, device and surface setup
//! - Canvas creation, resizing and the per-frame start / done cycle
//! - Logging initialization and frame pacing
//!
//! # Example
//!
//! ```no_run
//! use ash::vk;
//! use trellis_app::{run_app, AppConfig, AppContext, CanvasApp};
//!
//! struct MyApp;
//!
//! impl CanvasApp for MyApp {
//!     fn init(_ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(MyApp)
//!     }
//!
//!     fn update(&mut self, _ctx: &AppContext, _dt: f32) {}
//!
//!     fn render(&mut self, _ctx: &AppContext, _cmd: vk::CommandBuffer) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<MyApp>(AppConfig::new("My App"))
//! }
//! ```

mod app;
mod context;
mod runner;

pub use app::CanvasApp;
pub use context::AppContext;
pub use runner::{run_app, AppConfig};

// Re-export commonly used types for convenience
pub use trellis_gpu::{sample_count_from_u32, Canvas, CanvasConfig, Device};
pub use winit::event::WindowEvent;
