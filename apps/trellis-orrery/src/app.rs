//! Orrery application.

use ash::vk;
use tracing::{info, warn};
use trellis_app::{AppContext, CanvasApp};

use crate::disc::DiscRenderer;
use crate::scene::{solar_system, OrreryScene, Renderable};

/// Time scale used when none is given on the command line.
pub const DEFAULT_TIME_SCALE: f32 = 1.0;

pub struct Orrery {
    scene: OrreryScene,
    bodies: Vec<Box<dyn Renderable>>,
    discs: DiscRenderer,
}

impl CanvasApp for Orrery {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let bodies = solar_system();
        let scene = OrreryScene::new(DEFAULT_TIME_SCALE);
        let discs = DiscRenderer::new(&ctx.device, &ctx.canvas)?;
        info!(
            "Orrery with {} bodies on a {}x{} canvas, {:?} samples, {} surface mip levels, \
             time scale {}",
            bodies.len(),
            ctx.width(),
            ctx.height(),
            ctx.canvas.msaa_samples(),
            discs.rocky_surface().mip_levels(),
            scene.time_scale()
        );

        Ok(Self {
            scene,
            bodies,
            discs,
        })
    }

    fn update(&mut self, ctx: &AppContext, dt: f32) {
        self.scene.advance(dt);

        // No frame is being recorded here, so the shared resources can change.
        if let Err(e) = self.discs.sync_view(&ctx.device, ctx.extent()) {
            warn!("Failed to update view uniform: {e:#}");
        }
        let tick = self.scene.granulation_tick();
        if let Err(e) = self.discs.sync_granulation(&ctx.device, tick) {
            warn!("Failed to update granulation: {e:#}");
        }
    }

    fn render(&mut self, ctx: &AppContext, cmd: vk::CommandBuffer) -> anyhow::Result<()> {
        self.discs.begin(&ctx.device, cmd);
        for body in &mut self.bodies {
            body.draw(&self.scene, &self.discs, &ctx.device, cmd);
        }
        Ok(())
    }

    fn clear_color(&self) -> Option<[f32; 4]> {
        Some(self.scene.background())
    }

    fn cleanup(&mut self, _ctx: &mut AppContext) {
        info!(
            "Orrery ran {} frames over {:.1}s",
            self.scene.frame(),
            self.scene.elapsed()
        );
    }
}
