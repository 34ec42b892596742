//! Orrery scene: a sun, orbiting planets and their moons, drawn as
//! textured discs inside the canvas render pass.

use std::f32::consts::TAU;

use ash::vk;
use glam::Vec2;
use trellis_app::Device;

use crate::disc::{DiscPush, DiscRenderer, Surface};

/// Background color the clear color pulses around.
const BACKGROUND: [f32; 3] = [0.02, 0.02, 0.12];

/// Seconds per background pulse at time scale 1.
const PULSE_PERIOD: f32 = 6.0;

/// Simulated seconds between two granulation patterns of the sun.
const GRANULATION_PERIOD: f32 = 0.25;

/// Shared per-frame state handed to every body.
#[derive(Debug, Clone, PartialEq)]
pub struct OrreryScene {
    elapsed: f32,
    frame: u64,
    time_scale: f32,
}

impl OrreryScene {
    pub fn new(time_scale: f32) -> Self {
        Self {
            elapsed: 0.0,
            frame: 0,
            time_scale,
        }
    }

    /// Advance the clock by `dt` real seconds.
    pub fn advance(&mut self, dt: f32) {
        self.elapsed += dt;
        self.frame += 1;
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    /// Simulated time, in orbit seconds.
    pub fn time(&self) -> f32 {
        self.elapsed * self.time_scale
    }

    /// Animation step of the sun's surface.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn granulation_tick(&self) -> u64 {
        (self.time().max(0.0) / GRANULATION_PERIOD) as u64
    }

    /// Clear color for the current time.
    pub fn background(&self) -> [f32; 4] {
        let pulse = 0.75 + 0.25 * (self.time() * TAU / PULSE_PERIOD).sin();
        let [r, g, b] = BACKGROUND;
        [r * pulse, g * pulse, b * pulse, 1.0]
    }
}

/// Something that records draw commands for the orrery.
pub trait Renderable {
    fn draw(
        &mut self,
        scene: &OrreryScene,
        discs: &DiscRenderer,
        device: &Device,
        cmd: vk::CommandBuffer,
    );
}

/// Circular orbit in scene units, where 1.0 is half the shorter side of
/// the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orbit {
    pub radius: f32,
    /// Seconds per revolution.
    pub period: f32,
    /// Starting angle in radians.
    pub phase: f32,
}

impl Orbit {
    pub const fn new(radius: f32, period: f32, phase: f32) -> Self {
        Self {
            radius,
            period,
            phase,
        }
    }

    /// Offset from the orbit center at simulated time `t`.
    pub fn offset(&self, t: f32) -> Vec2 {
        let angle = self.phase + t * TAU / self.period;
        Vec2::new(angle.cos(), angle.sin()) * self.radius
    }
}

pub struct Sun {
    pub size: f32,
    pub color: [f32; 3],
}

impl Sun {
    /// The sun flickers slightly.
    pub fn color_at(&self, t: f32) -> [f32; 4] {
        let glow = 0.9 + 0.1 * (t * 3.0).sin();
        let [r, g, b] = self.color;
        [r * glow, g * glow, b * glow, 1.0]
    }
}

impl Renderable for Sun {
    fn draw(
        &mut self,
        scene: &OrreryScene,
        discs: &DiscRenderer,
        device: &Device,
        cmd: vk::CommandBuffer,
    ) {
        let push = DiscPush::new(Vec2::ZERO, self.size, self.color_at(scene.time()));
        discs.draw_disc(device, cmd, Surface::Solar, &push);
    }
}

pub struct Planet {
    pub orbit: Orbit,
    pub size: f32,
    pub color: [f32; 4],
}

impl Planet {
    pub fn position(&self, t: f32) -> Vec2 {
        self.orbit.offset(t)
    }
}

impl Renderable for Planet {
    fn draw(
        &mut self,
        scene: &OrreryScene,
        discs: &DiscRenderer,
        device: &Device,
        cmd: vk::CommandBuffer,
    ) {
        let push = DiscPush::new(self.position(scene.time()), self.size, self.color);
        discs.draw_disc(device, cmd, Surface::Rocky, &push);
    }
}

/// A moon circling a planet's orbit position.
pub struct Moon {
    pub parent: Orbit,
    pub orbit: Orbit,
    pub size: f32,
    pub color: [f32; 4],
}

impl Moon {
    pub fn position(&self, t: f32) -> Vec2 {
        self.parent.offset(t) + self.orbit.offset(t)
    }
}

impl Renderable for Moon {
    fn draw(
        &mut self,
        scene: &OrreryScene,
        discs: &DiscRenderer,
        device: &Device,
        cmd: vk::CommandBuffer,
    ) {
        let push = DiscPush::new(self.position(scene.time()), self.size, self.color);
        discs.draw_disc(device, cmd, Surface::Rocky, &push);
    }
}

/// The default system, drawn back to front.
pub fn solar_system() -> Vec<Box<dyn Renderable>> {
    let earth = Orbit::new(0.55, 20.0, 0.0);
    let mars = Orbit::new(0.85, 36.0, 2.0);

    vec![
        Box::new(Sun {
            size: 0.12,
            color: [1.0, 0.8, 0.2],
        }),
        Box::new(Planet {
            orbit: Orbit::new(0.28, 8.0, 1.0),
            size: 0.03,
            color: [0.7, 0.6, 0.5, 1.0],
        }),
        Box::new(Planet {
            orbit: earth,
            size: 0.05,
            color: [0.2, 0.4, 0.9, 1.0],
        }),
        Box::new(Moon {
            parent: earth,
            orbit: Orbit::new(0.1, 3.0, 0.0),
            size: 0.015,
            color: [0.8, 0.8, 0.8, 1.0],
        }),
        Box::new(Planet {
            orbit: mars,
            size: 0.04,
            color: [0.8, 0.3, 0.2, 1.0],
        }),
        Box::new(Moon {
            parent: mars,
            orbit: Orbit::new(0.07, 2.0, 1.5),
            size: 0.01,
            color: [0.6, 0.55, 0.5, 1.0],
        }),
    ]
}
