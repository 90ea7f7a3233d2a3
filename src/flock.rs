use colors_transform::{Color, Hsl};
use image::Rgb;
use nalgebra::{Point3, Vector3};
use rand::Rng;

use crate::agent::FlockAgent;
use crate::config::FlockConfig;
use crate::spatial::RayCaster;

#[derive(Clone, Copy, Debug)]
pub struct SpawnSettings {
    pub count: usize,
    // Flock anchor; doubles as the centre of the spawn volume.
    pub centre: Point3<f32>,
    // Per-axis extents of the spawn volume.
    pub extents: Vector3<f32>,
}

#[derive(Clone, Debug)]
pub struct Flock {
    agents: Vec<FlockAgent>,
    config: FlockConfig,
    anchor: Point3<f32>,
}

impl Flock {
    pub fn new(config: FlockConfig, anchor: Point3<f32>) -> Self {
        Self {
            agents: Vec::new(),
            config,
            anchor,
        }
    }

    pub fn spawn<R: Rng>(config: FlockConfig, settings: SpawnSettings, rng: &mut R) -> Self {
        let mut flock = Self::new(config, settings.centre);
        for index in 0..settings.count {
            let unit = random_in_unit_sphere(rng);
            let offset = Vector3::new(
                unit.x * settings.extents.x,
                unit.y * settings.extents.y,
                unit.z * settings.extents.z,
            );
            let yaw = rng.random_range(0.0..std::f32::consts::TAU);
            let forward = Vector3::new(yaw.sin(), 0.0, yaw.cos());
            let speed = rng.random_range(flock.config.min_speed..=flock.config.max_speed);
            flock.agents.push(FlockAgent::new(
                settings.centre + offset,
                forward,
                speed,
                hue_colour(index, settings.count),
            ));
        }
        flock
    }

    pub fn push(&mut self, agent: FlockAgent) {
        self.agents.push(agent);
    }

    pub fn agents(&self) -> &[FlockAgent] {
        &self.agents
    }

    pub fn config(&self) -> &FlockConfig {
        &self.config
    }

    pub fn anchor(&self) -> Point3<f32> {
        self.anchor
    }

    // Strictly sequential in roster order, each update applied before the
    // next agent plans; later agents see mixed this-tick and last-tick
    // neighbour state.
    pub fn step(&mut self, dt: f32, caster: &dyn RayCaster) {
        for index in 0..self.agents.len() {
            let step =
                self.agents[index].plan(index, &self.agents, &self.config, self.anchor, caster, dt);
            self.agents[index].apply(step);
        }
    }
}

fn random_in_unit_sphere<R: Rng>(rng: &mut R) -> Vector3<f32> {
    loop {
        let candidate = Vector3::new(
            rng.random_range(-1.0..=1.0),
            rng.random_range(-1.0..=1.0),
            rng.random_range(-1.0..=1.0),
        );
        if candidate.norm_squared() <= 1.0 {
            return candidate;
        }
    }
}

// Spread colours around the hue wheel so individuals stay trackable in
// rendered output.
fn hue_colour(index: usize, count: usize) -> Rgb<u8> {
    let hue = index as f32 / count.max(1) as f32 * 360.0;
    let rgb = Hsl::from(hue.min(359.9), 70.0, 60.0).to_rgb();
    Rgb([
        rgb.get_red() as u8,
        rgb.get_green() as u8,
        rgb.get_blue() as u8,
    ])
}
