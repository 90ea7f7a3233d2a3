use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Weights of zero disable the matching behaviour, so the same core covers
// flocks with and without obstacle avoidance or containment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlockConfig {
    pub cohesion_radius: f32,
    pub avoidance_radius: f32,
    pub alignment_radius: f32,
    pub cohesion_weight: f32,
    pub avoidance_weight: f32,
    pub alignment_weight: f32,
    pub bounds_weight: f32,
    pub obstacle_weight: f32,
    pub bounds_radius: f32,
    // Symmetric view cone around the forward vector, in degrees.
    pub field_of_view_deg: f32,
    pub obstacle_probe_distance: f32,
    // Local-space directions tried when searching for a way around an
    // obstacle. Scan order is the tie-break, so order matters.
    pub obstacle_probe_directions: Vec<Vector3<f32>>,
    pub smooth_time: f32,
    pub min_speed: f32,
    pub max_speed: f32,
}

impl Default for FlockConfig {
    fn default() -> Self {
        Self {
            cohesion_radius: 4.0,
            avoidance_radius: 1.5,
            alignment_radius: 4.0,
            cohesion_weight: 2.0,
            avoidance_weight: 5.0,
            alignment_weight: 3.0,
            bounds_weight: 1.0,
            obstacle_weight: 10.0,
            bounds_radius: 30.0,
            field_of_view_deg: 120.0,
            obstacle_probe_distance: 5.0,
            obstacle_probe_directions: vec![
                Vector3::new(1.0, 0.0, 1.0),
                Vector3::new(-1.0, 0.0, 1.0),
                Vector3::new(0.0, 1.0, 1.0),
                Vector3::new(0.0, -1.0, 1.0),
            ],
            smooth_time: 0.5,
            min_speed: 2.0,
            max_speed: 5.0,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be finite and non-negative")]
    InvalidRadius(&'static str),
    #[error("{0} must be finite and non-negative")]
    InvalidWeight(&'static str),
    #[error("min_speed and max_speed must be finite, non-negative, and ordered")]
    InvalidSpeedRange,
    #[error("field_of_view_deg must be finite and within [0, 360]")]
    InvalidFieldOfView,
    #[error("smooth_time must be finite and positive")]
    InvalidSmoothTime,
    #[error("obstacle_probe_distance must be finite and non-negative")]
    InvalidProbeDistance,
    #[error("obstacle_probe_directions[{0}] must be finite and non-zero")]
    DegenerateProbeDirection(usize),
}

impl FlockConfig {
    // The hot loop assumes a validated config and never re-checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let radii = [
            ("cohesion_radius", self.cohesion_radius),
            ("avoidance_radius", self.avoidance_radius),
            ("alignment_radius", self.alignment_radius),
            ("bounds_radius", self.bounds_radius),
        ];
        for (name, value) in radii {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::InvalidRadius(name));
            }
        }

        let weights = [
            ("cohesion_weight", self.cohesion_weight),
            ("avoidance_weight", self.avoidance_weight),
            ("alignment_weight", self.alignment_weight),
            ("bounds_weight", self.bounds_weight),
            ("obstacle_weight", self.obstacle_weight),
        ];
        for (name, value) in weights {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::InvalidWeight(name));
            }
        }

        if !(self.min_speed.is_finite()
            && self.max_speed.is_finite()
            && self.min_speed >= 0.0
            && self.min_speed <= self.max_speed)
        {
            return Err(ConfigError::InvalidSpeedRange);
        }
        if !(self.field_of_view_deg.is_finite() && (0.0..=360.0).contains(&self.field_of_view_deg))
        {
            return Err(ConfigError::InvalidFieldOfView);
        }
        if !(self.smooth_time.is_finite() && self.smooth_time > 0.0) {
            return Err(ConfigError::InvalidSmoothTime);
        }
        if !(self.obstacle_probe_distance.is_finite() && self.obstacle_probe_distance >= 0.0) {
            return Err(ConfigError::InvalidProbeDistance);
        }
        for (index, direction) in self.obstacle_probe_directions.iter().enumerate() {
            if !(direction.iter().all(|c| c.is_finite())
                && direction.norm_squared() > crate::math::EPSILON)
            {
                return Err(ConfigError::DegenerateProbeDirection(index));
            }
        }
        Ok(())
    }
}
