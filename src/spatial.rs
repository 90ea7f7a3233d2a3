use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::math;

// Nearest intersection with the obstacle geometry within max_distance, or
// None. Which geometry counts as an obstacle is up to the implementation.
pub trait RayCaster {
    fn cast(
        &self,
        origin: &Point3<f32>,
        direction: &Vector3<f32>,
        max_distance: f32,
    ) -> Option<Point3<f32>>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoObstacles;

impl RayCaster for NoObstacles {
    fn cast(&self, _: &Point3<f32>, _: &Vector3<f32>, _: f32) -> Option<Point3<f32>> {
        None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    pub centre: Point3<f32>,
    pub radius: f32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SphereField {
    spheres: Vec<Sphere>,
}

impl SphereField {
    pub fn new(spheres: Vec<Sphere>) -> Self {
        Self { spheres }
    }

    pub fn push(&mut self, sphere: Sphere) {
        self.spheres.push(sphere);
    }

    pub fn spheres(&self) -> &[Sphere] {
        &self.spheres
    }
}

impl RayCaster for SphereField {
    fn cast(
        &self,
        origin: &Point3<f32>,
        direction: &Vector3<f32>,
        max_distance: f32,
    ) -> Option<Point3<f32>> {
        let direction = math::normalize_or_zero(*direction);
        if direction == Vector3::zeros() {
            return None;
        }

        let mut nearest: Option<f32> = None;
        for sphere in &self.spheres {
            if let Some(t) = ray_sphere_distance(origin, &direction, sphere) {
                if t <= max_distance && nearest.is_none_or(|n| t < n) {
                    nearest = Some(t);
                }
            }
        }
        nearest.map(|t| origin + direction * t)
    }
}

// An origin inside the sphere reports the exit point.
fn ray_sphere_distance(origin: &Point3<f32>, direction: &Vector3<f32>, sphere: &Sphere) -> Option<f32> {
    let to_centre = sphere.centre - origin;
    let along = to_centre.dot(direction);
    let closest_sq = to_centre.norm_squared() - along * along;
    let radius_sq = sphere.radius * sphere.radius;
    if closest_sq > radius_sq {
        return None;
    }
    let half_chord = (radius_sq - closest_sq).sqrt();
    let entry = along - half_chord;
    let t = if entry >= 0.0 { entry } else { along + half_chord };
    (t >= 0.0).then_some(t)
}
