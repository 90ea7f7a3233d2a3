use nalgebra::Vector3;

pub const EPSILON: f32 = 1.0e-6;

// Steering sums regularly cancel out to (near) zero and must never turn
// into NaN headings.
pub fn normalize_or_zero(v: Vector3<f32>) -> Vector3<f32> {
    let norm_sq = v.norm_squared();
    if norm_sq <= EPSILON {
        return Vector3::zeros();
    }
    v / norm_sq.sqrt()
}

// Unsigned angle in degrees; degenerate inputs count as zero.
pub fn angle_between_deg(a: &Vector3<f32>, b: &Vector3<f32>) -> f32 {
    let denom_sq = a.norm_squared() * b.norm_squared();
    if denom_sq <= EPSILON {
        return 0.0;
    }
    let cos = (a.dot(b) / denom_sq.sqrt()).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

// Critically-damped spring interpolation from `current` toward `target`.
// `velocity` is the filter memory carried between calls.
pub fn smooth_damp(
    current: Vector3<f32>,
    target: Vector3<f32>,
    velocity: &mut Vector3<f32>,
    smooth_time: f32,
    dt: f32,
) -> Vector3<f32> {
    let smooth_time = smooth_time.max(1.0e-4);
    let omega = 2.0 / smooth_time;
    let x = omega * dt;
    let decay = 1.0 / (1.0 + x + 0.48 * x * x + 0.235 * x * x * x);
    let change = current - target;
    let temp = (*velocity + change * omega) * dt;
    *velocity = (*velocity - temp * omega) * decay;
    target + (change + temp) * decay
}

// Orthonormal frame derived from a heading, with local +z mapped onto it.
#[derive(Clone, Copy, Debug)]
pub struct HeadingBasis {
    pub right: Vector3<f32>,
    pub up: Vector3<f32>,
    pub forward: Vector3<f32>,
}

impl HeadingBasis {
    pub fn from_forward(heading: &Vector3<f32>) -> Self {
        let mut forward = normalize_or_zero(*heading);
        if forward == Vector3::zeros() {
            forward = Vector3::z();
        }

        let mut up_ref = Vector3::y();
        if forward.dot(&up_ref).abs() > 0.97 {
            up_ref = Vector3::z();
        }

        let mut right = normalize_or_zero(up_ref.cross(&forward));
        if right == Vector3::zeros() {
            right = Vector3::x();
        }
        let up = normalize_or_zero(forward.cross(&right));

        Self { right, up, forward }
    }

    pub fn to_world(&self, local: &Vector3<f32>) -> Vector3<f32> {
        self.right * local.x + self.up * local.y + self.forward * local.z
    }
}
