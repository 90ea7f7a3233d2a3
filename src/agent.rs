use image::Rgb;
use nalgebra::{Point3, Vector3};

use crate::config::FlockConfig;
use crate::math::{self, HeadingBasis};
use crate::spatial::RayCaster;

// Neighbours read `position`, `forward`, and `speed`; everything else is
// private steering state touched only by the agent's own update.
#[derive(Debug, Clone, PartialEq)]
pub struct FlockAgent {
    pub position: Point3<f32>,
    forward: Vector3<f32>,
    smoothing: Vector3<f32>,
    speed: f32,
    remembered_escape: Option<Vector3<f32>>,
    pub colour: Rgb<u8>,
}

// `plan` computes, `apply` commits, so the driver keeps the roster readable
// while one agent's update is in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentStep {
    position: Point3<f32>,
    forward: Vector3<f32>,
    smoothing: Vector3<f32>,
    speed: f32,
    remembered_escape: Option<Vector3<f32>>,
}

#[derive(Debug, Default)]
struct Neighbourhood {
    cohesion: Vec<usize>,
    avoidance: Vec<usize>,
    alignment: Vec<usize>,
}

impl FlockAgent {
    pub fn new(position: Point3<f32>, forward: Vector3<f32>, speed: f32, colour: Rgb<u8>) -> Self {
        let mut forward = math::normalize_or_zero(forward);
        if forward == Vector3::zeros() {
            forward = Vector3::z();
        }
        Self {
            position,
            forward,
            smoothing: Vector3::zeros(),
            speed,
            remembered_escape: None,
            colour,
        }
    }

    pub fn forward(&self) -> Vector3<f32> {
        self.forward
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn plan(
        &self,
        index: usize,
        roster: &[FlockAgent],
        config: &FlockConfig,
        anchor: Point3<f32>,
        caster: &dyn RayCaster,
        dt: f32,
    ) -> AgentStep {
        let neighbours = self.find_neighbours(index, roster, config);
        let speed = self.average_speed(&neighbours.cohesion, roster, config);
        let (obstacle, remembered_escape) = self.obstacle_vector(caster, config);

        let move_vector = self.cohesion_vector(&neighbours.cohesion, roster, config)
            * config.cohesion_weight
            + self.avoidance_vector(&neighbours.avoidance, roster, config)
                * config.avoidance_weight
            + self.alignment_vector(&neighbours.alignment, roster, config)
                * config.alignment_weight
            + self.bounds_vector(anchor, config) * config.bounds_weight
            + obstacle * config.obstacle_weight;

        let mut smoothing = self.smoothing;
        let smoothed =
            math::smooth_damp(self.forward, move_vector, &mut smoothing, config.smooth_time, dt);

        let mut heading = math::normalize_or_zero(smoothed);
        if heading == Vector3::zeros() {
            // Smoothing cancelled out; keep the old heading rather than stall.
            heading = self.forward;
        }

        AgentStep {
            position: self.position + heading * speed * dt,
            forward: heading,
            smoothing,
            speed,
            remembered_escape,
        }
    }

    pub fn apply(&mut self, step: AgentStep) {
        self.position = step.position;
        self.forward = step.forward;
        self.smoothing = step.smoothing;
        self.speed = step.speed;
        self.remembered_escape = step.remembered_escape;
    }

    // Recomputed from scratch each tick; positions all move.
    fn find_neighbours(
        &self,
        index: usize,
        roster: &[FlockAgent],
        config: &FlockConfig,
    ) -> Neighbourhood {
        let cohesion_sq = config.cohesion_radius * config.cohesion_radius;
        let avoidance_sq = config.avoidance_radius * config.avoidance_radius;
        let alignment_sq = config.alignment_radius * config.alignment_radius;

        let mut neighbours = Neighbourhood::default();
        for (other_index, other) in roster.iter().enumerate() {
            if other_index == index {
                continue;
            }
            let distance_sq = (other.position - self.position).norm_squared();
            if distance_sq <= cohesion_sq {
                neighbours.cohesion.push(other_index);
            }
            if distance_sq <= avoidance_sq {
                neighbours.avoidance.push(other_index);
            }
            if distance_sq <= alignment_sq {
                neighbours.alignment.push(other_index);
            }
        }
        neighbours
    }

    // The FOV filter deliberately does not apply to the speed average.
    fn average_speed(&self, cohesion: &[usize], roster: &[FlockAgent], config: &FlockConfig) -> f32 {
        if cohesion.is_empty() {
            return self.speed;
        }
        let sum: f32 = cohesion.iter().map(|&j| roster[j].speed).sum();
        (sum / cohesion.len() as f32).clamp(config.min_speed, config.max_speed)
    }

    fn in_fov(&self, position: &Point3<f32>, config: &FlockConfig) -> bool {
        math::angle_between_deg(&self.forward, &(position - self.position))
            <= config.field_of_view_deg
    }

    fn cohesion_vector(
        &self,
        cohesion: &[usize],
        roster: &[FlockAgent],
        config: &FlockConfig,
    ) -> Vector3<f32> {
        let mut sum = Vector3::zeros();
        let mut visible = 0usize;
        for &j in cohesion {
            if self.in_fov(&roster[j].position, config) {
                visible += 1;
                sum += roster[j].position.coords;
            }
        }
        if visible == 0 {
            return Vector3::zeros();
        }
        let centre = sum / visible as f32;
        math::normalize_or_zero(centre - self.position.coords)
    }

    // An agent with nobody visible keeps flying straight, so the default is
    // its own heading.
    fn alignment_vector(
        &self,
        alignment: &[usize],
        roster: &[FlockAgent],
        config: &FlockConfig,
    ) -> Vector3<f32> {
        let mut sum = Vector3::zeros();
        let mut visible = 0usize;
        for &j in alignment {
            if self.in_fov(&roster[j].position, config) {
                visible += 1;
                sum += roster[j].forward;
            }
        }
        if visible == 0 {
            return self.forward;
        }
        math::normalize_or_zero(sum / visible as f32)
    }

    fn avoidance_vector(
        &self,
        avoidance: &[usize],
        roster: &[FlockAgent],
        config: &FlockConfig,
    ) -> Vector3<f32> {
        let mut sum = Vector3::zeros();
        let mut visible = 0usize;
        for &j in avoidance {
            if self.in_fov(&roster[j].position, config) {
                visible += 1;
                sum += self.position - roster[j].position;
            }
        }
        if visible == 0 {
            return Vector3::zeros();
        }
        math::normalize_or_zero(sum / visible as f32)
    }

    // Hard threshold at 90% of the bounds radius; agents well inside feel
    // nothing.
    fn bounds_vector(&self, anchor: Point3<f32>, config: &FlockConfig) -> Vector3<f32> {
        let offset = anchor - self.position;
        if offset.norm() >= config.bounds_radius * 0.9 {
            math::normalize_or_zero(offset)
        } else {
            Vector3::zeros()
        }
    }

    // A forward miss clears the remembered escape so stale directions cannot
    // linger.
    fn obstacle_vector(
        &self,
        caster: &dyn RayCaster,
        config: &FlockConfig,
    ) -> (Vector3<f32>, Option<Vector3<f32>>) {
        if config.obstacle_weight <= 0.0 || config.obstacle_probe_directions.is_empty() {
            return (Vector3::zeros(), self.remembered_escape);
        }
        match caster.cast(&self.position, &self.forward, config.obstacle_probe_distance) {
            Some(_) => self.find_escape_direction(caster, config),
            None => (Vector3::zeros(), None),
        }
    }

    // A remembered escape gets a cheap forward re-test first; while it holds,
    // the agent keeps steering the same way instead of flickering between
    // probe results. The full scan walks the probe list in order and takes
    // the first clear direction. When everything hits, the farthest hit
    // steers this tick but is not remembered; only a fully clear direction
    // is kept for later ticks.
    fn find_escape_direction(
        &self,
        caster: &dyn RayCaster,
        config: &FlockConfig,
    ) -> (Vector3<f32>, Option<Vector3<f32>>) {
        if let Some(remembered) = self.remembered_escape {
            if caster
                .cast(&self.position, &self.forward, config.obstacle_probe_distance)
                .is_none()
            {
                return (remembered, Some(remembered));
            }
        }

        let basis = HeadingBasis::from_forward(&self.forward);
        let mut best_distance_sq = f32::MIN;
        let mut farthest_hit = Vector3::zeros();
        for local in &config.obstacle_probe_directions {
            let direction = basis.to_world(&math::normalize_or_zero(*local));
            match caster.cast(&self.position, &direction, config.obstacle_probe_distance) {
                None => {
                    let escape = math::normalize_or_zero(direction);
                    return (escape, Some(escape));
                }
                Some(hit) => {
                    let hit_distance_sq = (hit - self.position).norm_squared();
                    if hit_distance_sq > best_distance_sq {
                        best_distance_sq = hit_distance_sq;
                        farthest_hit = direction;
                    }
                }
            }
        }
        (math::normalize_or_zero(farthest_hit), self.remembered_escape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::NoObstacles;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

    fn agent_at(x: f32, y: f32, z: f32) -> FlockAgent {
        FlockAgent::new(Point3::new(x, y, z), Vector3::z(), 3.0, WHITE)
    }

    fn test_config() -> FlockConfig {
        FlockConfig {
            cohesion_radius: 10.0,
            avoidance_radius: 10.0,
            alignment_radius: 10.0,
            field_of_view_deg: 120.0,
            min_speed: 1.0,
            max_speed: 5.0,
            ..FlockConfig::default()
        }
    }

    // Replays a scripted list of responses and counts calls. Responses run
    // out as misses.
    struct ScriptedCaster {
        responses: RefCell<VecDeque<Option<Point3<f32>>>>,
        calls: Cell<usize>,
    }

    impl ScriptedCaster {
        fn new(responses: Vec<Option<Point3<f32>>>) -> Self {
            Self {
                responses: RefCell::new(responses.into()),
                calls: Cell::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.get()
        }
    }

    impl RayCaster for ScriptedCaster {
        fn cast(
            &self,
            _: &Point3<f32>,
            _: &Vector3<f32>,
            _: f32,
        ) -> Option<Point3<f32>> {
            self.calls.set(self.calls.get() + 1);
            self.responses.borrow_mut().pop_front().unwrap_or(None)
        }
    }

    fn hit_at(x: f32, y: f32, z: f32) -> Option<Point3<f32>> {
        Some(Point3::new(x, y, z))
    }

    #[test]
    fn speed_is_unchanged_without_cohesion_neighbours() {
        let config = test_config();
        let agent = agent_at(0.0, 0.0, 0.0);
        let far = agent_at(100.0, 0.0, 0.0);
        let roster = vec![agent.clone(), far];
        assert_eq!(roster[0].average_speed(&[], &roster, &config), 3.0);
    }

    #[test]
    fn speed_averages_and_clamps_to_nearer_bound() {
        let config = test_config();
        let agent = agent_at(0.0, 0.0, 0.0);
        let mut fast_a = agent_at(1.0, 0.0, 0.0);
        let mut fast_b = agent_at(-1.0, 0.0, 0.0);
        fast_a.speed = 8.0;
        fast_b.speed = 10.0;
        let roster = vec![agent, fast_a, fast_b];
        // Mean of 9.0 lands above max_speed; expect exactly the bound.
        assert_eq!(roster[0].average_speed(&[1, 2], &roster, &config), 5.0);

        let mut slow = roster.clone();
        slow[1].speed = 0.2;
        slow[2].speed = 0.4;
        assert_eq!(slow[0].average_speed(&[1, 2], &slow, &config), 1.0);
    }

    #[test]
    fn cohesion_vector_is_zero_without_neighbours() {
        let config = test_config();
        let roster = vec![agent_at(0.0, 0.0, 0.0)];
        assert_eq!(
            roster[0].cohesion_vector(&[], &roster, &config),
            Vector3::zeros()
        );
    }

    #[test]
    fn cohesion_vector_points_at_visible_centroid() {
        let config = test_config();
        let roster = vec![
            agent_at(0.0, 0.0, 0.0),
            agent_at(2.0, 0.0, 4.0),
            agent_at(-2.0, 0.0, 4.0),
        ];
        let vector = roster[0].cohesion_vector(&[1, 2], &roster, &config);
        // Centroid sits straight ahead at (0, 0, 4).
        assert!((vector - Vector3::z()).norm() < 1.0e-5);
    }

    #[test]
    fn cohesion_vector_guards_when_no_neighbour_is_visible() {
        let config = test_config();
        // Neighbour inside the radius but directly behind the agent.
        let roster = vec![agent_at(0.0, 0.0, 0.0), agent_at(0.0, 0.0, -3.0)];
        assert_eq!(
            roster[0].cohesion_vector(&[1], &roster, &config),
            Vector3::zeros()
        );
    }

    #[test]
    fn alignment_vector_defaults_to_own_heading() {
        let config = test_config();
        let roster = vec![agent_at(0.0, 0.0, 0.0), agent_at(0.0, 0.0, -3.0)];
        // Empty set and invisible-neighbour set both fall back to forward.
        assert_eq!(roster[0].alignment_vector(&[], &roster, &config), Vector3::z());
        assert_eq!(roster[0].alignment_vector(&[1], &roster, &config), Vector3::z());
    }

    #[test]
    fn alignment_vector_averages_visible_headings() {
        let config = test_config();
        let mut left = agent_at(1.0, 0.0, 2.0);
        let mut right = agent_at(-1.0, 0.0, 2.0);
        left.forward = Vector3::x();
        right.forward = Vector3::z();
        let roster = vec![agent_at(0.0, 0.0, 0.0), left, right];
        let vector = roster[0].alignment_vector(&[1, 2], &roster, &config);
        let expected = Vector3::new(0.5, 0.0, 0.5).normalize();
        assert!((vector - expected).norm() < 1.0e-5);
    }

    #[test]
    fn avoidance_vector_is_zero_without_neighbours() {
        let config = test_config();
        let roster = vec![agent_at(0.0, 0.0, 0.0), agent_at(0.0, 0.0, -3.0)];
        assert_eq!(roster[0].avoidance_vector(&[], &roster, &config), Vector3::zeros());
        // Crowding neighbour behind the agent is out of view and ignored.
        assert_eq!(
            roster[0].avoidance_vector(&[1], &roster, &config),
            Vector3::zeros()
        );
    }

    #[test]
    fn avoidance_vector_points_away_from_visible_crowd() {
        let config = test_config();
        let roster = vec![agent_at(0.0, 0.0, 0.0), agent_at(1.0, 0.0, 1.0)];
        let vector = roster[0].avoidance_vector(&[1], &roster, &config);
        let expected = Vector3::new(-1.0, 0.0, -1.0).normalize();
        assert!((vector - expected).norm() < 1.0e-5);
    }

    #[test]
    fn bounds_vector_is_zero_at_the_anchor() {
        let config = test_config();
        let agent = agent_at(0.0, 0.0, 0.0);
        assert_eq!(agent.bounds_vector(Point3::origin(), &config), Vector3::zeros());
    }

    #[test]
    fn bounds_vector_activates_at_ninety_percent_of_radius() {
        let config = test_config(); // bounds_radius 30.0
        let inside = agent_at(20.0, 0.0, 0.0);
        assert_eq!(inside.bounds_vector(Point3::origin(), &config), Vector3::zeros());

        let near_edge = agent_at(27.5, 0.0, 0.0);
        let vector = near_edge.bounds_vector(Point3::origin(), &config);
        assert!((vector - -Vector3::x()).norm() < 1.0e-5);
    }

    #[test]
    fn obstacle_clear_path_resets_memory() {
        let config = test_config();
        let mut agent = agent_at(0.0, 0.0, 0.0);
        agent.remembered_escape = Some(Vector3::x());
        let caster = ScriptedCaster::new(vec![None]);
        let (vector, memory) = agent.obstacle_vector(&caster, &config);
        assert_eq!(vector, Vector3::zeros());
        assert_eq!(memory, None);
        assert_eq!(caster.calls(), 1);
    }

    #[test]
    fn obstacle_search_takes_first_clear_probe_and_remembers_it() {
        let config = test_config();
        let agent = agent_at(0.0, 0.0, 0.0);
        // Entry probe hits, first listed probe hits, second is clear.
        let caster = ScriptedCaster::new(vec![
            hit_at(0.0, 0.0, 2.0),
            hit_at(1.0, 0.0, 1.0),
            None,
        ]);
        let (vector, memory) = agent.obstacle_vector(&caster, &config);
        // Forward is +z, so local probes transform onto themselves.
        let expected = Vector3::new(-1.0, 0.0, 1.0).normalize();
        assert!((vector - expected).norm() < 1.0e-5);
        assert_eq!(memory, Some(vector));
        assert_eq!(caster.calls(), 3);
    }

    #[test]
    fn obstacle_hysteresis_returns_remembered_direction_without_rescanning() {
        let config = test_config();
        let mut agent = agent_at(0.0, 0.0, 0.0);

        // First blocked tick establishes a remembered escape.
        let first = ScriptedCaster::new(vec![hit_at(0.0, 0.0, 2.0), hit_at(1.0, 0.0, 1.0), None]);
        let (first_vector, memory) = agent.obstacle_vector(&first, &config);
        agent.remembered_escape = memory;

        // Next tick: entry probe still reports a hit, the cheap re-test comes
        // back clear, and the remembered direction is reused as-is.
        let second = ScriptedCaster::new(vec![hit_at(0.0, 0.0, 2.0), None]);
        let (second_vector, second_memory) = agent.obstacle_vector(&second, &config);
        assert_eq!(second_vector, first_vector);
        assert_eq!(second_memory, Some(first_vector));
        // Entry probe plus re-test only; the probe list was never scanned.
        assert_eq!(second.calls(), 2);
    }

    #[test]
    fn obstacle_search_falls_back_to_farthest_hit_without_remembering() {
        let config = test_config();
        let agent = agent_at(0.0, 0.0, 0.0);
        // Entry hit, then all four probes hit at different ranges; the
        // second probe's hit is farthest.
        let caster = ScriptedCaster::new(vec![
            hit_at(0.0, 0.0, 1.0),
            hit_at(1.0, 0.0, 1.0),
            hit_at(-2.0, 0.0, 2.0),
            hit_at(0.0, 1.0, 1.0),
            hit_at(0.0, -0.5, 0.5),
        ]);
        let (vector, memory) = agent.obstacle_vector(&caster, &config);
        let expected = Vector3::new(-1.0, 0.0, 1.0).normalize();
        assert!((vector - expected).norm() < 1.0e-5);
        // A blocked-everywhere scan leaves the remembered state untouched.
        assert_eq!(memory, None);
        assert_eq!(caster.calls(), 5);
    }

    #[test]
    fn obstacle_casting_is_skipped_when_weight_is_zero() {
        let config = FlockConfig {
            obstacle_weight: 0.0,
            ..test_config()
        };
        let agent = agent_at(0.0, 0.0, 0.0);
        let caster = ScriptedCaster::new(vec![hit_at(0.0, 0.0, 1.0)]);
        let (vector, _) = agent.obstacle_vector(&caster, &config);
        assert_eq!(vector, Vector3::zeros());
        assert_eq!(caster.calls(), 0);
    }

    #[test]
    fn plan_keeps_heading_when_steering_cancels_out() {
        // All weights zero and no obstacles: the move vector is zero and the
        // agent must hold its old course at full speed instead of stalling.
        let config = FlockConfig {
            cohesion_weight: 0.0,
            avoidance_weight: 0.0,
            alignment_weight: 0.0,
            bounds_weight: 0.0,
            obstacle_weight: 0.0,
            ..test_config()
        };
        let roster = vec![agent_at(0.0, 0.0, 0.0)];
        let mut agent = roster[0].clone();
        let step = agent.plan(0, &roster, &config, Point3::origin(), &NoObstacles, 0.02);
        agent.apply(step);
        assert!((agent.forward() - Vector3::z()).norm() < 1.0e-4);
        assert!((agent.position.z - 3.0 * 0.02).abs() < 1.0e-4);
        assert_eq!(agent.speed(), 3.0);
    }
}
