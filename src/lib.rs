pub mod agent;
pub mod config;
pub mod flock;
pub mod math;
pub mod spatial;

pub use agent::{AgentStep, FlockAgent};
pub use config::{ConfigError, FlockConfig};
pub use flock::{Flock, SpawnSettings};
pub use spatial::{NoObstacles, RayCaster, Sphere, SphereField};
