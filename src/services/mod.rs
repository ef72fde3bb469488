pub mod health;
pub mod metrics;

pub use health::{HealthServer, HealthState, HealthStatus};
pub use metrics::Metrics;
