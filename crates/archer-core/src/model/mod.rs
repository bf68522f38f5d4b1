// ── Domain model ──
//
// Rows the agent reconciles. Statuses are stored as their
// SCREAMING_SNAKE_CASE names.

pub mod agent;
pub mod endpoint;
pub mod service;

pub use agent::AgentRegistration;
pub use endpoint::{Endpoint, EndpointPort, EndpointStatus};
pub use service::{Service, ServiceStatus};

/// Provider value of rows this agent kind owns.
pub const PROVIDER_TENANT: &str = "tenant";
