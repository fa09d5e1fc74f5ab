//! Service management: the orchestrator and its status surface

pub mod orchestrator;
pub mod status;
pub mod types;

pub use orchestrator::Orchestrator;
pub use status::StatusBoard;
pub use types::{ServerStatus, ServiceState, StatusReport};
