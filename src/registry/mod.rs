//! Server registry and function catalog

pub mod catalog;
pub mod service;
pub mod types;

pub use catalog::build_catalog;
pub use service::ServerRegistry;
pub use types::*;
