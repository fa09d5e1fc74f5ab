//! Security: permission gate and destructive-keyword guard

pub mod guard;
pub mod permissions;

pub use guard::KeywordGuard;
pub use permissions::{Identity, PermissionDecision, PermissionGate, ANY_SERVER};
