//! Routing module for directing function calls to tool servers

pub mod cache;
pub mod retry;
pub mod router;
pub mod types;

pub use cache::{CacheEntry, CacheStats, ResultCache};
pub use retry::{should_retry_error, RetryPolicy};
pub use router::DispatchRouter;
pub use types::ExecutionResult;
