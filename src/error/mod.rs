//! Error handling module for ToolRelay

mod error;

pub use error::{ErrorKind, RelayError, Result, ToolError, TransportError};
