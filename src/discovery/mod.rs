//! AI function-calling bridge: command parsing, LLM tool selection and replies

pub mod bridge;
pub mod commands;
pub mod formatter;

pub use bridge::{AiBridge, CandidateCall, Intent, Interpretation, Reply, DEFAULT_SYSTEM_PROMPT};
pub use commands::{CommandParser, ParsedCommand, BUILTIN_PREFIX};
pub use formatter::{
    format_execution_result, format_functions, format_help, format_status, result_text,
    LLM_UNAVAILABLE_REPLY, NO_PROVIDER_REPLY,
};
