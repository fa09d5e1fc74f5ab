//! Slash-command parsing
//!
//! Commands are recognised without any LLM call. `/tools ...` is built in;
//! every other prefix comes from the configured command routes.

use crate::config::CommandRouteConfig;
use serde_json::{Map, Value};

/// Prefix of the built-in commands
pub const BUILTIN_PREFIX: &str = "/tools";

/// A recognised command
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedCommand {
    /// `/tools status`
    Status,
    /// `/tools help` (also any unknown `/tools` subcommand)
    Help,
    /// `/tools functions [server]`
    Functions { server: Option<String> },
    /// A configured route resolved to a function call
    Call { function: String, arguments: Value },
    /// Starts with '/' but matches nothing
    Unknown { prefix: String },
}

/// Matches text against the built-in commands and the configured routes
#[derive(Debug, Clone, Default)]
pub struct CommandParser {
    routes: Vec<CommandRouteConfig>,
}

impl CommandParser {
    pub fn new(routes: Vec<CommandRouteConfig>) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &[CommandRouteConfig] {
        &self.routes
    }

    /// `None` when the text is not a command at all
    pub fn parse(&self, text: &str) -> Option<ParsedCommand> {
        let text = text.trim();
        if !text.starts_with('/') {
            return None;
        }

        let (head, rest) = split_first_token(text);
        let prefix = head.to_lowercase();

        if prefix == BUILTIN_PREFIX {
            return Some(parse_builtin(rest));
        }

        let command = match self.routes.iter().find(|r| r.prefix.to_lowercase() == prefix) {
            Some(route) => ParsedCommand::Call {
                function: route.function.clone(),
                arguments: bind_arguments(route, rest),
            },
            None => ParsedCommand::Unknown { prefix: head.to_string() },
        };
        Some(command)
    }
}

fn parse_builtin(rest: &str) -> ParsedCommand {
    let (sub, rest) = split_first_token(rest);
    match sub.to_lowercase().as_str() {
        "status" => ParsedCommand::Status,
        "functions" | "list" => {
            let (server, _) = split_first_token(rest);
            ParsedCommand::Functions {
                server: (!server.is_empty()).then(|| server.to_string()),
            }
        }
        _ => ParsedCommand::Help,
    }
}

/// Positional arguments in order; the last one takes the rest of the line.
/// Fixed arguments are applied last and cannot be overridden from the line.
fn bind_arguments(route: &CommandRouteConfig, mut rest: &str) -> Value {
    let mut arguments = Map::new();

    let count = route.arguments.len();
    for (index, name) in route.arguments.iter().enumerate() {
        let value = if index + 1 == count {
            let remainder = rest.trim();
            rest = "";
            remainder
        } else {
            let (token, tail) = split_first_token(rest);
            rest = tail;
            token
        };
        if value.is_empty() {
            break;
        }
        arguments.insert(name.clone(), Value::String(value.to_string()));
    }

    for (name, value) in &route.fixed_arguments {
        arguments.insert(name.clone(), value.clone());
    }

    Value::Object(arguments)
}

fn split_first_token(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.find(char::is_whitespace) {
        Some(at) => (&text[..at], text[at..].trim_start()),
        None => (text, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn route(prefix: &str, function: &str, arguments: &[&str]) -> CommandRouteConfig {
        CommandRouteConfig {
            prefix: prefix.to_string(),
            function: function.to_string(),
            arguments: arguments.iter().map(|a| a.to_string()).collect(),
            fixed_arguments: Map::new(),
            description: None,
        }
    }

    fn parser() -> CommandParser {
        CommandParser::new(vec![
            route("/db", "data__execute", &["query"]),
            route("/docs", "docs__search", &["library", "topic"]),
        ])
    }

    #[test]
    fn test_free_text_is_not_a_command() {
        assert_eq!(parser().parse("how many users signed up?"), None);
    }

    #[test]
    fn test_builtin_commands() {
        let parser = parser();
        assert_eq!(parser.parse("/tools status"), Some(ParsedCommand::Status));
        assert_eq!(parser.parse("/tools"), Some(ParsedCommand::Help));
        assert_eq!(parser.parse("/TOOLS whatever"), Some(ParsedCommand::Help));
        assert_eq!(
            parser.parse("/tools functions data"),
            Some(ParsedCommand::Functions { server: Some("data".to_string()) })
        );
        assert_eq!(parser.parse("/tools functions"), Some(ParsedCommand::Functions { server: None }));
    }

    #[test]
    fn test_last_argument_absorbs_remainder() {
        let parsed = parser().parse("/db  select * from users where id = 1").unwrap();
        assert_eq!(
            parsed,
            ParsedCommand::Call {
                function: "data__execute".to_string(),
                arguments: json!({"query": "select * from users where id = 1"}),
            }
        );

        let parsed = parser().parse("/docs tokio how do I spawn a task").unwrap();
        assert_eq!(
            parsed,
            ParsedCommand::Call {
                function: "docs__search".to_string(),
                arguments: json!({"library": "tokio", "topic": "how do I spawn a task"}),
            }
        );
    }

    #[test]
    fn test_missing_arguments_are_omitted() {
        let parsed = parser().parse("/docs").unwrap();
        assert_eq!(
            parsed,
            ParsedCommand::Call {
                function: "docs__search".to_string(),
                arguments: json!({}),
            }
        );
    }

    #[test]
    fn test_fixed_arguments_win() {
        let mut r = route("/sql", "data__execute", &["query"]);
        r.fixed_arguments.insert("project".to_string(), json!("prod"));
        let parser = CommandParser::new(vec![r]);
        let parsed = parser.parse("/sql select 1").unwrap();
        assert_eq!(
            parsed,
            ParsedCommand::Call {
                function: "data__execute".to_string(),
                arguments: json!({"query": "select 1", "project": "prod"}),
            }
        );
    }

    #[test]
    fn test_unknown_prefix() {
        assert_eq!(
            parser().parse("/deploy now"),
            Some(ParsedCommand::Unknown { prefix: "/deploy".to_string() })
        );
    }
}
