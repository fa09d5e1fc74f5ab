//! AI function-calling bridge
//!
//! Turns inbound text into at most one function call and the call's result
//! into a reply. Commands are parsed deterministically; free text goes to the
//! configured LLM together with the functions the identity may call. A failed
//! or denied call never fails the conversation: the bridge falls back to a
//! plain answer without tools.

use crate::config::Config;
use crate::discovery::commands::{CommandParser, ParsedCommand};
use crate::discovery::formatter::{
    format_execution_result, format_functions, format_help, format_status, result_text,
    LLM_UNAVAILABLE_REPLY, NO_PROVIDER_REPLY,
};
use crate::error::Result;
use crate::llm::{ChatMessage, Completion, CompletionRequest, LlmProvider};
use crate::registry::FunctionDescriptor;
use crate::routing::{DispatchRouter, ExecutionResult};
use crate::security::Identity;
use crate::services::StatusBoard;
use arc_swap::ArcSwap;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// System prompt when the config sets none
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an operations assistant with access to tool servers. \
If one of the provided functions answers the request, call exactly one of them; otherwise answer directly and briefly.";

/// A function call the bridge intends to make
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateCall {
    /// Exposed `server__function` name
    pub function: String,
    pub arguments: Value,
    /// Provider's id for the call, echoed back with the result
    pub call_id: String,
}

/// What the inbound text asks for
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// A slash command, parsed without the LLM
    Command(ParsedCommand),
    /// The LLM chose a function
    FunctionCall(CandidateCall),
    /// The LLM answered directly
    Answer(String),
    /// Free text but no LLM is configured
    Unsupported,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Interpretation {
    pub intent: Intent,
}

impl Interpretation {
    pub fn is_tool_intent(&self) -> bool {
        self.candidate_call().is_some()
    }

    /// The call this text resolves to, from a command route or the LLM
    pub fn candidate_call(&self) -> Option<CandidateCall> {
        match &self.intent {
            Intent::FunctionCall(call) => Some(call.clone()),
            Intent::Command(ParsedCommand::Call { function, arguments }) => Some(CandidateCall {
                function: function.clone(),
                arguments: arguments.clone(),
                call_id: Uuid::new_v4().to_string(),
            }),
            _ => None,
        }
    }
}

/// Reply to one inbound message
#[derive(Debug, Clone)]
pub struct Reply {
    pub text: String,
    pub tool_result: Option<ExecutionResult>,
    /// The plain-answer fallback was used
    pub used_fallback: bool,
}

impl Reply {
    fn text<S: Into<String>>(text: S) -> Self {
        Self {
            text: text.into(),
            tool_result: None,
            used_fallback: false,
        }
    }
}

struct BridgeSettings {
    commands: CommandParser,
    system_prompt: String,
}

impl BridgeSettings {
    fn from_config(config: &Config) -> Self {
        Self {
            commands: CommandParser::new(config.commands.clone()),
            system_prompt: config
                .llm
                .as_ref()
                .and_then(|llm| llm.system_prompt.clone())
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        }
    }
}

/// Natural language and commands in, replies out
pub struct AiBridge {
    router: Arc<DispatchRouter>,
    status: Arc<StatusBoard>,
    provider: Option<Arc<dyn LlmProvider>>,
    settings: ArcSwap<BridgeSettings>,
}

impl AiBridge {
    pub fn new(
        config: &Config,
        router: Arc<DispatchRouter>,
        status: Arc<StatusBoard>,
        provider: Option<Arc<dyn LlmProvider>>,
    ) -> Self {
        Self {
            router,
            status,
            provider,
            settings: ArcSwap::from_pointee(BridgeSettings::from_config(config)),
        }
    }

    /// Pick up new command routes and system prompt
    pub fn reload(&self, config: &Config) {
        self.settings.store(Arc::new(BridgeSettings::from_config(config)));
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    /// Classify the text. Commands never reach the LLM.
    pub async fn interpret(&self, text: &str, identity: &Identity) -> Result<Interpretation> {
        let settings = self.settings.load();
        if let Some(command) = settings.commands.parse(text) {
            debug!("[BRIDGE] Parsed command: {:?}", command);
            return Ok(Interpretation {
                intent: Intent::Command(command),
            });
        }

        let Some(provider) = &self.provider else {
            return Ok(Interpretation {
                intent: Intent::Unsupported,
            });
        };

        let tools = self.callable_functions(identity).await;
        let request = CompletionRequest::new(Some(settings.system_prompt.clone()), vec![ChatMessage::user(text)])
            .with_tools(tools);

        let intent = match provider.complete(&request).await? {
            Completion::Text(answer) => Intent::Answer(answer),
            Completion::FunctionCall { id, name, arguments } => {
                info!("🤖 [BRIDGE] Model selected {}", name);
                Intent::FunctionCall(CandidateCall {
                    function: name,
                    arguments,
                    call_id: if id.is_empty() { Uuid::new_v4().to_string() } else { id },
                })
            }
        };
        Ok(Interpretation { intent })
    }

    /// Produce a reply. Never fails.
    pub async fn handle(&self, text: &str, identity: &Identity) -> Reply {
        let interpretation = match self.interpret(text, identity).await {
            Ok(interpretation) => interpretation,
            Err(e) => {
                warn!("⚠️ [BRIDGE] Interpretation failed: {}", e);
                return Reply {
                    text: LLM_UNAVAILABLE_REPLY.to_string(),
                    tool_result: None,
                    used_fallback: true,
                };
            }
        };

        match interpretation.intent {
            Intent::Command(command) => self.run_command(command, identity).await,
            Intent::Unsupported => Reply::text(NO_PROVIDER_REPLY),
            Intent::Answer(answer) => Reply::text(answer),
            Intent::FunctionCall(call) => self.run_function_call(text, call, identity).await,
        }
    }

    /// Functions the identity may call, as offered to the model
    pub async fn callable_functions(&self, identity: &Identity) -> Vec<FunctionDescriptor> {
        let allowed = self
            .router
            .permissions()
            .resolve(identity, &self.router.registry());
        if allowed.is_empty() {
            return Vec::new();
        }

        match self.router.supervisor().list_functions(None).await {
            Ok(functions) => functions
                .into_iter()
                .filter(|f| allowed.get(&f.server).map(|c| c.contains(&f.class)).unwrap_or(false))
                .collect(),
            Err(e) => {
                warn!("⚠️ [BRIDGE] Listing functions failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn run_command(&self, command: ParsedCommand, identity: &Identity) -> Reply {
        match command {
            ParsedCommand::Status => Reply::text(format_status(&self.status.report().await)),
            ParsedCommand::Help => Reply::text(format_help(self.settings.load().commands.routes())),
            ParsedCommand::Functions { server } => {
                let functions: Vec<FunctionDescriptor> = self
                    .callable_functions(identity)
                    .await
                    .into_iter()
                    .filter(|f| server.as_deref().map(|s| f.server == s).unwrap_or(true))
                    .collect();
                Reply::text(format_functions(&functions))
            }
            ParsedCommand::Call { function, arguments } => {
                let result = self.router.execute_qualified(identity, &function, arguments, true).await;
                Reply {
                    text: format_execution_result(&result),
                    tool_result: Some(result),
                    used_fallback: false,
                }
            }
            ParsedCommand::Unknown { prefix } => Reply::text(format!(
                "Unknown command {}.\n{}",
                prefix,
                format_help(self.settings.load().commands.routes())
            )),
        }
    }

    async fn run_function_call(&self, text: &str, call: CandidateCall, identity: &Identity) -> Reply {
        let result = self
            .router
            .execute_qualified(identity, &call.function, call.arguments.clone(), true)
            .await;

        if !result.success {
            info!(
                "[BRIDGE] {} did not succeed ({}), answering without tools",
                call.function,
                result.error.as_ref().map(|e| e.to_string()).unwrap_or_default()
            );
            let text = self.plain_answer(text).await;
            return Reply {
                text,
                tool_result: Some(result),
                used_fallback: true,
            };
        }

        let content = result.data.as_ref().map(result_text).unwrap_or_default();
        let settings = self.settings.load();
        // some providers reject tool turns in a request that declares no tools
        let called: Vec<FunctionDescriptor> = self
            .callable_functions(identity)
            .await
            .into_iter()
            .filter(|f| f.qualified_name() == call.function)
            .collect();
        let request = CompletionRequest::new(
            Some(settings.system_prompt.clone()),
            vec![
                ChatMessage::user(text),
                ChatMessage::FunctionCall {
                    id: call.call_id.clone(),
                    name: call.function.clone(),
                    arguments: call.arguments.clone(),
                },
                ChatMessage::FunctionResult {
                    id: call.call_id,
                    name: call.function,
                    content,
                },
            ],
        )
        .with_tools(called);

        let text = match self.complete_text(&request).await {
            Some(answer) => answer,
            None => format_execution_result(&result),
        };
        Reply {
            text,
            tool_result: Some(result),
            used_fallback: false,
        }
    }

    /// Same model, no tools
    async fn plain_answer(&self, text: &str) -> String {
        let settings = self.settings.load();
        let request = CompletionRequest::new(Some(settings.system_prompt.clone()), vec![ChatMessage::user(text)]);
        self.complete_text(&request)
            .await
            .unwrap_or_else(|| LLM_UNAVAILABLE_REPLY.to_string())
    }

    async fn complete_text(&self, request: &CompletionRequest) -> Option<String> {
        let provider = self.provider.as_ref()?;
        match provider.complete(request).await {
            Ok(Completion::Text(answer)) => Some(answer),
            Ok(Completion::FunctionCall { name, .. }) => {
                // one call per message; a follow-up call is not made
                warn!("⚠️ [BRIDGE] Model asked for a second call ({}), ignoring", name);
                None
            }
            Err(e) => {
                warn!("⚠️ [BRIDGE] Completion failed: {}", e);
                None
            }
        }
    }
}
