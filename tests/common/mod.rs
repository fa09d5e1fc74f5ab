//! Shared test doubles: an in-memory tool server and a scripted LLM

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use toolrelay::config::Config;
use toolrelay::error::{RelayError, Result, TransportError};
use toolrelay::llm::{Completion, CompletionRequest, LlmProvider};
use toolrelay::mcp::{ToolTransport, TransportFactory};
use toolrelay::registry::{RemoteFunction, ServerDescriptor, TransportKind};
use toolrelay::security::Identity;
use toolrelay::services::Orchestrator;

pub const TEST_CONFIG: &str = r#"
manager:
  health_check_interval: 0
  max_consecutive_failures: 3
  retry_delay_ms: 10
  max_retry_delay_ms: 20
servers:
  - name: data
    display_name: Data
    api_url: http://data.invalid/rpc
    require_api_key: false
    permissions: [read, write, admin, search]
    timeout: 5
    retry_budget: 2
    cache_ttl: 300
    functions:
      - { name: execute, class: write, cacheable: false, query_parameter: query }
      - { name: listProjects, class: read, cacheable: true }
      - { name: listTables, class: read, cacheable: true }
  - name: docs
    command: docs-server
    permissions: [search]
    functions:
      - { name: search, class: search, cacheable: true }
permissions:
  roles:
    admin:
      "*": [read, write, admin, search]
  identities:
    - { id: "1001", username: alice, role: admin }
commands:
  - { prefix: /db, function: data__execute, arguments: [query] }
  - { prefix: /docs, function: docs__search, arguments: [library, topic] }
"#;

/// Identity granted everything through the `admin` role
pub fn admin() -> Identity {
    Identity::new("1001")
}

/// Identity with no role
pub fn guest() -> Identity {
    Identity::new("42")
}

/// Scriptable in-memory tool server, shared by every transport built for it
#[derive(Default)]
pub struct MockBackend {
    pub connects: AtomicUsize,
    pub lists: AtomicUsize,
    pub calls: AtomicUsize,
    pub pings: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub fail_connect: AtomicBool,
    pub fail_ping: AtomicBool,
    functions: Mutex<Vec<RemoteFunction>>,
    responses: Mutex<HashMap<String, Value>>,
    call_failures: Mutex<VecDeque<TransportError>>,
    list_failures: Mutex<VecDeque<TransportError>>,
    call_delay: Mutex<Option<Duration>>,
}

impl MockBackend {
    pub fn set_functions(&self, functions: Vec<RemoteFunction>) {
        *self.functions.lock().unwrap() = functions;
    }

    pub fn set_response(&self, function: &str, value: Value) {
        self.responses.lock().unwrap().insert(function.to_string(), value);
    }

    /// Fail the next calls with these errors, in order
    pub fn push_call_failure(&self, error: TransportError) {
        self.call_failures.lock().unwrap().push_back(error);
    }

    /// Fail the next function listings with these errors, in order
    pub fn push_list_failure(&self, error: TransportError) {
        self.list_failures.lock().unwrap().push_back(error);
    }

    pub fn set_call_delay(&self, delay: Duration) {
        *self.call_delay.lock().unwrap() = Some(delay);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn lists(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

pub struct MockTransport {
    backend: Arc<MockBackend>,
    kind: TransportKind,
}

#[async_trait]
impl ToolTransport for MockTransport {
    async fn connect(&self) -> std::result::Result<(), TransportError> {
        self.backend.connects.fetch_add(1, Ordering::SeqCst);
        if self.backend.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Refused("connection refused".to_string()));
        }
        Ok(())
    }

    async fn list_functions(&self) -> std::result::Result<Vec<RemoteFunction>, TransportError> {
        self.backend.lists.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.backend.list_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(self.backend.functions.lock().unwrap().clone())
    }

    async fn call(&self, function: &str, _arguments: Value) -> std::result::Result<Value, TransportError> {
        self.backend.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.backend.call_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.backend.call_failures.lock().unwrap().pop_front();
        if let Some(error) = failure {
            return Err(error);
        }

        let response = self.backend.responses.lock().unwrap().get(function).cloned();
        Ok(response.unwrap_or_else(|| json!({"content": [{"type": "text", "text": format!("{} ok", function)}]})))
    }

    async fn ping(&self) -> std::result::Result<(), TransportError> {
        self.backend.pings.fetch_add(1, Ordering::SeqCst);
        if self.backend.fail_ping.load(Ordering::SeqCst) {
            return Err(TransportError::Refused("ping refused".to_string()));
        }
        Ok(())
    }

    async fn disconnect(&self) {
        self.backend.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    fn kind(&self) -> TransportKind {
        self.kind
    }
}

/// Hands out transports backed by one [`MockBackend`] per server name
#[derive(Default)]
pub struct MockFactory {
    backends: Mutex<HashMap<String, Arc<MockBackend>>>,
}

impl MockFactory {
    pub fn backend(&self, server: &str) -> Arc<MockBackend> {
        let mut backends = self.backends.lock().unwrap();
        Arc::clone(backends.entry(server.to_string()).or_default())
    }
}

impl TransportFactory for MockFactory {
    fn create(&self, server: &ServerDescriptor) -> Result<Box<dyn ToolTransport>> {
        Ok(Box::new(MockTransport {
            backend: self.backend(&server.name),
            kind: server.transport,
        }))
    }
}

/// Provider returning canned completions and recording every request
#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<Completion>>>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<Completion>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, index: usize) -> CompletionRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        self.requests.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(RelayError::llm("script exhausted")))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Functions the `data` and `docs` mock servers list
pub fn seed_backends(factory: &MockFactory) {
    factory.backend("data").set_functions(vec![
        RemoteFunction::new(
            "execute",
            json!({
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"]
            }),
        )
        .with_description("Run a SQL statement"),
        RemoteFunction::new("listProjects", json!({"type": "object", "properties": {}}))
            .with_description("List projects"),
        RemoteFunction::new("listTables", json!({"type": "object", "properties": {}})),
    ]);
    factory.backend("docs").set_functions(vec![RemoteFunction::new(
        "search",
        json!({
            "type": "object",
            "properties": {"library": {"type": "string"}, "topic": {"type": "string"}},
            "required": ["library"]
        }),
    )]);
}

pub fn test_config() -> Config {
    let config = Config::from_yaml(TEST_CONFIG).unwrap();
    config.validate().unwrap();
    config
}

/// Orchestrator over mock backends, not yet started
pub async fn build_orchestrator(provider: Option<Arc<dyn LlmProvider>>) -> (Orchestrator, Arc<MockFactory>) {
    let factory = Arc::new(MockFactory::default());
    seed_backends(&factory);
    let orchestrator = Orchestrator::new(test_config(), Arc::clone(&factory) as Arc<dyn TransportFactory>, provider)
        .await
        .unwrap();
    (orchestrator, factory)
}
