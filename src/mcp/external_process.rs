//! Stdio transport
//!
//! Spawns a tool server as a child process and speaks newline-delimited
//! JSON-RPC over its stdin/stdout. Responses are matched to requests by id.

use crate::error::{RelayError, Result, TransportError};
use crate::mcp::jsonrpc::{parse_call_result, parse_tool_list, JsonRpcRequest, JsonRpcResponse};
use crate::mcp::transport::ToolTransport;
use crate::registry::{RemoteFunction, ServerDescriptor, TransportKind};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

type PendingMap = Arc<StdMutex<HashMap<String, oneshot::Sender<JsonRpcResponse>>>>;

/// A running child process and its writer channel
struct RunningProcess {
    child: Child,
    stdin_sender: mpsc::UnboundedSender<String>,
    alive: Arc<AtomicBool>,
}

/// Removes a pending entry if the waiting future is dropped (e.g. on timeout)
struct PendingGuard {
    pending: PendingMap,
    id: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&self.id);
        }
    }
}

/// JSON-RPC over a child process' stdio
pub struct StdioTransport {
    /// Server name from configuration
    name: String,
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    process: Mutex<Option<RunningProcess>>,
    /// Pending requests waiting for responses
    pending_requests: PendingMap,
}

impl StdioTransport {
    pub fn new(server: &ServerDescriptor) -> Result<Self> {
        let command = server.command.clone().ok_or_else(|| {
            RelayError::config(format!("Server '{}' has no command for the stdio transport", server.name))
        })?;

        Ok(Self {
            name: server.name.clone(),
            command,
            args: server.args.clone(),
            env: server.env.clone(),
            process: Mutex::new(None),
            pending_requests: Arc::new(StdMutex::new(HashMap::new())),
        })
    }

    fn spawn(&self) -> std::result::Result<RunningProcess, TransportError> {
        info!("Starting stdio tool server '{}': {} {:?}", self.name, self.command, self.args);

        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| TransportError::Refused(format!("Failed to spawn '{}': {}", self.name, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Refused(format!("Failed to get stdin for '{}'", self.name)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Refused(format!("Failed to get stdout for '{}'", self.name)))?;
        let stderr = child.stderr.take();

        let alive = Arc::new(AtomicBool::new(true));

        // stdin writer
        let (stdin_tx, mut stdin_rx) = mpsc::unbounded_channel::<String>();
        let server_name = self.name.clone();
        let writer_alive = Arc::clone(&alive);
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(message) = stdin_rx.recv().await {
                let written = async {
                    stdin.write_all(message.as_bytes()).await?;
                    stdin.write_all(b"\n").await?;
                    stdin.flush().await
                }
                .await;
                if let Err(e) = written {
                    error!("Failed to write to '{}' stdin: {}", server_name, e);
                    writer_alive.store(false, Ordering::SeqCst);
                    break;
                }
            }
        });

        // stdout reader
        let pending = Arc::clone(&self.pending_requests);
        let server_name = self.name.clone();
        let reader_alive = Arc::clone(&alive);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<JsonRpcResponse>(&line) {
                    Ok(response) => {
                        let id = response.id_key();
                        let sender = pending.lock().ok().and_then(|mut p| p.remove(&id));
                        match sender {
                            Some(sender) => {
                                if sender.send(response).is_err() {
                                    debug!("Caller for request {} to '{}' went away", id, server_name);
                                }
                            }
                            None => debug!("Unsolicited message from '{}': {}", server_name, line),
                        }
                    }
                    Err(e) => {
                        warn!("Failed to parse JSON-RPC message from '{}': {} (line: {})", server_name, e, line);
                    }
                }
            }

            warn!("Stdio tool server '{}' closed its stdout", server_name);
            reader_alive.store(false, Ordering::SeqCst);
            // dropping the senders wakes every waiter with an error
            if let Ok(mut p) = pending.lock() {
                p.clear();
            }
        });

        if let Some(stderr) = stderr {
            let server_name = self.name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[{}] stderr: {}", server_name, line);
                }
            });
        }

        Ok(RunningProcess {
            child,
            stdin_sender: stdin_tx,
            alive,
        })
    }

    /// Send a request and wait for its response. The caller owns the deadline.
    async fn send_request(&self, request: JsonRpcRequest) -> std::result::Result<JsonRpcResponse, TransportError> {
        let id = request
            .id_key()
            .ok_or_else(|| TransportError::Protocol("request without id".to_string()))?;
        let request_json = serde_json::to_string(&request)
            .map_err(|e| TransportError::Protocol(format!("Failed to serialize request: {}", e)))?;

        let (response_tx, response_rx) = oneshot::channel();
        {
            let process = self.process.lock().await;
            let running = process
                .as_ref()
                .filter(|p| p.alive.load(Ordering::SeqCst))
                .ok_or_else(|| TransportError::Refused(format!("'{}' is not running", self.name)))?;

            if let Ok(mut pending) = self.pending_requests.lock() {
                pending.insert(id.clone(), response_tx);
            }

            debug!("Sending request to '{}': {}", self.name, request.method);
            if running.stdin_sender.send(request_json).is_err() {
                if let Ok(mut pending) = self.pending_requests.lock() {
                    pending.remove(&id);
                }
                return Err(TransportError::Refused(format!("'{}' stdin is closed", self.name)));
            }
        }

        let _guard = PendingGuard {
            pending: Arc::clone(&self.pending_requests),
            id,
        };

        response_rx
            .await
            .map_err(|_| TransportError::Protocol(format!("'{}' exited before responding", self.name)))
    }

    fn send_notification(&self, running: &RunningProcess, method: &str) {
        match serde_json::to_string(&JsonRpcRequest::notification(method)) {
            Ok(json) => {
                if running.stdin_sender.send(json).is_err() {
                    warn!("Failed to send {} to '{}'", method, self.name);
                }
            }
            Err(e) => warn!("Failed to serialize {} for '{}': {}", method, self.name, e),
        }
    }
}

#[async_trait]
impl ToolTransport for StdioTransport {
    async fn connect(&self) -> std::result::Result<(), TransportError> {
        {
            let mut process = self.process.lock().await;
            if process.as_ref().map(|p| p.alive.load(Ordering::SeqCst)).unwrap_or(false) {
                return Ok(());
            }
            // a dead process is replaced
            *process = Some(self.spawn()?);
        }

        let handshake = match self.send_request(JsonRpcRequest::initialize()).await {
            Ok(response) => match response.error {
                Some(error) => Err(TransportError::Remote(format!("initialize rejected: {}", error.message))),
                None => Ok(()),
            },
            Err(e) => Err(e),
        };
        if let Err(e) = handshake {
            // a half-initialized process must not look connected on the next attempt
            self.disconnect().await;
            return Err(e);
        }

        let process = self.process.lock().await;
        if let Some(running) = process.as_ref() {
            self.send_notification(running, "notifications/initialized");
        }
        info!("Stdio tool server '{}' initialized", self.name);
        Ok(())
    }

    async fn list_functions(&self) -> std::result::Result<Vec<RemoteFunction>, TransportError> {
        let result = self.send_request(JsonRpcRequest::list_tools()).await?.into_result()?;
        parse_tool_list(result)
    }

    async fn call(&self, function: &str, arguments: Value) -> std::result::Result<Value, TransportError> {
        let result = self
            .send_request(JsonRpcRequest::call_tool(function, arguments))
            .await?
            .into_result()?;
        parse_call_result(result)
    }

    async fn ping(&self) -> std::result::Result<(), TransportError> {
        // an error object still proves the process is answering
        self.send_request(JsonRpcRequest::ping()).await.map(|_| ())
    }

    async fn disconnect(&self) {
        let running = self.process.lock().await.take();
        let Some(mut running) = running else {
            return;
        };

        info!("Stopping stdio tool server '{}'", self.name);
        running.alive.store(false, Ordering::SeqCst);
        if let Err(e) = running.child.start_kill() {
            warn!("Failed to kill '{}': {}", self.name, e);
        }
        match timeout(Duration::from_secs(5), running.child.wait()).await {
            Ok(Ok(status)) => info!("Stdio tool server '{}' exited with status: {}", self.name, status),
            Ok(Err(e)) => error!("Error waiting for '{}' to exit: {}", self.name, e),
            Err(_) => warn!("Stdio tool server '{}' did not exit within timeout", self.name),
        }
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    fn descriptor(command: &str) -> ServerDescriptor {
        let mut config = ServerConfig::new("local");
        config.command = Some(command.to_string());
        ServerDescriptor::from_config(&config)
    }

    #[tokio::test]
    async fn test_spawn_failure_is_refused() {
        let transport = StdioTransport::new(&descriptor("/definitely/not/a/real/binary")).unwrap();
        let err = transport.connect().await.unwrap_err();
        assert!(err.is_retryable(), "spawn failure should be retryable: {:?}", err);
    }

    #[tokio::test]
    async fn test_call_before_connect_is_refused() {
        let transport = StdioTransport::new(&descriptor("unused")).unwrap();
        let err = transport.call("anything", Value::Null).await.unwrap_err();
        assert!(matches!(err, TransportError::Refused(_)));
        transport.disconnect().await;
    }
}
