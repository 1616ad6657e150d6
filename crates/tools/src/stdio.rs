//! Subprocess tool providers spoken to over stdin/stdout.
//!
//! One JSON-RPC message per line. The child's stderr is forwarded to the
//! debug log.

use async_trait::async_trait;
use deliberate_core::tool::ToolDescriptor;
use serde_json::Value;
use std::collections::HashSet;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::launch::LaunchSpec;
use crate::protocol::{
    InitializeParams, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ServerInfo,
    ToolCallResult, ToolListResult,
};
use crate::session::{CallOutcome, SessionError, SessionLauncher, ToolSession};

/// How long a closing child gets to exit on its own before it is killed.
const EXIT_GRACE: Duration = Duration::from_secs(5);

/// Upper bound on `tools/list` pages read from one provider.
const MAX_TOOL_PAGES: usize = 64;

/// Spawns [`StdioSession`]s.
pub struct StdioLauncher {
    request_timeout: Duration,
}

impl StdioLauncher {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

#[async_trait]
impl SessionLauncher for StdioLauncher {
    async fn launch(&self, capability: &str, spec: &LaunchSpec) -> Result<Box<dyn ToolSession>, SessionError> {
        let session = StdioSession::spawn(capability, spec, self.request_timeout)?;
        Ok(Box::new(session))
    }
}

/// A tool provider running as a child process.
pub struct StdioSession {
    capability: String,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<Lines<BufReader<ChildStdout>>>,
    next_id: u64,
    request_timeout: Duration,
}

impl StdioSession {
    /// Start the process described by `spec`.
    pub fn spawn(capability: &str, spec: &LaunchSpec, request_timeout: Duration) -> Result<Self, SessionError> {
        info!(capability, command = %spec.command, args = ?spec.args, "Starting tool provider process");

        let mut child = Command::new(&spec.command)
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SessionError::Io(format!("failed to spawn '{}': {e}", spec.command)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SessionError::Io("failed to capture stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SessionError::Io("failed to capture stdout".into()))?;

        if let Some(stderr) = child.stderr.take() {
            let capability = capability.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(capability = %capability, "[provider stderr] {line}");
                }
            });
        }

        Ok(Self {
            capability: capability.to_string(),
            child: Some(child),
            stdin: Some(stdin),
            stdout: Some(BufReader::new(stdout).lines()),
            next_id: 1,
            request_timeout,
        })
    }

    async fn write_line(&mut self, line: String) -> Result<(), SessionError> {
        let stdin = self.stdin.as_mut().ok_or(SessionError::Closed)?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn notify(&mut self, method: &str) -> Result<(), SessionError> {
        let line = serde_json::to_string(&JsonRpcNotification::new(method))?;
        self.write_line(line).await
    }

    /// Send one request and wait for the response carrying its id.
    async fn request(&mut self, method: &str, params: Option<Value>) -> Result<Value, SessionError> {
        let id = self.next_id;
        self.next_id += 1;
        let timeout = self.request_timeout;

        match tokio::time::timeout(timeout, self.exchange(id, method, params)).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Timeout {
                method: method.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    async fn exchange(&mut self, id: u64, method: &str, params: Option<Value>) -> Result<Value, SessionError> {
        let line = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;
        debug!(capability = %self.capability, %method, id, "Sending request");
        self.write_line(line).await?;

        let stdout = self.stdout.as_mut().ok_or(SessionError::Closed)?;
        loop {
            let Some(line) = stdout.next_line().await? else {
                warn!(capability = %self.capability, "Tool provider closed stdout");
                return Err(SessionError::Closed);
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let response: JsonRpcResponse = match serde_json::from_str(line) {
                Ok(r) => r,
                Err(e) => {
                    debug!(capability = %self.capability, error = %e, "Skipping non-JSON-RPC line");
                    continue;
                }
            };
            if response.id != Value::from(id) {
                // Notifications and stale responses.
                continue;
            }
            if let Some(error) = response.error {
                return Err(SessionError::Remote {
                    code: error.code,
                    message: error.message,
                });
            }
            return response
                .result
                .ok_or_else(|| SessionError::Protocol(format!("response to '{method}' has no result")));
        }
    }
}

#[async_trait]
impl ToolSession for StdioSession {
    async fn initialize(&mut self) -> Result<ServerInfo, SessionError> {
        let params = serde_json::to_value(InitializeParams::default())?;
        let result = self.request("initialize", Some(params)).await?;
        let info: ServerInfo = serde_json::from_value(result)?;
        self.notify("notifications/initialized").await?;
        Ok(info)
    }

    async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>, SessionError> {
        let mut descriptors = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen = HashSet::new();
        for _ in 0..MAX_TOOL_PAGES {
            let params = cursor.as_ref().map(|c| serde_json::json!({ "cursor": c }));
            let page: ToolListResult = serde_json::from_value(self.request("tools/list", params).await?)?;
            descriptors.extend(page.tools.into_iter().map(|t| ToolDescriptor {
                name: t.name,
                description: t.description.unwrap_or_default(),
                input_schema: t
                    .input_schema
                    .unwrap_or_else(|| serde_json::json!({ "type": "object", "properties": {} })),
            }));
            match page.next_cursor {
                Some(next) if !next.is_empty() => {
                    if !seen.insert(next.clone()) {
                        return Err(SessionError::Protocol(format!(
                            "tools/list repeated cursor '{next}'"
                        )));
                    }
                    cursor = Some(next);
                }
                _ => return Ok(descriptors),
            }
        }
        Err(SessionError::Protocol(format!(
            "tools/list still paginating after {MAX_TOOL_PAGES} pages"
        )))
    }

    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<CallOutcome, SessionError> {
        let params = serde_json::json!({ "name": name, "arguments": arguments });
        let result: ToolCallResult = serde_json::from_value(self.request("tools/call", Some(params)).await?)?;
        Ok(CallOutcome {
            text: result.text(),
            is_error: result.is_error,
        })
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        // Closing stdin is the polite shutdown signal.
        self.stdin = None;
        self.stdout = None;

        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(capability = %self.capability, %status, "Tool provider exited");
                Ok(())
            }
            _ => {
                warn!(capability = %self.capability, "Tool provider did not exit, killing");
                child.kill().await?;
                Ok(())
            }
        }
    }
}
