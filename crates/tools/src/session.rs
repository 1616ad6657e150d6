//! Tool-provider sessions: the three operations the runtime needs from a
//! capability, independent of how the bytes travel.

use async_trait::async_trait;
use deliberate_core::tool::ToolDescriptor;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::launch::LaunchSpec;
use crate::protocol::ServerInfo;

/// Transport- and protocol-level session failures.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Remote error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("Request '{method}' timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    #[error("Session closed")]
    Closed,
}

impl From<std::io::Error> for SessionError {
    fn from(e: std::io::Error) -> Self {
        SessionError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        SessionError::Protocol(e.to_string())
    }
}

/// Outcome of a remote tool call that reached the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    /// Flattened text content
    pub text: String,
    /// The provider flagged the call as an application-level failure
    pub is_error: bool,
}

/// A live connection to one tool provider.
///
/// Methods take `&mut self`: a session handles one exchange at a time and
/// callers sharing it go through [`SharedSession`].
#[async_trait]
pub trait ToolSession: Send {
    /// Perform the handshake. Must be called once, before anything else.
    async fn initialize(&mut self) -> Result<ServerInfo, SessionError>;

    /// Every tool the provider exposes, in the order it reports them.
    async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>, SessionError>;

    /// Invoke a remote tool.
    async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<CallOutcome, SessionError>;

    /// Release the underlying resources. Idempotent.
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// A session shared by every tool it contributed. The mutex serializes calls
/// against one provider; different providers never contend.
pub type SharedSession = Arc<Mutex<Box<dyn ToolSession>>>;

/// Creates sessions from launch specifications.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self, capability: &str, spec: &LaunchSpec) -> Result<Box<dyn ToolSession>, SessionError>;
}
