//! Error types for the deliberate domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

use crate::tool::ToolDescriptor;

/// The top-level error type for all deliberate operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Capability startup errors ---
    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Errors raised while invoking a tool.
///
/// Every failure of a discovered tool, whether the remote reported an
/// application-level error or the session transport broke, surfaces as
/// [`ToolError::Execution`].
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {}: {reason}", descriptor.name)]
    Execution {
        descriptor: Box<ToolDescriptor>,
        reason: String,
    },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

impl ToolError {
    /// Build the uniform execution error for `descriptor`.
    pub fn execution(descriptor: &ToolDescriptor, reason: impl Into<String>) -> Self {
        Self::Execution {
            descriptor: Box::new(descriptor.clone()),
            reason: reason.into(),
        }
    }
}

/// Fatal errors raised while bringing capabilities up.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("Unknown capability type: {0}")]
    UnknownType(String),

    #[error("Capability '{capability}' requires at least one path, got none")]
    EmptyPaths { capability: String },

    #[error("Capability '{capability}' is missing required config key '{key}'")]
    MissingConfig { capability: String, key: String },

    #[error("Failed to spawn capability '{capability}': {reason}")]
    Spawn { capability: String, reason: String },

    #[error("Handshake with capability '{capability}' failed: {reason}")]
    Handshake { capability: String, reason: String },

    #[error("Handshake with capability '{capability}' timed out after {timeout_secs}s")]
    HandshakeTimeout { capability: String, timeout_secs: u64 },

    #[error("Tool discovery for capability '{capability}' failed: {reason}")]
    Discovery { capability: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn tool_execution_error_names_tool_and_reason() {
        let descriptor = ToolDescriptor {
            name: "read_file".into(),
            description: "Read a file".into(),
            input_schema: serde_json::json!({"type": "object"}),
        };
        let err = ToolError::execution(&descriptor, "ENOENT: no such file");
        assert!(err.to_string().contains("read_file"));
        assert!(err.to_string().contains("ENOENT"));
        match err {
            ToolError::Execution { descriptor, .. } => assert_eq!(descriptor.name, "read_file"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn capability_error_converts_with_question_mark() {
        fn start() -> Result<()> {
            Err(CapabilityError::EmptyPaths { capability: "files".into() })?
        }
        let err = start().unwrap_err();
        assert!(matches!(err, Error::Capability(CapabilityError::EmptyPaths { .. })));
        assert!(err.to_string().contains("files"));
    }

    #[test]
    fn unknown_capability_names_type() {
        let err = CapabilityError::UnknownType("telepathy".into());
        assert!(err.to_string().contains("telepathy"));
    }
}
