//! Adapts a remote tool into a local [`Tool`].

use async_trait::async_trait;
use deliberate_core::error::ToolError;
use deliberate_core::tool::{Tool, ToolDescriptor, ToolResult};
use serde_json::Value;
use tracing::{debug, warn};

use crate::session::SharedSession;

/// A discovered tool bound to the session that provides it.
pub struct CapabilityTool {
    descriptor: ToolDescriptor,
    remote_name: String,
    capability: String,
    session: SharedSession,
}

impl CapabilityTool {
    pub fn new(descriptor: ToolDescriptor, capability: impl Into<String>, session: SharedSession) -> Self {
        Self {
            remote_name: descriptor.name.clone(),
            descriptor,
            capability: capability.into(),
            session,
        }
    }

    /// Models sometimes hand over arguments as a JSON string; providers want an object.
    fn normalize(&self, arguments: Value) -> Result<Value, ToolError> {
        match arguments {
            Value::Null => Ok(Value::Object(Default::default())),
            Value::String(raw) if raw.trim().is_empty() => Ok(Value::Object(Default::default())),
            Value::String(raw) => serde_json::from_str(&raw).map_err(|e| {
                ToolError::execution(&self.descriptor, format!("arguments are not valid JSON: {e}"))
            }),
            other => Ok(other),
        }
    }
}

#[async_trait]
impl Tool for CapabilityTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let arguments = self.normalize(arguments)?;
        debug!(capability = %self.capability, tool = %self.remote_name, "Invoking remote tool");

        let outcome = {
            let mut session = self.session.lock().await;
            session.call_tool(&self.remote_name, arguments).await
        }
        .map_err(|e| {
            warn!(capability = %self.capability, tool = %self.remote_name, error = %e, "Tool transport failure");
            ToolError::execution(&self.descriptor, e.to_string())
        })?;

        if outcome.is_error {
            warn!(capability = %self.capability, tool = %self.remote_name, "Tool reported an error");
            return Err(ToolError::execution(&self.descriptor, outcome.text));
        }

        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output: outcome.text,
            data: None,
        })
    }
}
