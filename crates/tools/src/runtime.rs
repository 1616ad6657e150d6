//! Capability runtime: brings every declared tool provider up, collects the
//! tools they expose, and tears them down again.
//!
//! Startup is all-or-nothing. Every declaration is validated before anything
//! is spawned, and if any capability fails to come up the ones already
//! started are closed before the error is returned.

use deliberate_config::{CapabilityConfig, CapabilityRuntimeConfig};
use deliberate_core::error::CapabilityError;
use deliberate_core::tool::{ToolDescriptor, ToolRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::adapter::CapabilityTool;
use crate::launch::{LaunchSpec, capability_name, launch_spec};
use crate::session::{SessionError, SessionLauncher, SharedSession, ToolSession};
use crate::stdio::StdioLauncher;

/// A capability that failed to close cleanly during shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownFailure {
    pub capability: String,
    pub error: SessionError,
}

/// Running tool providers and the tools they contributed.
pub struct CapabilityRuntime {
    sessions: Vec<(String, SharedSession)>,
    descriptors: Vec<ToolDescriptor>,
    registry: Arc<ToolRegistry>,
}

impl CapabilityRuntime {
    /// Start every declared capability as a subprocess.
    pub async fn start(
        declarations: &[CapabilityConfig],
        settings: &CapabilityRuntimeConfig,
    ) -> Result<Self, CapabilityError> {
        let launcher = StdioLauncher::new(Duration::from_secs(settings.request_timeout_secs));
        Self::start_with(declarations, settings, &launcher).await
    }

    /// Start every declared capability through `launcher`.
    pub async fn start_with(
        declarations: &[CapabilityConfig],
        settings: &CapabilityRuntimeConfig,
        launcher: &dyn SessionLauncher,
    ) -> Result<Self, CapabilityError> {
        let plans = declarations
            .iter()
            .map(|decl| Ok((capability_name(decl), launch_spec(decl)?)))
            .collect::<Result<Vec<(String, LaunchSpec)>, CapabilityError>>()?;

        let mut runtime = Self {
            sessions: Vec::with_capacity(plans.len()),
            descriptors: Vec::new(),
            registry: Arc::new(ToolRegistry::new()),
        };
        let mut registry = ToolRegistry::new();

        for (name, spec) in &plans {
            match bring_up(name, spec, settings, launcher).await {
                Ok((session, tools)) => {
                    info!(capability = %name, tools = tools.len(), "Capability ready");
                    for descriptor in tools {
                        runtime.descriptors.push(descriptor.clone());
                        registry.register(Box::new(CapabilityTool::new(descriptor, name.clone(), session.clone())));
                    }
                    runtime.sessions.push((name.clone(), session));
                }
                Err(e) => {
                    warn!(capability = %name, error = %e, "Capability failed to start, rolling back");
                    runtime.shutdown().await;
                    return Err(e);
                }
            }
        }

        runtime.registry = Arc::new(registry);
        info!(
            capabilities = runtime.sessions.len(),
            tools = runtime.descriptors.len(),
            "Capability runtime started"
        );
        Ok(runtime)
    }

    /// Every discovered tool, in declaration order then provider order.
    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    /// The executable tools, keyed by name.
    pub fn registry(&self) -> Arc<ToolRegistry> {
        self.registry.clone()
    }

    /// Names of the running capabilities.
    pub fn capabilities(&self) -> Vec<&str> {
        self.sessions.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Close every session. A failing close is logged and does not stop the
    /// remaining ones from closing.
    pub async fn shutdown(&mut self) -> Vec<ShutdownFailure> {
        let mut failures = Vec::new();
        for (name, session) in self.sessions.drain(..) {
            let mut session = session.lock().await;
            if let Err(error) = session.close().await {
                warn!(capability = %name, error = %error, "Failed to close capability");
                failures.push(ShutdownFailure { capability: name, error });
            }
        }
        failures
    }
}

async fn bring_up(
    name: &str,
    spec: &LaunchSpec,
    settings: &CapabilityRuntimeConfig,
    launcher: &dyn SessionLauncher,
) -> Result<(SharedSession, Vec<ToolDescriptor>), CapabilityError> {
    let mut session = launcher.launch(name, spec).await.map_err(|e| CapabilityError::Spawn {
        capability: name.to_string(),
        reason: e.to_string(),
    })?;

    let handshake = Duration::from_secs(settings.handshake_timeout_secs);
    let handshake_result = match tokio::time::timeout(handshake, session.initialize()).await {
        Ok(Ok(info)) => {
            info!(capability = %name, server = %info.server_info.name, "Handshake complete");
            Ok(())
        }
        Ok(Err(e)) => Err(CapabilityError::Handshake {
            capability: name.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Err(CapabilityError::HandshakeTimeout {
            capability: name.to_string(),
            timeout_secs: settings.handshake_timeout_secs,
        }),
    };

    let result = match handshake_result {
        Ok(()) => discover(name, session.as_mut(), settings.discovery_timeout_secs).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(tools) => Ok((Arc::new(Mutex::new(session)), tools)),
        Err(e) => {
            if let Err(close_err) = session.close().await {
                warn!(capability = %name, error = %close_err, "Failed to close capability after startup error");
            }
            Err(e)
        }
    }
}

async fn discover(
    name: &str,
    session: &mut dyn ToolSession,
    timeout_secs: u64,
) -> Result<Vec<ToolDescriptor>, CapabilityError> {
    let discovery = Duration::from_secs(timeout_secs);
    match tokio::time::timeout(discovery, session.list_tools()).await {
        Ok(Ok(tools)) => Ok(tools),
        Ok(Err(e)) => Err(CapabilityError::Discovery {
            capability: name.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Err(CapabilityError::Discovery {
            capability: name.to_string(),
            reason: format!("tools/list did not finish within {timeout_secs}s"),
        }),
    }
}
