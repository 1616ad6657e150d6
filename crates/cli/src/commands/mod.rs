pub mod chat;
pub mod config_cmd;
pub mod tools;

use deliberate_config::AppConfig;
use deliberate_tools::CapabilityRuntime;
use tracing::warn;

/// Start every declared capability, or none.
pub async fn start_runtime(config: &AppConfig) -> Result<CapabilityRuntime, Box<dyn std::error::Error>> {
    CapabilityRuntime::start(&config.capabilities, &config.capability_runtime)
        .await
        .map_err(|e| format!("Failed to start capabilities: {e}").into())
}

pub async fn stop_runtime(mut runtime: CapabilityRuntime) {
    for failure in runtime.shutdown().await {
        warn!(capability = %failure.capability, error = %failure.error, "Capability did not shut down cleanly");
    }
}
