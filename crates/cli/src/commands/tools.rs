//! `deliberate tools`: list discovered tools.

use deliberate_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if config.capabilities.is_empty() {
        println!("No capabilities declared in {}", AppConfig::config_dir().join("config.toml").display());
        return Ok(());
    }

    let runtime = super::start_runtime(&config).await?;
    println!("Capabilities: {}", runtime.capabilities().join(", "));
    println!();
    for tool in runtime.descriptors() {
        println!("  {:<28} {}", tool.name, tool.description.lines().next().unwrap_or_default());
    }
    println!();
    println!("{} tools", runtime.descriptors().len());

    super::stop_runtime(runtime).await;
    Ok(())
}
