//! `deliberate config`: print configuration.

use deliberate_config::AppConfig;

pub fn run(default: bool) -> Result<(), Box<dyn std::error::Error>> {
    if default {
        println!("{}", AppConfig::default_toml());
        return Ok(());
    }

    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    redact(&mut config);
    println!("# {}", AppConfig::config_dir().join("config.toml").display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn redact(config: &mut AppConfig) {
    let hidden = || Some("[REDACTED]".to_string());
    if config.api_key.is_some() {
        config.api_key = hidden();
    }
    for provider in config.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = hidden();
        }
    }
}
