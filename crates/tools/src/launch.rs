//! Capability declarations → subprocess launch specifications.
//!
//! Each capability type maps to a fixed command line. Unknown types and
//! missing required settings are rejected here, before anything is spawned.

use deliberate_config::CapabilityConfig;
use deliberate_core::error::CapabilityError;
use serde_json::Value;
use std::collections::HashMap;

/// How to start one tool-provider process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

impl LaunchSpec {
    fn new(command: &str, args: &[&str]) -> Self {
        Self {
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            env: HashMap::new(),
        }
    }
}

/// The supported capability types.
pub const KNOWN_TYPES: &[&str] = &["filesystem", "fetch", "memory", "brave_search", "command"];

/// Display name of a declaration: its `name` setting, or its type.
pub fn capability_name(decl: &CapabilityConfig) -> String {
    decl.config
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| decl.kind.clone())
}

/// Resolve the launch specification for a declaration.
pub fn launch_spec(decl: &CapabilityConfig) -> Result<LaunchSpec, CapabilityError> {
    let name = capability_name(decl);
    match decl.kind.as_str() {
        "filesystem" => {
            let paths = string_list(decl.config.get("paths"));
            if paths.is_empty() {
                return Err(CapabilityError::EmptyPaths { capability: name });
            }
            let mut spec = LaunchSpec::new("npx", &["-y", "@modelcontextprotocol/server-filesystem"]);
            spec.args.extend(paths);
            Ok(spec)
        }
        "fetch" => Ok(LaunchSpec::new("uvx", &["mcp-server-fetch"])),
        "memory" => Ok(LaunchSpec::new("npx", &["-y", "@modelcontextprotocol/server-memory"])),
        "brave_search" => {
            let api_key = required_str(decl, &name, "api_key")?;
            let mut spec = LaunchSpec::new("npx", &["-y", "@modelcontextprotocol/server-brave-search"]);
            spec.env.insert("BRAVE_API_KEY".into(), api_key);
            Ok(spec)
        }
        "command" => {
            let command = required_str(decl, &name, "command")?;
            Ok(LaunchSpec {
                command,
                args: string_list(decl.config.get("args")),
                env: decl
                    .config
                    .get("env")
                    .and_then(Value::as_object)
                    .map(|env| {
                        env.iter()
                            .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                            .collect()
                    })
                    .unwrap_or_default(),
            })
        }
        other => Err(CapabilityError::UnknownType(other.to_string())),
    }
}

fn required_str(decl: &CapabilityConfig, name: &str, key: &str) -> Result<String, CapabilityError> {
    decl.config
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| CapabilityError::MissingConfig {
            capability: name.to_string(),
            key: key.to_string(),
        })
}

/// A string or an array of strings; anything else is treated as empty.
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filesystem_templates_paths_into_args() {
        let decl = CapabilityConfig::new("filesystem").with("paths", json!(["/srv/a", "/srv/b"]));
        let spec = launch_spec(&decl).unwrap();
        assert_eq!(spec.command, "npx");
        assert_eq!(
            spec.args,
            vec!["-y", "@modelcontextprotocol/server-filesystem", "/srv/a", "/srv/b"]
        );
    }

    #[test]
    fn filesystem_accepts_single_path_string() {
        let decl = CapabilityConfig::new("filesystem").with("paths", json!("/srv/a"));
        assert_eq!(launch_spec(&decl).unwrap().args.last().unwrap(), "/srv/a");
    }

    #[test]
    fn filesystem_without_paths_is_empty_paths_error() {
        for decl in [
            CapabilityConfig::new("filesystem"),
            CapabilityConfig::new("filesystem").with("paths", json!([])),
        ] {
            let err = launch_spec(&decl).unwrap_err();
            assert!(matches!(err, CapabilityError::EmptyPaths { .. }), "{err:?}");
        }
    }

    #[test]
    fn unknown_type_names_the_type() {
        let err = launch_spec(&CapabilityConfig::new("carrier_pigeon")).unwrap_err();
        assert!(matches!(err, CapabilityError::UnknownType(ref t) if t == "carrier_pigeon"));
        assert!(err.to_string().contains("carrier_pigeon"));
    }

    #[test]
    fn brave_search_requires_api_key_and_passes_it_via_env() {
        let err = launch_spec(&CapabilityConfig::new("brave_search")).unwrap_err();
        assert!(matches!(err, CapabilityError::MissingConfig { ref key, .. } if key == "api_key"));

        let decl = CapabilityConfig::new("brave_search").with("api_key", json!("bsk-1"));
        let spec = launch_spec(&decl).unwrap();
        assert_eq!(spec.env.get("BRAVE_API_KEY").map(String::as_str), Some("bsk-1"));
        assert!(!spec.args.iter().any(|a| a.contains("bsk-1")));
    }

    #[test]
    fn command_type_uses_declared_command_line() {
        let decl = CapabilityConfig::new("command")
            .with("name", json!("local"))
            .with("command", json!("python3"))
            .with("args", json!(["-m", "my_server"]))
            .with("env", json!({"LOG_LEVEL": "debug"}));
        let spec = launch_spec(&decl).unwrap();
        assert_eq!(spec.command, "python3");
        assert_eq!(spec.args, vec!["-m", "my_server"]);
        assert_eq!(spec.env["LOG_LEVEL"], "debug");
        assert_eq!(capability_name(&decl), "local");
    }

    #[test]
    fn every_known_type_is_recognized() {
        for kind in KNOWN_TYPES {
            let decl = CapabilityConfig::new(*kind)
                .with("paths", json!(["/tmp"]))
                .with("api_key", json!("k"))
                .with("command", json!("true"));
            assert!(launch_spec(&decl).is_ok(), "{kind} rejected");
        }
    }
}
