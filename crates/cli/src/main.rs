//! deliberate CLI.
//!
//! Commands:
//! - `chat`  : one message or an interactive session through the advisor chain
//! - `tools` : list the tools discovered from the declared capabilities
//! - `config`: print the resolved or default configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "deliberate",
    about = "deliberate: plan, verify and refine before the model answers",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat through the reasoning pipeline
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Print the answer as it is generated
        #[arg(long)]
        stream: bool,
    },

    /// Start the declared capabilities and list their tools
    Tools,

    /// Print the configuration
    Config {
        /// Print the built-in defaults instead of the resolved file
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Chat { message, stream } => commands::chat::run(message, stream).await?,
        Commands::Tools => commands::tools::run().await?,
        Commands::Config { default } => commands::config_cmd::run(default)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_chat_with_global_verbose() {
        let cli = Cli::try_parse_from(["deliberate", "chat", "-m", "hi", "--stream", "-v"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Chat { message, stream } => {
                assert_eq!(message.as_deref(), Some("hi"));
                assert!(stream);
            }
            _ => panic!("expected chat"),
        }
    }

    #[test]
    fn parses_config_default() {
        let cli = Cli::try_parse_from(["deliberate", "config", "--default"]).unwrap();
        assert!(matches!(cli.command, Commands::Config { default: true }));
    }

    #[test]
    fn rejects_unknown_command() {
        assert!(Cli::try_parse_from(["deliberate", "serve"]).is_err());
    }
}
