//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Elite Dangerous journal tailer and game state tracker
#[derive(Parser)]
#[command(
    name = "ej",
    about = "Follow the Elite Dangerous journal and track game state",
    version = env!("CARGO_PKG_VERSION"),
    after_help = "Logs are written to: ~/.local/share/edjournal/logs/edjournal.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, help = "Log level (trace, debug, info, warn, error)")]
    pub log_level: Option<String>,

    /// Journal directory, overriding the configured one
    #[arg(short, long, global = true, help = "Journal directory")]
    pub journal_dir: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Follow the journal and report state changes until interrupted
    Watch {
        /// Also print every journal event
        #[arg(short, long)]
        events: bool,
    },

    /// Replay the latest journal and print the resulting state
    State {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// List events from the latest journal
    Events {
        /// Only show events of this type
        #[arg(short = 't', long = "type", value_name = "TYPE")]
        event_type: Option<String>,

        /// Show at most this many events, counting from the end
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Print the raw journal lines
        #[arg(short, long)]
        raw: bool,
    },

    /// Show the game version recorded in the latest journal
    Version,
}

/// Output format for state
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}
