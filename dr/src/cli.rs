//! CLI command definitions

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use crate::progress::{DetailKind, Notice};
use crate::research::DepthHint;

/// Deep research orchestrator
#[derive(Parser)]
#[command(
    name = "dr",
    about = "Multi-stage web research with clarification, iterative search and cited reports",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP API server
    Serve {
        /// Address to bind (overrides config)
        #[arg(long)]
        bind: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Research a topic in-process, answering clarification questions interactively
    Run {
        /// Research topic
        topic: String,

        /// Research depth
        #[arg(short, long, value_enum, default_value_t = DepthHint::Medium)]
        depth: DepthHint,

        /// Write the markdown report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Follow a session's progress on a running server
    Watch {
        /// Session id
        id: String,

        /// Server base URL
        #[arg(short, long, default_value = "http://127.0.0.1:8000")]
        server: String,

        /// First progress offset to show
        #[arg(long, default_value_t = 0)]
        from: usize,
    },

    /// Print the effective configuration as YAML
    Config,
}

/// One-line terminal rendering of a progress notice
pub fn format_notice(notice: &Notice) -> String {
    match notice {
        Notice::Status { status, step, error } => match error {
            Some(error) => format!("{} {} ({step}): {error}", "●".red(), status.to_string().red().bold()),
            None => format!("{} {} ({step})", "●".cyan(), status.to_string().bold()),
        },
        Notice::Detail { detail_type, detail } => {
            let label = match detail_type {
                DetailKind::Link => "search".blue(),
                DetailKind::Curation => "source".magenta(),
                DetailKind::Report => "report".green(),
            };
            format!("  {label} {detail}")
        }
        Notice::Completed { report } => format!("{} {}", "✓".green(), report.title.bold()),
        Notice::Error { error } => format!("{} {}", "✗".red(), error.red()),
    }
}
