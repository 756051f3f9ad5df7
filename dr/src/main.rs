//! DeepResearch - CLI entry point

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result, eyre};
use futures::StreamExt;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{debug, info};

use deepresearch::cli::{Cli, Command, format_notice};
use deepresearch::client::ResearchClient;
use deepresearch::config::Config;
use deepresearch::research::DepthHint;
use deepresearch::server::{AppState, run_server};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("deepresearch")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level).map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") | None => tracing::Level::INFO,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some(other) => {
            eprintln!("Warning: Unknown log-level '{other}', defaulting to INFO");
            tracing::Level::INFO
        }
    };

    let log_file = fs::File::create(log_dir.join("deepresearch.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Serve { bind, port } => cmd_serve(config, bind, port).await,
        Command::Run { topic, depth, output } => cmd_run(config, &topic, depth, output).await,
        Command::Watch { id, server, from } => cmd_watch(&server, &id, from).await,
        Command::Config => cmd_config(&config),
    }
}

async fn cmd_serve(config: Config, bind: Option<String>, port: Option<u16>) -> Result<()> {
    debug!(?bind, ?port, "cmd_serve: called");
    config.validate()?;
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let port = port.unwrap_or(config.server.port);
    let state = AppState::from_config(config)?;
    run_server(state, &bind, port).await
}

async fn cmd_run(config: Config, topic: &str, depth: DepthHint, output: Option<PathBuf>) -> Result<()> {
    debug!(%topic, %depth, "cmd_run: called");
    config.validate()?;
    let state = AppState::from_config(config)?;
    let orchestrator = &state.orchestrator;

    let session = orchestrator.create_session(topic, depth).await?;
    println!("{} {}", "Session".bold(), session.id);

    let questions = orchestrator.request_clarification(&session.id).await?;
    println!("\n{}", "A few questions before researching:".bold());

    let mut editor = DefaultEditor::new()?;
    let mut answers = BTreeMap::new();
    for (i, q) in questions.iter().enumerate() {
        println!("\n{}. {}", i + 1, q.question.cyan());
        match editor.readline("> ") {
            Ok(line) => {
                answers.insert(q.id.clone(), line.trim().to_string());
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                return Err(eyre!("clarification cancelled"));
            }
            Err(e) => return Err(e.into()),
        }
    }
    println!();

    orchestrator.submit_answers(&session.id, answers).await?;
    let mut notices = orchestrator.hub().subscribe(&session.id, 0).await;
    state.runner.start(&session.id)?;

    while let Some((_, notice)) = notices.next().await {
        println!("{}", format_notice(&notice));
    }

    let session = orchestrator.get_session(&session.id).await?;
    let report = match session.final_report() {
        Some(report) => report,
        None => {
            return Err(eyre!(
                "research ended without a report: {}",
                session.error().unwrap_or("unknown error")
            ));
        }
    };

    let markdown = report.to_markdown();
    match output {
        Some(path) => {
            fs::write(&path, markdown).context(format!("Failed to write {}", path.display()))?;
            println!("\nReport written to {}", path.display());
        }
        None => println!("\n{markdown}"),
    }
    Ok(())
}

async fn cmd_watch(server: &str, id: &str, from: usize) -> Result<()> {
    debug!(%server, %id, from, "cmd_watch: called");
    let client = ResearchClient::new(server);
    client
        .watch(id, from, |offset, notice| {
            println!("{} {}", format!("[{offset}]").dimmed(), format_notice(notice));
        })
        .await
}

fn cmd_config(config: &Config) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
    print!("{yaml}");
    Ok(())
}
