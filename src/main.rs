//! mcp-session: reference MCP server over stdio.
//!
//! Serves a small demonstration capability set — a quiz-level tool, a quiz
//! link resource, and a teaching prompt — through the session engine.
//! Useful for smoke-testing MCP clients against this implementation.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use serde_json::{json, Value};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use mcp_session::config;
use mcp_session::registry::{ApplicationError, Prompt, Registry, RegistryError, Resource, Tool};
use mcp_session::rpc::types::{
    CallToolResult, GetPromptResult, PromptMessage, ResourceContents, ResourceDef, ServerInfo,
};
use mcp_session::transport::LineTransport;
use mcp_session::{Server, Session};

/// Reference MCP server over stdio.
///
/// Exposes a demonstration tool, resource, and prompt through the
/// mcp-session protocol engine.
#[derive(Parser, Debug)]
#[command(name = "mcp-session")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Determines the log level from CLI arguments.
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "error" => Level::ERROR,
            _ => Level::WARN,
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
///
/// Logs go to stderr; stdout carries protocol frames.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Builds the demonstration capability set.
fn build_registry() -> Result<Registry, RegistryError> {
    let registry = Registry::new();

    registry.register_tool(Tool::from_fn(
        "FindLevel",
        "Determines the student's English level based on their quiz score.",
        json!({
            "type": "object",
            "properties": {
                "grade": {
                    "type": "integer",
                    "description": "Quiz score from 0 to 100"
                }
            },
            "required": ["grade"]
        }),
        |arguments| {
            let grade = arguments
                .get("grade")
                .and_then(Value::as_i64)
                .ok_or_else(|| ApplicationError::new("grade must be an integer"))?;
            let level = if grade < 50 {
                "Beginner"
            } else if grade < 75 {
                "Intermediate"
            } else {
                "Expert"
            };
            Ok(CallToolResult::text(level))
        },
    ))?;

    registry.register_resource(Resource::from_fn(
        ResourceDef {
            name: "GetQuiz".to_string(),
            uri: "https://quiz.xyz".to_string(),
            description: Some(
                "Provides a link to an online English level assessment quiz.".to_string(),
            ),
            mime_type: Some("text/plain".to_string()),
        },
        |uri| {
            Ok(vec![ResourceContents::text(
                uri,
                "Link to online quiz: https://quiz.xyz",
            )])
        },
    ))?;

    registry.register_prompt(Prompt::from_fn(
        "GetPrompt",
        "Generates a prompt to ask an LLM to teach English based on the student's level.",
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Student name" },
                "level": { "type": "string", "description": "Assessed English level" }
            },
            "required": ["name", "level"]
        }),
        |arguments| {
            let name = arguments
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| ApplicationError::new("name must be a string"))?;
            let level = arguments
                .get("level")
                .and_then(Value::as_str)
                .ok_or_else(|| ApplicationError::new("level must be a string"))?;
            Ok(GetPromptResult {
                description: Some("English teaching prompt".to_string()),
                messages: vec![PromptMessage::user(format!(
                    "Teach {name} English based on this level: {level}."
                ))],
            })
        },
    ))?;

    Ok(registry)
}

/// Runs the served session until the client disconnects or a shutdown
/// signal arrives.
#[cfg(unix)]
async fn run_until_shutdown(session: &Session) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT, initiating graceful shutdown");
            session.close().await;
        }

        _ = sigterm.recv() => {
            info!("Received SIGTERM, initiating graceful shutdown");
            session.close().await;
        }

        () = session.closed() => {
            info!("Client disconnected");
        }
    }

    Ok(())
}

/// Runs the served session until the client disconnects or a shutdown
/// signal arrives.
#[cfg(windows)]
async fn run_until_shutdown(session: &Session) -> std::io::Result<()> {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown");
            session.close().await;
        }

        () = session.closed() => {
            info!("Client disconnected");
        }
    }

    Ok(())
}

/// Entry point for the mcp-session reference server.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        server = %cfg.server.name,
        "Starting mcp-session reference server"
    );

    let registry = match build_registry() {
        Ok(registry) => registry,
        Err(e) => {
            error!(error = %e, "Failed to build capability registry");
            return ExitCode::FAILURE;
        }
    };

    let server = Server::new(
        ServerInfo::new(cfg.server.name.clone(), env!("CARGO_PKG_VERSION")),
        Arc::new(registry),
    )
    .with_config(cfg.session.to_session_config());

    info!("MCP server ready, waiting for client connection...");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to create Tokio runtime");

    let result = runtime.block_on(async {
        let session = server.serve(LineTransport::stdio());
        run_until_shutdown(&session).await
    });

    match result {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}
