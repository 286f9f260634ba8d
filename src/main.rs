//! mcp-mqtt-server: MCP server for devices reachable over MQTT
//!
//! Runs the sample speaker device behind a line-delimited JSON bridge on
//! stdin/stdout. An MQTT client process connects to the broker with the
//! emitted `connect` options, forwards broker events as stdin frames and
//! executes the actions written to stdout.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use mcp_mqtt_server::config;
use mcp_mqtt_server::demo::{self, Speaker};
use mcp_mqtt_server::mcp::server::shutdown_signal;
use mcp_mqtt_server::mcp::{McpServer, ServerIdentity, StdioBridge};

/// MCP server exposing device tools and resources over MQTT.
///
/// Protocol traffic is exchanged as JSON lines on stdin/stdout; logs go to
/// stderr.
#[derive(Parser, Debug)]
#[command(name = "mcp-mqtt-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (default: ~/.mcp-mqtt-server/config.json)
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// More log output: -v info, -vv debug, -vvv trace
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

/// Picks the log level: `-q` wins, then `-v` flags, then the config file.
fn log_level(args: &Args, config_level: &str) -> Level {
    if args.quiet {
        return Level::ERROR;
    }

    match args.verbose {
        0 => config_level.parse().unwrap_or(Level::WARN),
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Logs to stderr; stdout carries bridge frames. `RUST_LOG` overrides `level`.
fn init_tracing(level: Level) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Entry point for the mcp-mqtt-server bridge.
fn main() -> ExitCode {
    let args = Args::parse();

    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if config_path.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("\nExpected config at: {}", default_path.display());
                }
            }
            return ExitCode::FAILURE;
        }
    };

    init_tracing(log_level(&args, &cfg.logging.level));

    // GPLv3 section 5d notice
    eprintln!(
        "mcp-mqtt-server {}  Copyright (C) 2026  The Embedded Society",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!("This program comes with ABSOLUTELY NO WARRANTY.");
    eprintln!("This is free software, licensed under GPL-3.0-or-later.");
    eprintln!();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        broker = %cfg.broker.uri,
        "Starting mcp-mqtt-server"
    );

    let identity = match ServerIdentity::new(
        cfg.server.name.clone(),
        cfg.server.description.clone(),
        cfg.broker.client_id.clone(),
    ) {
        Ok(identity) => identity,
        Err(e) => {
            error!(error = %e, "Invalid server identity");
            return ExitCode::FAILURE;
        }
    };

    let mut server = McpServer::new(identity);
    let speaker = Arc::new(Speaker::default());

    let registered = server
        .register_tools(demo::tools(&speaker))
        .and_then(|()| server.register_resources(demo::resources(), demo::reader(&speaker)));
    if let Err(e) = registered {
        error!(error = %e, "Registration failed");
        return ExitCode::FAILURE;
    }

    info!(
        control_topic = %server.topics().control(),
        "MCP server ready, waiting for broker connection..."
    );

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    let options = server.connect_options(&cfg.broker);
    let result = runtime.block_on(async {
        let mut bridge = StdioBridge::stdio();
        server
            .run_bridge(&mut bridge, options, shutdown_signal())
            .await
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
