// crates/live-node-cli/src/main.rs
// ============================================================================
// Module: Live Node CLI Entry Point
// Description: Command dispatcher for the live node daemon.
// Purpose: Load configuration, wire the node together, and serve until stopped.
// Dependencies: clap, live-node-broker, live-node-config, thiserror, tokio.
// ============================================================================

//! ## Overview
//! `live-node serve` connects to the broker, declares the creation queue and
//! this node's query queue, and serves both until interrupted. `live-node
//! config validate` checks a configuration file without touching the broker.
//! Startup failures are fatal and exit non-zero; failures of individual
//! requests are reported to their requesters and never stop the daemon.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::ArgAction;
use clap::Args;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use live_node_broker::AmqpBroker;
use live_node_broker::BrokerTransport;
use live_node_broker::Dispatcher;
use live_node_broker::LiveNode;
use live_node_broker::audit_sink_from_config;
use live_node_config::LiveNodeConfig;
use live_node_config::NodeOverrides;
use live_node_config::NodeSettings;
use live_node_object_store::build_object_store;
use live_node_store_sqlite::DatabaseHost;
use live_node_store_sqlite::LocalStore;
use live_node_store_sqlite::QueryLimits;
use thiserror::Error;
use tokio::sync::watch;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "live-node", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the live node daemon.
    Serve(ServeCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Arguments for the `serve` command.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Optional config file path (defaults to live-node.toml or `LIVE_NODE_CONFIG`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Node identity; also the name of this node's query queue.
    #[arg(long, value_name = "NAME")]
    node_name: Option<String>,
    /// Directory holding live database files.
    #[arg(long, value_name = "DIR")]
    storage_dir: Option<PathBuf>,
}

/// Configuration subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate a live node configuration file.
    Validate(ConfigValidateCommand),
}

/// Arguments for config validation.
#[derive(Args, Debug)]
struct ConfigValidateCommand {
    /// Optional config file path (defaults to live-node.toml or `LIVE_NODE_CONFIG`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper carrying a user-facing message.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();

    if cli.show_version {
        let version = env!("CARGO_PKG_VERSION");
        write_stdout_line(&format!("live-node {version}"))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }

    let Some(command) = cli.command else {
        let mut command = Cli::command();
        command
            .print_help()
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    };

    match command {
        Commands::Serve(command) => command_serve(&command).await,
        Commands::Config {
            command,
        } => command_config(&command),
    }
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: &ServeCommand) -> CliResult<ExitCode> {
    let (config, settings) = load_serve_config(command)?;

    let store = LocalStore::open(&settings.storage_dir)
        .map_err(|err| CliError::new(format!("storage directory unusable: {err}")))?;
    let object_store = build_object_store(&config.object_store)
        .await
        .map_err(|err| CliError::new(format!("object store init failed: {err}")))?;
    let limits = QueryLimits {
        timeout_ms: config.query.timeout_ms,
        max_rows: config.query.max_rows,
    };
    let host = Arc::new(DatabaseHost::new(store, object_store, limits));
    let audit = audit_sink_from_config(&config.audit)
        .map_err(|err| CliError::new(format!("audit log init failed: {err}")))?;

    let broker = Arc::new(
        AmqpBroker::connect(&config.broker)
            .await
            .map_err(|err| CliError::new(format!("broker connection failed: {err}")))?,
    );
    let transport: Arc<dyn BrokerTransport> = broker.clone();
    let dispatcher =
        Arc::new(Dispatcher::new(settings.identity, host, Arc::clone(&transport), audit));
    let node = LiveNode::new(dispatcher, transport, &config.broker.create_queue, config.workers);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signals = tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let served = node.run(shutdown_rx).await;
    signals.abort();
    if let Err(err) = broker.close().await {
        let _ = write_stderr_line(&format!("broker close failed: {err}"));
    }
    served.map_err(|err| CliError::new(format!("node stopped: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Loads configuration for `serve` and applies command-line overrides.
fn load_serve_config(command: &ServeCommand) -> CliResult<(LiveNodeConfig, NodeSettings)> {
    let mut config = LiveNodeConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(format!("config load failed: {err}")))?;
    config
        .apply_overrides(NodeOverrides {
            name: command.node_name.clone(),
            storage_dir: command.storage_dir.clone(),
        })
        .map_err(|err| CliError::new(format!("config load failed: {err}")))?;
    let settings = config
        .node_settings()
        .map_err(|err| CliError::new(format!("config load failed: {err}")))?;
    Ok((config, settings))
}

/// Resolves when the process is asked to stop.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::SignalKind;
        use tokio::signal::unix::signal;

        if let Ok(mut terminate) = signal(SignalKind::terminate()) {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
            return;
        }
    }
    let _ = tokio::signal::ctrl_c().await;
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Dispatches config subcommands.
fn command_config(command: &ConfigCommand) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Validate(command) => command_config_validate(command),
    }
}

/// Executes the config validation command.
fn command_config_validate(command: &ConfigValidateCommand) -> CliResult<ExitCode> {
    let _config = LiveNodeConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(format!("config load failed: {err}")))?;
    write_stdout_line("config valid").map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Output
// ============================================================================

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
