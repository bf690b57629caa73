// crates/xpart-cli/src/main.rs
// ============================================================================
// Module: xpart CLI Entry Point
// Description: Command dispatcher for serving, counting, and loading.
// Purpose: Run the aggregate server, one-off counts, and the bulk loader.
// Dependencies: clap, tokio, tracing-subscriber, xpart-*
// ============================================================================

//! ## Overview
//! `xpart serve` hosts the aggregate routes, `xpart count` evaluates one
//! aggregate and prints its JSON result, `xpart load` writes generated items
//! in batches, and `xpart config check` validates configuration.
//!
//! With `store.kind = "memory"`, `serve` and `count` first populate a
//! process-local store using the loader settings so results are non-trivial.
//! Logs go to stderr and are filtered by `XPART_LOG` (default `info`).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use xpart_config::StoreKind;
use xpart_config::XpartConfig;
use xpart_core::AggregateExecutor;
use xpart_core::BulkWriter;
use xpart_core::ConnectionDescriptor;
use xpart_core::InMemoryDocumentStore;
use xpart_core::SharedClient;
use xpart_loader::BulkLoader;
use xpart_loader::DocumentGenerator;
use xpart_loader::LoaderSettings;
use xpart_server::AggregateResponse;
use xpart_server::AggregateServer;
use xpart_server::http_store_config;
use xpart_store_http::HttpStoreFactory;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable holding the log filter.
const LOG_ENV: &str = "XPART_LOG";
/// Log filter used when [`LOG_ENV`] is unset or invalid.
const DEFAULT_LOG_FILTER: &str = "info";

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "xpart", version, disable_help_subcommand = true)]
struct Cli {
    /// Config file path (defaults to xpart.toml or the `XPART_CONFIG` override).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the configured aggregates over HTTP.
    Serve(ServeCommand),
    /// Evaluate one aggregate and print its JSON result.
    Count(CountCommand),
    /// Generate items and bulk-load them into the collection.
    Load(LoadCommand),
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
    /// Generator seed for the in-memory store.
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,
}

/// Arguments for the `count` command.
#[derive(Args, Debug)]
struct CountCommand {
    /// Aggregate name, e.g. `ItemCountByCustomer`.
    #[arg(long, value_name = "NAME")]
    aggregate: String,
    /// Optional filter value.
    #[arg(long, value_name = "VALUE")]
    filter: Option<String>,
    /// Generator seed for the in-memory store.
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,
}

/// Arguments for the `load` command.
#[derive(Args, Debug)]
struct LoadCommand {
    /// Override `loader.batch_count`.
    #[arg(long, value_name = "N")]
    batches: Option<u32>,
    /// Override `loader.documents_per_batch`.
    #[arg(long, value_name = "N")]
    batch_size: Option<u32>,
    /// Generator seed.
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate configuration.
    Check,
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
    init_tracing();
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Installs the stderr log subscriber.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    let config = XpartConfig::load(cli.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    match cli.command {
        Commands::Serve(command) => command_serve(config, &command).await,
        Commands::Count(command) => command_count(config, &command).await,
        Commands::Load(command) => command_load(config, &command).await,
        Commands::Config {
            command: ConfigCommand::Check,
        } => command_config_check(&config),
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(config: XpartConfig, command: &ServeCommand) -> CliResult<ExitCode> {
    let server = match config.store.kind {
        StoreKind::Memory => {
            let store = seeded_memory_store(&config, command.seed).await?;
            let client = Arc::new(SharedClient::preconnected(Arc::new(store)));
            AggregateServer::with_client(config, client)
        }
        StoreKind::Http => AggregateServer::from_config(config),
    }
    .map_err(|err| CliError::new(format!("server init failed: {err}")))?;
    server
        .serve_until_ctrl_c()
        .await
        .map_err(|err| CliError::new(format!("server failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `count` command.
async fn command_count(config: XpartConfig, command: &CountCommand) -> CliResult<ExitCode> {
    let aggregate = config
        .aggregates
        .iter()
        .find(|aggregate| aggregate.name == command.aggregate)
        .ok_or_else(|| CliError::new(format!("unknown aggregate '{}'", command.aggregate)))?;
    let partition_key = config.store.partition_key_path().map_err(config_error)?;
    let dimension = aggregate.dimension(&partition_key).map_err(config_error)?;
    let collection = config.store.collection_ref().map_err(config_error)?;
    let client = match config.store.kind {
        StoreKind::Memory => {
            let store = seeded_memory_store(&config, command.seed).await?;
            SharedClient::preconnected(Arc::new(store))
        }
        StoreKind::Http => {
            let factory = HttpStoreFactory::new(http_store_config(&config.store, 1));
            SharedClient::new(config.store.connection_source(), factory)
        }
    };
    let executor = AggregateExecutor::new(Arc::new(client), collection, dimension, config.feed);
    let cancel = cancel_on_ctrl_c();
    let result = executor
        .count(command.filter.as_deref(), &cancel)
        .await
        .map_err(|err| CliError::new(format!("aggregate failed: {err}")))?;
    let body = serde_json::to_string(&AggregateResponse::from(result))
        .map_err(|err| CliError::new(format!("failed to encode result: {err}")))?;
    write_stdout_line(&body).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `load` command.
async fn command_load(mut config: XpartConfig, command: &LoadCommand) -> CliResult<ExitCode> {
    if let Some(batches) = command.batches {
        config.loader.batch_count = batches;
    }
    if let Some(batch_size) = command.batch_size {
        config.loader.documents_per_batch = batch_size;
    }
    config.validate().map_err(config_error)?;
    let collection = config.store.collection_ref().map_err(config_error)?;
    let writer: Arc<dyn BulkWriter> = match config.store.kind {
        StoreKind::Memory => {
            warn!("loading into a process-local memory store; documents are discarded on exit");
            let store = InMemoryDocumentStore::new();
            store.register_collection(&collection).map_err(|err| CliError::new(err.to_string()))?;
            Arc::new(store)
        }
        StoreKind::Http => {
            let source = config.store.connection_source();
            let connection_string =
                source.resolve().map_err(|err| CliError::new(err.to_string()))?;
            let descriptor = ConnectionDescriptor::parse(connection_string)
                .map_err(|err| CliError::new(format!("invalid connection string: {err}")))?;
            let concurrency = usize::try_from(config.loader.max_concurrency).unwrap_or(1);
            let factory = HttpStoreFactory::new(http_store_config(&config.store, concurrency));
            Arc::new(factory.build(&descriptor).map_err(|err| CliError::new(err.to_string()))?)
        }
    };
    let loader = BulkLoader::new(writer, collection, LoaderSettings::from(&config.loader));
    let mut generator = generator_for(&config, command.seed);
    let cancel = cancel_on_ctrl_c();
    let mut write_failure = None;
    let summary = loader
        .run(&mut generator, &cancel, |batch| {
            if let Err(err) = write_stdout_line(&batch.to_string()) {
                write_failure.get_or_insert(err);
            }
        })
        .await
        .map_err(|err| CliError::new(format!("load failed: {err}")))?;
    if let Some(err) = write_failure {
        return Err(CliError::new(output_error("stdout", &err)));
    }
    write_stdout_line(&summary.to_string())
        .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `config check`.
fn command_config_check(config: &XpartConfig) -> CliResult<ExitCode> {
    let names: Vec<&str> = config.aggregates.iter().map(|aggregate| aggregate.name.as_str()).collect();
    let kind = match config.store.kind {
        StoreKind::Http => "http",
        StoreKind::Memory => "memory",
    };
    write_stdout_line(&format!(
        "config ok: store={kind} collection={}/{} aggregates={}",
        config.store.database,
        config.store.collection,
        names.join(",")
    ))
    .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds a memory store populated by the configured loader settings.
async fn seeded_memory_store(config: &XpartConfig, seed: Option<u64>) -> CliResult<InMemoryDocumentStore> {
    let collection = config.store.collection_ref().map_err(config_error)?;
    let store = InMemoryDocumentStore::new();
    store.register_collection(&collection).map_err(|err| CliError::new(err.to_string()))?;
    let loader =
        BulkLoader::new(Arc::new(store.clone()), collection, LoaderSettings::from(&config.loader));
    let mut generator = generator_for(config, seed);
    let summary = loader
        .run(&mut generator, &CancellationToken::new(), |_| {})
        .await
        .map_err(|err| CliError::new(format!("memory store seeding failed: {err}")))?;
    info!(documents = summary.documents_imported, "memory store seeded");
    Ok(store)
}

/// Builds the item generator from loader settings.
fn generator_for(config: &XpartConfig, seed: Option<u64>) -> DocumentGenerator {
    let customers = config.loader.customer_cardinality;
    let products = config.loader.product_cardinality;
    seed.map_or_else(
        || DocumentGenerator::new(customers, products),
        |seed| DocumentGenerator::seeded(seed, customers, products),
    )
}

/// Returns a token cancelled on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("cancellation requested");
            trigger.cancel();
        }
    });
    token
}

/// Maps a configuration error into a CLI error.
fn config_error(err: xpart_config::ConfigError) -> CliError {
    CliError::new(format!("invalid configuration: {err}"))
}

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
