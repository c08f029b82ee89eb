//! Task Result Bridge
//!
//! Webhook server that writes the latest task result into a CRM entity field.

use anyhow::Result;
use clap::Parser;
use serde_json::json;
use std::fs::OpenOptions;
use std::sync::Arc;
use task_result_bridge::cli::{Cli, Command};
use task_result_bridge::config::{Config, ConfigLoader};
use task_result_bridge::fields::FieldIdentifier;
use task_result_bridge::logging::{FileSink, LogLevelFilter, Logger};
use task_result_bridge::server::{BridgeServer, HttpTransportFactory, start_server};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

/// Diagnostic logger: tracing plus the optional append-only file.
fn build_logger(config: &Config) -> Logger {
    let level_filter = Arc::new(LogLevelFilter::new(config.diagnostics.level));
    let mut logger = Logger::new()
        .with_name("bridge")
        .with_level_filter(level_filter);
    if let Some(path) = &config.diagnostics.file {
        logger = logger.with_sink(Arc::new(FileSink::new(path.clone())));
    }
    logger
}

fn print_field_candidates(field_code: &str) -> Result<()> {
    let field = FieldIdentifier::parse(field_code);
    let report = json!({
        "raw": field.raw(),
        "converted": field.converted(),
        "candidates": field.candidates(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on --log option
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    match cli.log.as_str() {
        "0" | "off" => {}
        "1" | "stdout" => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(std::io::stdout)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        "2" | "stderr" => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        filename => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(filename)?;
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(file)
                .with_ansi(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    if let Some(Command::Fields { field_code }) = &cli.command {
        return print_field_candidates(field_code);
    }

    // SAFETY: set at startup before the runtime spawns any task
    if let Some(config_path) = &cli.config {
        unsafe {
            std::env::set_var("TASK_BRIDGE_CONFIG_PATH", config_path);
        }
    }
    let mut loader = ConfigLoader::load()?;
    if let Some(path) = loader.config_path() {
        info!("Using config {}", path.display());
    }

    let config = loader.config_mut();
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(path) = &cli.diagnostic_log {
        config.diagnostics.file = Some(path.into());
    }
    let config = loader.into_config();

    let logger = build_logger(&config);
    let transports = Arc::new(HttpTransportFactory::new(&config.remote)?);
    let state = BridgeServer::new(transports, logger);

    start_server(state, &config.server).await
}
