//! target-miso - Main entry point

use anyhow::Context;
use clap::Parser;
use miso_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;
use std::process;
use target_miso::transform::load_templates;
use target_miso::{BatchingUploader, Config, MisoClient, Pipeline};
use tokio::io::BufReader;
use tracing::{debug, error, info};

/// Singer target for the Miso data API
#[derive(Parser, Debug)]
#[command(name = "target-miso")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the JSON config file
    #[arg(short, long)]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .output(LogOutput::Console)
        .log_file_prefix("target-miso")
        .build();

    // Environment variables take precedence
    let log_config = match log_config.clone().with_env_overrides() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: ignoring invalid logging environment: {}", e);
            log_config
        },
    };

    // Hold the guard so buffered file logs are written before exit
    let _guard = init_logging(&log_config).unwrap_or_else(|e| {
        eprintln!("Warning: failed to initialize logging: {}", e);
        None
    });

    if let Err(e) = run(&cli).await {
        let message = format!("{:#}", e);
        error!(error = %message, "target-miso failed");
        eprintln!("Error: {}", message);
        process::exit(1);
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = Config::load(&cli.config)?;
    info!(
        api_server = %config.api_server,
        template_folder = %config.template_folder.display(),
        use_async = config.use_async,
        dry_run = config.dry_run,
        insert_only = config.insert_only,
        "Starting target-miso"
    );

    let templates = load_templates(&config.template_folder)?;
    let client = MisoClient::new(config.client_config())?;
    let uploader = BatchingUploader::new(client, config.uploader_config());

    let mut pipeline = Pipeline::new(uploader, templates, config.pipeline_options());
    let input = BufReader::new(tokio::io::stdin());

    if let Some(state) = pipeline.run(input).await? {
        emit_state(&state).context("Failed to write state to stdout")?;
    }

    Ok(())
}

/// Write the checkpoint as one line on stdout
fn emit_state(state: &Value) -> std::io::Result<()> {
    let line = serde_json::to_string(state)?;
    debug!(state = %line, "Emitting state");

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{}", line)?;
    handle.flush()
}
