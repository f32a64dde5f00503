use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crpt_api::client::{CrptApi, Document};
use crpt_api::config::CrptConfig;

/// Rate-limited client for the CRPT document creation API.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Configuration file (YAML, TOML or JSON); CRPT_* environment
    /// variables override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Submit one or more documents, each read from a JSON file
    Submit {
        /// Detached signature sent with every document
        #[arg(short, long)]
        signature: String,

        /// Document files
        #[arg(required = true)]
        documents: Vec<PathBuf>,
    },
    /// Print the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = match &cli.config {
        Some(path) => CrptConfig::from_file(path),
        None => CrptConfig::from_env(),
    }
    .context("Failed to load configuration")?;

    match cli.command {
        Command::ShowConfig => {
            print!("{}", config.to_yaml()?);
            Ok(())
        }
        Command::Submit {
            signature,
            documents,
        } => submit(&config, &signature, &documents).await,
    }
}

/// Initialize tracing; `RUST_LOG` overrides the default `info` level.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Submit all documents concurrently through a single rate-limited client.
async fn submit(config: &CrptConfig, signature: &str, paths: &[PathBuf]) -> anyhow::Result<()> {
    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let document: Document = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        documents.push((path.clone(), document));
    }

    let api = Arc::new(CrptApi::from_config(config)?);
    info!(
        endpoint = %api.endpoint(),
        request_limit = config.rate_limiting.request_limit,
        interval_ms = config.rate_limiting.interval().as_millis() as u64,
        documents = documents.len(),
        "Submitting documents"
    );

    let submissions = documents.into_iter().map(|(path, document)| {
        let api = Arc::clone(&api);
        let signature = signature.to_string();
        async move {
            let result = api.create_document(&document, &signature).await;
            (path, result)
        }
    });

    let mut failures = 0usize;
    for (path, result) in futures::future::join_all(submissions).await {
        match result {
            Ok(true) => info!(path = %path.display(), "Document accepted"),
            Ok(false) => {
                failures += 1;
                error!(path = %path.display(), "Document rejected");
            }
            Err(e) => {
                failures += 1;
                error!(path = %path.display(), error = %e, "Document submission failed");
            }
        }
    }

    api.shutdown();

    if failures > 0 {
        anyhow::bail!("{failures} of {} documents were not accepted", paths.len());
    }
    Ok(())
}
