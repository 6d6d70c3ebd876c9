//! Feedvault Ingest - provider file ingestion tool

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use feedvault_common::logging::{init_logging, LogConfig, LogLevel};
use feedvault_ingest::progress::{self, ProgressEvent};
use feedvault_ingest::{
    AdapterSource, IngestSettings, Orchestrator, ProviderRegistry, Providers, RunResult,
    S3Storage, TransformStage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "feedvault-ingest")]
#[command(author, version, about = "Feedvault provider ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest every pending file for a provider
    Run {
        /// Provider name, e.g. affirm
        provider: String,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// List pending files without fetching them
    Pending {
        /// Provider name, e.g. affirm
        provider: String,
    },

    /// List registered providers
    Providers,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Environment variables configure logging; --verbose only raises the level.
    let mut log_config = LogConfig::from_env().unwrap_or_default();
    if cli.verbose {
        log_config.level = LogLevel::Debug;
    }
    if std::env::var("LOG_FILE_PREFIX").is_err() {
        log_config.log_file_prefix = "feedvault-ingest".to_string();
    }

    let _guard = init_logging(&log_config)?;

    match cli.command {
        Command::Providers => {
            for name in ProviderRegistry::builtin().names() {
                println!("{}", name);
            }
        },
        Command::Pending { provider } => {
            let (providers, settings) = load_providers().await?;
            let adapter = providers.build(&provider)?;
            let mut orchestrator = Orchestrator::new(
                adapter,
                TransformStage::from_settings(&settings),
                settings.work_dir.clone(),
            );

            let pending = orchestrator
                .pending()
                .await
                .with_context(|| format!("Failed to list pending files for {}", provider))?;
            info!(provider = %provider, count = pending.len(), "Pending files");
            for handle in pending {
                println!("{}\t{}", handle.remote_path, handle.final_name());
            }
        },
        Command::Run { provider, json } => {
            let (providers, settings) = load_providers().await?;
            let adapter = providers.build(&provider)?;
            let orchestrator = Orchestrator::new(
                adapter,
                TransformStage::from_settings(&settings),
                settings.work_dir.clone(),
            );

            let (sender, mut stream) = progress::channel();
            let bar = create_progress_bar(&provider);
            let render = async {
                while let Some(event) = stream.next().await {
                    match event {
                        ProgressEvent::Progress(percent) => bar.set_position(percent.round() as u64),
                        ProgressEvent::Finished => bar.finish_and_clear(),
                    }
                }
            };

            let (outcome, ()) = tokio::join!(orchestrator.run(sender), render);
            let result = outcome.with_context(|| format!("Run for {} failed", provider))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_summary(&result);
            }
            if result.has_failures() {
                warn!(failed = result.failures.len(), "Run completed with file failures");
            }
        },
    }

    Ok(())
}

async fn load_providers() -> Result<(Providers, IngestSettings)> {
    let settings = IngestSettings::from_env().context("Invalid ingest settings")?;
    let store = S3Storage::new(settings.storage.clone())
        .await
        .context("Failed to initialize object storage")?;
    let providers = Providers::new(ProviderRegistry::builtin(), settings.clone(), Arc::new(store));
    Ok((providers, settings))
}

fn create_progress_bar(provider: &str) -> ProgressBar {
    let pb = ProgressBar::new(100);
    let style = ProgressStyle::default_bar()
        .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}%")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message(format!("Ingesting {}", provider));
    pb
}

fn print_summary(result: &RunResult) {
    println!(
        "{}: {} pending, {} uploaded, {} failed ({:.1}s)",
        result.provider,
        result.total_files,
        result.succeeded,
        result.failures.len(),
        result.duration_secs
    );
    for key in &result.uploaded_keys {
        println!("  + {}", key);
    }
    for failure in &result.failures {
        println!("  ! {} [{}] {}", failure.file.remote_path, failure.kind, failure.error);
    }
}
