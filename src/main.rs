//! AgroScan command line
//!
//! Leaf disease prediction from the terminal: classify a photo, check the
//! classifier, browse scan history, or run the inference API.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use agroscan::catalog::DiseaseInfo;
use agroscan::config::{AgroConfig, BackendKind};
use agroscan::history::HistoryStore;
use agroscan::oracle::ImageRef;
use agroscan::server::{run_server, AppState};
use agroscan::service::PredictionService;
use agroscan::telemetry::init_logging;

#[derive(Parser, Debug)]
#[command(name = "agroscan", version, about = "Plant leaf disease prediction")]
struct Cli {
    /// YAML configuration file.
    #[arg(long, global = true, env = "AGROSCAN_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured classifier backend.
    #[arg(long, global = true, value_parser = parse_backend)]
    backend: Option<BackendKind>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify a leaf photo.
    Predict {
        image: PathBuf,
        /// Fuse several augmented views of the photo.
        #[arg(long)]
        tta: bool,
        /// Do not record the scan in history.
        #[arg(long)]
        no_history: bool,
        /// Print the raw result as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Probe the classifier and report its state.
    Health,
    /// Serve the prediction API over HTTP.
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
    /// Inspect scan history.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryAction {
    /// Most recent scans first.
    List {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Scans per day over the last week.
    Week,
    /// Delete every recorded scan.
    Clear,
}

fn parse_backend(s: &str) -> Result<BackendKind, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = AgroConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    let _log_guard = init_logging(config.log_dir.as_deref())?;

    match cli.command {
        Commands::Predict {
            image,
            tta,
            no_history,
            json,
        } => predict(&config, image, tta, no_history, json).await,
        Commands::Health => health(&config).await,
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.bind_address.clone());
            let service = PredictionService::from_config(&config).await?;
            let state = AppState {
                service: Arc::new(service),
                input_size: config.input_size,
            };
            run_server(state, &bind).await
        }
        Commands::History { action } => history(&config, action).await,
    }
}

async fn predict(config: &AgroConfig, path: PathBuf, tta: bool, no_history: bool, json: bool) -> Result<()> {
    let service = PredictionService::from_config(config).await?;
    let image = ImageRef::file(path);

    let result = match service.predict(&image, tta).await {
        Ok(result) => result,
        Err(e) => {
            eprintln!("{}", e.user_message(config.locale));
            return Err(e).context("Prediction failed");
        }
    };

    if !no_history {
        let store = HistoryStore::new(&config.history_path);
        let entry = store.record(&image, &result).await?;
        info!("Saved scan {} to {}", entry.id, store.path().display());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let top = &result.top_prediction;
    let disease = DiseaseInfo::for_label(&top.label);
    println!("{} ({:.1}%)", disease.name, top.confidence * 100.0);
    println!("Severity: {:?}", disease.severity);
    println!("{}", disease.description);
    println!();
    for entry in result.predictions.iter() {
        println!("  {:<10} {:>6.2}%", entry.label, entry.confidence * 100.0);
    }
    println!();
    for tip in disease.recommendations {
        println!("  - {}", tip);
    }
    println!(
        "\n{} in {}ms",
        if result.used_tta { "TTA" } else { "Single pass" },
        result.processing_time_ms
    );
    Ok(())
}

async fn health(config: &AgroConfig) -> Result<()> {
    let service = PredictionService::from_config(config).await?;
    let snapshot = service.health().await;
    println!("{} oracle: {:?}", service.oracle_name(), snapshot.state);
    if let Some(checked) = snapshot.last_checked {
        println!("Checked at {}", checked.to_rfc3339());
    }
    Ok(())
}

async fn history(config: &AgroConfig, action: HistoryAction) -> Result<()> {
    let store = HistoryStore::new(&config.history_path);
    match action {
        HistoryAction::List { limit } => {
            let entries = store.list().await?;
            if entries.is_empty() {
                println!("No scans recorded yet");
            }
            for entry in entries.iter().take(limit) {
                println!(
                    "{}  {:<10} {:>6.2}%  {}",
                    entry.recorded_at.format("%Y-%m-%d %H:%M"),
                    entry.label,
                    entry.confidence * 100.0,
                    entry.image_uri
                );
            }
        }
        HistoryAction::Week => {
            let today = Utc::now().date_naive();
            let counts = store.last_seven_days(today).await?;
            for (offset, count) in counts.iter().enumerate() {
                let day = today - chrono::Duration::days(6 - offset as i64);
                println!("{}  {}", day.format("%a %d"), "#".repeat(*count as usize));
            }
        }
        HistoryAction::Clear => {
            store.clear().await?;
            println!("History cleared");
        }
    }
    Ok(())
}
