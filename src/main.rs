use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use sentra::config::Config;
use sentra::extract::image::OcrsTextRecognizer;
use sentra::extract::speech::HttpSpeechRecognizer;
use sentra::toxicity::onnx::OnnxToxicityClassifier;
use sentra::toxicity::traits::ToxicityClassifier;

/// Sentra: toxicity analysis for text, images, and audio.
///
/// Classifies content across six toxicity categories and reduces the scores
/// to a single verdict. Images are read with OCR and audio is transcribed
/// before classification.
#[derive(Parser)]
#[command(name = "sentra", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the models and serve the HTTP API and browser client
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "5000")]
        port: u16,

        /// Address to bind
        #[arg(long, default_value = "0.0.0.0")]
        bind: String,
    },

    /// Classify a piece of text from the command line
    Analyze {
        /// The text to analyze
        text: String,

        /// Print the verdict as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Download the OCR models (and the toxicity model, if a URL is configured)
    DownloadModel,

    /// Show which models and backends are configured
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sentra=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, bind } => {
            let config = Config::load()?;
            config.require_models()?;
            config.require_speech()?;

            info!("Loading models from {}", config.model_dir.display());
            let classifier = OnnxToxicityClassifier::load(&config.toxicity_dir())?;
            let ocr = OcrsTextRecognizer::load(&config.ocr_dir())?;
            let speech = HttpSpeechRecognizer::new(
                &config.stt_url,
                config.stt_api_key.clone(),
                config.stt_model.clone(),
                config.stt_language.clone(),
            );
            info!(stt_url = %config.stt_url, stt_model = %config.stt_model, "Models ready");

            let state = sentra::web::AppState {
                classifier: Arc::new(classifier),
                ocr: Arc::new(ocr),
                speech: Arc::new(speech),
                max_upload_bytes: config.max_upload_bytes,
            };
            sentra::web::run_server(state, port, &bind).await?;
        }

        Commands::Analyze { text, json } => {
            let config = Config::load()?;
            let text = text.trim();
            if text.is_empty() {
                anyhow::bail!("Text cannot be empty");
            }

            let classifier = OnnxToxicityClassifier::load(&config.toxicity_dir())?;
            let scores = classifier.classify(text).await?;
            let verdict = sentra::scoring::verdict::aggregate(&scores)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&verdict)?);
            } else {
                sentra::output::terminal::display_verdict(text, &verdict);
            }
        }

        Commands::DownloadModel => {
            let config = Config::load()?;
            let model_dir = &config.model_dir;

            println!("Downloading models...");
            println!("  Destination: {}", model_dir.display());

            sentra::toxicity::download::download_models(
                model_dir,
                config.toxicity_model_url.as_deref(),
            )
            .await?;

            println!("\n{}", "Done.".bold());
            println!("Run `sentra check` to confirm, then `sentra serve`.");
        }

        Commands::Check => {
            let config = Config::load()?;
            println!("\n{}", "=== Sentra configuration ===".bold());
            println!("  Model directory: {}", config.model_dir.display());
            print_check(
                "Toxicity model",
                sentra::toxicity::download::toxicity_files_present(&config.model_dir),
                &config.toxicity_dir().display().to_string(),
            );
            print_check(
                "OCR models",
                sentra::toxicity::download::ocr_files_present(&config.model_dir),
                &config.ocr_dir().display().to_string(),
            );
            print_check("Speech-to-text", config.require_speech().is_ok(), &config.stt_url);
            println!(
                "  Upload limit: {} MiB",
                config.max_upload_bytes as f64 / (1024.0 * 1024.0)
            );
        }
    }

    Ok(())
}

fn print_check(name: &str, ok: bool, detail: &str) {
    let status = if ok { "ok".green() } else { "missing".red() };
    println!("  {:<16} {:<8} {}", name, status, detail.dimmed());
}
