// Model download helper.
//
// Two sets of files live under the model directory:
// 1. Detoxify `original` exported to ONNX: toxicity classification.
//    There is no canonical hosted export, so the base URL comes from
//    SENTRA_TOXICITY_MODEL_URL; without it the files must be copied in by hand.
// 2. ocrs text detection + recognition models: OCR (~12MB total).
//
// Files are stored in a platform-appropriate directory
// (~/.local/share/sentra/models/ on Linux) so they persist across runs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Public bucket hosting the ocrs models.
const OCR_MODELS_URL: &str = "https://ocrs-models.s3-accelerate.amazonaws.com";

/// Files for the toxicity model (stored in a subdirectory).
pub const TOXICITY_MODEL_FILE: &str = "model.onnx";
pub const TOXICITY_TOKENIZER_FILE: &str = "tokenizer.json";

/// Files for the OCR models (stored in a subdirectory).
pub const OCR_DETECTION_FILE: &str = "text-detection.rten";
pub const OCR_RECOGNITION_FILE: &str = "text-recognition.rten";

/// Returns the default directory for storing model files.
/// Uses the platform data directory: ~/.local/share/sentra/models/ on Linux.
pub fn default_model_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sentra")
        .join("models")
}

/// Subdirectory within model_dir for the toxicity classifier.
pub fn toxicity_model_dir(base: &Path) -> PathBuf {
    base.join("detoxify-original")
}

/// Subdirectory within model_dir for the OCR models.
pub fn ocr_model_dir(base: &Path) -> PathBuf {
    base.join("ocrs")
}

/// Check whether both toxicity model files exist.
pub fn toxicity_files_present(base: &Path) -> bool {
    let dir = toxicity_model_dir(base);
    dir.join(TOXICITY_MODEL_FILE).exists() && dir.join(TOXICITY_TOKENIZER_FILE).exists()
}

/// Check whether both OCR model files exist.
pub fn ocr_files_present(base: &Path) -> bool {
    let dir = ocr_model_dir(base);
    dir.join(OCR_DETECTION_FILE).exists() && dir.join(OCR_RECOGNITION_FILE).exists()
}

/// Download all models into `dir`.
///
/// Shows progress bars for large files. Skips files that already exist.
/// Creates directories as needed. The toxicity model is only fetched when
/// `toxicity_url` is given.
pub async fn download_models(dir: &Path, toxicity_url: Option<&str>) -> Result<()> {
    // --- Toxicity model (Detoxify original, ONNX export) ---
    println!("\nToxicity model (detoxify original):");

    let tox_dir = toxicity_model_dir(dir);
    match toxicity_url {
        Some(base_url) => {
            std::fs::create_dir_all(&tox_dir).with_context(|| {
                format!("Failed to create model directory: {}", tox_dir.display())
            })?;
            let base_url = base_url.trim_end_matches('/');
            fetch_if_missing(base_url, TOXICITY_TOKENIZER_FILE, &tox_dir, false).await?;
            fetch_if_missing(base_url, TOXICITY_MODEL_FILE, &tox_dir, true).await?;
        }
        None if toxicity_files_present(dir) => {
            println!("  {TOXICITY_MODEL_FILE}, {TOXICITY_TOKENIZER_FILE} (already exist)");
        }
        None => {
            println!(
                "  Skipped: set SENTRA_TOXICITY_MODEL_URL, or copy {} and {} into {}",
                TOXICITY_MODEL_FILE,
                TOXICITY_TOKENIZER_FILE,
                tox_dir.display()
            );
        }
    }

    // --- OCR models (ocrs) ---
    println!("\nOCR models (ocrs):");

    let ocr_dir = ocr_model_dir(dir);
    std::fs::create_dir_all(&ocr_dir)
        .with_context(|| format!("Failed to create OCR model directory: {}", ocr_dir.display()))?;
    fetch_if_missing(OCR_MODELS_URL, OCR_DETECTION_FILE, &ocr_dir, true).await?;
    fetch_if_missing(OCR_MODELS_URL, OCR_RECOGNITION_FILE, &ocr_dir, true).await?;

    Ok(())
}

async fn fetch_if_missing(base_url: &str, file: &str, dir: &Path, show_progress: bool) -> Result<()> {
    let dest = dir.join(file);
    if dest.exists() {
        info!(file, "Model file already exists, skipping");
        println!("  {file} (already exists)");
        return Ok(());
    }
    println!("  Downloading {file}...");
    download_file(&format!("{base_url}/{file}"), &dest, show_progress).await
}

/// Download a single file from a URL to a local path.
/// If `show_progress` is true, display a progress bar.
async fn download_file(url: &str, dest: &Path, show_progress: bool) -> Result<()> {
    let client = reqwest::Client::new();
    let mut response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to download {}", url))?;

    if !response.status().is_success() {
        anyhow::bail!("Download failed with status {}: {}", response.status(), url);
    }

    let pb = if show_progress {
        Some(progress_bar(response.content_length()))
    } else {
        None
    };

    let mut bytes = Vec::with_capacity(response.content_length().unwrap_or(0) as usize);
    while let Some(chunk) = response
        .chunk()
        .await
        .context("Failed to read response body")?
    {
        bytes.extend_from_slice(&chunk);
        if let Some(ref pb) = pb {
            pb.set_position(bytes.len() as u64);
        }
    }

    std::fs::write(dest, &bytes).with_context(|| format!("Failed to write {}", dest.display()))?;

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    info!("Downloaded {} to {}", url, dest.display());
    Ok(())
}

fn progress_bar(total_size: Option<u64>) -> ProgressBar {
    match total_size {
        Some(size) => {
            let pb = ProgressBar::new(size);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("    [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=> "),
            );
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("    {spinner} {bytes}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb
        }
    }
}
