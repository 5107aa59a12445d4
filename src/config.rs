use std::env;
use std::path::PathBuf;

use anyhow::Result;

use crate::toxicity::download::{
    default_model_dir, ocr_files_present, ocr_model_dir, toxicity_files_present,
    toxicity_model_dir,
};
use crate::web::DEFAULT_MAX_UPLOAD_BYTES;

/// Default OpenAI-compatible transcription base URL.
pub const DEFAULT_STT_URL: &str = "https://api.openai.com/v1";

/// Central configuration loaded from environment variables.
///
/// All secrets come from env vars (never hardcoded). The .env file
/// is loaded automatically at startup via dotenvy.
pub struct Config {
    /// Root directory for model files (SENTRA_MODEL_DIR)
    pub model_dir: PathBuf,
    /// Base URL to fetch the ONNX toxicity model from (SENTRA_TOXICITY_MODEL_URL)
    pub toxicity_model_url: Option<String>,
    /// OpenAI-compatible speech-to-text base URL (SENTRA_STT_URL)
    pub stt_url: String,
    /// Bearer token for the speech-to-text backend; empty for local servers
    pub stt_api_key: String,
    /// Transcription model name (SENTRA_STT_MODEL)
    pub stt_model: String,
    /// Language hint for transcription; empty disables it (SENTRA_STT_LANGUAGE)
    pub stt_language: Option<String>,
    /// Request body cap for uploads (SENTRA_MAX_UPLOAD_BYTES)
    pub max_upload_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables. Everything has a default.
    pub fn load() -> Result<Self> {
        let model_dir = env::var("SENTRA_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_model_dir());

        let max_upload_bytes = match env::var("SENTRA_MAX_UPLOAD_BYTES") {
            Ok(raw) => raw.trim().parse::<usize>().map_err(|e| {
                anyhow::anyhow!("SENTRA_MAX_UPLOAD_BYTES must be a byte count, got {raw:?}: {e}")
            })?,
            Err(_) => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let stt_language = match env::var("SENTRA_STT_LANGUAGE") {
            Ok(lang) if lang.trim().is_empty() => None,
            Ok(lang) => Some(lang.trim().to_string()),
            Err(_) => Some("en".to_string()),
        };

        Ok(Self {
            model_dir,
            toxicity_model_url: env::var("SENTRA_TOXICITY_MODEL_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            stt_url: env::var("SENTRA_STT_URL").unwrap_or_else(|_| DEFAULT_STT_URL.to_string()),
            stt_api_key: env::var("SENTRA_STT_API_KEY").unwrap_or_default(),
            stt_model: env::var("SENTRA_STT_MODEL").unwrap_or_else(|_| "whisper-1".to_string()),
            stt_language,
            max_upload_bytes,
        })
    }

    /// Directory holding the ONNX classifier and its tokenizer.
    pub fn toxicity_dir(&self) -> PathBuf {
        toxicity_model_dir(&self.model_dir)
    }

    /// Directory holding the OCR models.
    pub fn ocr_dir(&self) -> PathBuf {
        ocr_model_dir(&self.model_dir)
    }

    /// Check that every local model the server needs is on disk.
    /// Call this before loading models so the error says what to do.
    pub fn require_models(&self) -> Result<()> {
        if !toxicity_files_present(&self.model_dir) {
            anyhow::bail!(
                "Toxicity model files not found in {}\n\
                 Set SENTRA_TOXICITY_MODEL_URL and run `sentra download-model`,\n\
                 or copy model.onnx and tokenizer.json there.",
                self.toxicity_dir().display()
            );
        }
        if !ocr_files_present(&self.model_dir) {
            anyhow::bail!(
                "OCR model files not found in {}\n\
                 Run `sentra download-model` to download them.",
                self.ocr_dir().display()
            );
        }
        Ok(())
    }

    /// Check that the speech-to-text backend is usable.
    /// The hosted default needs a key; a custom URL may not.
    pub fn require_speech(&self) -> Result<()> {
        if self.stt_url == DEFAULT_STT_URL && self.stt_api_key.is_empty() {
            anyhow::bail!(
                "SENTRA_STT_API_KEY not set. Add it to your .env file,\n\
                 or point SENTRA_STT_URL at a local transcription server."
            );
        }
        Ok(())
    }
}
