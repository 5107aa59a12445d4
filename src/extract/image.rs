// Image adapter: OCR over uploaded image bytes.
//
// Decoding happens here (via the `image` crate) so every OCR backend receives
// the same RGB buffer. The default backend is ocrs: a text detection model
// finds word boxes, lines are assembled from them, and a recognition model
// reads each line.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use image::RgbImage;
use ocrs::{ImageSource, OcrEngine, OcrEngineParams};
use rten::Model;
use tracing::{debug, warn};

use super::{ExtractError, Extraction, NO_TEXT_IN_IMAGE};
use crate::toxicity::download::{OCR_DETECTION_FILE, OCR_RECOGNITION_FILE};

/// Trait for reading text lines out of a decoded image.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Return the text lines found in the image, top to bottom.
    async fn read_lines(&self, image: RgbImage) -> Result<Vec<String>>;
}

/// OCR backed by the ocrs detection + recognition models.
pub struct OcrsTextRecognizer {
    engine: Arc<OcrEngine>,
}

impl OcrsTextRecognizer {
    /// Load both `.rten` models from the given directory.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let detection_path = model_dir.join(OCR_DETECTION_FILE);
        let recognition_path = model_dir.join(OCR_RECOGNITION_FILE);

        for path in [&detection_path, &recognition_path] {
            if !path.exists() {
                anyhow::bail!(
                    "OCR model not found: {}\nRun `sentra download-model` to download it.",
                    path.display()
                );
            }
        }

        let detection_model = Model::load_file(&detection_path)
            .with_context(|| format!("Failed to load {}", detection_path.display()))?;
        let recognition_model = Model::load_file(&recognition_path)
            .with_context(|| format!("Failed to load {}", recognition_path.display()))?;

        let engine = OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .context("Failed to build OCR engine")?;

        debug!("Loaded OCR models from {}", model_dir.display());

        Ok(Self {
            engine: Arc::new(engine),
        })
    }
}

#[async_trait]
impl TextRecognizer for OcrsTextRecognizer {
    async fn read_lines(&self, image: RgbImage) -> Result<Vec<String>> {
        let engine = Arc::clone(&self.engine);

        tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
            let source = ImageSource::from_bytes(image.as_raw(), image.dimensions())
                .map_err(|e| anyhow::anyhow!("Unsupported image layout: {}", e))?;
            let input = engine.prepare_input(source)?;
            let word_rects = engine.detect_words(&input)?;
            let line_rects = engine.find_text_lines(&input, &word_rects);
            let lines = engine.recognize_text(&input, &line_rects)?;

            let text_lines: Vec<String> = lines
                .iter()
                .flatten()
                .map(|line| line.to_string())
                .filter(|line| !line.trim().is_empty())
                .collect();
            Ok(text_lines)
        })
        .await
        .context("spawn_blocking panicked")?
    }
}

/// Decode image bytes and run OCR over them.
///
/// Lines are joined with newlines. No lines yields `Extraction::Empty`; a
/// decode or OCR failure yields `Extraction::Failed`.
pub async fn extract_text_from_image(recognizer: &dyn TextRecognizer, bytes: Vec<u8>) -> Extraction {
    let image = match decode_image(bytes).await {
        Ok(image) => image,
        Err(e) => {
            warn!(error = %e, "Image decode failed");
            return e.into();
        }
    };

    debug!(width = image.width(), height = image.height(), "Running OCR");

    match recognizer.read_lines(image).await {
        Ok(lines) if lines.is_empty() => Extraction::Empty(NO_TEXT_IN_IMAGE),
        Ok(lines) => Extraction::Text(lines.join("\n")),
        Err(e) => {
            warn!(error = %e, "OCR failed");
            ExtractError::Ocr(format!("{e:#}")).into()
        }
    }
}

async fn decode_image(bytes: Vec<u8>) -> Result<RgbImage, ExtractError> {
    tokio::task::spawn_blocking(move || {
        image::load_from_memory(&bytes)
            .map(|img| img.into_rgb8())
            .map_err(|e| ExtractError::ImageDecode(e.to_string()))
    })
    .await
    .map_err(|e| ExtractError::ImageDecode(format!("decoder task failed: {e}")))?
}
