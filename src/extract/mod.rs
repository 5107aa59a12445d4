// Modality adapters: reduce an uploaded image or audio clip to plain text.
//
// Each adapter returns an `Extraction` rather than a bare string, so callers
// can tell "here is text to classify" apart from "nothing usable came out"
// without comparing against magic strings. The user-visible rendering of the
// non-text outcomes is kept stable for existing clients.

pub mod audio;
pub mod image;
pub mod speech;

use thiserror::Error;

/// Rendered when OCR finds no text lines.
pub const NO_TEXT_IN_IMAGE: &str = "No text detected in image";

/// Rendered when the speech recogniser produces no transcript.
pub const UNINTELLIGIBLE_AUDIO: &str = "Could not understand audio";

/// Outcome of running a modality adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// Text to hand to the classifier.
    Text(String),
    /// The input decoded fine but contained nothing to classify. Carries the
    /// notice shown to the user.
    Empty(&'static str),
    /// Decoding or model failure, already rendered with its user-facing prefix.
    Failed(String),
}

impl Extraction {
    /// The string reported back as `extracted_text`.
    pub fn display_text(&self) -> &str {
        match self {
            Extraction::Text(text) => text,
            Extraction::Empty(notice) => notice,
            Extraction::Failed(message) => message,
        }
    }

    /// Text worth classifying, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Extraction::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Failures inside an adapter. Never surfaced as HTTP errors: each one is
/// folded into `Extraction::Failed` with its display string.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Error extracting text: {0}")]
    ImageDecode(String),
    #[error("Error extracting text: {0}")]
    Ocr(String),
    #[error("Audio processing error: {0}")]
    AudioDecode(String),
    #[error("Audio processing error: {0}")]
    Resample(String),
    #[error("Speech recognition error: {0}")]
    Recognition(String),
}

impl From<ExtractError> for Extraction {
    fn from(err: ExtractError) -> Self {
        Extraction::Failed(err.to_string())
    }
}
