// Request handlers for the three analysis endpoints.
//
// Every handler walks the same states: validate the input, extract text (image
// and audio only), aggregate, respond. The helpers here cover the shared
// middle and tail of that walk.

pub mod audio;
pub mod image;
pub mod text;

use axum::extract::multipart::MultipartRejection;
use axum::extract::Multipart;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::extract::Extraction;
use crate::output::truncate_chars;
use crate::scoring::verdict::{aggregate, ToxicityVerdict};
use crate::toxicity::traits::ToxicityClassifier;
use crate::web::error::{AnalyzeError, Modality};

/// Response body: the verdict plus, for image and audio, what was extracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    #[serde(flatten)]
    pub verdict: ToxicityVerdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
}

/// Classify `text` and aggregate the scores.
pub async fn classify_and_aggregate(
    classifier: &dyn ToxicityClassifier,
    text: &str,
    modality: Modality,
) -> Result<ToxicityVerdict, AnalyzeError> {
    let scores = classifier
        .classify(text)
        .await
        .map_err(|e| AnalyzeError::unexpected(modality, e))?;
    let verdict = aggregate(&scores).map_err(|e| AnalyzeError::unexpected(modality, e))?;

    info!(
        modality = modality.as_str(),
        is_toxic = verdict.is_toxic,
        overall_score = verdict.overall_score,
        detected = verdict.detected_categories.len(),
        text_preview = %truncate_chars(text, 50),
        "Analyzed text"
    );

    Ok(verdict)
}

/// Turn an adapter outcome into a response. Only `Extraction::Text` reaches
/// the classifier; anything else short-circuits to a zero verdict.
pub async fn respond_to_extraction(
    classifier: &dyn ToxicityClassifier,
    extraction: Extraction,
    modality: Modality,
) -> Result<AnalysisResponse, AnalyzeError> {
    let verdict = match extraction.text() {
        Some(text) => classify_and_aggregate(classifier, text, modality).await?,
        None => {
            info!(
                modality = modality.as_str(),
                notice = extraction.display_text(),
                "Nothing to classify, returning zero verdict"
            );
            ToxicityVerdict::zero()
        }
    };

    Ok(AnalysisResponse {
        verdict,
        extracted_text: Some(extraction.display_text().to_string()),
    })
}

/// A file pulled out of a multipart request.
#[derive(Debug)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Find the file field called `field_name`.
///
/// Returns `Ok(None)` when the request isn't multipart or has no such file
/// field. A part without a filename attribute is not a file.
pub async fn read_upload(
    multipart: Result<Multipart, MultipartRejection>,
    field_name: &str,
    modality: Modality,
) -> Result<Option<Upload>, AnalyzeError> {
    let mut multipart = match multipart {
        Ok(m) => m,
        Err(rejection) => {
            debug!(error = %rejection, "Request is not multipart");
            return Ok(None);
        }
    };

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Ok(None),
            Err(e) => return Err(multipart_error(e, modality)),
        };

        if field.name() != Some(field_name) {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };

        let bytes = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, modality))?;

        debug!(field = field_name, filename = %filename, size = bytes.len(), "Received upload");

        return Ok(Some(Upload {
            filename,
            bytes: bytes.to_vec(),
        }));
    }
}

fn multipart_error(err: axum::extract::multipart::MultipartError, modality: Modality) -> AnalyzeError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AnalyzeError::TooLarge(format!("{} upload exceeds the size limit", modality.as_str()))
    } else {
        AnalyzeError::unexpected(modality, anyhow::anyhow!(err.body_text()))
    }
}
