// POST /analyze/text: classify a JSON-submitted string.
//
// Body: {"text": "..."}. The text is trimmed before classification; missing,
// malformed, or blank input is a 400.

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;

use super::{classify_and_aggregate, AnalysisResponse};
use crate::web::error::{AnalyzeError, Modality};
use crate::web::AppState;

/// POST /analyze/text: verdict for the submitted text.
pub async fn analyze_text(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<AnalysisResponse>, AnalyzeError> {
    let text = parse_text(&body)?;
    let verdict = classify_and_aggregate(state.classifier.as_ref(), &text, Modality::Text).await?;

    Ok(Json(AnalysisResponse {
        verdict,
        extracted_text: None,
    }))
}

/// Pull the trimmed `text` field out of a JSON body.
fn parse_text(body: &[u8]) -> Result<String, AnalyzeError> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|_| AnalyzeError::validation("No text provided"))?;

    let text = match value.get("text") {
        None | Some(serde_json::Value::Null) => {
            return Err(AnalyzeError::validation("No text provided"))
        }
        Some(serde_json::Value::String(s)) => s.trim(),
        Some(_) => return Err(AnalyzeError::validation("Text must be a string")),
    };

    if text.is_empty() {
        return Err(AnalyzeError::validation("Text cannot be empty"));
    }
    Ok(text.to_string())
}
