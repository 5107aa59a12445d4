// POST /analyze/image: OCR an uploaded image, then classify what it says.

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::Json;

use super::{read_upload, respond_to_extraction, AnalysisResponse};
use crate::extract::image::extract_text_from_image;
use crate::web::error::{AnalyzeError, Modality};
use crate::web::AppState;

/// POST /analyze/image: multipart field `image`.
pub async fn analyze_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AnalysisResponse>, AnalyzeError> {
    let upload = read_upload(multipart, "image", Modality::Image)
        .await?
        .ok_or_else(|| AnalyzeError::validation("No image file provided"))?;

    if upload.filename.is_empty() {
        return Err(AnalyzeError::validation("No image selected"));
    }

    let extraction = extract_text_from_image(state.ocr.as_ref(), upload.bytes).await;
    let response =
        respond_to_extraction(state.classifier.as_ref(), extraction, Modality::Image).await?;
    Ok(Json(response))
}
