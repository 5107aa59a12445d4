// POST /analyze/audio: transcribe an uploaded clip, then classify the transcript.

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::Json;

use super::{read_upload, respond_to_extraction, AnalysisResponse};
use crate::extract::audio::{allowed_audio_file, speech_to_text};
use crate::web::error::{AnalyzeError, Modality};
use crate::web::AppState;

/// POST /analyze/audio: multipart field `audio`; wav, mp3, m4a, flac or aac.
pub async fn analyze_audio(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AnalysisResponse>, AnalyzeError> {
    let upload = read_upload(multipart, "audio", Modality::Audio)
        .await?
        .ok_or_else(|| AnalyzeError::validation("No audio file provided"))?;

    if upload.filename.is_empty() {
        return Err(AnalyzeError::validation("No audio selected"));
    }
    if !allowed_audio_file(&upload.filename) {
        return Err(AnalyzeError::validation(
            "Invalid audio format. Supported: WAV, MP3, M4A, FLAC, AAC",
        ));
    }

    let extraction = speech_to_text(state.speech.as_ref(), upload.bytes, &upload.filename).await;
    let response =
        respond_to_extraction(state.classifier.as_ref(), extraction, Modality::Audio).await?;
    Ok(Json(response))
}
