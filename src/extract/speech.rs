// Speech recognition backends.
//
// The recogniser receives already-normalised audio (16 kHz mono f32) and
// either returns a transcript or reports that nothing intelligible was said.
// Transport or backend failures come back as errors.
//
// HttpSpeechRecognizer talks to any OpenAI-compatible transcription endpoint
// (`POST {base}/audio/transcriptions`), which covers hosted Whisper as well as
// local whisper.cpp / faster-whisper servers.

use std::io::Cursor;

use anyhow::{Context, Result};
use async_trait::async_trait;
use hound::{SampleFormat, WavSpec, WavWriter};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

/// Mono PCM audio in [-1, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct PcmAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PcmAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// What the recogniser made of the audio.
#[derive(Debug, Clone, PartialEq)]
pub enum Recognition {
    Transcript(String),
    Unintelligible,
}

/// Trait for turning speech into text.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn recognize(&self, audio: &PcmAudio) -> Result<Recognition>;
}

/// OpenAI-compatible transcription client.
pub struct HttpSpeechRecognizer {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    language: Option<String>,
}

impl HttpSpeechRecognizer {
    pub fn new(base_url: &str, api_key: String, model: String, language: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            language,
        }
    }
}

#[async_trait]
impl SpeechRecognizer for HttpSpeechRecognizer {
    async fn recognize(&self, audio: &PcmAudio) -> Result<Recognition> {
        let url = format!("{}/audio/transcriptions", self.base_url);
        let wav = encode_wav(audio)?;

        let file = Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .context("Invalid MIME type for audio part")?;
        let mut form = Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("response_format", "json");
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        let mut request = self.client.post(&url).multipart(form);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request
            .send()
            .await
            .context("Failed to call transcription endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Transcription endpoint returned {}: {}", status, body);
        }

        let body: TranscriptionResponse = response
            .json()
            .await
            .context("Failed to parse transcription response")?;

        debug!(
            chars = body.text.len(),
            seconds = audio.duration_secs(),
            "Transcribed audio"
        );

        Ok(interpret_transcript(body.text))
    }
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

/// A blank transcript means the backend heard nothing it could understand.
fn interpret_transcript(text: String) -> Recognition {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Recognition::Unintelligible
    } else {
        Recognition::Transcript(trimmed.to_string())
    }
}

/// Encode mono f32 samples as a 16-bit PCM WAV file.
pub fn encode_wav(audio: &PcmAudio) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = WavWriter::new(&mut cursor, spec).context("Failed to start WAV stream")?;
    for &sample in &audio.samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(value).context("Failed to write WAV sample")?;
    }
    writer.finalize().context("Failed to finalize WAV stream")?;

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_transcript_is_unintelligible() {
        assert_eq!(interpret_transcript("   ".into()), Recognition::Unintelligible);
        assert_eq!(interpret_transcript(String::new()), Recognition::Unintelligible);
    }

    #[test]
    fn test_transcript_is_trimmed() {
        assert_eq!(
            interpret_transcript(" you are great \n".into()),
            Recognition::Transcript("you are great".into())
        );
    }

    #[test]
    fn test_wav_round_trips_through_hound() {
        let audio = PcmAudio {
            samples: vec![0.0, 1.0, -1.0, 0.5],
            sample_rate: 16_000,
        };
        let wav = encode_wav(&audio).unwrap();

        let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16_000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_format, SampleFormat::Int);

        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, i16::MAX, -i16::MAX, i16::MAX / 2]);
    }

    #[test]
    fn test_out_of_range_samples_are_clamped() {
        let audio = PcmAudio {
            samples: vec![3.0, -3.0],
            sample_rate: 8_000,
        };
        let wav = encode_wav(&audio).unwrap();
        let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![i16::MAX, -i16::MAX]);
    }

    #[test]
    fn test_duration() {
        let audio = PcmAudio {
            samples: vec![0.0; 8_000],
            sample_rate: 16_000,
        };
        assert!((audio.duration_secs() - 0.5).abs() < 1e-12);
    }

    // ============================================================
    // HttpSpeechRecognizer against a local transcription server
    // ============================================================

    use std::sync::{Arc, Mutex};

    use axum::extract::{Multipart, State};
    use axum::http::{header, HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::{Json, Router};

    use crate::extract::audio::speech_to_text;
    use crate::extract::Extraction;

    /// What the transcription server received.
    #[derive(Debug, Default)]
    struct Received {
        authorization: Option<String>,
        fields: Vec<(String, String)>,
        file: Option<(String, Vec<u8>)>,
    }

    type Shared = Arc<Mutex<Received>>;

    async fn transcribe(
        State(received): State<Shared>,
        headers: HeaderMap,
        mut multipart: Multipart,
    ) -> Json<serde_json::Value> {
        let mut seen = Received {
            authorization: headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            ..Default::default()
        };
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(filename) => {
                    seen.file = Some((filename, field.bytes().await.unwrap().to_vec()));
                }
                None => seen.fields.push((name, field.text().await.unwrap())),
            }
        }
        *received.lock().unwrap() = seen;
        Json(serde_json::json!({ "text": "  hello there \n" }))
    }

    async fn overloaded() -> impl IntoResponse {
        (StatusCode::SERVICE_UNAVAILABLE, "model overloaded")
    }

    /// Serve `router` on an ephemeral port and return its base URL.
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/v1")
    }

    async fn transcription_server() -> (String, Shared) {
        let received = Shared::default();
        let router = Router::new()
            .route("/v1/audio/transcriptions", post(transcribe))
            .with_state(received.clone());
        (serve(router).await, received)
    }

    fn one_second() -> PcmAudio {
        PcmAudio {
            samples: vec![0.25; 16_000],
            sample_rate: 16_000,
        }
    }

    fn field<'a>(received: &'a Received, name: &str) -> Option<&'a str> {
        received
            .fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    #[tokio::test]
    async fn test_http_recognizer_sends_form_and_auth() {
        let (base_url, received) = transcription_server().await;
        let recognizer = HttpSpeechRecognizer::new(
            &format!("{base_url}/"),
            "sk-test".into(),
            "whisper-1".into(),
            Some("en".into()),
        );

        let result = recognizer.recognize(&one_second()).await.unwrap();
        assert_eq!(result, Recognition::Transcript("hello there".into()));

        let received = received.lock().unwrap();
        assert_eq!(received.authorization.as_deref(), Some("Bearer sk-test"));
        assert_eq!(field(&received, "model"), Some("whisper-1"));
        assert_eq!(field(&received, "response_format"), Some("json"));
        assert_eq!(field(&received, "language"), Some("en"));

        let (filename, wav) = received.file.as_ref().unwrap();
        assert_eq!(filename, "audio.wav");
        let reader = hound::WavReader::new(Cursor::new(wav.clone())).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.len(), 16_000);
    }

    #[tokio::test]
    async fn test_http_recognizer_without_key_or_language() {
        let (base_url, received) = transcription_server().await;
        let recognizer =
            HttpSpeechRecognizer::new(&base_url, String::new(), "base.en".into(), None);

        recognizer.recognize(&one_second()).await.unwrap();

        let received = received.lock().unwrap();
        assert_eq!(received.authorization, None);
        assert_eq!(field(&received, "model"), Some("base.en"));
        assert_eq!(field(&received, "language"), None);
    }

    #[tokio::test]
    async fn test_http_error_status_becomes_failed_extraction() {
        let router = Router::new().route("/v1/audio/transcriptions", post(overloaded));
        let base_url = serve(router).await;
        let recognizer =
            HttpSpeechRecognizer::new(&base_url, "sk-test".into(), "whisper-1".into(), None);

        let err = recognizer.recognize(&one_second()).await.unwrap_err();
        assert!(err.to_string().contains("503"), "{err}");

        let clip = PcmAudio {
            samples: vec![0.25; 24_000],
            sample_rate: 16_000,
        };
        let result = speech_to_text(&recognizer, encode_wav(&clip).unwrap(), "clip.wav").await;
        match result {
            Extraction::Failed(message) => {
                assert!(
                    message.starts_with("Speech recognition error: Transcription endpoint returned 503"),
                    "{message}"
                );
                assert!(message.ends_with("model overloaded"), "{message}");
            }
            other => panic!("expected a failed extraction, got {other:?}"),
        }
    }
}
