// Audio adapter: speech-to-text over an uploaded clip.
//
// Pipeline: symphonia decode (any supported container) → downmix to mono →
// rubato resample to 16 kHz → drop the ambient-noise calibration window →
// speech recogniser.
//
// The first half second is treated as room tone: its RMS is measured as the
// noise floor and it is not sent to the recogniser.

use std::io::Cursor;

use rubato::{FftFixedIn, Resampler};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use super::speech::{PcmAudio, Recognition, SpeechRecognizer};
use super::{ExtractError, Extraction, UNINTELLIGIBLE_AUDIO};

/// Upload extensions the audio endpoint accepts (lowercase).
pub const ALLOWED_AUDIO_EXTENSIONS: [&str; 5] = ["wav", "mp3", "m4a", "flac", "aac"];

/// Sample rate handed to the recogniser.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Length of the ambient-noise calibration window at the start of the clip.
pub const CALIBRATION_SECS: f64 = 0.5;

const RESAMPLE_CHUNK: usize = 1024;

/// Extension after the last dot, lowercased. `None` when there is no dot.
pub fn file_extension(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

/// Whether the filename carries one of the accepted audio extensions.
pub fn allowed_audio_file(filename: &str) -> bool {
    file_extension(filename)
        .map(|ext| ALLOWED_AUDIO_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Decode, normalise and transcribe an audio clip.
pub async fn speech_to_text(
    recognizer: &dyn SpeechRecognizer,
    bytes: Vec<u8>,
    filename: &str,
) -> Extraction {
    let extension = file_extension(filename);

    let prepared = tokio::task::spawn_blocking(move || prepare_audio(bytes, extension.as_deref()))
        .await
        .map_err(|e| ExtractError::AudioDecode(format!("decoder task failed: {e}")))
        .and_then(|r| r);

    let speech = match prepared {
        Ok(speech) => speech,
        Err(e) => {
            warn!(error = %e, filename, "Audio preparation failed");
            return e.into();
        }
    };

    if speech.samples.is_empty() {
        debug!(filename, "Nothing left after calibration window");
        return Extraction::Empty(UNINTELLIGIBLE_AUDIO);
    }

    match recognizer.recognize(&speech).await {
        Ok(Recognition::Transcript(text)) => Extraction::Text(text),
        Ok(Recognition::Unintelligible) => Extraction::Empty(UNINTELLIGIBLE_AUDIO),
        Err(e) => {
            warn!(error = %e, filename, "Speech recognition failed");
            ExtractError::Recognition(format!("{e:#}")).into()
        }
    }
}

/// Decode → 16 kHz mono → strip calibration window.
fn prepare_audio(bytes: Vec<u8>, extension: Option<&str>) -> Result<PcmAudio, ExtractError> {
    let decoded = decode_to_mono(bytes, extension)?;
    let resampled = resample(decoded, TARGET_SAMPLE_RATE)?;
    let (noise_floor, speech) = calibrate_ambient_noise(resampled, CALIBRATION_SECS);
    debug!(
        noise_floor,
        seconds = speech.duration_secs(),
        "Audio normalised for recognition"
    );
    Ok(speech)
}

/// Decode any supported container into mono f32 samples at the source rate.
pub fn decode_to_mono(bytes: Vec<u8>, extension: Option<&str>) -> Result<PcmAudio, ExtractError> {
    let source = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| ExtractError::AudioDecode(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| ExtractError::AudioDecode("no audio track found".to_string()))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| ExtractError::AudioDecode("unknown sample rate".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| ExtractError::AudioDecode(e.to_string()))?;

    let mut samples = Vec::new();
    let mut packets_read = 0usize;
    let mut packets_decoded = 0usize;
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(ExtractError::AudioDecode(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }
        packets_read += 1;

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => {
                packets_decoded += 1;
                decoded
            }
            // A corrupt packet is skipped, not fatal.
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(error = e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(ExtractError::AudioDecode(e.to_string())),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend(
            buffer
                .samples()
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
        );
    }

    ensure_decoded(packets_read, packets_decoded)?;

    Ok(PcmAudio {
        samples,
        sample_rate,
    })
}

/// A stream with packets but none decodable is corrupt, not silent.
fn ensure_decoded(packets_read: usize, packets_decoded: usize) -> Result<(), ExtractError> {
    if packets_read > 0 && packets_decoded == 0 {
        return Err(ExtractError::AudioDecode(format!(
            "none of {packets_read} audio packets could be decoded"
        )));
    }
    Ok(())
}

/// Resample mono audio to `target_rate`.
pub fn resample(audio: PcmAudio, target_rate: u32) -> Result<PcmAudio, ExtractError> {
    if audio.samples.is_empty() {
        return Ok(PcmAudio {
            samples: Vec::new(),
            sample_rate: target_rate,
        });
    }
    if audio.sample_rate == target_rate {
        return Ok(audio);
    }
    if audio.sample_rate == 0 {
        return Err(ExtractError::Resample("source sample rate is zero".to_string()));
    }

    let resample_err = |e: &dyn std::fmt::Display| ExtractError::Resample(e.to_string());

    let mut resampler = FftFixedIn::<f32>::new(
        audio.sample_rate as usize,
        target_rate as usize,
        RESAMPLE_CHUNK,
        2,
        1,
    )
    .map_err(|e| resample_err(&e))?;

    let expected_len =
        (audio.samples.len() as u64 * target_rate as u64 / audio.sample_rate as u64) as usize;
    let delay = resampler.output_delay();
    let mut out: Vec<f32> = Vec::with_capacity(expected_len + delay + RESAMPLE_CHUNK);

    // FftFixedIn rounds the chunk size to its FFT length, so ask it each time.
    let input = &audio.samples;
    let mut pos = 0;
    while input.len() - pos >= resampler.input_frames_next() {
        let needed = resampler.input_frames_next();
        let frames = resampler
            .process(&[&input[pos..pos + needed]], None)
            .map_err(|e| resample_err(&e))?;
        out.extend_from_slice(&frames[0]);
        pos += needed;
    }
    if pos < input.len() {
        let tail: [&[f32]; 1] = [&input[pos..]];
        let frames = resampler
            .process_partial(Some(&tail[..]), None)
            .map_err(|e| resample_err(&e))?;
        out.extend_from_slice(&frames[0]);
    }
    // Flush the filter so the tail isn't lost to the output delay.
    while out.len() < expected_len + delay {
        let frames = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .map_err(|e| resample_err(&e))?;
        if frames[0].is_empty() {
            break;
        }
        out.extend_from_slice(&frames[0]);
    }

    let samples: Vec<f32> = out.into_iter().skip(delay).take(expected_len).collect();
    Ok(PcmAudio {
        samples,
        sample_rate: target_rate,
    })
}

/// Split off the calibration window. Returns the window's RMS (the noise
/// floor) and the audio that follows it.
pub fn calibrate_ambient_noise(audio: PcmAudio, window_secs: f64) -> (f32, PcmAudio) {
    let window = ((window_secs * audio.sample_rate as f64).round() as usize).min(audio.samples.len());
    let (head, tail) = audio.samples.split_at(window);

    let noise_floor = if head.is_empty() {
        0.0
    } else {
        (head.iter().map(|s| s * s).sum::<f32>() / head.len() as f32).sqrt()
    };

    (
        noise_floor,
        PcmAudio {
            samples: tail.to_vec(),
            sample_rate: audio.sample_rate,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::speech::encode_wav;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records what it was given and replies with a fixed outcome.
    struct Scripted {
        reply: Option<Recognition>,
        seen: Mutex<Option<PcmAudio>>,
    }

    impl Scripted {
        fn new(reply: Option<Recognition>) -> Self {
            Self {
                reply,
                seen: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl SpeechRecognizer for Scripted {
        async fn recognize(&self, audio: &PcmAudio) -> Result<Recognition> {
            *self.seen.lock().unwrap() = Some(audio.clone());
            match &self.reply {
                Some(r) => Ok(r.clone()),
                None => anyhow::bail!("backend unavailable"),
            }
        }
    }

    fn tone(seconds: f64, sample_rate: u32) -> PcmAudio {
        let n = (seconds * sample_rate as f64) as usize;
        PcmAudio {
            samples: (0..n)
                .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / sample_rate as f32).sin() * 0.5)
                .collect(),
            sample_rate,
        }
    }

    #[test]
    fn test_allowed_extensions() {
        assert!(allowed_audio_file("clip.wav"));
        assert!(allowed_audio_file("CLIP.MP3"));
        assert!(allowed_audio_file("voice.memo.m4a"));
        assert!(allowed_audio_file("a.flac"));
        assert!(allowed_audio_file("a.aac"));
        assert!(!allowed_audio_file("clip.txt"));
        assert!(!allowed_audio_file("wav"));
        assert!(!allowed_audio_file("clip.wav.exe"));
        assert!(!allowed_audio_file(""));
    }

    #[test]
    fn test_calibration_window_is_half_a_second() {
        let audio = tone(2.0, TARGET_SAMPLE_RATE);
        let (noise, rest) = calibrate_ambient_noise(audio, CALIBRATION_SECS);
        assert_eq!(rest.samples.len(), 24_000);
        assert!(noise > 0.0);
    }

    #[test]
    fn test_calibration_on_short_clip_leaves_nothing() {
        let audio = tone(0.2, TARGET_SAMPLE_RATE);
        let (_, rest) = calibrate_ambient_noise(audio, CALIBRATION_SECS);
        assert!(rest.samples.is_empty());
    }

    #[test]
    fn test_silence_has_zero_noise_floor() {
        let audio = PcmAudio {
            samples: vec![0.0; 16_000],
            sample_rate: TARGET_SAMPLE_RATE,
        };
        let (noise, _) = calibrate_ambient_noise(audio, CALIBRATION_SECS);
        assert_eq!(noise, 0.0);
    }

    #[test]
    fn test_decode_wav_roundtrip_length() {
        let wav = encode_wav(&tone(1.0, 8_000)).unwrap();
        let decoded = decode_to_mono(wav, Some("wav")).unwrap();
        assert_eq!(decoded.sample_rate, 8_000);
        assert_eq!(decoded.samples.len(), 8_000);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = decode_to_mono(b"not audio at all".to_vec(), Some("mp3")).unwrap_err();
        assert!(err.to_string().starts_with("Audio processing error: "));
    }

    #[test]
    fn test_all_packets_corrupt_is_an_error() {
        let err = ensure_decoded(12, 0).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Audio processing error: none of 12 audio packets could be decoded"
        );
    }

    #[test]
    fn test_some_packets_decoded_is_fine() {
        assert!(ensure_decoded(12, 1).is_ok());
        // An empty stream is silence, left for the caller to report.
        assert!(ensure_decoded(0, 0).is_ok());
    }

    #[test]
    fn test_resample_changes_length_proportionally() {
        let resampled = resample(tone(1.0, 44_100), TARGET_SAMPLE_RATE).unwrap();
        assert_eq!(resampled.sample_rate, TARGET_SAMPLE_RATE);
        let len = resampled.samples.len() as i64;
        assert!((len - 16_000).abs() <= 16, "got {len} samples");
    }

    #[test]
    fn test_resample_same_rate_is_identity() {
        let audio = tone(0.1, TARGET_SAMPLE_RATE);
        let resampled = resample(audio.clone(), TARGET_SAMPLE_RATE).unwrap();
        assert_eq!(resampled, audio);
    }

    #[tokio::test]
    async fn test_transcript_passes_through() {
        let stt = Scripted::new(Some(Recognition::Transcript("hello there".into())));
        let wav = encode_wav(&tone(1.5, TARGET_SAMPLE_RATE)).unwrap();
        let result = speech_to_text(&stt, wav, "clip.wav").await;
        assert_eq!(result, Extraction::Text("hello there".into()));

        let seen = stt.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.sample_rate, TARGET_SAMPLE_RATE);
        assert_eq!(seen.samples.len(), 16_000);
    }

    #[tokio::test]
    async fn test_unintelligible_maps_to_empty() {
        let stt = Scripted::new(Some(Recognition::Unintelligible));
        let wav = encode_wav(&tone(1.0, TARGET_SAMPLE_RATE)).unwrap();
        let result = speech_to_text(&stt, wav, "clip.wav").await;
        assert_eq!(result, Extraction::Empty(UNINTELLIGIBLE_AUDIO));
    }

    #[tokio::test]
    async fn test_backend_error_is_reported() {
        let stt = Scripted::new(None);
        let wav = encode_wav(&tone(1.0, TARGET_SAMPLE_RATE)).unwrap();
        let result = speech_to_text(&stt, wav, "clip.wav").await;
        assert_eq!(
            result,
            Extraction::Failed("Speech recognition error: backend unavailable".into())
        );
    }

    #[tokio::test]
    async fn test_clip_shorter_than_calibration_skips_recognizer() {
        let stt = Scripted::new(Some(Recognition::Transcript("unused".into())));
        let wav = encode_wav(&tone(0.3, TARGET_SAMPLE_RATE)).unwrap();
        let result = speech_to_text(&stt, wav, "clip.wav").await;
        assert_eq!(result, Extraction::Empty(UNINTELLIGIBLE_AUDIO));
        assert!(stt.seen.lock().unwrap().is_none());
    }
}
