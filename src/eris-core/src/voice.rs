//! Voice module: text-to-speech and speech-to-text through ElevenLabs.
//!
//! Audio is handled as mono 16-bit PCM. Synthesis asks ElevenLabs for raw
//! `pcm_<rate>` output so segments can be joined and written as WAV without
//! decoding.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use crate::config::ElevenLabsConfig;
use crate::error::DebateError;
use crate::retry::RetryPolicy;

/// Pause inserted between synthesized chunks of one speech.
const CHUNK_GAP_SECS: f32 = 0.3;

/// Result of transcribing user audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    #[serde(default)]
    pub language_code: Option<String>,
}

#[async_trait]
pub trait VoiceService: Send + Sync {
    /// Synthesize `text` as mono PCM samples at [`sample_rate`](Self::sample_rate).
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<i16>, DebateError>;

    /// Transcribe an uploaded audio file.
    async fn transcribe(
        &self,
        audio: Vec<u8>,
        file_name: &str,
        mime: &str,
    ) -> Result<Transcript, DebateError>;

    fn sample_rate(&self) -> u32;
}

/// ElevenLabs REST client.
#[derive(Clone)]
pub struct ElevenLabsClient {
    http: reqwest::Client,
    api_key: String,
    config: ElevenLabsConfig,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct TtsBody<'a> {
    text: &'a str,
    model_id: &'a str,
}

impl ElevenLabsClient {
    pub fn new(
        api_key: impl Into<String>,
        config: ElevenLabsConfig,
        retry: RetryPolicy,
    ) -> Result<Self, DebateError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DebateError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            config,
            retry,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    async fn synthesize_chunk(&self, text: &str, voice_id: &str) -> Result<Vec<i16>, DebateError> {
        let response = self
            .http
            .post(self.url(&format!("/v1/text-to-speech/{voice_id}")))
            .query(&[("output_format", format!("pcm_{}", self.config.sample_rate))])
            .header("xi-api-key", &self.api_key)
            .json(&TtsBody {
                text,
                model_id: &self.config.tts_model,
            })
            .send()
            .await?;

        let response = check_status(response).await?;
        let bytes = response.bytes().await?;
        Ok(pcm_from_le_bytes(&bytes))
    }

    async fn transcribe_once(
        &self,
        audio: Vec<u8>,
        file_name: &str,
        mime: &str,
    ) -> Result<Transcript, DebateError> {
        let file = reqwest::multipart::Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str(mime)?;
        let form = reqwest::multipart::Form::new()
            .text("model_id", self.config.stt_model.clone())
            .part("file", file);

        let response = self
            .http
            .post(self.url("/v1/speech-to-text"))
            .header("xi-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await?;

        Ok(check_status(response).await?.json::<Transcript>().await?)
    }
}

#[async_trait]
impl VoiceService for ElevenLabsClient {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<i16>, DebateError> {
        if voice_id.trim().is_empty() {
            return Err(DebateError::Validation("voice ID cannot be empty".into()));
        }

        let chunks = split_into_chunks(text, self.config.max_chunk_chars);
        if chunks.is_empty() {
            return Err(DebateError::Validation("nothing to synthesize".into()));
        }

        let mut segments = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let samples = self
                .retry
                .run("elevenlabs tts", || self.synthesize_chunk(chunk, voice_id))
                .await?;
            segments.push(samples);
        }

        tracing::debug!(voice_id, chunks = chunks.len(), "synthesized speech");
        Ok(combine_audio_segments(
            segments,
            CHUNK_GAP_SECS,
            self.config.sample_rate,
        ))
    }

    async fn transcribe(
        &self,
        audio: Vec<u8>,
        file_name: &str,
        mime: &str,
    ) -> Result<Transcript, DebateError> {
        if audio.is_empty() {
            return Err(DebateError::Validation("audio is empty".into()));
        }

        self.retry
            .run("elevenlabs stt", || {
                self.transcribe_once(audio.clone(), file_name, mime)
            })
            .await
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }
}

/// Turn a non-2xx response into [`DebateError::Upstream`].
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, DebateError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(DebateError::Upstream {
        service: "ElevenLabs",
        status: status.as_u16(),
        message,
    })
}

/// Decode little-endian 16-bit PCM. A trailing odd byte is dropped.
pub fn pcm_from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Split text into chunks that are safe for TTS synthesis.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current_chunk = String::new();

    for sentence in text.split_inclusive(&['.', '!', '?', ';'][..]) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }

        if current_chunk.len() + sentence.len() > max_chars {
            if !current_chunk.is_empty() {
                chunks.push(current_chunk.trim().to_string());
                current_chunk = String::new();
            }

            // A single sentence that is too long is split by commas
            if sentence.len() > max_chars {
                for part in sentence.split_inclusive(',') {
                    if current_chunk.len() + part.len() > max_chars && !current_chunk.is_empty() {
                        chunks.push(current_chunk.trim().to_string());
                        current_chunk = String::new();
                    }
                    current_chunk.push_str(part.trim());
                    current_chunk.push(' ');
                }
            } else {
                current_chunk.push_str(sentence);
                current_chunk.push(' ');
            }
        } else {
            current_chunk.push_str(sentence);
            current_chunk.push(' ');
        }
    }

    if !current_chunk.trim().is_empty() {
        chunks.push(current_chunk.trim().to_string());
    }

    chunks
}

/// Combine multiple audio segments with silence gaps.
pub fn combine_audio_segments(
    segments: Vec<Vec<i16>>,
    gap_seconds: f32,
    sample_rate: u32,
) -> Vec<i16> {
    let gap_samples = (gap_seconds * sample_rate as f32) as usize;
    let silence: Vec<i16> = vec![0; gap_samples];

    let mut combined = Vec::new();

    for (i, segment) in segments.into_iter().enumerate() {
        if i > 0 {
            combined.extend(&silence);
        }
        combined.extend(segment);
    }

    combined
}

fn wav_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Encode mono 16-bit samples as an in-memory WAV file.
pub fn encode_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>, DebateError> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, wav_spec(sample_rate))
            .map_err(|e| DebateError::Audio(format!("Failed to start WAV: {}", e)))?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| DebateError::Audio(format!("Failed to write WAV: {}", e)))?;
        }
        writer
            .finalize()
            .map_err(|e| DebateError::Audio(format!("Failed to finish WAV: {}", e)))?;
    }
    Ok(cursor.into_inner())
}

/// Save audio samples to a WAV file.
pub fn save_wav<P: AsRef<Path>>(
    path: P,
    samples: &[i16],
    sample_rate: u32,
) -> Result<(), DebateError> {
    let bytes = encode_wav(samples, sample_rate)?;
    std::fs::write(path.as_ref(), bytes)
        .map_err(|e| DebateError::Audio(format!("Failed to save WAV: {}", e)))
}

/// Generate filename for debate output.
pub fn generate_output_filename(topic: &str) -> String {
    let sanitized: String = topic
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(50)
        .collect();

    format!("Eris Debate - {}.wav", sanitized.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ElevenLabsClient {
        let config = ElevenLabsConfig {
            api_base: server.uri(),
            sample_rate: 10,
            ..ElevenLabsConfig::default()
        };
        ElevenLabsClient::new("test-key", config, RetryPolicy::none()).unwrap()
    }

    #[test]
    fn test_generate_output_filename() {
        assert_eq!(
            generate_output_filename("Should AI be open source?"),
            "Eris Debate - Should AI be open source_.wav"
        );
    }

    #[test]
    fn test_generate_output_filename_long_unicode() {
        let filename = generate_output_filename(&"é".repeat(100));
        assert!(filename.chars().count() < 70);
    }

    #[test]
    fn test_combine_audio_segments() {
        let combined = combine_audio_segments(vec![vec![1, 1], vec![2, 2]], 0.1, 10);
        assert_eq!(combined, vec![1, 1, 0, 2, 2]);
    }

    #[test]
    fn test_split_into_chunks() {
        let text = "Hello world. This is a test. Another sentence here.";
        let chunks = split_into_chunks(text, 30);
        assert_eq!(chunks.len(), 2);
        for chunk in &chunks {
            assert!(chunk.len() <= 30);
        }
        assert!(split_into_chunks("   ", 30).is_empty());
    }

    #[test]
    fn test_pcm_from_le_bytes() {
        assert_eq!(pcm_from_le_bytes(&[0x01, 0x00, 0xff, 0xff, 0x07]), vec![1, -1]);
    }

    #[test]
    fn test_encode_wav_header() {
        let wav = encode_wav(&[0, 1, 2, 3], 24_000).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");

        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 24_000);
        assert_eq!(reader.len(), 4);
    }

    #[tokio::test]
    async fn test_synthesize_requests_pcm() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/voice-1"))
            .and(query_param("output_format", "pcm_10"))
            .and(header("xi-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x02, 0x00, 0x03, 0x00]))
            .mount(&server)
            .await;

        let samples = client(&server)
            .synthesize("We affirm.", "voice-1")
            .await
            .unwrap();
        assert_eq!(samples, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_synthesize_reports_upstream_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let err = client(&server)
            .synthesize("We affirm.", "voice-1")
            .await
            .unwrap_err();
        match err {
            DebateError::Upstream {
                service, status, message,
            } => {
                assert_eq!(service, "ElevenLabs");
                assert_eq!(status, 401);
                assert_eq!(message, "invalid api key");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_transcribe() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/speech-to-text"))
            .and(header("xi-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "text": "I negate.",
                "language_code": "en"
            })))
            .mount(&server)
            .await;

        let transcript = client(&server)
            .transcribe(vec![1, 2, 3], "speech.webm", "audio/webm")
            .await
            .unwrap();
        assert_eq!(transcript.text, "I negate.");
        assert_eq!(transcript.language_code.as_deref(), Some("en"));
    }

    #[tokio::test]
    async fn test_transcribe_rejects_empty_audio() {
        let server = MockServer::start().await;
        let result = client(&server).transcribe(vec![], "a.wav", "audio/wav").await;
        assert!(matches!(result, Err(DebateError::Validation(_))));
    }
}
