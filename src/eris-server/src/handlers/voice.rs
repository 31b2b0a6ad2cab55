//! Speech synthesis and transcription. Both endpoints answer 503 when no
//! voice service is configured.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
};
use eris_core::participant::Side;
use eris_core::store::DebateStore;
use eris_core::voice::{Transcript, VoiceService, encode_wav};
use serde::Deserialize;

use crate::{AppState, auth::AuthUser, error::ApiError};

const MAX_TTS_CHARS: usize = 5_000;

fn voice_service<S: DebateStore>(state: &AppState<S>) -> Result<Arc<dyn VoiceService>, ApiError> {
    state
        .services
        .voice
        .clone()
        .ok_or_else(|| ApiError::Unavailable("voice is not configured".into()))
}

#[derive(Debug, Deserialize)]
pub struct TtsBody {
    pub text: String,
    /// Explicit ElevenLabs voice; wins over `side`.
    pub voice_id: Option<String>,
    /// Use the configured voice for this side.
    pub side: Option<Side>,
}

/// `POST /api/voice/tts`, answered with `audio/wav`.
pub async fn tts<S>(
    State(state): State<AppState<S>>,
    user: AuthUser,
    Json(body): Json<TtsBody>,
) -> Result<Response, ApiError>
where
    S: DebateStore + Clone + 'static,
{
    let voice = voice_service(&state)?;
    let text = body.text.trim();
    if text.is_empty() || text.chars().count() > MAX_TTS_CHARS {
        return Err(ApiError::BadRequest(format!(
            "text must be 1 to {MAX_TTS_CHARS} characters"
        )));
    }

    let voice_id = match (body.voice_id, body.side) {
        (Some(id), _) if !id.trim().is_empty() => id,
        (_, Some(side)) => state.config.get_voice(side).to_string(),
        _ => state
            .store
            .get_preferences(user.id())
            .await
            .map_err(ApiError::store)?
            .voice_id
            .unwrap_or_else(|| state.config.voices.moderator_voice.clone()),
    };

    let samples = voice.synthesize(text, &voice_id).await?;
    let wav = encode_wav(&samples, voice.sample_rate())?;
    tracing::debug!(bytes = wav.len(), %voice_id, "synthesized speech");

    Ok((
        [(header::CONTENT_TYPE, HeaderValue::from_static("audio/wav"))],
        wav,
    )
        .into_response())
}

fn file_name_for(mime: &str) -> &'static str {
    match mime.split(';').next().unwrap_or_default().trim() {
        "audio/wav" | "audio/x-wav" | "audio/wave" => "speech.wav",
        "audio/mpeg" | "audio/mp3" => "speech.mp3",
        "audio/ogg" => "speech.ogg",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "speech.m4a",
        _ => "speech.webm",
    }
}

/// `POST /api/voice/transcribe` with a raw audio body typed by `Content-Type`.
pub async fn transcribe<S>(
    State(state): State<AppState<S>>,
    _user: AuthUser,
    headers: HeaderMap,
    audio: Bytes,
) -> Result<Json<Transcript>, ApiError>
where
    S: DebateStore + Clone + 'static,
{
    let voice = voice_service(&state)?;
    if audio.is_empty() {
        return Err(ApiError::BadRequest("audio body is empty".into()));
    }

    let mime = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("audio/webm");

    let transcript = voice
        .transcribe(audio.to_vec(), file_name_for(mime), mime)
        .await?;
    Ok(Json(transcript))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_follows_mime() {
        assert_eq!(file_name_for("audio/wav"), "speech.wav");
        assert_eq!(file_name_for("audio/ogg; codecs=opus"), "speech.ogg");
        assert_eq!(file_name_for("application/octet-stream"), "speech.webm");
    }
}
