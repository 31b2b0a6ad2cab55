//! AI judging: per-speech feedback and a decision for the round.

use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::CreateChatCompletionRequestArgs;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DebateError;
use crate::orchestrator::DebateMessage;
use crate::participant::Side;
use crate::retry::RetryPolicy;
use crate::speech::{complete_chat, openai_client, system_message, user_message};

/// Feedback on a single speech.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechFeedback {
    /// 1 (weak) to 10 (excellent).
    pub score: u8,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub summary: String,
}

/// A judge's decision for a completed round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub winner: Side,
    pub reason: String,
}

#[async_trait]
pub trait FeedbackProvider: Send + Sync {
    async fn speech_feedback(
        &self,
        topic: &str,
        speech: &DebateMessage,
    ) -> Result<SpeechFeedback, DebateError>;

    async fn verdict(
        &self,
        topic: &str,
        transcript: &[DebateMessage],
    ) -> Result<Verdict, DebateError>;
}

const FEEDBACK_PROMPT: &str = r#"You are an experienced Public Forum debate coach.
Evaluate the speech you are given for clarity, argument structure, use of evidence, clash with the opponent, and delivery within time.

Reply with a single JSON object and nothing else:
{"score": <integer 1-10>, "strengths": [<short strings>], "improvements": [<short strings>], "summary": "<two sentences>"}"#;

const VERDICT_PROMPT: &str = r#"You are a Public Forum debate judge.
Decide the round on the arguments actually made, weighing the final focus speeches most heavily. Do not intervene with your own arguments.

Reply with a single JSON object and nothing else:
{"winner": "pro" | "con", "reason": "<reason for decision, at most five sentences>"}"#;

/// Judge backed by an OpenAI-compatible chat API.
#[derive(Clone)]
pub struct OpenAiJudge {
    client: Client<OpenAIConfig>,
    model: String,
    retry: RetryPolicy,
}

impl OpenAiJudge {
    pub fn new(
        api_base: &str,
        api_key: &str,
        model: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, DebateError> {
        Ok(Self {
            client: openai_client(api_base, api_key, timeout)?,
            model: model.into(),
            retry,
        })
    }

    async fn ask(&self, system: &str, user: String) -> Result<String, DebateError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .max_completion_tokens(600u32)
            .messages(vec![system_message(system.to_string()), user_message(user)])
            .build()?;
        complete_chat(&self.client, &self.retry, &request).await
    }
}

#[async_trait]
impl FeedbackProvider for OpenAiJudge {
    async fn speech_feedback(
        &self,
        topic: &str,
        speech: &DebateMessage,
    ) -> Result<SpeechFeedback, DebateError> {
        let user = format!(
            "RESOLUTION: {topic}\nSPEECH ({}, {} side):\n{}",
            speech.phase.display_name(),
            speech.side.display_name(),
            speech.content
        );
        let reply = self.ask(FEEDBACK_PROMPT, user).await?;
        parse_feedback(&reply)
    }

    async fn verdict(
        &self,
        topic: &str,
        transcript: &[DebateMessage],
    ) -> Result<Verdict, DebateError> {
        if transcript.is_empty() {
            return Err(DebateError::Validation("no speeches to judge".into()));
        }
        let user = format!("RESOLUTION: {topic}\n\n{}", format_transcript(transcript));
        let reply = self.ask(VERDICT_PROMPT, user).await?;
        parse_verdict(&reply)
    }
}

/// Render a transcript for the judge, one speech per block.
pub fn format_transcript(transcript: &[DebateMessage]) -> String {
    transcript
        .iter()
        .map(|m| {
            format!(
                "[{} - {} ({})]\n{}",
                m.section,
                m.speaker_name,
                m.side.display_name(),
                m.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// The first balanced `{...}` object in `text`, ignoring braces inside
/// strings. Models like to wrap JSON in prose or code fences.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// The judge answered, but not with anything we can use.
fn malformed_reply(message: impl Into<String>) -> DebateError {
    DebateError::Upstream {
        service: "OpenAI",
        status: 200,
        message: message.into(),
    }
}

fn parse_json<T: for<'de> Deserialize<'de>>(reply: &str) -> Result<T, DebateError> {
    let json = extract_json_object(reply)
        .ok_or_else(|| malformed_reply("judge reply contained no JSON object"))?;
    serde_json::from_str(json).map_err(|e| malformed_reply(format!("malformed judge reply: {e}")))
}

pub fn parse_feedback(reply: &str) -> Result<SpeechFeedback, DebateError> {
    #[derive(Deserialize)]
    struct Raw {
        score: i64,
        #[serde(default)]
        strengths: Vec<String>,
        #[serde(default)]
        improvements: Vec<String>,
        #[serde(default)]
        summary: String,
    }

    let raw: Raw = parse_json(reply)?;
    Ok(SpeechFeedback {
        score: raw.score.clamp(1, 10) as u8,
        strengths: raw.strengths,
        improvements: raw.improvements,
        summary: raw.summary,
    })
}

pub fn parse_verdict(reply: &str) -> Result<Verdict, DebateError> {
    #[derive(Deserialize)]
    struct Raw {
        winner: String,
        #[serde(default)]
        reason: String,
    }

    let raw: Raw = parse_json(reply)?;
    Ok(Verdict {
        winner: raw
            .winner
            .parse()
            .map_err(|_| malformed_reply(format!("judge named no side: {:?}", raw.winner)))?,
        reason: raw.reason,
    })
}
