//! AI speech generation over an OpenAI-compatible chat API.

use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::debate_format::Phase;
use crate::error::DebateError;
use crate::orchestrator::DebateMessage;
use crate::participant::Side;
use crate::retry::RetryPolicy;

/// Average speaking rate used to turn a time limit into a word budget.
const WORDS_PER_MINUTE: u32 = 150;

/// How many times an empty or near-empty reply is asked for again.
const MAX_EMPTY_ATTEMPTS: u32 = 3;

/// Everything needed to generate one AI speech.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechRequest {
    pub topic: String,
    pub turn_index: usize,
    pub phase: Phase,
    pub section_name: String,
    pub section_description: String,
    pub side: Side,
    pub speaker_name: String,
    pub opponent_name: String,
    pub model: String,
    pub system_prompt: String,
    pub time_limit_secs: u32,
    pub max_tokens: u32,
    /// Speeches so far, oldest first.
    pub transcript: Vec<DebateMessage>,
}

impl SpeechRequest {
    pub fn word_budget(&self) -> u32 {
        (self.time_limit_secs * WORDS_PER_MINUTE / 60).max(20)
    }
}

/// Produces speech text for an AI debater.
#[async_trait]
pub trait SpeechGenerator: Send + Sync {
    async fn generate(&self, request: &SpeechRequest) -> Result<String, DebateError>;
}

/// Build an async-openai client with request timeouts.
pub(crate) fn openai_client(
    api_base: &str,
    api_key: &str,
    timeout: Duration,
) -> Result<Client<OpenAIConfig>, DebateError> {
    let http_client = reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| DebateError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

    let config = OpenAIConfig::new()
        .with_api_key(api_key)
        .with_api_base(api_base);

    Ok(Client::with_config(config).with_http_client(http_client))
}

/// Send a chat request through the retry policy and return the first
/// choice's text.
pub(crate) async fn complete_chat(
    client: &Client<OpenAIConfig>,
    retry: &RetryPolicy,
    request: &CreateChatCompletionRequest,
) -> Result<String, DebateError> {
    retry
        .run("chat completion", || async {
            let response = client.chat().create(request.clone()).await?;
            Ok(response
                .choices
                .first()
                .and_then(|c| c.message.content.clone())
                .unwrap_or_default())
        })
        .await
}

pub(crate) fn system_message(content: String) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
        content: content.into(),
        name: None,
    })
}

pub(crate) fn user_message(content: String) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
        content: content.into(),
        name: None,
    })
}

fn assistant_message(content: String) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
        content: Some(content.into()),
        name: None,
        tool_calls: None,
        refusal: None,
        audio: None,
        function_call: None,
    })
}

/// Speech generator backed by an OpenAI-compatible chat completion API.
#[derive(Clone)]
pub struct OpenAiSpeechGenerator {
    client: Client<OpenAIConfig>,
    retry: RetryPolicy,
}

impl OpenAiSpeechGenerator {
    pub fn new(
        api_base: &str,
        api_key: &str,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, DebateError> {
        Ok(Self {
            client: openai_client(api_base, api_key, timeout)?,
            retry,
        })
    }
}

#[async_trait]
impl SpeechGenerator for OpenAiSpeechGenerator {
    async fn generate(&self, request: &SpeechRequest) -> Result<String, DebateError> {
        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&request.model)
            .max_completion_tokens(request.max_tokens)
            .messages(build_messages(request))
            .build()?;

        for attempt in 1..=MAX_EMPTY_ATTEMPTS {
            let response = complete_chat(&self.client, &self.retry, &chat_request).await?;
            let sanitized = sanitize_response(&response);

            if sanitized.len() > 10 {
                tracing::debug!(
                    speaker = %request.speaker_name,
                    turn = request.turn_index,
                    words = sanitized.split_whitespace().count(),
                    "generated speech"
                );
                return Ok(sanitized);
            }

            if attempt < MAX_EMPTY_ATTEMPTS {
                tracing::warn!(
                    speaker = %request.speaker_name,
                    attempt,
                    max_attempts = MAX_EMPTY_ATTEMPTS,
                    "empty response, retrying"
                );
                tokio::time::sleep(self.retry.delay_for(attempt)).await;
            }
        }

        Err(DebateError::EmptyResponse {
            speaker: request.speaker_name.clone(),
            attempts: MAX_EMPTY_ATTEMPTS,
        })
    }
}

/// Build the chat history from the speaker's point of view: their own
/// speeches as assistant turns, the opponent's as quoted user turns, then
/// the instruction for the current section.
pub fn build_messages(request: &SpeechRequest) -> Vec<ChatCompletionRequestMessage> {
    let mut messages = Vec::with_capacity(request.transcript.len() + 2);
    messages.push(system_message(request.system_prompt.clone()));

    for message in &request.transcript {
        if message.side == request.side {
            messages.push(assistant_message(message.content.clone()));
        } else {
            messages.push(user_message(format!(
                "[Opponent {} said]: {}",
                message.speaker_name, message.content
            )));
        }
    }

    messages.push(user_message(section_prompt(request)));
    messages
}

/// Instruction for the current turn.
pub fn section_prompt(request: &SpeechRequest) -> String {
    let task = match request.phase {
        Phase::Crossfire => "Ask or answer a single crossfire question.".to_string(),
        phase => format!("Please deliver your {} speech.", phase.display_name().to_lowercase()),
    };

    format!(
        "[{} - {}]\nYou have {} seconds, roughly {} words.\n{}",
        request.section_name,
        request.section_description,
        request.time_limit_secs,
        request.word_budget(),
        task
    )
}

/// Sanitize AI response by stripping reasoning tokens and XML-like tags.
///
/// Removes patterns like <thinking>...</thinking>, <reflection>...</reflection>, etc.
pub fn sanitize_response(response: &str) -> String {
    // List of known reasoning/internal tags to strip with their content
    let tags_to_strip = [
        "thinking",
        "think",
        "reflection",
        "reflect",
        "internal",
        "reasoning",
        "thought",
        "scratch",
        "scratchpad",
        "plan",
        "analysis",
        "analyze",
        "consider",
        "pondering",
        "deliberation",
    ];

    let mut result = response.to_string();

    for tag in &tags_to_strip {
        let pattern = format!(r"(?is)<{tag}[^>]*>.*?</{tag}>", tag = tag);
        if let Ok(re) = regex::Regex::new(&pattern) {
            result = re.replace_all(&result, "").to_string();
        }
    }

    // Orphaned opening/closing tags
    if let Ok(orphan_re) = regex::Regex::new(r"</?[\w]+[^>]*>") {
        result = orphan_re.replace_all(&result, "").to_string();
    }

    result = result.replace('*', "");

    if let Ok(ws_re) = regex::Regex::new(r"\s+") {
        result = ws_re.replace_all(&result, " ").to_string();
    }

    result.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(side: Side, transcript: Vec<DebateMessage>) -> SpeechRequest {
        SpeechRequest {
            topic: "Resolved: cities should ban cars downtown.".into(),
            turn_index: transcript.len(),
            phase: Phase::Rebuttal,
            section_name: "Rebuttals".into(),
            section_description: "Attack and defend.".into(),
            side,
            speaker_name: "Eris".into(),
            opponent_name: "Sam".into(),
            model: "gpt-4o-mini".into(),
            system_prompt: "You are Eris.".into(),
            time_limit_secs: 240,
            max_tokens: 600,
            transcript,
        }
    }

    fn said(side: Side, name: &str, content: &str) -> DebateMessage {
        DebateMessage {
            turn_index: 0,
            phase: Phase::Constructive,
            section: "Constructive Speeches".into(),
            side,
            speaker_name: name.into(),
            content: content.into(),
        }
    }

    #[test]
    fn test_word_budget() {
        assert_eq!(request(Side::Con, vec![]).word_budget(), 600);
        let mut short = request(Side::Con, vec![]);
        short.time_limit_secs = 4;
        assert_eq!(short.word_budget(), 20);
    }

    #[test]
    fn test_build_messages_attributes_speakers() {
        let transcript = vec![
            said(Side::Pro, "Sam", "Cars pollute."),
            said(Side::Con, "Eris", "Commerce suffers."),
        ];
        let messages = build_messages(&request(Side::Con, transcript));

        assert_eq!(messages.len(), 4);
        assert!(matches!(messages[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(messages[1], ChatCompletionRequestMessage::User(_)));
        assert!(matches!(messages[2], ChatCompletionRequestMessage::Assistant(_)));
        assert!(matches!(messages[3], ChatCompletionRequestMessage::User(_)));
    }

    #[test]
    fn test_section_prompt_mentions_budget() {
        let prompt = section_prompt(&request(Side::Pro, vec![]));
        assert!(prompt.starts_with("[Rebuttals - Attack and defend.]"));
        assert!(prompt.contains("240 seconds, roughly 600 words"));
        assert!(prompt.contains("rebuttal speech"));

        let mut crossfire = request(Side::Pro, vec![]);
        crossfire.phase = Phase::Crossfire;
        assert!(section_prompt(&crossfire).contains("crossfire question"));
    }

    #[test]
    fn test_sanitize_response_thinking_tags() {
        let input = "<thinking>Let me think about this...</thinking>The answer is 42.";
        assert_eq!(sanitize_response(input), "The answer is 42.");
    }

    #[test]
    fn test_sanitize_response_reflection_tags() {
        let input = "Hello <reflection>internal thought</reflection> world!";
        assert_eq!(sanitize_response(input), "Hello world!");
    }

    #[test]
    fn test_sanitize_response_no_tags() {
        let input = "No tags here, just text.";
        assert_eq!(sanitize_response(input), "No tags here, just text.");
    }

    #[test]
    fn test_sanitize_response_multiline_tags() {
        let input = "<thinking>\nMultiple\nlines\nof\nthought\n</thinking>Final answer here.";
        assert_eq!(sanitize_response(input), "Final answer here.");
    }

    #[test]
    fn test_sanitize_response_nested_content() {
        let input = "Start <think>nested <inner>tags</inner> content</think> end";
        let output = sanitize_response(input);
        assert!(!output.contains('<'));
        assert!(!output.contains('>'));
    }

    #[test]
    fn test_sanitize_response_strips_emphasis() {
        let input = "This is **very** important.";
        assert_eq!(sanitize_response(input), "This is very important.");
    }
}
