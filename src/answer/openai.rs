//! OpenAI chat-completions 답변 생성기
//!
//! ref: https://platform.openai.com/docs/api-reference/chat

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

use super::{stuff_prompt, AnswerGenerator, GenerationSettings};

/// OpenAI 답변 생성기
#[derive(Debug)]
pub struct OpenAiGenerator {
    api_key: String,
    settings: GenerationSettings,
    client: reqwest::Client,
}

impl OpenAiGenerator {
    pub fn new(api_key: String, settings: GenerationSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| RagError::Generation(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            settings,
            client,
        })
    }

    /// `OPENAI_API_KEY` 환경변수로 생성
    pub fn from_env(settings: GenerationSettings) -> Result<Self> {
        Self::new(get_api_key()?, settings)
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.api_base.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl AnswerGenerator for OpenAiGenerator {
    async fn generate(&self, context: &str, question: &str) -> Result<String> {
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", self.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| RagError::Config("invalid OpenAI API key".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let prompt = stuff_prompt(context, question);
        let body = ChatRequest {
            model: &self.settings.model,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
        };

        let resp = self
            .client
            .post(self.completions_url())
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::Generation(format!("failed to call chat completions: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(RagError::Generation(format!(
                "OpenAI returned {}: {}",
                status, text
            )));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| RagError::Generation(format!("failed to parse response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or_else(|| RagError::Generation("response contained no choices".to_string()))
    }

    fn model(&self) -> &str {
        &self.settings.model
    }
}

// ============================================================================
// API Key
// ============================================================================

/// `OPENAI_API_KEY` 읽기
pub fn get_api_key() -> Result<String> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(RagError::Config(
            "OPENAI_API_KEY environment variable is not set".to_string(),
        )),
    }
}

/// API 키 설정 여부
pub fn has_api_key() -> bool {
    get_api_key().is_ok()
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: String,
}
