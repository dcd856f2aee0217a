//! Gemini client for the GENIE AI assistant
//!
//! One outbound `generateContent` call per question, with a fixed system
//! prompt. The API key travels as the `key` query parameter.

use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error};

use crate::error::{GenieError, Result};
use crate::settings;

pub const SYSTEM_PROMPT: &str = "You are GENIE AI, a friendly and knowledgeable assistant for the GENIE Connect community platform focused on gender equality.

Your role:
- Answer questions about gender equality, pay gaps, workplace inclusion, women's rights, diversity policies, and related topics.
- Give concise, helpful answers (2-4 sentences max unless the user asks for more detail).
- Be supportive and encouraging.
- If a question is completely unrelated to gender equality or community topics, gently redirect them.

Keep your tone warm but professional. No markdown formatting — just plain text.";

pub const FALLBACK_ANSWER: &str = "Sorry, I couldn't generate an answer. Please try again.";

const MAX_OUTPUT_TOKENS: u32 = 300;
const TEMPERATURE: f32 = 0.7;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// Gemini request format

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Clone)]
pub struct AssistantClient {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl AssistantClient {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: base_url.into(),
            model: model.into(),
        })
    }

    /// Client configured from settings (env `GEMINI_API_KEY` wins over the stored key)
    pub fn from_settings() -> Result<Self> {
        let current = settings::current();
        Self::new(settings::get_api_key(), current.gemini_base_url, current.gemini_model)
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url.trim_end_matches('/'), self.model)
    }

    /// Reject a request before any upstream call: missing key first, then
    /// an empty question. Returns the trimmed question.
    pub fn check_question<'a>(&self, question: &'a str) -> Result<&'a str> {
        if self.api_key.is_none() {
            return Err(GenieError::AiNotConfigured);
        }
        let question = question.trim();
        if question.is_empty() {
            return Err(GenieError::InvalidInput("Question is required".to_string()));
        }
        Ok(question)
    }

    /// Ask the assistant a question and return its plain-text answer
    pub async fn ask(&self, question: &str) -> Result<String> {
        let question = self.check_question(question)?;
        let api_key = self.api_key.as_deref().ok_or(GenieError::AiNotConfigured)?;

        let request = GenerateRequest {
            system_instruction: Content { parts: vec![Part { text: SYSTEM_PROMPT }] },
            contents: vec![Content { parts: vec![Part { text: question }] }],
            generation_config: GenerationConfig {
                max_output_tokens: MAX_OUTPUT_TOKENS,
                temperature: TEMPERATURE,
            },
        };

        debug!(model = %self.model, chars = question.chars().count(), "Sending question to Gemini");

        let response = self.http
            .post(self.endpoint())
            .query(&[("key", api_key)])
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            error!(status, body = %body, "Gemini API error");
            return Err(GenieError::AiUnavailable { status, body });
        }

        let data: serde_json::Value = response.json().await?;
        let answer = data
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| FALLBACK_ANSWER.to_string());

        Ok(answer)
    }
}
