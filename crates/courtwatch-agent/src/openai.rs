use async_trait::async_trait;
use courtwatch_core::summarizer::{
    error_summary, truncate_chars, Summarizer, SummaryOptions, SYSTEM_PROMPT,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Summarizes through an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiSummarizer {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub options: SummaryOptions,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiSummarizer {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key: api_key.into(),
            model: model.into(),
            options: SummaryOptions::default(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_options(mut self, options: SummaryOptions) -> Self {
        self.options = options;
        self
    }

    fn request<'a>(&'a self, text: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: truncate_chars(text, self.options.max_chars),
                },
            ],
            max_tokens: self.options.max_tokens,
            temperature: self.options.temperature,
        }
    }

    async fn complete(&self, text: &str) -> Result<String, String> {
        if self.api_key.is_empty() {
            return Err("OPENAI_API_KEY is not set".into());
        }
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(self.options.timeout_secs))
            .build()
            .map_err(|e| e.to_string())?;

        let response = client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request(text))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    format!("request timed out after {}s", self.options.timeout_secs)
                } else {
                    format!("request failed: {e}")
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {status}: {body}"));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| format!("invalid response: {e}"))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| "response contained no message".to_string())
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn summarize(&self, text: &str) -> String {
        info!(model = %self.model, input_len = text.len(), "requesting summary");
        match self.complete(text).await {
            Ok(summary) => {
                info!(model = %self.model, output_len = summary.len(), "summary received");
                summary
            }
            Err(e) => {
                warn!(model = %self.model, "summary failed: {e}");
                error_summary(e)
            }
        }
    }
}
