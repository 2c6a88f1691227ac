use async_trait::async_trait;
use courtwatch_core::summarizer::{
    error_summary, truncate_chars, Summarizer, SummaryOptions, SYSTEM_PROMPT,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Summarizes with a locally-hosted Ollama model via its native chat API.
///
/// For deployments where order text must not leave the local machine.
pub struct OllamaSummarizer {
    pub base_url: String,
    pub model: String,
    pub options: SummaryOptions,
}

impl OllamaSummarizer {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            options: SummaryOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SummaryOptions) -> Self {
        self.options = options;
        self
    }

    async fn chat(&self, text: &str) -> Result<String, String> {
        let request_body = OllamaChatRequest {
            model: self.model.clone(),
            messages: vec![
                OllamaMessage {
                    role: "system".into(),
                    content: SYSTEM_PROMPT.into(),
                },
                OllamaMessage {
                    role: "user".into(),
                    content: truncate_chars(text, self.options.max_chars).to_string(),
                },
            ],
            stream: false,
            options: OllamaOptions {
                temperature: self.options.temperature,
                num_predict: self.options.max_tokens,
            },
        };

        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(self.options.timeout_secs))
            .build()
            .map_err(|e| e.to_string())?;

        let response = match client.post(&url).json(&request_body).send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return Err(format!(
                    "Ollama request timed out after {}s",
                    self.options.timeout_secs
                ))
            }
            Err(e) => return Err(format!("Ollama request failed: {e}")),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Ollama error {status}: {body}"));
        }

        let parsed: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse Ollama response: {e}"))?;
        let content = parsed.message.content.trim().to_string();
        if content.is_empty() {
            return Err("Ollama returned an empty message".into());
        }
        Ok(content)
    }
}

#[derive(Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

#[async_trait]
impl Summarizer for OllamaSummarizer {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn summarize(&self, text: &str) -> String {
        info!(
            model = %self.model,
            base_url = %self.base_url,
            input_len = text.len(),
            "calling ollama chat API"
        );
        match self.chat(text).await {
            Ok(summary) => {
                info!(model = %self.model, output_len = summary.len(), "ollama summary received");
                summary
            }
            Err(e) => {
                warn!(model = %self.model, "ollama summary failed: {e}");
                error_summary(e)
            }
        }
    }
}
