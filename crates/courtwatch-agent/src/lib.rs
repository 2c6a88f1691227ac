pub mod ollama;
pub mod openai;

use std::sync::Arc;

use anyhow::{bail, Result};
use courtwatch_core::{config::Config, summarizer::Summarizer};

pub use ollama::OllamaSummarizer;
pub use openai::OpenAiSummarizer;

/// Build the summarizer named by `SUMMARIZER`.
pub fn from_config(config: &Config) -> Result<Arc<dyn Summarizer>> {
    let options = config.summary_options();
    match config.summarizer.as_str() {
        "openai" => Ok(Arc::new(
            OpenAiSummarizer::new(&config.openai_api_key, &config.openai_model)
                .with_base_url(&config.openai_base_url)
                .with_options(options),
        )),
        "ollama" => Ok(Arc::new(
            OllamaSummarizer::new(&config.ollama_base_url, &config.ollama_model)
                .with_options(options),
        )),
        other => bail!("unknown SUMMARIZER {other:?} (expected openai or ollama)"),
    }
}
