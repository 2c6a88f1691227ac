use async_trait::async_trait;

pub const SYSTEM_PROMPT: &str = "You are a helpful legal assistant. Summarize the following court \
order denying a motion to dismiss or motion for summary judgment. Focus on the key legal \
reasoning and grounds for denial.";

/// Turns order text into a short summary. Failures come back as
/// [`error_summary`] text so a record is always stored.
#[async_trait]
pub trait Summarizer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn summarize(&self, text: &str) -> String;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryOptions {
    pub max_chars: usize,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            max_chars: 15_000,
            max_tokens: 500,
            temperature: 0.3,
            timeout_secs: 120,
        }
    }
}

/// First `max_chars` characters of `text`, never splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn error_summary(detail: impl std::fmt::Display) -> String {
    format!("Error generating summary: {detail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("ab", 3), "ab");
        assert_eq!(truncate_chars("§§§§", 2), "§§");
        assert_eq!(truncate_chars("", 0), "");
    }

    #[test]
    fn error_summary_prefix() {
        assert_eq!(
            error_summary("timeout"),
            "Error generating summary: timeout"
        );
    }
}
