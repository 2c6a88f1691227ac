use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::{
    extract::{self, PayloadShape},
    provider::{CaseRef, DateWindow, ProviderClient, ProviderError},
    summarizer::{truncate_chars, Summarizer},
    types::MotionRecord,
};

/// Outcome of one pipeline run.
#[derive(Debug, Default)]
pub struct TrackerRun {
    pub records: Vec<MotionRecord>,
    /// References the search returned and the tracker attempted.
    pub scanned: usize,
    /// References skipped after a non-fatal provider error.
    pub failed: usize,
}

/// Search, detail, extract, summarize. Every call is awaited in order.
pub struct Tracker {
    pub provider: Arc<dyn ProviderClient>,
    pub summarizer: Arc<dyn Summarizer>,
    pub max_chars: usize,
}

impl Tracker {
    pub fn new(
        provider: Arc<dyn ProviderClient>,
        summarizer: Arc<dyn Summarizer>,
        max_chars: usize,
    ) -> Self {
        Self {
            provider,
            summarizer,
            max_chars,
        }
    }

    /// Denials ordered in the last `days_back` days (UTC), narrowed to
    /// `motion_type` when given.
    pub async fn find_denied_motions(
        &self,
        days_back: i64,
        motion_type: Option<&str>,
    ) -> Result<TrackerRun, ProviderError> {
        let window = DateWindow::ending_on(Utc::now().date_naive(), days_back)?;
        self.run_window(&window, motion_type).await
    }

    pub async fn run_window(
        &self,
        window: &DateWindow,
        motion_type: Option<&str>,
    ) -> Result<TrackerRun, ProviderError> {
        let provider = self.provider.name();
        info!(
            provider,
            start = %window.start,
            end = %window.end,
            motion_type = motion_type.unwrap_or(""),
            "searching for denied motions"
        );
        let refs = self.provider.search(window, motion_type).await?;
        info!(provider, cases = refs.len(), "search returned cases");

        let mut run = TrackerRun::default();
        for case in &refs {
            run.scanned += 1;
            match self.process_case(case, motion_type).await {
                Ok(Some(record)) => run.records.push(record),
                Ok(None) => {}
                Err(e) if e.is_auth() => return Err(e),
                Err(e) => {
                    warn!(provider, case = %case.id, "case skipped: {e}");
                    run.failed += 1;
                }
            }
        }
        info!(
            provider,
            found = run.records.len(),
            scanned = run.scanned,
            failed = run.failed,
            "tracker run complete"
        );
        Ok(run)
    }

    /// One reference through detail, extraction, document text and summary.
    /// `Ok(None)` when the case has no qualifying denial.
    pub async fn process_case(
        &self,
        case: &CaseRef,
        motion_type: Option<&str>,
    ) -> Result<Option<MotionRecord>, ProviderError> {
        let detail = self.provider.fetch_detail(case).await?;
        let shape: PayloadShape = self.provider.shape();
        let Some(extraction) = extract::extract(shape, &detail, motion_type) else {
            return Ok(None);
        };

        let order_text = match extraction.entry.document_id {
            Some(_) => {
                self.provider
                    .fetch_document_text(case, &extraction.entry)
                    .await?
            }
            None => None,
        };

        let input = order_text
            .clone()
            .unwrap_or_else(|| extraction.fallback_order_text());
        let summary = self
            .summarizer
            .summarize(truncate_chars(&input, self.max_chars))
            .await;

        Ok(Some(extraction.into_record(motion_type, order_text, summary)))
    }
}
