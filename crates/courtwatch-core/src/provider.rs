use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{NaiveDate, TimeDelta};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::extract::{DenialEntry, PayloadShape};

/// Inclusive range of order dates a search covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// Fails with `Payload` when `days_back` reaches past the calendar range.
    pub fn ending_on(end: NaiveDate, days_back: i64) -> ProviderResult<Self> {
        let start = TimeDelta::try_days(days_back.max(0))
            .and_then(|span| end.checked_sub_signed(span))
            .ok_or_else(|| {
                ProviderError::Payload(format!("days_back {days_back} is out of range"))
            })?;
        Ok(Self { start, end })
    }

    pub fn start_str(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    pub fn end_str(&self) -> String {
        self.end.format("%Y-%m-%d").to_string()
    }
}

/// Provider handle for one case. `court` is only needed by providers that key
/// dockets by (court, docket).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CaseRef {
    pub id: String,
    pub court: Option<String>,
}

impl CaseRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            court: None,
        }
    }

    pub fn in_court(court: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            court: Some(court.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} authentication failed: {message}")]
    Auth {
        provider: &'static str,
        message: String,
    },
    #[error("provider returned HTTP {status}: {body}")]
    Request { status: u16, body: String },
    #[error("provider transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected provider payload: {0}")]
    Payload(String),
}

impl ProviderError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Map a non-2xx response to `Auth` (401/403) or `Request`.
pub async fn ensure_success(
    resp: reqwest::Response,
    provider: &'static str,
) -> ProviderResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(ProviderError::Auth {
            provider,
            message: format!("HTTP {status}: {body}"),
        });
    }
    Err(ProviderError::Request {
        status: status.as_u16(),
        body,
    })
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Bearer or session token shared by every call of one client. Expired or
/// invalidated tokens are refreshed on the next `get_or_refresh`.
#[derive(Default)]
pub struct TokenCache {
    inner: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached token, or run `fetch` and cache its `(token, ttl)`.
    /// The lock is held across `fetch` so concurrent callers log in once.
    pub async fn get_or_refresh<F, Fut>(&self, fetch: F) -> ProviderResult<String>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = ProviderResult<(String, Duration)>>,
    {
        let mut guard = self.inner.lock().await;
        if let Some(cached) = guard.as_ref() {
            if Instant::now() < cached.expires_at {
                return Ok(cached.token.clone());
            }
        }
        let (token, ttl) = fetch().await?;
        *guard = Some(CachedToken {
            token: token.clone(),
            expires_at: Instant::now() + ttl,
        });
        Ok(token)
    }

    pub async fn invalidate(&self) {
        *self.inner.lock().await = None;
    }
}

/// A court-data source able to find candidate cases and fetch their dockets.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn name(&self) -> &'static str;

    fn shape(&self) -> PayloadShape;

    async fn authenticate(&self) -> ProviderResult<String>;

    /// Candidate cases for the window. `motion_type` narrows the query to the
    /// kind it names.
    async fn search(
        &self,
        window: &DateWindow,
        motion_type: Option<&str>,
    ) -> ProviderResult<Vec<CaseRef>>;

    async fn fetch_detail(&self, case: &CaseRef) -> ProviderResult<Value>;

    async fn fetch_document_text(
        &self,
        case: &CaseRef,
        entry: &DenialEntry,
    ) -> ProviderResult<Option<String>>;
}
