use std::time::Duration;

use async_trait::async_trait;
use courtwatch_core::{
    extract::{DenialEntry, PayloadShape},
    provider::{
        ensure_success, CaseRef, DateWindow, ProviderClient, ProviderError, ProviderResult,
        TokenCache,
    },
    types::MotionKind,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

const NAME: &str = "lexmachina";
const PAGE_SIZE: u32 = 100;
/// Tokens are refreshed this long before the server says they expire.
const EXPIRY_MARGIN_SECS: u64 = 300;

/// Client for the Lex Machina district-case API.
/// OAuth2 client credentials; the bearer token is cached until shortly
/// before it expires.
pub struct LexMachinaClient {
    base_url: String,
    client_id: String,
    client_secret: String,
    http: reqwest::Client,
    token: TokenCache,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DistrictCaseQuery {
    pub case_status: String,
    pub events: EventCriteria,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventCriteria {
    pub include_event_types: Vec<String>,
    pub date: DateRange,
    pub include_event_outcomes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub on_or_after: String,
    pub on_or_before: String,
}

/// Query for open cases with a denied contested event of one of `kinds`
/// inside the window.
pub fn query_payload(window: &DateWindow, kinds: &[MotionKind]) -> DistrictCaseQuery {
    DistrictCaseQuery {
        case_status: "Open".into(),
        events: EventCriteria {
            include_event_types: kinds.iter().map(|k| k.event_type().to_string()).collect(),
            date: DateRange {
                on_or_after: window.start_str(),
                on_or_before: window.end_str(),
            },
            include_event_outcomes: vec!["Denied".into()],
        },
        page: 1,
        page_size: PAGE_SIZE,
    }
}

/// Case references from a query response. Entries without a
/// `districtCaseId` are skipped.
pub fn parse_case_refs(body: &Value) -> Vec<CaseRef> {
    body.get("cases")
        .and_then(Value::as_array)
        .map(|cases| {
            cases
                .iter()
                .filter_map(|c| match c.get("districtCaseId")? {
                    Value::Number(n) => Some(CaseRef::new(n.to_string())),
                    Value::String(s) if !s.is_empty() => Some(CaseRef::new(s.as_str())),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Placeholder order text; the district-case API exposes no document body.
pub fn placeholder_order_text(entry: &DenialEntry) -> Option<String> {
    entry
        .document_id
        .as_ref()
        .map(|id| format!("Order denying {}. Document ID: {id}", entry.kind.label()))
}

impl LexMachinaClient {
    pub fn new(client_id: &str, client_secret: &str) -> Self {
        Self {
            base_url: "https://api.lexmachina.com".into(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            http: reqwest::Client::new(),
            token: TokenCache::new(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    async fn request_token(&self) -> ProviderResult<(String, Duration)> {
        let resp = self
            .http
            .post(format!("{}/oauth2/token", self.base_url))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;
        let status = resp.status();
        if matches!(status.as_u16(), 400 | 401 | 403) {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Auth {
                provider: NAME,
                message: format!("HTTP {status}: {body}"),
            });
        }
        let token: TokenResponse = ensure_success(resp, NAME).await?.json().await?;
        let ttl = token
            .expires_in
            .unwrap_or(3600)
            .saturating_sub(EXPIRY_MARGIN_SECS);
        info!(provider = NAME, ttl_s = ttl, "obtained access token");
        Ok((token.access_token, Duration::from_secs(ttl)))
    }

    /// Send with the cached bearer token. A rejected token is dropped so the
    /// next call fetches a fresh one.
    async fn send_authed(&self, req: reqwest::RequestBuilder) -> ProviderResult<Value> {
        let token = self.authenticate().await?;
        let resp = req.bearer_auth(&token).send().await?;
        match ensure_success(resp, NAME).await {
            Ok(resp) => Ok(resp.json().await?),
            Err(e) => {
                if e.is_auth() {
                    debug!(provider = NAME, "bearer token rejected, dropping cache");
                    self.token.invalidate().await;
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl ProviderClient for LexMachinaClient {
    fn name(&self) -> &'static str {
        NAME
    }

    fn shape(&self) -> PayloadShape {
        PayloadShape::CaseEvents
    }

    async fn authenticate(&self) -> ProviderResult<String> {
        self.token.get_or_refresh(|| self.request_token()).await
    }

    async fn search(
        &self,
        window: &DateWindow,
        motion_type: Option<&str>,
    ) -> ProviderResult<Vec<CaseRef>> {
        let kinds = MotionKind::for_filter(motion_type);
        if kinds.is_empty() {
            debug!(provider = NAME, "filter names no motion kind, skipping search");
            return Ok(Vec::new());
        }
        let req = self
            .http
            .post(format!("{}/query-district-cases", self.base_url))
            .json(&query_payload(window, &kinds));
        let body = self.send_authed(req).await?;
        Ok(parse_case_refs(&body))
    }

    async fn fetch_detail(&self, case: &CaseRef) -> ProviderResult<Value> {
        let req = self
            .http
            .get(format!("{}/district-cases/{}", self.base_url, case.id));
        self.send_authed(req).await
    }

    async fn fetch_document_text(
        &self,
        _case: &CaseRef,
        entry: &DenialEntry,
    ) -> ProviderResult<Option<String>> {
        Ok(placeholder_order_text(entry))
    }
}
