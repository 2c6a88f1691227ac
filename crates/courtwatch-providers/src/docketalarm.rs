use std::collections::HashSet;
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
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

const NAME: &str = "docketalarm";

/// Client for the Docket Alarm v1 API.
/// Username/password login yields a session token that is passed as the
/// `login_token` query parameter on every call.
pub struct DocketAlarmClient {
    base_url: String,
    username: String,
    password: String,
    client_matter: String,
    session_ttl: Duration,
    http: reqwest::Client,
    token: TokenCache,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    login_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Full-text query for orders denying one motion kind inside the window.
pub fn search_query(kind: MotionKind, window: &DateWindow) -> String {
    format!(
        "\"order denying {}\" AND date:[{} TO {}]",
        kind.phrase(),
        window.start_str(),
        window.end_str()
    )
}

/// (court, docket) references from a search response.
pub fn parse_search_results(body: &Value) -> Vec<CaseRef> {
    body.get("search_results")
        .and_then(Value::as_array)
        .map(|results| {
            results
                .iter()
                .filter_map(|r| {
                    let court = r.get("court")?.as_str()?.trim();
                    let docket = r.get("docket")?.as_str()?.trim();
                    if court.is_empty() || docket.is_empty() {
                        return None;
                    }
                    Some(CaseRef::in_court(court, docket))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Keep the first occurrence of each (court, docket).
pub fn dedup_refs(refs: Vec<CaseRef>) -> Vec<CaseRef> {
    let mut seen = HashSet::new();
    refs.into_iter()
        .filter(|r| seen.insert((r.court.clone(), r.id.clone())))
        .collect()
}

impl DocketAlarmClient {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            base_url: "https://www.docketalarm.com".into(),
            username: username.to_string(),
            password: password.to_string(),
            client_matter: String::new(),
            session_ttl: Duration::from_secs(3000),
            http: reqwest::Client::new(),
            token: TokenCache::new(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_client_matter(mut self, client_matter: &str) -> Self {
        self.client_matter = client_matter.to_string();
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    async fn login(&self) -> ProviderResult<(String, Duration)> {
        let mut form = vec![
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
        ];
        if !self.client_matter.is_empty() {
            form.push(("client_matter", self.client_matter.as_str()));
        }
        let resp = self
            .http
            .post(format!("{}/api/v1/login/", self.base_url))
            .form(&form)
            .send()
            .await?;
        let login: LoginResponse = ensure_success(resp, NAME).await?.json().await?;
        match (login.success, login.login_token) {
            (true, Some(token)) if !token.is_empty() => {
                info!(provider = NAME, "logged in");
                Ok((token, self.session_ttl))
            }
            _ => Err(ProviderError::Auth {
                provider: NAME,
                message: login.error.unwrap_or_else(|| "login rejected".into()),
            }),
        }
    }

    /// GET an API endpoint with the session token attached. A `success:false`
    /// body that mentions the login drops the cached session and reports Auth.
    async fn get_api(&self, path: &str, params: &[(&str, &str)]) -> ProviderResult<Value> {
        let token = self.authenticate().await?;
        let resp = self
            .http
            .get(format!("{}/api/v1/{path}/", self.base_url))
            .query(params)
            .query(&[("login_token", token.as_str())])
            .send()
            .await?;
        let body: Value = match ensure_success(resp, NAME).await {
            Ok(resp) => resp.json().await?,
            Err(e) => {
                if e.is_auth() {
                    self.token.invalidate().await;
                }
                return Err(e);
            }
        };
        if body.get("success").and_then(Value::as_bool) == Some(false) {
            let message = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("request failed")
                .to_string();
            if message.to_lowercase().contains("login") {
                self.token.invalidate().await;
                return Err(ProviderError::Auth {
                    provider: NAME,
                    message,
                });
            }
            return Err(ProviderError::Payload(message));
        }
        Ok(body)
    }

    fn court_of<'a>(case: &'a CaseRef) -> ProviderResult<&'a str> {
        case.court
            .as_deref()
            .ok_or_else(|| ProviderError::Payload(format!("docket {} has no court", case.id)))
    }
}

#[async_trait]
impl ProviderClient for DocketAlarmClient {
    fn name(&self) -> &'static str {
        NAME
    }

    fn shape(&self) -> PayloadShape {
        PayloadShape::DocketEntries
    }

    async fn authenticate(&self) -> ProviderResult<String> {
        self.token.get_or_refresh(|| self.login()).await
    }

    /// One query per motion kind. A failed query is skipped unless the
    /// session itself was rejected.
    async fn search(
        &self,
        window: &DateWindow,
        motion_type: Option<&str>,
    ) -> ProviderResult<Vec<CaseRef>> {
        let mut refs = Vec::new();
        for kind in MotionKind::for_filter(motion_type) {
            let q = search_query(kind, window);
            match self.get_api("search", &[("q", q.as_str())]).await {
                Ok(body) => refs.extend(parse_search_results(&body)),
                Err(e) if e.is_auth() => return Err(e),
                Err(e) => warn!(provider = NAME, query = %q, "search query failed: {e}"),
            }
        }
        Ok(dedup_refs(refs))
    }

    async fn fetch_detail(&self, case: &CaseRef) -> ProviderResult<Value> {
        let court = Self::court_of(case)?;
        self.get_api("getdocket", &[("court", court), ("docket", case.id.as_str())])
            .await
    }

    async fn fetch_document_text(
        &self,
        case: &CaseRef,
        entry: &DenialEntry,
    ) -> ProviderResult<Option<String>> {
        let Some(doc_number) = entry.document_id.as_deref() else {
            return Ok(None);
        };
        let court = Self::court_of(case)?;
        let body = self
            .get_api(
                "getdocument",
                &[
                    ("court", court),
                    ("docket", case.id.as_str()),
                    ("doc_number", doc_number),
                ],
            )
            .await?;
        Ok(body
            .get("text")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string))
    }
}
