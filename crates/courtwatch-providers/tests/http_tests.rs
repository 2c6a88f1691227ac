use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use courtwatch_core::{
    provider::{CaseRef, DateWindow, ProviderClient, ProviderError},
    summarizer::Summarizer,
    tracker::Tracker,
};
use courtwatch_providers::{docketalarm::DocketAlarmClient, lexmachina::LexMachinaClient};
use serde_json::{json, Value};

// ── helpers ──────────────────────────────────────────────────────────────────

/// Serve `app` on an ephemeral local port and return its base URL.
async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn window() -> DateWindow {
    DateWindow::ending_on(NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(), 7).unwrap()
}

#[derive(Default)]
struct Calls {
    logins: AtomicUsize,
    queries: Mutex<Vec<String>>,
    /// Status returned to the dismiss search query.
    search_failure: Option<StatusCode>,
}

impl Calls {
    fn failing_search(status: StatusCode) -> Arc<Self> {
        Arc::new(Self {
            search_failure: Some(status),
            ..Self::default()
        })
    }

    fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

type Shared = State<Arc<Calls>>;

// ── Lex Machina ──────────────────────────────────────────────────────────────

async fn lm_token(State(calls): Shared) -> Json<Value> {
    let n = calls.logins.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "access_token": format!("tok-{n}"), "expires_in": 3600 }))
}

/// Accepts every bearer except the first token handed out.
async fn lm_detail(Path(id): Path<String>, headers: HeaderMap) -> Response {
    let bearer = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    if bearer == Some("Bearer tok-0") {
        return (StatusCode::UNAUTHORIZED, "token revoked").into_response();
    }
    Json(json!({ "caseName": format!("Case {id}") })).into_response()
}

async fn lm_query(State(calls): Shared, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let bearer = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    if bearer.map_or(true, |b| !b.starts_with("Bearer tok-")) {
        return (StatusCode::UNAUTHORIZED, "missing bearer").into_response();
    }
    calls.queries.lock().unwrap().push(body.to_string());
    Json(json!({ "cases": [{ "districtCaseId": 2001 }, { "districtCaseId": 2002 }] }))
        .into_response()
}

fn lex_machina_app(calls: &Arc<Calls>) -> Router {
    Router::new()
        .route("/oauth2/token", post(lm_token))
        .route("/query-district-cases", post(lm_query))
        .route("/district-cases/:id", get(lm_detail))
        .with_state(Arc::clone(calls))
}

#[tokio::test]
async fn lexmachina_rejected_credentials_are_auth_errors() {
    let app = Router::new().route(
        "/oauth2/token",
        post(|| async { (StatusCode::BAD_REQUEST, "invalid_client") }),
    );
    let client = LexMachinaClient::new("id", "wrong").with_base_url(&serve(app).await);

    let err = client.authenticate().await.unwrap_err();
    assert!(err.is_auth());
    assert!(err.to_string().contains("invalid_client"));
}

#[tokio::test]
async fn lexmachina_token_is_reused_across_calls() {
    let calls = Arc::new(Calls::default());
    let base = serve(lex_machina_app(&calls)).await;
    let client = LexMachinaClient::new("id", "secret").with_base_url(&base);

    let refs = client.search(&window(), None).await.unwrap();
    let ids: Vec<_> = refs.into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec!["2001", "2002"]);
    client.search(&window(), None).await.unwrap();

    assert_eq!(calls.logins(), 1);
    assert_eq!(calls.queries().len(), 2);
    assert!(calls.queries()[0].contains("\"onOrAfter\":\"2024-03-03\""));
}

#[tokio::test]
async fn lexmachina_revoked_token_is_replaced_on_next_call() {
    let calls = Arc::new(Calls::default());
    let base = serve(lex_machina_app(&calls)).await;
    let client = LexMachinaClient::new("id", "secret").with_base_url(&base);
    let case = CaseRef::new("2001");

    let err = client.fetch_detail(&case).await.unwrap_err();
    assert!(err.is_auth());

    let detail = client.fetch_detail(&case).await.unwrap();
    assert_eq!(detail["caseName"], "Case 2001");
    assert_eq!(calls.logins(), 2);
}

#[tokio::test]
async fn lexmachina_server_error_carries_status_and_body() {
    let calls = Arc::new(Calls::default());
    let app = Router::new()
        .route("/oauth2/token", post(lm_token))
        .route(
            "/query-district-cases",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        )
        .with_state(Arc::clone(&calls));
    let client = LexMachinaClient::new("id", "secret").with_base_url(&serve(app).await);

    let err = client.search(&window(), None).await.unwrap_err();
    match err {
        ProviderError::Request { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("expected Request, got {other:?}"),
    }
    // A server error is not a credential problem; the token stays cached.
    client.authenticate().await.unwrap();
    assert_eq!(calls.logins(), 1);
}

// ── Docket Alarm ─────────────────────────────────────────────────────────────

async fn da_login(State(calls): Shared) -> Json<Value> {
    let n = calls.logins.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "success": true, "login_token": format!("sess-{n}") }))
}

/// The dismiss query fails when a failure status is configured; the
/// summary-judgment query succeeds.
async fn da_search(
    State(calls): Shared,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let q = params.get("q").cloned().unwrap_or_default();
    calls.queries.lock().unwrap().push(q.clone());
    if let Some(status) = calls.search_failure.filter(|_| q.contains("motion to dismiss")) {
        return (status, "index unavailable").into_response();
    }
    Json(json!({
        "success": true,
        "search_results": [
            { "court": "S.D.N.Y.", "docket": "1:23-cv-04567" },
            { "court": "S.D.N.Y.", "docket": "1:23-cv-04567" }
        ]
    }))
    .into_response()
}

fn docket() -> Value {
    json!({
        "success": true,
        "info": {
            "title": "Doe v. Roe",
            "judge": "Jane Smith",
            "court_name": "S.D.N.Y.",
            "docket": "1:23-cv-04567"
        },
        "parties": [
            {
                "name": "John Doe",
                "type": "Plaintiff",
                "counsel": [{ "name": "Ann Counsel", "firm": "Counsel LLP" }]
            }
        ],
        "docket_report": [
            { "number": "12", "date": "1/5/2024", "contents": "MOTION to Dismiss filed" },
            { "number": "30", "date": "3/7/2024", "contents": "ORDER: Motion to Dismiss is DENIED." }
        ]
    })
}

/// Rejects the first session as expired.
async fn da_getdocket(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    if params.get("login_token").map(String::as_str) == Some("sess-0") {
        return Json(json!({ "success": false, "error": "Invalid login_token, please login again" }));
    }
    Json(docket())
}

async fn da_getdocument(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    if params.get("doc_number").map(String::as_str) != Some("30") {
        return Json(json!({ "success": false, "error": "document not found" }));
    }
    Json(json!({ "success": true, "text": "  ORDER denying the motion to dismiss.  " }))
}

fn docket_alarm_app(calls: &Arc<Calls>) -> Router {
    Router::new()
        .route("/api/v1/login/", post(da_login))
        .route("/api/v1/search/", get(da_search))
        .route("/api/v1/getdocket/", get(|| async { Json(docket()) }))
        .route("/api/v1/getdocument/", get(da_getdocument))
        .with_state(Arc::clone(calls))
}

#[tokio::test]
async fn docketalarm_failed_query_is_skipped() {
    let calls = Calls::failing_search(StatusCode::INTERNAL_SERVER_ERROR);
    let base = serve(docket_alarm_app(&calls)).await;
    let client = DocketAlarmClient::new("u", "p").with_base_url(&base);

    let refs = client.search(&window(), None).await.unwrap();

    assert_eq!(refs, vec![CaseRef::in_court("S.D.N.Y.", "1:23-cv-04567")]);
    let queries = calls.queries();
    assert_eq!(queries.len(), 2);
    assert!(queries[1].contains("motion for summary judgment"));
    assert_eq!(calls.logins(), 1);
}

#[tokio::test]
async fn docketalarm_rejected_session_aborts_search() {
    let calls = Calls::failing_search(StatusCode::FORBIDDEN);
    let base = serve(docket_alarm_app(&calls)).await;
    let client = DocketAlarmClient::new("u", "p").with_base_url(&base);

    let err = client.search(&window(), None).await.unwrap_err();

    assert!(err.is_auth());
    assert_eq!(calls.queries().len(), 1);
}

#[tokio::test]
async fn docketalarm_login_rejection_is_auth() {
    let app = Router::new().route(
        "/api/v1/login/",
        post(|| async { Json(json!({ "success": false, "error": "bad password" })) }),
    );
    let client = DocketAlarmClient::new("u", "wrong").with_base_url(&serve(app).await);

    let err = client.authenticate().await.unwrap_err();
    assert!(err.is_auth());
    assert!(err.to_string().contains("bad password"));
}

#[tokio::test]
async fn docketalarm_expired_session_is_dropped() {
    let calls = Arc::new(Calls::default());
    let app = Router::new()
        .route("/api/v1/login/", post(da_login))
        .route("/api/v1/getdocket/", get(da_getdocket))
        .with_state(Arc::clone(&calls));
    let client = DocketAlarmClient::new("u", "p").with_base_url(&serve(app).await);
    let case = CaseRef::in_court("S.D.N.Y.", "1:23-cv-04567");

    let err = client.fetch_detail(&case).await.unwrap_err();
    assert!(err.is_auth());

    let detail = client.fetch_detail(&case).await.unwrap();
    assert_eq!(detail["info"]["title"], "Doe v. Roe");
    assert_eq!(calls.logins(), 2);
}

#[tokio::test]
async fn docketalarm_other_failures_keep_the_session() {
    let calls = Arc::new(Calls::default());
    let app = Router::new()
        .route("/api/v1/login/", post(da_login))
        .route(
            "/api/v1/getdocket/",
            get(|| async { Json(json!({ "success": false, "error": "docket not found" })) }),
        )
        .with_state(Arc::clone(&calls));
    let client = DocketAlarmClient::new("u", "p").with_base_url(&serve(app).await);
    let case = CaseRef::in_court("S.D.N.Y.", "1:00-cv-00000");

    for _ in 0..2 {
        let err = client.fetch_detail(&case).await.unwrap_err();
        assert!(matches!(err, ProviderError::Payload(ref m) if m == "docket not found"));
    }
    assert_eq!(calls.logins(), 1);
}

// ── end to end ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingSummarizer {
    inputs: Mutex<Vec<String>>,
}

#[async_trait]
impl Summarizer for RecordingSummarizer {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn summarize(&self, order_text: &str) -> String {
        self.inputs.lock().unwrap().push(order_text.to_string());
        "The court denied the motion to dismiss.".into()
    }
}

#[tokio::test]
async fn docket_entries_flow_through_tracker() {
    let calls = Calls::failing_search(StatusCode::INTERNAL_SERVER_ERROR);
    let base = serve(docket_alarm_app(&calls)).await;
    let summarizer = Arc::new(RecordingSummarizer::default());
    let tracker = Tracker::new(
        Arc::new(DocketAlarmClient::new("u", "p").with_base_url(&base)),
        summarizer.clone(),
        15_000,
    );

    let run = tracker.run_window(&window(), None).await.unwrap();

    assert_eq!(run.scanned, 1);
    assert_eq!(run.failed, 0);
    assert_eq!(run.records.len(), 1);
    let record = &run.records[0];
    assert_eq!(record.case_name.as_deref(), Some("Doe v. Roe"));
    assert_eq!(record.court.as_deref(), Some("S.D.N.Y."));
    assert_eq!(record.motion_type, "motion to dismiss denied");
    assert_eq!(record.order_info.document_number.as_deref(), Some("30"));
    assert_eq!(record.order_info.date.as_deref(), Some("2024-03-07"));
    assert_eq!(
        record.order_text.as_deref(),
        Some("ORDER denying the motion to dismiss.")
    );
    assert_eq!(record.parties[0].attorneys[0].firm.as_deref(), Some("Counsel LLP"));
    assert_eq!(
        summarizer.inputs.lock().unwrap().as_slice(),
        ["ORDER denying the motion to dismiss."]
    );
    assert_eq!(calls.logins(), 1);
}
