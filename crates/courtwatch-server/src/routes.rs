use std::sync::Arc;

use anyhow::anyhow;
use axum::{
    extract::{Path, Query, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
    routing::{get, post},
    Router,
};
use chrono::Utc;
use courtwatch_core::types::{
    GroupCount, MotionFilter, RefreshSettings, StoredMotion, MAX_DAYS_BACK, ORDER_DENIAL,
};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tracing::info;

use crate::{schedule::parse_refresh_time, AppState};

const DEFAULT_LIMIT: i64 = 100;
const LAW_FIRM_LIMIT: i64 = 50;

// ── Error helper ──────────────────────────────────────────────────────────

/// Every handler answers 200; failures are reported in the body.
pub(crate) fn failure(e: impl std::fmt::Display) -> Json<Value> {
    tracing::error!("request failed: {e}");
    Json(json!({ "success": false, "error": e.to_string() }))
}

// ── Request body types ────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
pub(crate) struct RefreshBody {
    pub days_back: Option<i64>,
    pub motion_type: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Deserialize)]
pub(crate) struct FilterQuery {
    pub court: Option<String>,
    pub judge: Option<String>,
    pub motion_type: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Accepts the dashboard's camelCase names as well.
#[derive(Deserialize)]
pub(crate) struct SettingsBody {
    #[serde(alias = "autoRefresh")]
    pub auto_refresh: Option<bool>,
    #[serde(alias = "refreshTime")]
    pub refresh_time: Option<String>,
    #[serde(alias = "daysBack")]
    pub days_back: Option<i64>,
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn page(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    (
        limit.filter(|l| *l > 0).unwrap_or(DEFAULT_LIMIT),
        offset.filter(|o| *o >= 0).unwrap_or(0),
    )
}

impl FilterQuery {
    fn into_parts(self) -> (MotionFilter, i64, i64) {
        let (limit, offset) = page(self.limit, self.offset);
        let filter = MotionFilter {
            court: non_empty(self.court),
            judge: non_empty(self.judge),
            motion_type: non_empty(self.motion_type),
            start_date: non_empty(self.start_date),
            end_date: non_empty(self.end_date),
        };
        (filter, limit, offset)
    }
}

// ── JSON shaping ──────────────────────────────────────────────────────────

fn or_unknown(v: &Option<String>, sentinel: &str) -> String {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(sentinel)
        .to_string()
}

/// Client-facing motion with placeholder text for absent fields.
pub(crate) fn motion_json(m: &StoredMotion) -> Value {
    let parties: Vec<Value> = m
        .parties
        .iter()
        .map(|p| {
            let attorneys: Vec<Value> = p
                .attorneys
                .iter()
                .map(|a| {
                    json!({
                        "id": a.id,
                        "attorney_name": or_unknown(&a.attorney_name, "Unknown Attorney"),
                        "law_firm": or_unknown(&a.law_firm, "Unknown Firm"),
                    })
                })
                .collect();
            json!({
                "id": p.id,
                "party_type": or_unknown(&p.party_type, "Unknown Role"),
                "party_name": or_unknown(&p.party_name, "Unknown Party"),
                "attorneys": attorneys,
            })
        })
        .collect();
    json!({
        "id": m.id,
        "case_name": or_unknown(&m.case_name, "Unknown Case"),
        "judge": or_unknown(&m.judge, "Unknown Judge"),
        "court": or_unknown(&m.court, "Unknown Court"),
        "docket_number": or_unknown(&m.docket_number, "Unknown Docket"),
        "motion_type": or_unknown(&m.motion_type, ORDER_DENIAL),
        "order_date": m.order_date,
        "order_description": m.order_description,
        "document_number": m.document_number,
        "summary": m.summary,
        "date_added": m.date_added,
        "parties": parties,
    })
}

fn groups_json(groups: Vec<GroupCount>, key: &str, sentinel: &str) -> Vec<Value> {
    groups
        .into_iter()
        .map(|g| {
            let mut obj = serde_json::Map::new();
            obj.insert(key.into(), json!(or_unknown(&g.key, sentinel)));
            obj.insert("count".into(), json!(g.count));
            Value::Object(obj)
        })
        .collect()
}

// ── Refresh ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RefreshOutcome {
    pub motions_found: usize,
    pub cases_scanned: usize,
    pub cases_failed: usize,
}

/// Another refresh holds the lock.
#[derive(Debug, Error)]
#[error("refresh already in progress")]
pub(crate) struct RefreshBusy;

fn check_days_back(days_back: i64) -> anyhow::Result<()> {
    if days_back < 0 {
        return Err(anyhow!("days_back must not be negative"));
    }
    if days_back > MAX_DAYS_BACK {
        return Err(anyhow!("days_back must be at most {MAX_DAYS_BACK}"));
    }
    Ok(())
}

/// Run the tracker and store what it finds. Shared by the API and the
/// scheduler; only one refresh runs at a time.
pub(crate) async fn run_refresh(
    state: &AppState,
    days_back: i64,
    motion_type: Option<&str>,
) -> anyhow::Result<RefreshOutcome> {
    check_days_back(days_back)?;
    let _guard = state.refresh_lock.try_lock().map_err(|_| RefreshBusy)?;

    let run = state
        .tracker
        .find_denied_motions(days_back, motion_type)
        .await?;
    for record in &run.records {
        state.db.upsert_motion(record)?;
    }
    info!(
        motions_found = run.records.len(),
        cases_scanned = run.scanned,
        cases_failed = run.failed,
        "refresh stored motions"
    );
    Ok(RefreshOutcome {
        motions_found: run.records.len(),
        cases_scanned: run.scanned,
        cases_failed: run.failed,
    })
}

pub(crate) async fn refresh(
    State(state): State<Arc<AppState>>,
    body: Option<Json<RefreshBody>>,
) -> Json<Value> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let motion_type = non_empty(body.motion_type);
    match run_refresh(&state, body.days_back.unwrap_or(1), motion_type.as_deref()).await {
        Ok(o) => Json(json!({
            "success": true,
            "motions_found": o.motions_found,
            "cases_scanned": o.cases_scanned,
            "cases_failed": o.cases_failed,
        })),
        Err(e) => failure(e),
    }
}

// ── Motions ───────────────────────────────────────────────────────────────

pub(crate) async fn list_motions(
    State(state): State<Arc<AppState>>,
    Query(q): Query<PageQuery>,
) -> Json<Value> {
    let (limit, offset) = page(q.limit, q.offset);
    let result = state
        .db
        .list_motions(limit, offset)
        .and_then(|motions| Ok((motions, state.db.count_motions()?)));
    match result {
        Ok((motions, total)) => Json(json!({
            "success": true,
            "motions": motions.iter().map(motion_json).collect::<Vec<_>>(),
            "total": total,
        })),
        Err(e) => failure(e),
    }
}

pub(crate) async fn filter_motions(
    State(state): State<Arc<AppState>>,
    Query(q): Query<FilterQuery>,
) -> Json<Value> {
    let (filter, limit, offset) = q.into_parts();
    let result = state
        .db
        .filter_motions(&filter, limit, offset)
        .and_then(|motions| Ok((motions, state.db.count_filtered(&filter)?)));
    match result {
        Ok((motions, total)) => Json(json!({
            "success": true,
            "motions": motions.iter().map(motion_json).collect::<Vec<_>>(),
            "total": total,
        })),
        Err(e) => failure(e),
    }
}

pub(crate) async fn get_motion(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Json<Value> {
    match state.db.get_motion(id) {
        Ok(Some(m)) => Json(json!({ "success": true, "motion": motion_json(&m) })),
        Ok(None) => Json(json!({ "success": false, "error": "Motion not found" })),
        Err(e) => failure(e),
    }
}

// ── Aggregates ────────────────────────────────────────────────────────────

pub(crate) async fn stats(State(state): State<Arc<AppState>>) -> Json<Value> {
    let db = &state.db;
    let result = (|| -> anyhow::Result<Value> {
        Ok(json!({
            "total_motions": db.count_motions()?,
            "by_court": groups_json(db.count_by_court()?, "court", "Unknown Court"),
            "by_judge": groups_json(
                db.count_by_judge(state.config.judge_limit)?,
                "judge",
                "Unknown Judge",
            ),
            "by_motion_type": groups_json(db.count_by_type()?, "motion_type", ORDER_DENIAL),
            "recent_trend": db.motion_trend(state.config.trend_days, Utc::now().date_naive())?,
        }))
    })();
    match result {
        Ok(stats) => Json(json!({ "success": true, "stats": stats })),
        Err(e) => failure(e),
    }
}

pub(crate) async fn law_firms(State(state): State<Arc<AppState>>) -> Json<Value> {
    match state.db.law_firms(LAW_FIRM_LIMIT) {
        Ok(firms) => Json(json!({
            "success": true,
            "firms": groups_json(firms, "law_firm", "Unknown Firm"),
        })),
        Err(e) => failure(e),
    }
}

// ── Settings ──────────────────────────────────────────────────────────────

pub(crate) async fn get_refresh_settings(State(state): State<Arc<AppState>>) -> Json<Value> {
    match state.db.refresh_settings(&state.config.refresh_defaults()) {
        Ok(s) => Json(json!({ "success": true, "settings": s })),
        Err(e) => failure(e),
    }
}

pub(crate) async fn save_refresh_settings(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SettingsBody>,
) -> Json<Value> {
    let current = match state.db.refresh_settings(&state.config.refresh_defaults()) {
        Ok(s) => s,
        Err(e) => return failure(e),
    };
    let updated = RefreshSettings {
        auto_refresh: body.auto_refresh.unwrap_or(current.auto_refresh),
        refresh_time: body
            .refresh_time
            .map(|t| t.trim().to_string())
            .unwrap_or(current.refresh_time),
        days_back: body.days_back.unwrap_or(current.days_back),
    };
    if parse_refresh_time(&updated.refresh_time).is_none() {
        return failure(format!(
            "invalid refresh_time {:?}, expected HH:MM",
            updated.refresh_time
        ));
    }
    if let Err(e) = check_days_back(updated.days_back) {
        return failure(e);
    }
    match state.db.save_refresh_settings(&updated) {
        Ok(()) => Json(json!({ "success": true, "settings": updated })),
        Err(e) => failure(e),
    }
}

// ── Health & logs ─────────────────────────────────────────────────────────

pub(crate) async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn sse_logs(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, std::convert::Infallible>>> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    // Subscribe before snapshotting ring to avoid race
    let live_rx = state.log_tx.subscribe();
    let history: Vec<String> = state
        .log_ring
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .iter()
        .cloned()
        .collect();
    tokio::spawn(async move {
        for line in history {
            if tx.send(line).is_err() {
                return;
            }
        }
        let mut live_rx = live_rx;
        loop {
            match live_rx.recv().await {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    });
    let stream = UnboundedReceiverStream::new(rx)
        .map(|data| Ok::<_, std::convert::Infallible>(Event::default().data(data)));
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("ping"),
    )
}

// ── Router ────────────────────────────────────────────────────────────────

pub(crate) fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/refresh", post(refresh))
        .route("/api/motions", get(list_motions))
        .route("/api/motions/filter", get(filter_motions))
        .route("/api/motions/:id", get(get_motion))
        .route("/api/stats", get(stats))
        .route("/api/law-firms", get(law_firms))
        .route(
            "/api/settings/refresh",
            get(get_refresh_settings).post(save_refresh_settings),
        )
        .route("/api/logs", get(sse_logs))
        .with_state(state)
}
