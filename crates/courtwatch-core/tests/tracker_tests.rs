use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use courtwatch_core::{
    db::Db,
    extract::{DenialEntry, PayloadShape},
    provider::{CaseRef, DateWindow, ProviderClient, ProviderError, ProviderResult},
    summarizer::{error_summary, Summarizer},
    tracker::Tracker,
};
use serde_json::{json, Value};

// ── fakes ────────────────────────────────────────────────────────────────────

enum Detail {
    Payload(Value),
    Fail(u16),
    AuthFail,
}

struct FakeProvider {
    details: HashMap<String, Detail>,
    order: Vec<String>,
    searched: Mutex<Vec<Option<String>>>,
}

impl FakeProvider {
    fn new(cases: Vec<(&str, Detail)>) -> Self {
        Self {
            order: cases.iter().map(|(id, _)| id.to_string()).collect(),
            details: cases.into_iter().map(|(id, d)| (id.to_string(), d)).collect(),
            searched: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ProviderClient for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn shape(&self) -> PayloadShape {
        PayloadShape::CaseEvents
    }

    async fn authenticate(&self) -> ProviderResult<String> {
        Ok("token".into())
    }

    async fn search(
        &self,
        _window: &DateWindow,
        motion_type: Option<&str>,
    ) -> ProviderResult<Vec<CaseRef>> {
        self.searched
            .lock()
            .unwrap()
            .push(motion_type.map(str::to_string));
        Ok(self.order.iter().map(CaseRef::new).collect())
    }

    async fn fetch_detail(&self, case: &CaseRef) -> ProviderResult<Value> {
        match self.details.get(&case.id) {
            Some(Detail::Payload(v)) => Ok(v.clone()),
            Some(Detail::Fail(status)) => Err(ProviderError::Request {
                status: *status,
                body: "boom".into(),
            }),
            Some(Detail::AuthFail) => Err(ProviderError::Auth {
                provider: "fake",
                message: "token revoked".into(),
            }),
            None => Err(ProviderError::Payload("unknown case".into())),
        }
    }

    async fn fetch_document_text(
        &self,
        _case: &CaseRef,
        entry: &DenialEntry,
    ) -> ProviderResult<Option<String>> {
        Ok(entry
            .document_id
            .as_ref()
            .map(|id| format!("Order denying {}. Document ID: {id}", entry.kind.label())))
    }
}

/// Records every input and echoes a fixed summary, or fails like a dead endpoint.
struct FakeSummarizer {
    fail: bool,
    inputs: Mutex<Vec<String>>,
}

impl FakeSummarizer {
    fn ok() -> Self {
        Self {
            fail: false,
            inputs: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            inputs: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Summarizer for FakeSummarizer {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn summarize(&self, text: &str) -> String {
        self.inputs.lock().unwrap().push(text.to_string());
        if self.fail {
            error_summary("connection refused")
        } else {
            "The court denied the motion.".into()
        }
    }
}

fn denial_case(docket: &str, doc_id: Option<i64>) -> Value {
    let mut event = json!({
        "type": "Dismiss (Contested)",
        "outcome": "Denied",
        "date": "2024-03-05"
    });
    if let Some(id) = doc_id {
        event["documentId"] = json!(id);
    }
    json!({
        "caseName": format!("Case {docket}"),
        "court": { "name": "D. Mass." },
        "judge": { "name": "Patti B. Saris" },
        "docketNumber": docket,
        "parties": [{ "name": "Acme", "role": "Plaintiff" }],
        "lawFirmRepresentations": [],
        "events": [event]
    })
}

fn window() -> DateWindow {
    DateWindow::ending_on(NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(), 7).unwrap()
}

fn tracker(provider: FakeProvider, summarizer: Arc<FakeSummarizer>) -> Tracker {
    Tracker::new(Arc::new(provider), summarizer, 15_000)
}

// ── tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn produces_one_record_per_qualifying_case() {
    let provider = FakeProvider::new(vec![
        ("1", Detail::Payload(denial_case("1:24-cv-1", Some(45)))),
        ("2", Detail::Payload(json!({ "caseName": "No denial", "events": [] }))),
    ]);
    let summarizer = Arc::new(FakeSummarizer::ok());
    let run = tracker(provider, summarizer.clone())
        .run_window(&window(), None)
        .await
        .unwrap();

    assert_eq!(run.scanned, 2);
    assert_eq!(run.failed, 0);
    assert_eq!(run.records.len(), 1);
    let r = &run.records[0];
    assert_eq!(r.motion_type, "motion to dismiss denied");
    assert_eq!(r.summary, "The court denied the motion.");
    assert_eq!(
        r.order_text.as_deref(),
        Some("Order denying motion to dismiss denied. Document ID: 45")
    );
    assert_eq!(
        summarizer.inputs.lock().unwrap().as_slice(),
        ["Order denying motion to dismiss denied. Document ID: 45"]
    );
}

#[tokio::test]
async fn missing_document_id_summarizes_fallback_sentence() {
    let provider = FakeProvider::new(vec![(
        "1",
        Detail::Payload(denial_case("1:24-cv-1", None)),
    )]);
    let summarizer = Arc::new(FakeSummarizer::ok());
    let run = tracker(provider, summarizer.clone())
        .run_window(&window(), None)
        .await
        .unwrap();

    assert_eq!(run.records.len(), 1);
    assert!(run.records[0].order_text.is_none());
    assert_eq!(
        summarizer.inputs.lock().unwrap().as_slice(),
        ["Order denying motion in case Case 1:24-cv-1"]
    );
}

#[tokio::test]
async fn summarizer_failure_is_stored_as_summary() {
    let provider = FakeProvider::new(vec![(
        "1",
        Detail::Payload(denial_case("1:24-cv-1", Some(7))),
    )]);
    let run = tracker(provider, Arc::new(FakeSummarizer::failing()))
        .run_window(&window(), None)
        .await
        .unwrap();

    let record = &run.records[0];
    assert!(record.summary.starts_with("Error generating summary:"));

    let mut db = Db::open_in_memory().unwrap();
    db.migrate().unwrap();
    let id = db.upsert_motion(record).unwrap();
    let stored = db.get_motion(id).unwrap().unwrap();
    assert_eq!(stored.summary.as_deref(), Some(record.summary.as_str()));
}

#[tokio::test]
async fn failed_case_is_counted_and_run_continues() {
    let provider = FakeProvider::new(vec![
        ("1", Detail::Fail(500)),
        ("2", Detail::Payload(denial_case("1:24-cv-2", Some(3)))),
    ]);
    let run = tracker(provider, Arc::new(FakeSummarizer::ok()))
        .run_window(&window(), None)
        .await
        .unwrap();

    assert_eq!(run.scanned, 2);
    assert_eq!(run.failed, 1);
    assert_eq!(run.records.len(), 1);
    assert_eq!(run.records[0].docket_number.as_deref(), Some("1:24-cv-2"));
}

#[tokio::test]
async fn auth_failure_aborts_the_run() {
    let provider = FakeProvider::new(vec![
        ("1", Detail::Payload(denial_case("1:24-cv-1", Some(1)))),
        ("2", Detail::AuthFail),
        ("3", Detail::Payload(denial_case("1:24-cv-3", Some(3)))),
    ]);
    let err = tracker(provider, Arc::new(FakeSummarizer::ok()))
        .run_window(&window(), None)
        .await
        .unwrap_err();
    assert!(err.is_auth());
}

#[tokio::test]
async fn non_matching_filter_yields_no_record() {
    let provider = FakeProvider::new(vec![(
        "1",
        Detail::Payload(denial_case("1:24-cv-1", Some(45))),
    )]);
    let summarizer = Arc::new(FakeSummarizer::ok());
    let run = tracker(provider, summarizer.clone())
        .run_window(&window(), Some("motion for summary judgment denied"))
        .await
        .unwrap();

    assert_eq!(run.scanned, 1);
    assert!(run.records.is_empty());
    assert!(summarizer.inputs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn filter_is_passed_to_search_and_recorded_verbatim() {
    let provider = Arc::new(FakeProvider::new(vec![(
        "1",
        Detail::Payload(denial_case("1:24-cv-1", Some(45))),
    )]));
    let t = Tracker::new(provider.clone(), Arc::new(FakeSummarizer::ok()), 15_000);
    let run = t
        .run_window(&window(), Some("  Motion To Dismiss Denied "))
        .await
        .unwrap();

    assert_eq!(run.records[0].motion_type, "Motion To Dismiss Denied");
    assert_eq!(
        provider.searched.lock().unwrap().as_slice(),
        [Some("  Motion To Dismiss Denied ".to_string())]
    );
}

#[tokio::test]
async fn first_qualifying_event_wins() {
    let payload = json!({
        "caseName": "Two denials",
        "court": { "name": "D. Del." },
        "docketNumber": "1:23-cv-9",
        "events": [
            { "type": "Summary Judgment (Contested)", "outcome": "Denied", "date": "2024-03-02", "documentId": "11" },
            { "type": "Dismiss (Contested)", "outcome": "Denied", "date": "2024-03-04", "documentId": "12" }
        ]
    });
    let provider = FakeProvider::new(vec![("1", Detail::Payload(payload))]);
    let run = tracker(provider, Arc::new(FakeSummarizer::ok()))
        .run_window(&window(), None)
        .await
        .unwrap();

    let r = &run.records[0];
    assert_eq!(r.motion_type, "motion for summary judgment denied");
    assert_eq!(r.order_info.document_number.as_deref(), Some("11"));
    assert_eq!(r.order_info.date.as_deref(), Some("2024-03-02"));
}

#[tokio::test]
async fn long_order_text_is_truncated_before_summarizing() {
    struct LongText;

    #[async_trait]
    impl ProviderClient for LongText {
        fn name(&self) -> &'static str {
            "long"
        }
        fn shape(&self) -> PayloadShape {
            PayloadShape::CaseEvents
        }
        async fn authenticate(&self) -> ProviderResult<String> {
            Ok(String::new())
        }
        async fn search(&self, _: &DateWindow, _: Option<&str>) -> ProviderResult<Vec<CaseRef>> {
            Ok(vec![CaseRef::new("1")])
        }
        async fn fetch_detail(&self, _: &CaseRef) -> ProviderResult<Value> {
            Ok(denial_case("1:24-cv-1", Some(1)))
        }
        async fn fetch_document_text(
            &self,
            _: &CaseRef,
            _: &DenialEntry,
        ) -> ProviderResult<Option<String>> {
            Ok(Some("x".repeat(50)))
        }
    }

    let summarizer = Arc::new(FakeSummarizer::ok());
    let t = Tracker::new(Arc::new(LongText), summarizer.clone(), 10);
    let run = t.run_window(&window(), None).await.unwrap();

    assert_eq!(summarizer.inputs.lock().unwrap()[0].len(), 10);
    assert_eq!(run.records[0].order_text.as_deref().map(str::len), Some(50));
}
