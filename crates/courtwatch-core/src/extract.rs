//! Motion extraction: turn one provider payload into the metadata of its first
//! qualifying denial.
//!
//! Two payload shapes are supported. `CaseEvents` is the Lex Machina district
//! case document (`events[]`, `parties[]`, `lawFirmRepresentations[]`).
//! `DocketEntries` is the Docket Alarm docket document (`info`,
//! `docket_report[]`, `parties[].counsel[]`). Both feed the same canonical
//! [`MotionRecord`].

use chrono::NaiveDate;
use serde_json::Value;

use crate::types::{Attorney, MotionKind, MotionRecord, OrderInfo, Party};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    CaseEvents,
    DocketEntries,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseMeta {
    pub case_name: Option<String>,
    pub judge: Option<String>,
    pub court: Option<String>,
    pub docket_number: Option<String>,
}

/// The qualifying event or docket entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenialEntry {
    pub kind: MotionKind,
    pub date: Option<String>,
    pub description: String,
    pub document_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub case: CaseMeta,
    pub parties: Vec<Party>,
    pub entry: DenialEntry,
}

impl Extraction {
    /// Sentence summarized when no order text could be obtained.
    pub fn fallback_order_text(&self) -> String {
        format!(
            "Order denying motion in case {}",
            self.case.case_name.as_deref().unwrap_or("Unknown Case")
        )
    }

    /// Assemble the canonical record. A caller-supplied filter is recorded as
    /// the motion type verbatim; otherwise the determined label is used.
    /// Stored rows therefore always carry a type, and
    /// [`ORDER_DENIAL`](crate::types::ORDER_DENIAL) only appears as a display
    /// fallback.
    pub fn into_record(
        self,
        filter: Option<&str>,
        order_text: Option<String>,
        summary: String,
    ) -> MotionRecord {
        let motion_type = filter
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.entry.kind.label().to_string());
        MotionRecord {
            case_name: self.case.case_name,
            judge: self.case.judge,
            court: self.case.court,
            docket_number: self.case.docket_number,
            motion_type,
            order_info: OrderInfo {
                date: self.entry.date,
                description: Some(self.entry.description),
                document_number: self.entry.document_id,
            },
            parties: self.parties,
            summary,
            order_text,
        }
    }
}

/// Extract the first qualifying denial from `payload`, or `None` when the case
/// has no entry that qualifies under `filter`.
pub fn extract(shape: PayloadShape, payload: &Value, filter: Option<&str>) -> Option<Extraction> {
    let entry = find_denial(shape, payload, filter)?;
    Some(Extraction {
        case: case_meta(shape, payload),
        parties: parties(shape, payload),
        entry,
    })
}

pub fn find_denial(shape: PayloadShape, payload: &Value, filter: Option<&str>) -> Option<DenialEntry> {
    match shape {
        PayloadShape::CaseEvents => first_event_denial(payload, filter),
        PayloadShape::DocketEntries => first_docket_denial(payload, filter),
    }
}

pub fn case_meta(shape: PayloadShape, payload: &Value) -> CaseMeta {
    match shape {
        PayloadShape::CaseEvents => CaseMeta {
            case_name: text_at(payload, &["caseName"]),
            judge: text_at(payload, &["judge", "name"]),
            court: text_at(payload, &["court", "name"]),
            docket_number: text_at(payload, &["docketNumber"]),
        },
        PayloadShape::DocketEntries => CaseMeta {
            case_name: text_at(payload, &["info", "title"])
                .or_else(|| text_at(payload, &["info", "case_name"])),
            judge: text_at(payload, &["info", "judge"]),
            court: text_at(payload, &["info", "court_name"])
                .or_else(|| text_at(payload, &["info", "court"])),
            docket_number: text_at(payload, &["info", "docket"]),
        },
    }
}

pub fn parties(shape: PayloadShape, payload: &Value) -> Vec<Party> {
    match shape {
        PayloadShape::CaseEvents => represented_parties(payload),
        PayloadShape::DocketEntries => counseled_parties(payload),
    }
}

// ── Case events (token API) ─────────────────────────────────────────────

fn first_event_denial(payload: &Value, filter: Option<&str>) -> Option<DenialEntry> {
    array_at(payload, "events").iter().find_map(|event| {
        let event_type = text_at(event, &["type"]).unwrap_or_default();
        let outcome = text_at(event, &["outcome"]).unwrap_or_default();
        let kind = contested_denial_kind(&event_type, &outcome)?;
        if !kind.matches_filter(filter) {
            return None;
        }
        Some(DenialEntry {
            kind,
            date: text_at(event, &["date"]).map(|d| normalize_date(&d)),
            description: format!("{event_type} - {outcome}"),
            document_id: text_at(event, &["documentId"]),
        })
    })
}

/// Event types must name the motion and be contested; the outcome must carry
/// "Denied" with that exact casing.
fn contested_denial_kind(event_type: &str, outcome: &str) -> Option<MotionKind> {
    if !event_type.contains("Contested") || !outcome.contains("Denied") {
        return None;
    }
    if event_type.contains("Dismiss") {
        Some(MotionKind::Dismiss)
    } else if event_type.contains("Summary Judgment") {
        Some(MotionKind::SummaryJudgment)
    } else {
        None
    }
}

/// Attorneys come from the sibling `lawFirmRepresentations` list whose `side`
/// equals the party's role.
fn represented_parties(payload: &Value) -> Vec<Party> {
    let representations = array_at(payload, "lawFirmRepresentations");
    array_at(payload, "parties")
        .iter()
        .map(|party| {
            let role = text_at(party, &["role"]);
            let attorneys = match role.as_deref() {
                None => Vec::new(),
                Some(role) => representations
                    .iter()
                    .filter(|rep| text_at(rep, &["side"]).as_deref() == Some(role))
                    .flat_map(|rep| {
                        let firm = text_at(rep, &["lawFirm", "name"]);
                        array_at(rep, "attorneys")
                            .iter()
                            .map(move |a| Attorney {
                                name: text_at(a, &["name"]),
                                firm: firm.clone(),
                            })
                            .collect::<Vec<_>>()
                    })
                    .collect(),
            };
            Party {
                role,
                name: text_at(party, &["name"]),
                attorneys,
            }
        })
        .collect()
}

// ── Docket entries (session API) ────────────────────────────────────────

fn first_docket_denial(payload: &Value, filter: Option<&str>) -> Option<DenialEntry> {
    array_at(payload, "docket_report").iter().find_map(|entry| {
        let contents = text_at(entry, &["contents"])?;
        let kind = docket_denial_kind(&contents)?;
        if !kind.matches_filter(filter) {
            return None;
        }
        Some(DenialEntry {
            kind,
            date: text_at(entry, &["date"]).map(|d| normalize_date(&d)),
            description: contents,
            document_id: text_at(entry, &["number"]),
        })
    })
}

/// Case-insensitive: the entry text must name the motion and contain "denied".
fn docket_denial_kind(contents: &str) -> Option<MotionKind> {
    let lower = contents.to_lowercase();
    if !lower.contains("denied") {
        return None;
    }
    MotionKind::ALL
        .into_iter()
        .find(|kind| lower.contains(kind.phrase()))
}

/// Attorneys are nested directly under each party.
fn counseled_parties(payload: &Value) -> Vec<Party> {
    array_at(payload, "parties")
        .iter()
        .map(|party| {
            let counsel = match party.get("counsel") {
                Some(Value::Array(c)) => c.as_slice(),
                _ => array_at(party, "attorneys"),
            };
            Party {
                role: text_at(party, &["type"]),
                name: text_at(party, &["name"]),
                attorneys: counsel
                    .iter()
                    .map(|a| Attorney {
                        name: text_at(a, &["name"]),
                        firm: text_at(a, &["firm"]),
                    })
                    .collect(),
            }
        })
        .collect()
}

// ── JSON helpers ────────────────────────────────────────────────────────

/// Walk `path` through nested objects. Strings (trimmed, non-empty) and
/// numbers yield text; anything else is absent.
pub fn text_at(value: &Value, path: &[&str]) -> Option<String> {
    let mut cur = value;
    for key in path {
        cur = cur.get(key)?;
    }
    match cur {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn array_at<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    match value.get(key) {
        Some(Value::Array(items)) => items.as_slice(),
        _ => &[],
    }
}

/// Normalize provider dates to `YYYY-MM-DD`. ISO dates, ISO datetimes and
/// `M/D/YYYY` are recognized; anything else is kept verbatim.
pub fn normalize_date(raw: &str) -> String {
    let raw = raw.trim();
    if let Some(prefix) = raw.get(..10) {
        if let Ok(d) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
            return d.format("%Y-%m-%d").to_string();
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%m/%d/%Y") {
        return d.format("%Y-%m-%d").to_string();
    }
    raw.to_string()
}
