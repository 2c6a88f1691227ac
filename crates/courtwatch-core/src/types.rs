use serde::{Deserialize, Serialize};

/// Label shown for a stored motion that carries no type.
pub const ORDER_DENIAL: &str = "order denial";
/// Largest look-back a refresh or saved setting may request.
pub const MAX_DAYS_BACK: i64 = 3650;

// ── Motion kinds ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionKind {
    Dismiss,
    SummaryJudgment,
}

impl MotionKind {
    pub const ALL: [MotionKind; 2] = [MotionKind::Dismiss, MotionKind::SummaryJudgment];

    /// Canonical `motion_type` label for a denial of this kind.
    pub fn label(self) -> &'static str {
        match self {
            Self::Dismiss => "motion to dismiss denied",
            Self::SummaryJudgment => "motion for summary judgment denied",
        }
    }

    /// Lowercase phrase as it appears in docket entry text.
    pub fn phrase(self) -> &'static str {
        match self {
            Self::Dismiss => "motion to dismiss",
            Self::SummaryJudgment => "motion for summary judgment",
        }
    }

    /// Lex Machina event type name.
    pub fn event_type(self) -> &'static str {
        match self {
            Self::Dismiss => "Dismiss (Contested)",
            Self::SummaryJudgment => "Summary Judgment (Contested)",
        }
    }

    /// Kinds a provider search should cover for an optional caller filter.
    ///
    /// A filter that names neither kind can never match a determined label,
    /// so it narrows the search to nothing.
    pub fn for_filter(filter: Option<&str>) -> Vec<MotionKind> {
        let Some(filter) = filter.map(str::trim).filter(|f| !f.is_empty()) else {
            return Self::ALL.to_vec();
        };
        let lower = filter.to_lowercase();
        if lower.contains("dismiss") {
            vec![Self::Dismiss]
        } else if lower.contains("summary judgment") {
            vec![Self::SummaryJudgment]
        } else {
            Vec::new()
        }
    }

    /// True when no filter is set or the filter names exactly this kind's label.
    pub fn matches_filter(self, filter: Option<&str>) -> bool {
        match filter.map(str::trim).filter(|f| !f.is_empty()) {
            None => true,
            Some(f) => f.eq_ignore_ascii_case(self.label()),
        }
    }
}

// ── Canonical record ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attorney {
    pub name: Option<String>,
    pub firm: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    /// Role or side in the case ("Plaintiff", "Defendant", ...).
    #[serde(rename = "type")]
    pub role: Option<String>,
    pub name: Option<String>,
    pub attorneys: Vec<Attorney>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderInfo {
    /// `YYYY-MM-DD` when the provider's format was recognized.
    pub date: Option<String>,
    pub description: Option<String>,
    pub document_number: Option<String>,
}

/// One denial event for one case, as produced by a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionRecord {
    pub case_name: Option<String>,
    pub judge: Option<String>,
    pub court: Option<String>,
    pub docket_number: Option<String>,
    pub motion_type: String,
    pub order_info: OrderInfo,
    pub parties: Vec<Party>,
    pub summary: String,
    /// Text handed to the summarizer, when the provider supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_text: Option<String>,
}

// ── Stored rows ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredAttorney {
    pub id: i64,
    pub attorney_name: Option<String>,
    pub law_firm: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredParty {
    pub id: i64,
    pub party_type: Option<String>,
    pub party_name: Option<String>,
    pub attorneys: Vec<StoredAttorney>,
}

/// A motion row with its parties and attorneys populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredMotion {
    pub id: i64,
    pub case_name: Option<String>,
    pub judge: Option<String>,
    pub court: Option<String>,
    pub docket_number: Option<String>,
    pub motion_type: Option<String>,
    pub order_date: Option<String>,
    pub order_description: Option<String>,
    pub document_number: Option<String>,
    pub summary: Option<String>,
    pub date_added: Option<String>,
    pub parties: Vec<StoredParty>,
}

// ── Queries and aggregates ───────────────────────────────────────────────

/// Optional listing criteria. `judge` and `motion_type` match as substrings,
/// dates are inclusive `YYYY-MM-DD` bounds on the order date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MotionFilter {
    pub court: Option<String>,
    pub judge: Option<String>,
    pub motion_type: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// One bucket of a GROUP BY count; `key` is NULL when the column was absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupCount {
    pub key: Option<String>,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendPoint {
    pub date: String,
    pub count: i64,
}

/// Scheduled refresh settings, persisted in the `config` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshSettings {
    pub auto_refresh: bool,
    /// UTC wall-clock time, `HH:MM`.
    pub refresh_time: String,
    pub days_back: i64,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            auto_refresh: false,
            refresh_time: "01:00".into(),
            days_back: 1,
        }
    }
}
