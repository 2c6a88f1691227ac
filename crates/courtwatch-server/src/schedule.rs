use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use courtwatch_core::types::RefreshSettings;
use tracing::{info, warn};

use crate::{
    routes::{run_refresh, RefreshBusy},
    AppState,
};

const TICK: Duration = Duration::from_secs(60);
/// Config key holding the UTC date of the last scheduled run.
pub(crate) const KEY_LAST_SCHEDULED: &str = "last_scheduled_refresh";

pub(crate) fn parse_refresh_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").ok()
}

/// True when auto refresh is on, today's run has not happened yet and the
/// configured wall-clock time has passed.
pub(crate) fn refresh_due(
    settings: &RefreshSettings,
    now: DateTime<Utc>,
    last_run: Option<NaiveDate>,
) -> bool {
    if !settings.auto_refresh {
        return false;
    }
    let Some(at) = parse_refresh_time(&settings.refresh_time) else {
        return false;
    };
    last_run != Some(now.date_naive()) && now.time() >= at
}

/// Background loop: checks once per tick and runs at most one refresh per
/// UTC day. Settings are re-read every tick so edits apply without restart.
pub(crate) async fn run_scheduler(state: Arc<AppState>) {
    let mut interval = tokio::time::interval(TICK);
    loop {
        interval.tick().await;
        tick(&state, Utc::now()).await;
    }
}

/// One scheduler check. Returns true when a refresh ran and the day was
/// recorded; a refresh already holding the lock leaves the day open.
pub(crate) async fn tick(state: &AppState, now: DateTime<Utc>) -> bool {
    let settings = match state.db.refresh_settings(&state.config.refresh_defaults()) {
        Ok(s) => s,
        Err(e) => {
            warn!("scheduler: failed to load refresh settings: {e}");
            return false;
        }
    };
    let last_run = state
        .db
        .get_config(KEY_LAST_SCHEDULED)
        .ok()
        .flatten()
        .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok());

    if !refresh_due(&settings, now, last_run) {
        return false;
    }

    info!(days_back = settings.days_back, "scheduled refresh starting");
    match run_refresh(state, settings.days_back, None).await {
        Ok(outcome) => info!(
            motions_found = outcome.motions_found,
            cases_scanned = outcome.cases_scanned,
            cases_failed = outcome.cases_failed,
            "scheduled refresh completed"
        ),
        Err(e) if e.is::<RefreshBusy>() => {
            info!("scheduled refresh deferred, another refresh is running");
            return false;
        }
        Err(e) => warn!("scheduled refresh failed: {e}"),
    }
    // Failed runs are not retried until the next day.
    let today = now.date_naive().format("%Y-%m-%d").to_string();
    if let Err(e) = state.db.set_config(KEY_LAST_SCHEDULED, &today) {
        warn!("scheduler: failed to record run date: {e}");
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn settings(auto: bool, at: &str) -> RefreshSettings {
        RefreshSettings {
            auto_refresh: auto,
            refresh_time: at.into(),
            days_back: 1,
        }
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, h, m, 0).unwrap()
    }

    #[test]
    fn fires_once_after_configured_time() {
        let s = settings(true, "01:00");
        assert!(!refresh_due(&s, at(0, 59), None));
        assert!(refresh_due(&s, at(1, 0), None));
        assert!(refresh_due(&s, at(23, 0), None));

        let today = at(0, 0).date_naive();
        assert!(!refresh_due(&s, at(1, 30), Some(today)));

        let yesterday = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert!(refresh_due(&s, at(1, 30), Some(yesterday)));
    }

    #[test]
    fn disabled_or_malformed_never_fires() {
        assert!(!refresh_due(&settings(false, "01:00"), at(12, 0), None));
        assert!(!refresh_due(&settings(true, "1am"), at(12, 0), None));
    }

    #[test]
    fn parses_hour_minute() {
        assert_eq!(
            parse_refresh_time(" 06:30 "),
            NaiveTime::from_hms_opt(6, 30, 0)
        );
        assert!(parse_refresh_time("25:00").is_none());
    }
}
