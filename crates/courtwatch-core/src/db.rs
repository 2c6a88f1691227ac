use anyhow::{Context, Result};
use chrono::{NaiveDate, TimeDelta, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::types::{
    GroupCount, MotionFilter, MotionRecord, RefreshSettings, StoredAttorney, StoredMotion,
    StoredParty, TrendPoint,
};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS motions (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    case_name         TEXT,
    judge             TEXT,
    court             TEXT,
    docket_number     TEXT,
    motion_type       TEXT,
    order_date        TEXT,
    order_description TEXT,
    document_number   TEXT,
    summary           TEXT,
    date_added        TEXT,
    full_data         TEXT,
    UNIQUE(court, docket_number, document_number)
);
CREATE TABLE IF NOT EXISTS parties (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    motion_id  INTEGER NOT NULL REFERENCES motions(id) ON DELETE CASCADE,
    party_type TEXT,
    party_name TEXT
);
CREATE TABLE IF NOT EXISTS attorneys (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    party_id      INTEGER NOT NULL REFERENCES parties(id) ON DELETE CASCADE,
    attorney_name TEXT,
    law_firm      TEXT
);
CREATE TABLE IF NOT EXISTS config (
    key        TEXT PRIMARY KEY,
    value      TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_motions_order_date ON motions(order_date);
CREATE INDEX IF NOT EXISTS idx_parties_motion ON parties(motion_id);
CREATE INDEX IF NOT EXISTS idx_attorneys_party ON attorneys(party_id);
";

const MOTION_COLUMNS: &str = "id, case_name, judge, court, docket_number, motion_type, \
     order_date, order_description, document_number, summary, date_added";

// Shared WHERE clause for filtered listing and counting. NULL parameters disable
// their criterion.
const FILTER_WHERE: &str = "WHERE (?1 IS NULL OR court = ?1) \
     AND (?2 IS NULL OR judge LIKE '%' || ?2 || '%') \
     AND (?3 IS NULL OR motion_type LIKE '%' || ?3 || '%') \
     AND (?4 IS NULL OR order_date >= ?4) \
     AND (?5 IS NULL OR order_date <= ?5)";

pub const KEY_AUTO_REFRESH: &str = "auto_refresh";
pub const KEY_REFRESH_TIME: &str = "refresh_time";
pub const KEY_REFRESH_DAYS_BACK: &str = "refresh_days_back";

pub struct Db {
    conn: Mutex<Connection>,
}

// ── Timestamp helpers ─────────────────────────────────────────────────────

fn now_str() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn today_str() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

// ── Row mappers ───────────────────────────────────────────────────────────

fn row_to_motion(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredMotion> {
    Ok(StoredMotion {
        id: row.get(0)?,
        case_name: row.get(1)?,
        judge: row.get(2)?,
        court: row.get(3)?,
        docket_number: row.get(4)?,
        motion_type: row.get(5)?,
        order_date: row.get(6)?,
        order_description: row.get(7)?,
        document_number: row.get(8)?,
        summary: row.get(9)?,
        date_added: row.get(10)?,
        parties: Vec::new(),
    })
}

fn row_to_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<GroupCount> {
    Ok(GroupCount {
        key: row.get(0)?,
        count: row.get(1)?,
    })
}

fn load_parties(conn: &Connection, motion_id: i64) -> rusqlite::Result<Vec<StoredParty>> {
    let mut party_stmt = conn.prepare_cached(
        "SELECT id, party_type, party_name FROM parties WHERE motion_id = ?1 ORDER BY id ASC",
    )?;
    let mut parties = party_stmt
        .query_map(params![motion_id], |row| {
            Ok(StoredParty {
                id: row.get(0)?,
                party_type: row.get(1)?,
                party_name: row.get(2)?,
                attorneys: Vec::new(),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut attorney_stmt = conn.prepare_cached(
        "SELECT id, attorney_name, law_firm FROM attorneys WHERE party_id = ?1 ORDER BY id ASC",
    )?;
    for party in &mut parties {
        party.attorneys = attorney_stmt
            .query_map(params![party.id], |row| {
                Ok(StoredAttorney {
                    id: row.get(0)?,
                    attorney_name: row.get(1)?,
                    law_firm: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
    }
    Ok(parties)
}

fn with_parties(conn: &Connection, mut motions: Vec<StoredMotion>) -> rusqlite::Result<Vec<StoredMotion>> {
    for motion in &mut motions {
        motion.parties = load_parties(conn, motion.id)?;
    }
    Ok(motions)
}

// ── Db impl ───────────────────────────────────────────────────────────────

impl Db {
    pub fn raw_conn(&self) -> &std::sync::Mutex<Connection> {
        &self.conn
    }

    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open SQLite database at {path:?}"))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .context("failed to set PRAGMAs")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory SQLite")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .context("failed to set PRAGMAs")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn migrate(&mut self) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute_batch(SCHEMA_SQL)
            .context("failed to apply schema migrations")?;
        Ok(())
    }

    // ── Motions ───────────────────────────────────────────────────────────

    /// Insert or update the motion keyed by (court, docket_number,
    /// document_number), then replace its parties and attorneys wholesale.
    /// Returns the motion id, which is stable across updates.
    pub fn upsert_motion(&self, record: &MotionRecord) -> Result<i64> {
        let mut conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let tx = conn.transaction().context("upsert_motion: begin")?;

        let full_data = serde_json::to_string(record).context("upsert_motion: serialize")?;
        let date_added = today_str();
        let order = &record.order_info;

        // `IS` so that absent key parts compare equal to each other.
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM motions \
                 WHERE court IS ?1 AND docket_number IS ?2 AND document_number IS ?3",
                params![record.court, record.docket_number, order.document_number],
                |row| row.get(0),
            )
            .optional()
            .context("upsert_motion: lookup")?;

        let motion_id = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE motions SET case_name = ?1, judge = ?2, motion_type = ?3, \
                     order_date = ?4, order_description = ?5, summary = ?6, \
                     date_added = ?7, full_data = ?8 WHERE id = ?9",
                    params![
                        record.case_name,
                        record.judge,
                        record.motion_type,
                        order.date,
                        order.description,
                        record.summary,
                        date_added,
                        full_data,
                        id,
                    ],
                )
                .context("upsert_motion: update")?;
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO motions \
                     (case_name, judge, court, docket_number, motion_type, order_date, \
                      order_description, document_number, summary, date_added, full_data) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        record.case_name,
                        record.judge,
                        record.court,
                        record.docket_number,
                        record.motion_type,
                        order.date,
                        order.description,
                        order.document_number,
                        record.summary,
                        date_added,
                        full_data,
                    ],
                )
                .context("upsert_motion: insert")?;
                tx.last_insert_rowid()
            }
        };

        tx.execute(
            "DELETE FROM attorneys WHERE party_id IN (SELECT id FROM parties WHERE motion_id = ?1)",
            params![motion_id],
        )
        .context("upsert_motion: clear attorneys")?;
        tx.execute("DELETE FROM parties WHERE motion_id = ?1", params![motion_id])
            .context("upsert_motion: clear parties")?;

        for party in &record.parties {
            tx.execute(
                "INSERT INTO parties (motion_id, party_type, party_name) VALUES (?1, ?2, ?3)",
                params![motion_id, party.role, party.name],
            )
            .context("upsert_motion: insert party")?;
            let party_id = tx.last_insert_rowid();
            for attorney in &party.attorneys {
                tx.execute(
                    "INSERT INTO attorneys (party_id, attorney_name, law_firm) VALUES (?1, ?2, ?3)",
                    params![party_id, attorney.name, attorney.firm],
                )
                .context("upsert_motion: insert attorney")?;
            }
        }

        tx.commit().context("upsert_motion: commit")?;
        Ok(motion_id)
    }

    pub fn get_motion(&self, id: i64) -> Result<Option<StoredMotion>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let motion = conn
            .query_row(
                &format!("SELECT {MOTION_COLUMNS} FROM motions WHERE id = ?1"),
                params![id],
                row_to_motion,
            )
            .optional()
            .context("get_motion")?;
        match motion {
            None => Ok(None),
            Some(mut m) => {
                m.parties = load_parties(&conn, m.id).context("get_motion: parties")?;
                Ok(Some(m))
            }
        }
    }

    pub fn list_motions(&self, limit: i64, offset: i64) -> Result<Vec<StoredMotion>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn.prepare(&format!(
            "SELECT {MOTION_COLUMNS} FROM motions \
             ORDER BY order_date DESC, id DESC LIMIT ?1 OFFSET ?2"
        ))?;
        let motions = stmt
            .query_map(params![limit, offset], row_to_motion)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("list_motions")?;
        with_parties(&conn, motions).context("list_motions: parties")
    }

    pub fn filter_motions(
        &self,
        filter: &MotionFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<StoredMotion>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn.prepare(&format!(
            "SELECT {MOTION_COLUMNS} FROM motions {FILTER_WHERE} \
             ORDER BY order_date DESC, id DESC LIMIT ?6 OFFSET ?7"
        ))?;
        let motions = stmt
            .query_map(
                params![
                    filter.court,
                    filter.judge,
                    filter.motion_type,
                    filter.start_date,
                    filter.end_date,
                    limit,
                    offset,
                ],
                row_to_motion,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("filter_motions")?;
        with_parties(&conn, motions).context("filter_motions: parties")
    }

    pub fn count_filtered(&self, filter: &MotionFilter) -> Result<i64> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.query_row(
            &format!("SELECT COUNT(*) FROM motions {FILTER_WHERE}"),
            params![
                filter.court,
                filter.judge,
                filter.motion_type,
                filter.start_date,
                filter.end_date,
            ],
            |row| row.get(0),
        )
        .context("count_filtered")
    }

    // ── Aggregates ────────────────────────────────────────────────────────

    pub fn count_motions(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.query_row("SELECT COUNT(*) FROM motions", [], |row| row.get(0))
            .context("count_motions")
    }

    pub fn count_by_court(&self) -> Result<Vec<GroupCount>> {
        self.group_count(
            "SELECT court, COUNT(*) AS n FROM motions GROUP BY court ORDER BY n DESC, court ASC",
            None,
        )
        .context("count_by_court")
    }

    pub fn count_by_judge(&self, limit: i64) -> Result<Vec<GroupCount>> {
        self.group_count(
            "SELECT judge, COUNT(*) AS n FROM motions GROUP BY judge \
             ORDER BY n DESC, judge ASC LIMIT ?1",
            Some(limit),
        )
        .context("count_by_judge")
    }

    pub fn count_by_type(&self) -> Result<Vec<GroupCount>> {
        self.group_count(
            "SELECT motion_type, COUNT(*) AS n FROM motions GROUP BY motion_type \
             ORDER BY n DESC, motion_type ASC",
            None,
        )
        .context("count_by_type")
    }

    /// Most active law firms across all stored attorneys.
    pub fn law_firms(&self, limit: i64) -> Result<Vec<GroupCount>> {
        self.group_count(
            "SELECT law_firm, COUNT(*) AS n FROM attorneys GROUP BY law_firm \
             ORDER BY n DESC, law_firm ASC LIMIT ?1",
            Some(limit),
        )
        .context("law_firms")
    }

    fn group_count(&self, sql: &str, limit: Option<i64>) -> Result<Vec<GroupCount>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn.prepare(sql)?;
        let rows = match limit {
            Some(limit) => stmt.query_map(params![limit], row_to_group)?,
            None => stmt.query_map([], row_to_group)?,
        };
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Daily motion counts from `end - days` through `end`, inclusive. Every
    /// day in range appears, zero-filled.
    pub fn motion_trend(&self, days: i64, end: NaiveDate) -> Result<Vec<TrendPoint>> {
        let start = TimeDelta::try_days(days.max(0))
            .and_then(|span| end.checked_sub_signed(span))
            .with_context(|| format!("trend span of {days} days is out of range"))?;
        let start_str = start.format("%Y-%m-%d").to_string();
        let end_str = end.format("%Y-%m-%d").to_string();

        let counts: HashMap<String, i64> = {
            let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
            let mut stmt = conn.prepare(
                "SELECT order_date, COUNT(*) FROM motions \
                 WHERE order_date >= ?1 AND order_date <= ?2 GROUP BY order_date",
            )?;
            let rows = stmt
                .query_map(params![start_str, end_str], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("motion_trend")?;
            rows.into_iter().collect()
        };

        Ok(start
            .iter_days()
            .take_while(|d| *d <= end)
            .map(|d| {
                let date = d.format("%Y-%m-%d").to_string();
                let count = counts.get(&date).copied().unwrap_or(0);
                TrendPoint { date, count }
            })
            .collect())
    }

    // ── Config ────────────────────────────────────────────────────────────

    pub fn get_config(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let result = conn
            .query_row(
                "SELECT value FROM config WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .context("get_config")?;
        Ok(result)
    }

    pub fn set_config(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let updated_at = now_str();
        conn.execute(
            "INSERT INTO config (key, value, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, updated_at],
        )
        .context("set_config")?;
        Ok(())
    }

    /// Refresh settings from the config table, falling back to `defaults` per key.
    pub fn refresh_settings(&self, defaults: &RefreshSettings) -> Result<RefreshSettings> {
        let auto_refresh = self
            .get_config(KEY_AUTO_REFRESH)?
            .map(|v| v == "true" || v == "1")
            .unwrap_or(defaults.auto_refresh);
        let refresh_time = self
            .get_config(KEY_REFRESH_TIME)?
            .unwrap_or_else(|| defaults.refresh_time.clone());
        let days_back = self
            .get_config(KEY_REFRESH_DAYS_BACK)?
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.days_back);
        Ok(RefreshSettings {
            auto_refresh,
            refresh_time,
            days_back,
        })
    }

    pub fn save_refresh_settings(&self, settings: &RefreshSettings) -> Result<()> {
        self.set_config(KEY_AUTO_REFRESH, &settings.auto_refresh.to_string())?;
        self.set_config(KEY_REFRESH_TIME, &settings.refresh_time)?;
        self.set_config(KEY_REFRESH_DAYS_BACK, &settings.days_back.to_string())?;
        Ok(())
    }
}
