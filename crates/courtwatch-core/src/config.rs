use std::collections::HashMap;

use anyhow::Result;

use crate::{
    db::{Db, KEY_AUTO_REFRESH, KEY_REFRESH_DAYS_BACK, KEY_REFRESH_TIME},
    summarizer::SummaryOptions,
    types::RefreshSettings,
};

/// Full application configuration.
/// Refresh settings are seeded to and then loaded from the DB `config` table.
/// Credentials come from env/.env only.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: String,

    // Web
    pub web_bind: String,
    pub web_port: u16,
    pub allowed_origins: Vec<String>,

    /// "lexmachina" (default) or "docketalarm".
    pub provider: String,

    // Lex Machina
    pub lex_machina_client_id: String,
    pub lex_machina_client_secret: String,
    pub lex_machina_base_url: String,

    // Docket Alarm
    pub docket_alarm_username: String,
    pub docket_alarm_password: String,
    pub docket_alarm_client_matter: String,
    pub docket_alarm_base_url: String,
    pub docket_alarm_session_ttl_s: u64,

    /// "openai" (default) or "ollama".
    pub summarizer: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub summary_max_chars: usize,
    pub summary_max_tokens: u32,
    pub summary_temperature: f32,
    pub summary_timeout_s: u64,

    // Scheduled refresh
    pub auto_refresh: bool,
    pub refresh_time: String,
    pub refresh_days_back: i64,

    // Stats
    pub trend_days: i64,
    pub judge_limit: i64,
}

pub(crate) fn parse_dotenv_str(contents: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            let v = v.trim();
            let v = v
                .strip_prefix('"')
                .and_then(|s| s.strip_suffix('"'))
                .unwrap_or(v);
            map.insert(k.trim().to_string(), v.to_string());
        }
    }
    map
}

fn parse_dotenv() -> HashMap<String, String> {
    std::fs::read_to_string(".env")
        .map(|contents| parse_dotenv_str(&contents))
        .unwrap_or_default()
}

fn get(key: &str, dotenv: &HashMap<String, String>) -> Option<String> {
    std::env::var(key).ok().or_else(|| dotenv.get(key).cloned())
}

fn get_str(key: &str, dotenv: &HashMap<String, String>, default: &str) -> String {
    get(key, dotenv).unwrap_or_else(|| default.to_string())
}

fn get_bool(key: &str, dotenv: &HashMap<String, String>, default: bool) -> bool {
    match get(key, dotenv).as_deref() {
        Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        Some(_) => default,
        None => default,
    }
}

fn get_parsed<T: std::str::FromStr>(key: &str, dotenv: &HashMap<String, String>, default: T) -> T {
    get(key, dotenv)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self::from_map(&parse_dotenv()))
    }

    /// Build from process env, falling back to `dotenv` and then defaults.
    pub fn from_map(dotenv: &HashMap<String, String>) -> Self {
        Config {
            data_dir: get_str("DATA_DIR", dotenv, "store"),
            web_bind: get_str("WEB_BIND", dotenv, "0.0.0.0"),
            web_port: get_parsed("WEB_PORT", dotenv, 5000),
            allowed_origins: split_list(&get_str(
                "ALLOWED_ORIGINS",
                dotenv,
                "https://courtwatchai.netlify.app,http://localhost:3000",
            )),
            provider: get_str("PROVIDER", dotenv, "lexmachina").to_lowercase(),
            lex_machina_client_id: get_str("LEX_MACHINA_CLIENT_ID", dotenv, ""),
            lex_machina_client_secret: get_str("LEX_MACHINA_CLIENT_SECRET", dotenv, ""),
            lex_machina_base_url: get_str(
                "LEX_MACHINA_BASE_URL",
                dotenv,
                "https://api.lexmachina.com",
            ),
            docket_alarm_username: get_str("DOCKET_ALARM_USERNAME", dotenv, ""),
            docket_alarm_password: get_str("DOCKET_ALARM_PASSWORD", dotenv, ""),
            docket_alarm_client_matter: get_str("DOCKET_ALARM_CLIENT_MATTER", dotenv, ""),
            docket_alarm_base_url: get_str(
                "DOCKET_ALARM_BASE_URL",
                dotenv,
                "https://www.docketalarm.com",
            ),
            docket_alarm_session_ttl_s: get_parsed("DOCKET_ALARM_SESSION_TTL_S", dotenv, 3000),
            summarizer: get_str("SUMMARIZER", dotenv, "openai").to_lowercase(),
            openai_api_key: get_str("OPENAI_API_KEY", dotenv, ""),
            openai_base_url: get_str("OPENAI_BASE_URL", dotenv, "https://api.openai.com/v1"),
            openai_model: get_str("OPENAI_MODEL", dotenv, "gpt-4"),
            ollama_base_url: get_str("OLLAMA_BASE_URL", dotenv, "http://localhost:11434"),
            ollama_model: get_str("OLLAMA_MODEL", dotenv, "llama3"),
            summary_max_chars: get_parsed("SUMMARY_MAX_CHARS", dotenv, 15_000),
            summary_max_tokens: get_parsed("SUMMARY_MAX_TOKENS", dotenv, 500),
            summary_temperature: get_parsed("SUMMARY_TEMPERATURE", dotenv, 0.3),
            summary_timeout_s: get_parsed("SUMMARY_TIMEOUT_S", dotenv, 120),
            auto_refresh: get_bool("AUTO_REFRESH", dotenv, false),
            refresh_time: get_str("REFRESH_TIME", dotenv, "01:00"),
            refresh_days_back: get_parsed("REFRESH_DAYS_BACK", dotenv, 1),
            trend_days: get_parsed("TREND_DAYS", dotenv, 30),
            judge_limit: get_parsed("JUDGE_LIMIT", dotenv, 20),
        }
    }

    pub fn summary_options(&self) -> SummaryOptions {
        SummaryOptions {
            max_chars: self.summary_max_chars,
            max_tokens: self.summary_max_tokens,
            temperature: self.summary_temperature,
            timeout_secs: self.summary_timeout_s,
        }
    }

    pub fn refresh_defaults(&self) -> RefreshSettings {
        RefreshSettings {
            auto_refresh: self.auto_refresh,
            refresh_time: self.refresh_time.clone(),
            days_back: self.refresh_days_back,
        }
    }

    /// Write refresh settings to DB if not already present (first-run seeding).
    pub fn seed_db(&self, db: &Db) -> Result<()> {
        let entries: &[(&str, String)] = &[
            (KEY_AUTO_REFRESH, self.auto_refresh.to_string()),
            (KEY_REFRESH_TIME, self.refresh_time.clone()),
            (KEY_REFRESH_DAYS_BACK, self.refresh_days_back.to_string()),
        ];
        let conn_guard = db.raw_conn();
        let conn = conn_guard.lock().unwrap_or_else(|e| e.into_inner());
        for (key, value) in entries {
            conn.execute(
                "INSERT OR IGNORE INTO config (key, value, updated_at) VALUES (?1, ?2, datetime('now'))",
                rusqlite::params![key, value],
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotenv_parsing_skips_comments_and_strips_quotes() {
        let map = parse_dotenv_str(
            "# comment\n\nPROVIDER = docketalarm\nOPENAI_MODEL=\"gpt-4o\"\nbroken line\n",
        );
        assert_eq!(map.get("PROVIDER").map(String::as_str), Some("docketalarm"));
        assert_eq!(map.get("OPENAI_MODEL").map(String::as_str), Some("gpt-4o"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn defaults_apply_for_unset_keys() {
        let c = Config::from_map(&HashMap::new());
        assert_eq!(c.summary_max_chars, 15_000);
        assert_eq!(c.summary_max_tokens, 500);
        assert_eq!(c.refresh_defaults(), RefreshSettings::default());
        assert_eq!(c.trend_days, 30);
        assert_eq!(c.judge_limit, 20);
    }

    #[test]
    fn dotenv_values_override_defaults() {
        let mut map = HashMap::new();
        map.insert("REFRESH_DAYS_BACK".to_string(), "7".to_string());
        map.insert("ALLOWED_ORIGINS".to_string(), "http://a, ,http://b".to_string());
        let c = Config::from_map(&map);
        if std::env::var("REFRESH_DAYS_BACK").is_err() {
            assert_eq!(c.refresh_days_back, 7);
        }
        if std::env::var("ALLOWED_ORIGINS").is_err() {
            assert_eq!(c.allowed_origins, vec!["http://a", "http://b"]);
        }
    }

    #[test]
    fn seed_does_not_overwrite_saved_settings() {
        let mut db = Db::open_in_memory().unwrap();
        db.migrate().unwrap();
        db.set_config(KEY_REFRESH_TIME, "06:30").unwrap();

        let mut c = Config::from_map(&HashMap::new());
        c.refresh_time = "02:00".into();
        c.auto_refresh = true;
        c.seed_db(&db).unwrap();

        let settings = db.refresh_settings(&RefreshSettings::default()).unwrap();
        assert_eq!(settings.refresh_time, "06:30");
        assert!(settings.auto_refresh);
    }
}
