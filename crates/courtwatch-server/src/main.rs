mod logging;
mod routes;
mod schedule;

use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use courtwatch_core::{config::Config, db::Db, tracker::Tracker};
use tokio::sync::broadcast;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::logging::{BroadcastLayer, LogRing};

// ── AppState ──────────────────────────────────────────────────────────────

pub struct AppState {
    pub db: Arc<Db>,
    pub tracker: Arc<Tracker>,
    pub config: Arc<Config>,
    /// Held for the duration of a refresh; contenders are turned away.
    pub refresh_lock: tokio::sync::Mutex<()>,
    pub log_tx: broadcast::Sender<String>,
    pub log_ring: LogRing,
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(allowed))
}

// ── main ──────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (log_tx, _log_rx) = broadcast::channel::<String>(256);
    let log_ring: LogRing = Arc::default();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "courtwatch_server=info,courtwatch_core=info,courtwatch_providers=info,\
                 courtwatch_agent=info,tower_http=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(BroadcastLayer {
            tx: log_tx.clone(),
            ring: log_ring.clone(),
        })
        .init();

    let config = Config::from_env()?;

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("failed to create data dir {:?}", config.data_dir))?;
    let db_path = format!("{}/motions.db", config.data_dir);
    let mut db = Db::open(&db_path)?;
    db.migrate()?;
    config.seed_db(&db)?;
    let db = Arc::new(db);

    let provider = courtwatch_providers::from_config(&config)?;
    let summarizer = courtwatch_agent::from_config(&config)?;
    info!(
        provider = provider.name(),
        summarizer = summarizer.name(),
        db = %db_path,
        "courtwatch starting"
    );
    let tracker = Arc::new(Tracker::new(
        provider,
        summarizer,
        config.summary_max_chars,
    ));

    let config = Arc::new(config);
    let state = Arc::new(AppState {
        db,
        tracker,
        config: Arc::clone(&config),
        refresh_lock: tokio::sync::Mutex::new(()),
        log_tx,
        log_ring,
    });

    // Always spawned; auto_refresh is checked on every tick.
    tokio::spawn(schedule::run_scheduler(Arc::clone(&state)));

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.allowed_origins));

    let addr = format!("{}:{}", config.web_bind, config.web_port);
    info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await?;
    Ok(())
}

