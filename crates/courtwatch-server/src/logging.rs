use std::{collections::VecDeque, sync::Arc};

use tokio::sync::broadcast;

/// Lines kept for clients that connect to `/api/logs` late.
pub(crate) const RING_CAPACITY: usize = 500;

pub(crate) type LogRing = Arc<std::sync::Mutex<VecDeque<String>>>;

/// Mirrors every event as a JSON line into a ring buffer and a broadcast
/// channel for the SSE log stream.
pub(crate) struct BroadcastLayer {
    pub tx: broadcast::Sender<String>,
    pub ring: LogRing,
}

struct MessageVisitor<'a> {
    message: &'a mut String,
}

impl tracing::field::Visit for MessageVisitor<'_> {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            *self.message = value.to_string();
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message.clear();
            use std::fmt::Write;
            let _ = write!(self.message, "{value:?}");
            // Strip surrounding quotes added by Debug on &str
            if self.message.starts_with('"') && self.message.ends_with('"') && self.message.len() > 1
            {
                *self.message = self.message[1..self.message.len() - 1].to_string();
            }
        }
    }
}

pub(crate) fn category(target: &str) -> &'static str {
    if target.contains("tracker") || target.contains("schedule") || target.contains("routes") {
        "refresh"
    } else if target.starts_with("courtwatch_providers") {
        "provider"
    } else if target.starts_with("courtwatch_agent") {
        "summarizer"
    } else if target.starts_with("tower_http") {
        "http"
    } else {
        "system"
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for BroadcastLayer {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let level = match *event.metadata().level() {
            tracing::Level::ERROR => "err",
            tracing::Level::WARN => "warn",
            tracing::Level::INFO => "info",
            tracing::Level::DEBUG => "debug",
            tracing::Level::TRACE => return,
        };

        let mut message = String::new();
        event.record(&mut MessageVisitor {
            message: &mut message,
        });

        let json = serde_json::json!({
            "ts": chrono::Utc::now().timestamp(),
            "level": level,
            "message": message,
            "category": category(event.metadata().target()),
        })
        .to_string();

        let _ = self.tx.send(json.clone());
        if let Ok(mut ring) = self.ring.lock() {
            ring.push_back(json);
            if ring.len() > RING_CAPACITY {
                ring.pop_front();
            }
        }
    }
}
