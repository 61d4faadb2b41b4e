use crate::core::capabilities::StatusSink;
use crate::core::types::{ActionLogEntry, Severity};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Mirrors every entry into `tracing`.
pub struct TracingSink {
    bot_id: String,
}

impl TracingSink {
    pub fn new(bot_id: impl Into<String>) -> Self {
        Self {
            bot_id: bot_id.into(),
        }
    }
}

impl StatusSink for TracingSink {
    fn emit(&self, entry: ActionLogEntry) {
        let bot = self.bot_id.as_str();
        let state = entry.state.as_str();
        match entry.severity {
            Severity::Critical => error!(bot, state, critical = true, "{}", entry.message),
            Severity::Error => warn!(bot, state, "{}", entry.message),
            Severity::Warning => warn!(bot, state, "{}", entry.message),
            Severity::Info if entry.is_state_change => info!(bot, state, "{}", entry.message),
            Severity::Info => debug!(bot, state, "{}", entry.message),
        }
    }
}

/// Sends every entry to each inner sink, in order.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn StatusSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn StatusSink>>) -> Self {
        Self { sinks }
    }
}

impl StatusSink for FanoutSink {
    fn emit(&self, entry: ActionLogEntry) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.emit(entry.clone());
            }
            last.emit(entry);
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusPush<'a> {
    bot_id: &'a str,
    status: &'a str,
    state: &'a str,
    is_error: bool,
    timestamp: String,
}

/// Pushes entries to an external status server as
/// `{"bot_id", "status", ...}` JSON, off the caller's task.
pub struct HttpStatusSink {
    tx: mpsc::UnboundedSender<ActionLogEntry>,
}

impl HttpStatusSink {
    /// Start the background sender. Must be called inside a runtime.
    pub fn spawn(client: reqwest::Client, url: String, bot_id: String) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<ActionLogEntry>();
        tokio::spawn(async move {
            let mut failures = 0u32;
            while let Some(entry) = rx.recv().await {
                let body = StatusPush {
                    bot_id: &bot_id,
                    status: &entry.message,
                    state: entry.state.as_str(),
                    is_error: entry.is_error,
                    timestamp: entry.timestamp.to_rfc3339(),
                };
                match deliver(&client, &url, &body).await {
                    Ok(()) => failures = 0,
                    Err(e) => {
                        failures += 1;
                        // One warning per outage.
                        if failures == 1 {
                            warn!("status server {} unreachable: {}", url, e);
                        }
                    }
                }
            }
        });
        Self { tx }
    }
}

/// POST one push; a non-2xx reply counts as a failed delivery.
async fn deliver(
    client: &reqwest::Client,
    url: &str,
    body: &StatusPush<'_>,
) -> reqwest::Result<()> {
    client
        .post(url)
        .json(body)
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}

impl StatusSink for HttpStatusSink {
    fn emit(&self, entry: ActionLogEntry) {
        let _ = self.tx.send(entry);
    }
}

/// Recent entries per bot, served by the control API.
pub struct StatusBoard {
    capacity: usize,
    entries: Mutex<HashMap<String, VecDeque<ActionLogEntry>>>,
}

impl StatusBoard {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        })
    }

    pub fn push(&self, bot_id: &str, entry: ActionLogEntry) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let log = entries.entry(bot_id.to_string()).or_default();
        if log.len() >= self.capacity {
            log.pop_front();
        }
        log.push_back(entry);
    }

    pub fn recent(&self, bot_id: &str) -> Vec<ActionLogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(bot_id)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Sink that records into this board under `bot_id`.
    pub fn sink_for(self: &Arc<Self>, bot_id: impl Into<String>) -> BoardSink {
        BoardSink {
            board: Arc::clone(self),
            bot_id: bot_id.into(),
        }
    }
}

pub struct BoardSink {
    board: Arc<StatusBoard>,
    bot_id: String,
}

impl StatusSink for BoardSink {
    fn emit(&self, entry: ActionLogEntry) {
        self.board.push(&self.bot_id, entry);
    }
}
