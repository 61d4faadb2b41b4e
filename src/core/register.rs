//! Single source of truth for the believed flow position.
//!
//! Both the supervisor (inferred states) and the handlers (forced states)
//! write through [`StateRegister::set`], which swaps the state, appends the
//! change log entry, clears scratch data and emits the status record under one
//! lock.

use super::capabilities::StatusSink;
use super::state::{BotState, PhaseFamily};
use super::types::{ActionLogEntry, Severity, StateChange, TransitionOrigin};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info};

pub const DEFAULT_LOG_CAPACITY: usize = 256;

struct Inner {
    current: BotState,
    scratch: HashMap<String, serde_json::Value>,
    // Family that owns the scratch map; RECOVERING never takes ownership.
    scratch_family: Option<PhaseFamily>,
    log: VecDeque<StateChange>,
}

pub struct StateRegister {
    inner: Mutex<Inner>,
    notify: watch::Sender<BotState>,
    sink: Arc<dyn StatusSink>,
    log_capacity: usize,
}

impl std::fmt::Debug for StateRegister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateRegister")
            .field("current", &self.get())
            .finish()
    }
}

impl StateRegister {
    pub fn new(initial: BotState, sink: Arc<dyn StatusSink>) -> Self {
        Self::with_log_capacity(initial, sink, DEFAULT_LOG_CAPACITY)
    }

    pub fn with_log_capacity(
        initial: BotState,
        sink: Arc<dyn StatusSink>,
        log_capacity: usize,
    ) -> Self {
        let (notify, _) = watch::channel(initial);
        Self {
            inner: Mutex::new(Inner {
                current: initial,
                scratch: HashMap::new(),
                scratch_family: Some(initial.family()),
                log: VecDeque::with_capacity(log_capacity.min(DEFAULT_LOG_CAPACITY)),
            }),
            notify,
            sink,
            log_capacity: log_capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self) -> BotState {
        self.lock().current
    }

    /// Receiver that observes every committed transition.
    pub fn subscribe(&self) -> watch::Receiver<BotState> {
        self.notify.subscribe()
    }

    /// Commit `new` if it differs from the current state. Returns whether a
    /// transition happened. Terminal states are absorbing.
    pub fn set(&self, new: BotState, origin: TransitionOrigin, note: &str) -> bool {
        let mut inner = self.lock();
        self.commit(&mut inner, new, origin, note)
    }

    pub fn infer(&self, new: BotState, note: &str) -> bool {
        self.set(new, TransitionOrigin::Inferred, note)
    }

    pub fn force(&self, new: BotState, note: &str) -> bool {
        self.set(new, TransitionOrigin::Forced, note)
    }

    /// Compare-and-set: only moves to `new` while the state is still
    /// `expected`.
    pub fn advance_from(&self, expected: BotState, new: BotState, note: &str) -> bool {
        let mut inner = self.lock();
        if inner.current != expected {
            debug!(
                "register: skip {} -> {} (now {})",
                expected, new, inner.current
            );
            return false;
        }
        self.commit(&mut inner, new, TransitionOrigin::Forced, note)
    }

    fn commit(
        &self,
        inner: &mut Inner,
        new: BotState,
        origin: TransitionOrigin,
        note: &str,
    ) -> bool {
        let old = inner.current;
        if old == new || old.is_terminal() {
            return false;
        }

        inner.current = new;
        let family = new.family();
        if family != PhaseFamily::Recovery && inner.scratch_family != Some(family) {
            inner.scratch.clear();
            inner.scratch_family = Some(family);
        }

        if inner.log.len() >= self.log_capacity {
            inner.log.pop_front();
        }
        inner.log.push_back(StateChange {
            at: Utc::now(),
            from: old,
            to: new,
            origin,
            note: note.to_string(),
        });

        info!("state {} -> {} ({:?}) {}", old, new, origin, note);
        let mut entry = ActionLogEntry::action(new, format!("{} -> {}: {}", old, new, note));
        entry.is_state_change = true;
        if matches!(new, BotState::Failed | BotState::Fatal) {
            entry = entry.with_severity(Severity::Error);
        }
        self.sink.emit(entry);
        self.notify.send_replace(new);
        true
    }

    /// Append a non-transition record stamped with the current state.
    pub fn record(&self, message: impl Into<String>) {
        let state = self.get();
        self.sink.emit(ActionLogEntry::action(state, message));
    }

    pub fn record_error(&self, message: impl Into<String>) {
        let state = self.get();
        self.sink.emit(ActionLogEntry::error(state, message));
    }

    pub fn record_with(&self, severity: Severity, message: impl Into<String>) {
        let state = self.get();
        self.sink
            .emit(ActionLogEntry::action(state, message).with_severity(severity));
    }

    pub fn scratch_get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let inner = self.lock();
        inner
            .scratch
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn scratch_put<T: Serialize>(&self, key: &str, value: T) {
        if let Ok(v) = serde_json::to_value(value) {
            self.lock().scratch.insert(key.to_string(), v);
        }
    }

    /// Increment a counter in scratch and return the new value.
    pub fn scratch_increment(&self, key: &str) -> u64 {
        let mut inner = self.lock();
        let next = inner
            .scratch
            .get(key)
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
            + 1;
        inner.scratch.insert(key.to_string(), next.into());
        next
    }

    pub fn changes(&self) -> Vec<StateChange> {
        self.lock().log.iter().cloned().collect()
    }
}
