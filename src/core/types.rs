use super::state::BotState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    /// Unexpected regressions the watchdog corrected (e.g. a forced logout).
    Critical,
}

/// One record on the status stream. Observational only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub is_state_change: bool,
    pub is_error: bool,
    pub severity: Severity,
    pub state: BotState,
}

impl ActionLogEntry {
    pub fn action(state: BotState, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
            is_state_change: false,
            is_error: false,
            severity: Severity::Info,
            state,
        }
    }

    pub fn error(state: BotState, message: impl Into<String>) -> Self {
        Self {
            is_error: true,
            severity: Severity::Error,
            ..Self::action(state, message)
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self.is_error = severity >= Severity::Error;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionOrigin {
    /// Derived by the supervisor from live page signals.
    Inferred,
    /// Assigned by a handler, the worker, or the orchestrator.
    Forced,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChange {
    pub at: DateTime<Utc>,
    pub from: BotState,
    pub to: BotState,
    pub origin: TransitionOrigin,
    pub note: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleSource {
    Remote,
    /// The remote clock was unreachable; the local clock stands in for it.
    LocalFallback,
}

/// A reading of the authoritative remote clock, pinned to the local monotonic
/// clock at the moment it was taken. Superseded, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSyncSample {
    pub remote: DateTime<Utc>,
    pub local_wall: DateTime<Utc>,
    pub local_mono: Instant,
    pub source: SampleSource,
}

impl TimeSyncSample {
    /// How far the remote clock runs ahead of the local wall clock.
    pub fn remote_ahead(&self) -> chrono::TimeDelta {
        self.remote.signed_duration_since(self.local_wall)
    }

    /// Remote reading that corresponds to `instant`.
    pub fn remote_at(&self, instant: Instant) -> DateTime<Utc> {
        self.remote + signed_between(self.local_mono, instant)
    }
}

fn signed_between(from: Instant, to: Instant) -> chrono::TimeDelta {
    if to >= from {
        chrono::TimeDelta::from_std(to - from).unwrap_or(chrono::TimeDelta::MAX)
    } else {
        -chrono::TimeDelta::from_std(from - to).unwrap_or(chrono::TimeDelta::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn remote_at_uses_monotonic_elapsed() {
        let now = Instant::now();
        let wall = Utc::now();
        let sample = TimeSyncSample {
            remote: wall + chrono::TimeDelta::seconds(2),
            local_wall: wall,
            local_mono: now,
            source: SampleSource::Remote,
        };
        assert_eq!(sample.remote_ahead(), chrono::TimeDelta::seconds(2));
        let later = now + Duration::from_millis(1500);
        assert_eq!(
            sample.remote_at(later),
            wall + chrono::TimeDelta::milliseconds(3500)
        );
    }

    #[test]
    fn severity_drives_error_flag() {
        let entry = ActionLogEntry::action(BotState::LoggedOut, "session dropped")
            .with_severity(Severity::Critical);
        assert!(entry.is_error);
        assert!(!ActionLogEntry::action(BotState::Idle, "tick").is_error);
    }
}
