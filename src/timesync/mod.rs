//! Deadlines expressed in the remote clock, waited for on the local monotonic
//! clock.
//!
//! Every sample pins a remote reading to a `tokio::time::Instant`. Converting
//! "10:00:00 on the remote calendar" into an `Instant` only ever uses the
//! latest sample plus elapsed monotonic time, so a local wall-clock jump
//! between sampling and firing cannot move the gate.

pub mod remote;

use crate::core::capabilities::TimeSource;
use crate::core::error::{BotError, Result};
use crate::core::types::{SampleSource, TimeSyncSample};
use crate::engine::stop::StopSignal;
use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub use remote::HttpTimeSource;

/// Upper bound on a single sleep inside [`TimeSynchronizer::wait_until`].
pub const MAX_WAIT_POLL: Duration = Duration::from_millis(50);

pub struct TimeSynchronizer {
    source: Arc<dyn TimeSource>,
    latest: RwLock<Option<TimeSyncSample>>,
    zone: FixedOffset,
}

impl std::fmt::Debug for TimeSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeSynchronizer")
            .field("zone", &self.zone)
            .field("latest", &self.latest())
            .finish()
    }
}

impl TimeSynchronizer {
    /// `utc_offset_minutes` is the remote clock's zone, e.g. 330 for IST.
    pub fn new(source: Arc<dyn TimeSource>, utc_offset_minutes: i32) -> Result<Self> {
        let zone = FixedOffset::east_opt(utc_offset_minutes.saturating_mul(60)).ok_or_else(|| {
            BotError::Config(format!("utc offset {} minutes is out of range", utc_offset_minutes))
        })?;
        Ok(Self {
            source,
            latest: RwLock::new(None),
            zone,
        })
    }

    pub fn latest(&self) -> Option<TimeSyncSample> {
        *self.latest.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Supersede the current sample.
    pub fn install(&self, sample: TimeSyncSample) {
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = Some(sample);
    }

    /// Query the remote clock and store the result.
    ///
    /// The remote reading is pinned to the midpoint of the round trip. When
    /// the source fails the local clock stands in for it.
    pub async fn sample(&self) -> TimeSyncSample {
        let sample = match self.read_remote().await {
            Ok(sample) => sample,
            Err(e) => {
                warn!("⏱️ remote clock unavailable, using local time: {}", e);
                TimeSyncSample {
                    remote: Utc::now(),
                    local_wall: Utc::now(),
                    local_mono: Instant::now(),
                    source: SampleSource::LocalFallback,
                }
            }
        };
        self.install(sample);
        sample
    }

    /// Like [`sample`](Self::sample) but keeps the previous sample when the
    /// remote clock cannot be read.
    pub async fn refresh(&self) -> Option<TimeSyncSample> {
        match self.read_remote().await {
            Ok(sample) => {
                self.install(sample);
                Some(sample)
            }
            Err(e) => {
                debug!("time refresh skipped: {}", e);
                None
            }
        }
    }

    async fn read_remote(&self) -> Result<TimeSyncSample> {
        let sent_mono = Instant::now();
        let sent_wall = Utc::now();
        let remote = self.source.now().await?;
        let half_rtt = (Instant::now() - sent_mono) / 2;
        let sample = TimeSyncSample {
            remote,
            local_wall: sent_wall + TimeDelta::from_std(half_rtt).unwrap_or(TimeDelta::zero()),
            local_mono: sent_mono + half_rtt,
            source: SampleSource::Remote,
        };
        info!(
            "⏱️ remote clock sampled: ahead of local by {:.3}s (rtt {}ms)",
            sample.remote_ahead().num_milliseconds() as f64 / 1000.0,
            (half_rtt * 2).as_millis()
        );
        Ok(sample)
    }

    /// Current remote time, extrapolated from the latest sample.
    pub fn now_remote(&self) -> DateTime<Utc> {
        match self.latest() {
            Some(sample) => sample.remote_at(Instant::now()),
            None => Utc::now(),
        }
    }

    /// Monotonic instant at which the remote clock reads `hour:minute:second`
    /// (on the remote calendar day of the latest sample) plus `offset_seconds`.
    pub fn target_for(
        &self,
        hour: u32,
        minute: u32,
        second: u32,
        offset_seconds: f64,
    ) -> Result<Instant> {
        let sample = self
            .latest()
            .ok_or_else(|| BotError::TimeSource("no clock sample taken yet".into()))?;

        let remote_day = sample.remote.with_timezone(&self.zone).date_naive();
        let wall = remote_day.and_hms_opt(hour, minute, second).ok_or_else(|| {
            BotError::Config(format!(
                "{:02}:{:02}:{:02} is not a time of day",
                hour, minute, second
            ))
        })?;
        let target = wall
            .and_local_timezone(self.zone)
            .single()
            .ok_or_else(|| BotError::Config("ambiguous target time".into()))?
            .with_timezone(&Utc)
            + TimeDelta::milliseconds((offset_seconds * 1000.0).round() as i64);

        let delta = target.signed_duration_since(sample.remote);
        Ok(shift(sample.local_mono, delta))
    }

    /// Sleep until `target`, polling at most every 50 ms.
    ///
    /// Returns `true` once the target is reached (immediately if it already
    /// passed), `false` if `budget` runs out or the run is stopped first.
    pub async fn wait_until(&self, target: Instant, budget: Duration, stop: &StopSignal) -> bool {
        let deadline = Instant::now() + budget;
        loop {
            let now = Instant::now();
            if now >= target {
                return true;
            }
            if stop.is_stopped() || now >= deadline {
                return false;
            }
            let step = (target - now).min(deadline - now).min(MAX_WAIT_POLL);
            tokio::select! {
                _ = tokio::time::sleep(step) => {}
                _ = stop.cancelled() => return false,
            }
        }
    }

    /// Periodically refresh the sample until `stop` fires.
    pub fn spawn_refresher(
        self: &Arc<Self>,
        interval: Duration,
        stop: StopSignal,
    ) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = stop.cancelled() => break,
                }
                this.refresh().await;
            }
            debug!("time refresher stopped");
        })
    }
}

fn shift(base: Instant, delta: TimeDelta) -> Instant {
    match delta.to_std() {
        Ok(forward) => base + forward,
        Err(_) => {
            let back = (-delta).to_std().unwrap_or_default();
            base.checked_sub(back).unwrap_or(base)
        }
    }
}
