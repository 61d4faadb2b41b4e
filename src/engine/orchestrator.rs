//! Lifecycle of one booking attempt.
//!
//! The orchestrator seeds the register, samples the remote clock, runs the
//! supervisor, worker and clock refresher side by side, and ends the run on a
//! terminal state, an external stop, or the optional run timeout. Whatever
//! the outcome, the browser session is closed last.

use super::stop::StopSignal;
use super::worker::Worker;
use super::{supervisor, EngineContext};
use crate::core::capabilities::Capabilities;
use crate::core::config::{BookingConfig, BotSettings};
use crate::core::error::Result;
use crate::core::register::StateRegister;
use crate::core::state::BotState;
use crate::core::types::StateChange;
use crate::timesync::TimeSynchronizer;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub account: String,
    pub final_state: BotState,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub transitions: Vec<StateChange>,
}

impl RunOutcome {
    pub fn is_confirmed(&self) -> bool {
        self.final_state == BotState::Confirmed
    }
}

/// Cheap handle for external supervision of a running attempt.
#[derive(Clone, Debug)]
pub struct OrchestratorHandle {
    run_id: Uuid,
    account: String,
    register: Arc<StateRegister>,
    stop: StopSignal,
}

impl OrchestratorHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Ask the run to wind down. Idempotent.
    pub fn stop(&self) {
        self.stop.trigger();
    }

    pub fn current_state(&self) -> BotState {
        self.register.get()
    }

    pub fn recent_transitions(&self) -> Vec<StateChange> {
        self.register.changes()
    }
}

pub struct Orchestrator {
    run_id: Uuid,
    ctx: EngineContext,
}

impl Orchestrator {
    pub fn new(booking: BookingConfig, settings: BotSettings, caps: Capabilities) -> Result<Self> {
        let time = Arc::new(TimeSynchronizer::new(
            Arc::clone(&caps.time_source),
            settings.utc_offset_minutes,
        )?);
        Ok(Self::with_time(booking, settings, caps, time))
    }

    /// Orchestrator sharing an existing synchronizer (multi-account runs).
    pub fn with_time(
        booking: BookingConfig,
        settings: BotSettings,
        caps: Capabilities,
        time: Arc<TimeSynchronizer>,
    ) -> Self {
        let register = Arc::new(StateRegister::new(
            BotState::Starting,
            Arc::clone(&caps.sink),
        ));
        Self {
            run_id: Uuid::new_v4(),
            ctx: EngineContext {
                caps,
                register,
                time,
                booking: Arc::new(booking),
                settings: Arc::new(settings),
                stop: StopSignal::new(),
            },
        }
    }

    pub fn handle(&self) -> OrchestratorHandle {
        OrchestratorHandle {
            run_id: self.run_id,
            account: self.ctx.booking.account.username.clone(),
            register: Arc::clone(&self.ctx.register),
            stop: self.ctx.stop.clone(),
        }
    }

    pub async fn run(self) -> RunOutcome {
        let ctx = self.ctx;
        let started_at = Utc::now();
        info!(
            "🚀 run {} started for {}",
            self.run_id, ctx.booking.account.username
        );
        ctx.register.record(format!("run {} started", self.run_id));

        if ctx.time.latest().is_none() {
            ctx.time.sample().await;
        }
        let refresher = ctx
            .time
            .spawn_refresher(ctx.settings.time_refresh(), ctx.stop.clone());
        let supervisor_task = tokio::spawn(supervisor::run(ctx.clone()));
        let worker_task = tokio::spawn(Worker::new(ctx.clone()).run());

        wait_for_end(&ctx).await;

        let current = ctx.register.get();
        if !current.is_terminal() {
            if ctx.stop.is_stopped() {
                ctx.register.force(BotState::Stopped, "stop requested");
            } else {
                error!("⏱️ run timed out in {}", current);
                ctx.register
                    .record_error(format!("run timed out in {}", current));
                ctx.register.force(BotState::Failed, "run timeout");
            }
            ctx.stop.trigger();
        }

        // On a natural terminal state the worker still runs its handler.
        let join_timeout = ctx.settings.shutdown_join_timeout();
        join_bounded("worker", worker_task, join_timeout).await;
        ctx.stop.trigger();
        join_bounded("supervisor", supervisor_task, join_timeout).await;
        refresher.abort();

        if let Err(e) = ctx.caps.executor.close().await {
            warn!("browser close failed: {}", e);
        }

        let final_state = ctx.register.get();
        info!("🏁 run {} finished: {}", self.run_id, final_state);
        RunOutcome {
            run_id: self.run_id,
            account: ctx.booking.account.username.clone(),
            final_state,
            started_at,
            finished_at: Utc::now(),
            transitions: ctx.register.changes(),
        }
    }
}

async fn wait_for_end(ctx: &EngineContext) {
    let mut changes = ctx.register.subscribe();
    let terminal = async {
        let _ = changes.wait_for(|s| s.is_terminal()).await;
    };
    let timeout = async {
        match ctx.settings.run_timeout() {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        _ = terminal => {}
        _ = ctx.stop.cancelled() => {}
        _ = timeout => {}
    }
}

async fn join_bounded(name: &str, mut task: JoinHandle<()>, limit: Duration) {
    match tokio::time::timeout(limit, &mut task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("{} task ended abnormally: {}", name, e),
        Err(_) => {
            warn!("{} did not stop within {}ms, aborting", name, limit.as_millis());
            task.abort();
        }
    }
}
