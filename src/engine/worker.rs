//! Edge-triggered handler dispatch.
//!
//! The worker remembers the last state it handled and runs a handler only
//! when the register shows a different one. Holding a state for many ticks
//! therefore runs its handler once.

use super::handlers::{self, HandlerFn};
use super::EngineContext;
use crate::core::error::BotError;
use crate::core::state::BotState;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

pub struct Worker {
    ctx: EngineContext,
    table: HashMap<BotState, HandlerFn>,
    last_processed: Option<BotState>,
    failures: Option<(BotState, u32)>,
}

impl Worker {
    pub fn new(ctx: EngineContext) -> Self {
        Self::with_table(ctx, handlers::dispatch_table())
    }

    /// Worker over a custom dispatch table.
    pub fn with_table(ctx: EngineContext, table: HashMap<BotState, HandlerFn>) -> Self {
        Self {
            ctx,
            table,
            last_processed: None,
            failures: None,
        }
    }

    pub fn last_processed(&self) -> Option<BotState> {
        self.last_processed
    }

    /// Handle the current state if it is a new edge. Returns whether a
    /// handler ran.
    pub async fn tick(&mut self) -> bool {
        let current = self.ctx.register.get();
        if self.last_processed == Some(current) {
            return false;
        }
        self.last_processed = Some(current);

        let Some(handler) = self.table.get(&current).copied() else {
            debug!("worker: no handler for {}", current);
            return false;
        };

        debug!("worker: handling {}", current);
        match handler(&self.ctx).await {
            Ok(()) => {
                if current != BotState::Recovering {
                    self.failures = None;
                }
            }
            Err(e) => self.on_failure(current, e),
        }
        true
    }

    fn on_failure(&mut self, state: BotState, err: BotError) {
        let register = self.ctx.register.clone();
        match err {
            BotError::Stopped => debug!("worker: {} interrupted by stop", state),
            BotError::Preempted(_) => {
                info!("↪️ {} handler preempted by {}", state, register.get());
            }
            e if e.is_fatal() => {
                error!("💀 {} handler: {}", state, e);
                register.record_error(format!("{} handler: {}", state, e));
                register.force(BotState::Fatal, &e.to_string());
                self.ctx.stop.trigger();
            }
            e @ BotError::ChallengeExhausted { .. } => {
                error!("❌ {} handler: {}", state, e);
                register.record_error(format!("{} handler: {}", state, e));
                register.force(BotState::Failed, &e.to_string());
            }
            e => {
                // A rejected answer has its own attempt ceiling.
                let streak = if matches!(e, BotError::ChallengeRejected) {
                    0
                } else {
                    self.bump_failures(state)
                };
                let limit = self.ctx.settings.max_consecutive_failures;
                if limit > 0 && streak >= limit {
                    error!(
                        "❌ {} failed {} times in a row, giving up: {}",
                        state, streak, e
                    );
                    register.record_error(format!(
                        "{} failed {} consecutive times: {}",
                        state, streak, e
                    ));
                    register.force(BotState::Failed, "too many consecutive failures");
                    return;
                }

                register.record_error(format!("{} handler failed: {}", state, e));
                // The supervisor may already have classified a newer page.
                let recovering = if state == BotState::Recovering {
                    register.get() == BotState::Recovering
                } else {
                    register.advance_from(state, BotState::Recovering, &e.to_string())
                };
                if recovering {
                    warn!("⚠️ {} handler failed: {} (recovering)", state, e);
                    self.last_processed = None;
                } else {
                    warn!(
                        "⚠️ {} handler failed: {} (already moved to {})",
                        state,
                        e,
                        register.get()
                    );
                }
            }
        }
    }

    fn bump_failures(&mut self, state: BotState) -> u32 {
        let count = match self.failures {
            Some((s, n)) if s == state => n + 1,
            _ => 1,
        };
        self.failures = Some((state, count));
        count
    }

    pub async fn run(mut self) {
        let interval = self.ctx.settings.worker_interval();
        let mut changes = self.ctx.register.subscribe();
        info!("⚙️ worker started ({}ms)", interval.as_millis());

        loop {
            if self.ctx.stop.is_stopped() {
                break;
            }
            let before = self.ctx.register.get();
            self.tick().await;
            if before.is_terminal() && self.last_processed == Some(before) {
                break;
            }

            tokio::select! {
                _ = changes.changed() => {}
                _ = tokio::time::sleep(interval) => {}
                _ = self.ctx.stop.cancelled() => break,
            }
        }

        debug!("worker stopped");
    }
}
