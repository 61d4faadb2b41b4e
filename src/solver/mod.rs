//! Challenge recognition.
//!
//! The recognizer is one process-wide resource. It may need time to come up
//! (model load, sidecar start), so it sits behind [`ReadySolver`], which
//! holds solve calls until readiness is signalled.

pub mod ocr;

use crate::core::capabilities::{ChallengeImage, ChallengeSolver};
use crate::core::error::{BotError, Result};
use async_trait::async_trait;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

pub use ocr::HttpOcrSolver;

/// Readiness barrier in front of a solver.
pub struct ReadySolver {
    inner: Arc<dyn ChallengeSolver>,
    ready: watch::Sender<bool>,
    ready_timeout: Duration,
}

impl ReadySolver {
    /// Not ready until [`mark_ready`](Self::mark_ready) is called.
    pub fn new(inner: Arc<dyn ChallengeSolver>, ready_timeout: Duration) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            inner,
            ready,
            ready_timeout,
        }
    }

    /// Already usable.
    pub fn ready(inner: Arc<dyn ChallengeSolver>) -> Self {
        let solver = Self::new(inner, Duration::ZERO);
        solver.mark_ready();
        solver
    }

    pub fn mark_ready(&self) {
        if !self.ready.send_replace(true) {
            info!("🧠 challenge solver ready");
        }
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Whether the solver became ready within `within`.
    pub async fn wait_ready(&self, within: Duration) -> bool {
        if self.is_ready() {
            return true;
        }
        let mut rx = self.ready.subscribe();
        let became_ready = async { rx.wait_for(|ready| *ready).await.is_ok() };
        tokio::time::timeout(within, became_ready)
            .await
            .unwrap_or(false)
    }
}

#[async_trait]
impl ChallengeSolver for ReadySolver {
    async fn solve(&self, image: ChallengeImage) -> Result<Option<String>> {
        if !self.wait_ready(self.ready_timeout).await {
            return Err(BotError::Solver(format!(
                "solver not ready after {}ms",
                self.ready_timeout.as_millis()
            )));
        }
        self.inner.solve(image).await
    }
}

static SHARED_SOLVER: OnceLock<Arc<ReadySolver>> = OnceLock::new();

/// The process-wide solver, created by `init` on first use.
pub fn shared_solver(init: impl FnOnce() -> ReadySolver) -> Arc<ReadySolver> {
    Arc::clone(SHARED_SOLVER.get_or_init(|| Arc::new(init())))
}

/// Keep only the characters a challenge answer can contain.
pub fn sanitize_answer(raw: &str) -> Option<String> {
    let cleaned: String = raw.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}
