//! The booking engine: a supervisor that classifies the page, a worker that
//! reacts to state edges, and the orchestrator that owns both.

pub mod handlers;
pub mod orchestrator;
pub mod stop;
pub mod supervisor;
pub mod worker;

use crate::core::capabilities::Capabilities;
use crate::core::config::{BookingConfig, BotSettings};
use crate::core::error::{BotError, Result};
use crate::core::register::StateRegister;
use crate::timesync::TimeSynchronizer;
use std::sync::Arc;
use std::time::Duration;

pub use orchestrator::{Orchestrator, OrchestratorHandle, RunOutcome};
pub use stop::StopSignal;

/// Everything a handler may touch, passed explicitly.
#[derive(Clone, Debug)]
pub struct EngineContext {
    pub caps: Capabilities,
    pub register: Arc<StateRegister>,
    pub time: Arc<TimeSynchronizer>,
    pub booking: Arc<BookingConfig>,
    pub settings: Arc<BotSettings>,
    pub stop: StopSignal,
}

impl EngineContext {
    /// Sleep for `duration`, or fail with `Stopped` as soon as the run stops.
    pub async fn pause(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            _ = tokio::time::sleep(duration) => self.stop.check(),
            _ = self.stop.cancelled() => Err(BotError::Stopped),
        }
    }
}
