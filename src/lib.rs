pub mod browser;
pub mod core;
pub mod engine;
pub mod resilience;
pub mod solver;
pub mod status;
pub mod timesync;

// --- Primary exports ---
pub use core::capabilities::Capabilities;
pub use core::config::{load_config, BookingConfig, BotConfig, BotSettings};
pub use core::error::{BotError, Result};
pub use core::state::BotState;
pub use engine::{Orchestrator, OrchestratorHandle, RunOutcome, StopSignal};
pub use timesync::TimeSynchronizer;
