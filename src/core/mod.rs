pub mod capabilities;
pub mod config;
pub mod error;
pub mod register;
pub mod state;
pub mod types;

pub use capabilities::{
    ActionExecutor, Capabilities, ChallengeImage, ChallengeSolver, Locator, PageObserver,
    Signal, StatusSink, TimeSource,
};
pub use error::{BotError, Result};
pub use register::StateRegister;
pub use state::{BotState, PhaseFamily};
