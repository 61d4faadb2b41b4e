use thiserror::Error;

/// Errors raised by the booking engine and its collaborators.
///
/// The variants follow the recovery taxonomy the engine applies:
/// * transient UI timing (`ElementNotFound`, `StaleElement`, `Timeout`) is retried
///   locally inside the resilience primitives and never reaches the worker;
/// * challenge failures are retried with a refresh and escalate to
///   `ChallengeExhausted` once the ceiling is hit;
/// * handler failures route through `RECOVERING`;
/// * `SessionLost` and `Config` are fatal and end the run.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("stale element reference: {0}")]
    StaleElement(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("challenge answer rejected")]
    ChallengeRejected,

    #[error("challenge unresolved after {attempts} attempts")]
    ChallengeExhausted { attempts: u32 },

    #[error("train {0} not found in results")]
    TrainNotFound(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("browser command failed: {0}")]
    Driver(String),

    #[error("solver failed: {0}")]
    Solver(String),

    #[error("time source unavailable: {0}")]
    TimeSource(String),

    #[error("browser session lost: {0}")]
    SessionLost(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("stop requested")]
    Stopped,

    /// The register moved off the handler's state while it was waiting.
    #[error("left {0} while waiting")]
    Preempted(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, BotError>;

impl BotError {
    /// Not-yet-rendered, stale, or briefly covered elements.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BotError::ElementNotFound(_) | BotError::StaleElement(_) | BotError::Timeout(_)
        )
    }

    /// Errors that end the run without retry.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BotError::SessionLost(_) | BotError::Config(_))
    }
}
