//! Capability seams between the engine and the outside world.
//!
//! The engine never talks to a browser, a clock, or a recognition model
//! directly: it talks to these traits. `browser::session::ChromeSession`
//! implements the page-facing pair over a live Chromium tab; tests substitute
//! scripted fakes.

use super::error::Result;
use super::types::ActionLogEntry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Boolean, page-derived observations used to infer the flow position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    BookingConfirmed,
    PaymentPending,
    PaymentOptions,
    ReviewPage,
    PassengerForm,
    TrainList,
    LoginForm,
    Dashboard,
    LoggedOut,
    AdvisoryDialog,
    SessionTimeoutDialog,
    ConfirmDialog,
}

/// Semantic element handles. The concrete selectors live in
/// `browser::locators`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    LoginButton,
    UsernameInput,
    PasswordInput,
    CaptchaImage,
    CaptchaInput,
    CaptchaRefresh,
    SignInButton,
    OriginInput,
    DestinationInput,
    StationOption(String),
    JourneyDateInput,
    ClassDropdown,
    ClassOption(String),
    QuotaDropdown,
    QuotaOption(String),
    FindTrainsButton,
    TrainClass { train: String, class: String },
    BookNow { train: String },
    MobileInput,
    PassengerName(usize),
    PassengerAge(usize),
    PassengerGender(usize),
    PassengerBerth(usize),
    AddPassenger,
    AutoUpgradeCheckbox,
    AutoUpgradeLabel,
    ContinueButton,
    ReviewCaptchaImage,
    ReviewCaptchaInput,
    ReviewCaptchaRefresh,
    ProceedToPay,
    PaymentMethod(String),
    PayAndBook,
    AdvisoryClose,
    SessionTimeoutOk,
    ConfirmDialogAccept,
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Challenge image handed to a solver: raw bytes when the page embedded them,
/// otherwise a URI the solver fetches itself. Never a live element handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeImage {
    Bytes(Vec<u8>),
    Uri(String),
}

#[async_trait]
pub trait PageObserver: Send + Sync {
    /// Whether `signal` is detectable, waiting up to `timeout` for it.
    async fn is_signal_present(&self, signal: Signal, timeout: Duration) -> Result<bool>;
}

#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn click(&self, locator: &Locator) -> Result<()>;

    /// Programmatic activation used when a direct click is intercepted.
    async fn activate_fallback(&self, locator: &Locator) -> Result<()>;

    async fn clear(&self, locator: &Locator) -> Result<()>;

    async fn type_text(&self, locator: &Locator, text: &str) -> Result<()>;

    async fn read_attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>>;

    /// Assign a value directly and fire `input`/`change` (date pickers).
    async fn set_value(&self, locator: &Locator, value: &str) -> Result<()>;

    /// Pick an `<option>` of a native select by its visible text.
    async fn select_option(&self, locator: &Locator, visible_text: &str) -> Result<()>;

    async fn navigate(&self, url: &str) -> Result<()>;

    async fn screenshot(&self) -> Result<Vec<u8>>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait ChallengeSolver: Send + Sync {
    /// Text read from the image, `None` when nothing legible was found.
    async fn solve(&self, image: ChallengeImage) -> Result<Option<String>>;
}

#[async_trait]
pub trait TimeSource: Send + Sync {
    async fn now(&self) -> Result<DateTime<Utc>>;
}

pub trait StatusSink: Send + Sync {
    fn emit(&self, entry: ActionLogEntry);
}

/// Everything the engine consumes from outside.
#[derive(Clone)]
pub struct Capabilities {
    pub observer: Arc<dyn PageObserver>,
    pub executor: Arc<dyn ActionExecutor>,
    pub solver: Arc<dyn ChallengeSolver>,
    pub time_source: Arc<dyn TimeSource>,
    pub sink: Arc<dyn StatusSink>,
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities").finish_non_exhaustive()
    }
}
