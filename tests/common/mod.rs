//! Scripted collaborators for driving the engine without a browser.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeDelta, Timelike, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tatkal_bot::core::capabilities::{
    ActionExecutor, Capabilities, ChallengeImage, ChallengeSolver, Locator, PageObserver, Signal,
    StatusSink, TimeSource,
};
use tatkal_bot::core::config::{parse_config, BookingConfig, BookingWindow, BotSettings};
use tatkal_bot::core::register::StateRegister;
use tatkal_bot::core::types::ActionLogEntry;
use tatkal_bot::engine::{EngineContext, StopSignal};
use tatkal_bot::{BotError, BotState, Result, TimeSynchronizer};
use tokio::time::Instant;

pub const CAPTCHA_ANSWER: &str = "AB12";
pub const CAPTCHA_SRC: &str = "data:image/png;base64,QUIxMg==";

pub fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Where the scripted site currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Blank,
    Home,
    LoginForm,
    Dashboard,
    TrainList,
    PassengerForm,
    Review,
    PaymentOptions,
    PaymentPending,
    Confirmed,
}

impl Screen {
    fn signals(self) -> &'static [Signal] {
        match self {
            Screen::Blank => &[],
            Screen::Home => &[Signal::LoggedOut],
            // The login modal sits on top of the logged-out home page.
            Screen::LoginForm => &[Signal::LoginForm, Signal::LoggedOut],
            Screen::Dashboard => &[Signal::Dashboard],
            Screen::TrainList => &[Signal::TrainList],
            Screen::PassengerForm => &[Signal::PassengerForm],
            Screen::Review => &[Signal::ReviewPage],
            Screen::PaymentOptions => &[Signal::PaymentOptions],
            Screen::PaymentPending => &[Signal::PaymentPending],
            Screen::Confirmed => &[Signal::BookingConfirmed],
        }
    }

    fn offers(self, locator: &Locator) -> bool {
        use Locator::*;
        match locator {
            LoginButton => self == Screen::Home,
            UsernameInput | PasswordInput | CaptchaImage | CaptchaInput | CaptchaRefresh
            | SignInButton => self == Screen::LoginForm,
            OriginInput | DestinationInput | StationOption(_) | JourneyDateInput
            | ClassDropdown | ClassOption(_) | QuotaDropdown | QuotaOption(_)
            | FindTrainsButton => self == Screen::Dashboard,
            TrainClass { .. } | BookNow { .. } => self == Screen::TrainList,
            MobileInput | PassengerName(_) | PassengerAge(_) | PassengerGender(_)
            | PassengerBerth(_) | AddPassenger | AutoUpgradeCheckbox | AutoUpgradeLabel
            | ContinueButton => self == Screen::PassengerForm,
            ReviewCaptchaImage | ReviewCaptchaInput | ReviewCaptchaRefresh | ProceedToPay => {
                self == Screen::Review
            }
            PaymentMethod(_) | PayAndBook => self == Screen::PaymentOptions,
            AdvisoryClose | SessionTimeoutOk | ConfirmDialogAccept => false,
        }
    }
}

#[derive(Debug)]
struct PageState {
    screen: Screen,
    logged_in: bool,
    train_no: String,
    dialogs: HashSet<Signal>,
    /// Screen shown instead of the real one (e.g. a blank gap).
    override_screen: Option<Screen>,
    /// When PAYMENT_PENDING turns into a confirmation.
    confirm_at: Option<Instant>,
    confirm_delay: Option<Duration>,
    dead: HashSet<Locator>,
    clicks: Vec<(Locator, Instant)>,
    typed: HashMap<Locator, String>,
    navigations: Vec<String>,
    observations: usize,
    session_lost: bool,
}

/// In-memory stand-in for the booking site.
pub struct ScriptedPage {
    state: Mutex<PageState>,
}

impl ScriptedPage {
    pub fn new(screen: Screen) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(PageState {
                screen,
                logged_in: false,
                train_no: "12834".to_string(),
                dialogs: HashSet::new(),
                override_screen: None,
                confirm_at: None,
                confirm_delay: Some(Duration::from_secs(2)),
                dead: HashSet::new(),
                clicks: Vec::new(),
                typed: HashMap::new(),
                navigations: Vec::new(),
                observations: 0,
                session_lost: false,
            }),
        })
    }

    fn with<R>(&self, f: impl FnOnce(&mut PageState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn screen(&self) -> Screen {
        self.with(|s| s.screen)
    }

    pub fn set_screen(&self, screen: Screen) {
        self.with(|s| s.screen = screen);
    }

    /// Hide every signal until cleared.
    pub fn blank_out(&self, blank: bool) {
        self.with(|s| s.override_screen = blank.then_some(Screen::Blank));
    }

    pub fn show_dialog(&self, signal: Signal) {
        self.with(|s| s.dialogs.insert(signal));
    }

    /// Make `locator` unresolvable, whatever the screen.
    pub fn kill(&self, locator: Locator) {
        self.with(|s| s.dead.insert(locator));
    }

    /// Keep the payment pending forever.
    pub fn never_confirm(&self) {
        self.with(|s| s.confirm_delay = None);
    }

    pub fn lose_session(&self) {
        self.with(|s| s.session_lost = true);
    }

    pub fn log_out(&self) {
        self.with(|s| {
            s.logged_in = false;
            s.screen = Screen::Home;
        });
    }

    pub fn clicks_on(&self, locator: &Locator) -> usize {
        self.with(|s| s.clicks.iter().filter(|(l, _)| l == locator).count())
    }

    /// When `locator` was first activated.
    pub fn first_click_at(&self, locator: &Locator) -> Option<Instant> {
        self.with(|s| {
            s.clicks
                .iter()
                .find(|(l, _)| l == locator)
                .map(|(_, at)| *at)
        })
    }

    pub fn typed(&self, locator: &Locator) -> Option<String> {
        self.with(|s| s.typed.get(locator).cloned())
    }

    pub fn navigations(&self) -> usize {
        self.with(|s| s.navigations.len())
    }

    pub fn observations(&self) -> usize {
        self.with(|s| s.observations)
    }

    fn resolve(&self, s: &PageState, locator: &Locator) -> Result<()> {
        if s.session_lost {
            return Err(BotError::SessionLost("scripted browser closed".into()));
        }
        let present = match locator {
            Locator::AdvisoryClose => s.dialogs.contains(&Signal::AdvisoryDialog),
            Locator::SessionTimeoutOk => s.dialogs.contains(&Signal::SessionTimeoutDialog),
            Locator::ConfirmDialogAccept => s.dialogs.contains(&Signal::ConfirmDialog),
            Locator::TrainClass { train, .. } | Locator::BookNow { train } => {
                s.screen.offers(locator) && *train == s.train_no
            }
            other => s.screen.offers(other),
        };
        if present && !s.dead.contains(locator) {
            Ok(())
        } else {
            Err(BotError::ElementNotFound(locator.to_string()))
        }
    }

    fn activate(&self, locator: &Locator) -> Result<()> {
        self.with(|s| {
            self.resolve(s, locator)?;
            s.clicks.push((locator.clone(), Instant::now()));
            match locator {
                Locator::LoginButton => s.screen = Screen::LoginForm,
                Locator::SignInButton => {
                    if s.typed.get(&Locator::CaptchaInput).map(String::as_str) == Some(CAPTCHA_ANSWER)
                    {
                        s.logged_in = true;
                        s.screen = Screen::Dashboard;
                    }
                }
                Locator::FindTrainsButton => s.screen = Screen::TrainList,
                Locator::BookNow { .. } => s.screen = Screen::PassengerForm,
                Locator::ContinueButton => s.screen = Screen::Review,
                Locator::ProceedToPay => {
                    if s.typed.get(&Locator::ReviewCaptchaInput).map(String::as_str)
                        == Some(CAPTCHA_ANSWER)
                    {
                        s.screen = Screen::PaymentOptions;
                    }
                }
                Locator::PayAndBook => {
                    s.screen = Screen::PaymentPending;
                    s.confirm_at = s.confirm_delay.map(|d| Instant::now() + d);
                }
                Locator::AdvisoryClose => {
                    s.dialogs.remove(&Signal::AdvisoryDialog);
                }
                Locator::SessionTimeoutOk => {
                    s.dialogs.remove(&Signal::SessionTimeoutDialog);
                }
                Locator::ConfirmDialogAccept => {
                    s.dialogs.remove(&Signal::ConfirmDialog);
                }
                _ => {}
            }
            Ok(())
        })
    }
}

#[async_trait]
impl PageObserver for ScriptedPage {
    async fn is_signal_present(&self, signal: Signal, _timeout: Duration) -> Result<bool> {
        self.with(|s| {
            if s.session_lost {
                return Err(BotError::SessionLost("scripted browser closed".into()));
            }
            s.observations += 1;
            if s.screen == Screen::PaymentPending
                && s.confirm_at.is_some_and(|at| Instant::now() >= at)
            {
                s.screen = Screen::Confirmed;
            }
            if s.dialogs.contains(&signal) {
                return Ok(true);
            }
            let screen = s.override_screen.unwrap_or(s.screen);
            Ok(screen.signals().contains(&signal))
        })
    }
}

#[async_trait]
impl ActionExecutor for ScriptedPage {
    async fn click(&self, locator: &Locator) -> Result<()> {
        self.activate(locator)
    }

    async fn activate_fallback(&self, locator: &Locator) -> Result<()> {
        self.activate(locator)
    }

    async fn clear(&self, locator: &Locator) -> Result<()> {
        self.with(|s| {
            self.resolve(s, locator)?;
            s.typed.insert(locator.clone(), String::new());
            Ok(())
        })
    }

    async fn type_text(&self, locator: &Locator, text: &str) -> Result<()> {
        self.with(|s| {
            self.resolve(s, locator)?;
            s.typed.entry(locator.clone()).or_default().push_str(text);
            Ok(())
        })
    }

    async fn read_attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>> {
        self.with(|s| {
            self.resolve(s, locator)?;
            Ok(match (locator, name) {
                (Locator::CaptchaImage | Locator::ReviewCaptchaImage, "src") => {
                    Some(CAPTCHA_SRC.to_string())
                }
                (Locator::AutoUpgradeCheckbox, "checked") => Some("false".to_string()),
                _ => None,
            })
        })
    }

    async fn set_value(&self, locator: &Locator, value: &str) -> Result<()> {
        self.with(|s| {
            self.resolve(s, locator)?;
            s.typed.insert(locator.clone(), value.to_string());
            Ok(())
        })
    }

    async fn select_option(&self, locator: &Locator, visible_text: &str) -> Result<()> {
        self.set_value(locator, visible_text).await
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.with(|s| {
            if s.session_lost {
                return Err(BotError::SessionLost("scripted browser closed".into()));
            }
            s.navigations.push(url.to_string());
            s.override_screen = None;
            s.screen = if s.logged_in {
                Screen::Dashboard
            } else {
                Screen::Home
            };
            Ok(())
        })
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(b"\x89PNG".to_vec())
    }
}

/// Solver answering from a script, then with `fallback`.
pub struct StubSolver {
    answers: Mutex<VecDeque<Option<String>>>,
    fallback: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StubSolver {
    pub fn answering(answer: &str) -> Arc<Self> {
        Self::scripted(Vec::new(), Some(answer))
    }

    pub fn scripted(answers: Vec<Option<&str>>, fallback: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(
                answers
                    .into_iter()
                    .map(|a| a.map(str::to_string))
                    .collect(),
            ),
            fallback: fallback.map(str::to_string),
            delay: None,
            calls: AtomicUsize::new(0),
        })
    }

    /// Answers `answer`, but only after `delay`.
    pub fn slow(answer: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(VecDeque::new()),
            fallback: Some(answer.to_string()),
            delay: Some(delay),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChallengeSolver for StubSolver {
    async fn solve(&self, image: ChallengeImage) -> Result<Option<String>> {
        assert_eq!(image, ChallengeImage::Bytes(CAPTCHA_ANSWER.as_bytes().to_vec()));
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.answers.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }
}

/// Remote clock running `ahead` of the local one.
pub struct FixedTimeSource {
    pub ahead: TimeDelta,
}

#[async_trait]
impl TimeSource for FixedTimeSource {
    async fn now(&self) -> Result<DateTime<Utc>> {
        Ok(Utc::now() + self.ahead)
    }
}

#[derive(Default)]
pub struct MemorySink {
    entries: Mutex<Vec<ActionLogEntry>>,
}

impl MemorySink {
    pub fn entries(&self) -> Vec<ActionLogEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.message.contains(needle))
            .count()
    }
}

impl StatusSink for MemorySink {
    fn emit(&self, entry: ActionLogEntry) {
        self.entries.lock().unwrap().push(entry);
    }
}

pub const CONFIG: &str = r#"{
    "booking": {
        "account": {"username": "user1", "password": "secret"},
        "journey": {
            "from_station": "HWH", "to_station": "ADI", "date": "2025-09-30",
            "train_no": "12834", "class": "AC 3 Tier (3A)"
        },
        "passengers": [
            {"name": "Passenger One", "age": 30, "gender": "Male", "berth": "Lower"},
            {"name": "Passenger Two", "age": 28, "gender": "Female"}
        ],
        "contact": {"mobile_number": "9876543210"},
        "preferences": {"payment_method": "UPI", "upi_id": "me@upi"}
    }
}"#;

pub fn booking() -> BookingConfig {
    parse_config(CONFIG).unwrap().booking
}

/// Booking window opening `after` from now on an IST clock that agrees with
/// the local one, truncated to the second.
pub fn window_opening_in(
    after: TimeDelta,
    search_lead_seconds: f64,
    submit_offset_seconds: f64,
) -> BookingWindow {
    let ist = FixedOffset::east_opt(330 * 60).unwrap();
    let opens = (Utc::now() + after).with_timezone(&ist);
    BookingWindow {
        hour: opens.hour(),
        minute: opens.minute(),
        second: opens.second(),
        search_lead_seconds,
        submit_offset_seconds,
    }
}

/// Fast settings without a booking window.
pub fn settings() -> BotSettings {
    BotSettings {
        window: None,
        booking_url: "https://booking.test/train-search".to_string(),
        supervisor_interval_ms: 50,
        worker_interval_ms: 20,
        retry_poll_interval_ms: 50,
        activate_budget_ms: 1_000,
        login_button_budget_ms: 2_000,
        typing_delay_min_ms: 0,
        typing_delay_max_ms: 5,
        solve_timeout_ms: 1_000,
        login_verify_timeout_ms: 1_000,
        confirmation_timeout_ms: 10_000,
        recovery_grace_ms: 200,
        page_transition_timeout_ms: 2_000,
        control_port: None,
        ..BotSettings::default()
    }
}

pub struct Harness {
    pub page: Arc<ScriptedPage>,
    pub solver: Arc<StubSolver>,
    pub sink: Arc<MemorySink>,
    pub caps: Capabilities,
}

impl Harness {
    pub fn new(page: Arc<ScriptedPage>, solver: Arc<StubSolver>) -> Self {
        Self::with_clock(page, solver, TimeDelta::zero())
    }

    pub fn with_clock(page: Arc<ScriptedPage>, solver: Arc<StubSolver>, ahead: TimeDelta) -> Self {
        let sink = Arc::new(MemorySink::default());
        let caps = Capabilities {
            observer: page.clone(),
            executor: page.clone(),
            solver: solver.clone(),
            time_source: Arc::new(FixedTimeSource { ahead }),
            sink: sink.clone(),
        };
        Self {
            page,
            solver,
            sink,
            caps,
        }
    }

    /// Engine context positioned at `initial`.
    pub fn context(&self, initial: BotState, settings: BotSettings) -> EngineContext {
        let time = TimeSynchronizer::new(
            Arc::clone(&self.caps.time_source),
            settings.utc_offset_minutes,
        )
        .unwrap();
        EngineContext {
            caps: self.caps.clone(),
            register: Arc::new(StateRegister::new(initial, self.caps.sink.clone())),
            time: Arc::new(time),
            booking: Arc::new(booking()),
            settings: Arc::new(settings),
            stop: StopSignal::new(),
        }
    }
}
