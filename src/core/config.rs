use super::error::{BotError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Booking parameters (immutable once loaded)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub mobile_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Journey {
    pub from_station: String,
    pub to_station: String,
    pub date: NaiveDate,
    pub train_no: String,
    /// Either a bare code (`3A`) or a label with the code in parentheses
    /// (`AC 3 Tier (3A)`).
    pub class: String,
    #[serde(default = "default_quota")]
    pub quota: String,
}

fn default_quota() -> String {
    "TATKAL".to_string()
}

impl Journey {
    pub fn class_code(&self) -> &str {
        match (self.class.rfind('('), self.class.rfind(')')) {
            (Some(open), Some(close)) if open < close => self.class[open + 1..close].trim(),
            _ => self.class.trim(),
        }
    }

    /// Date as the journey form expects it.
    pub fn form_date(&self) -> String {
        self.date.format("%d/%m/%Y").to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passenger {
    pub name: String,
    pub age: u8,
    pub gender: String,
    #[serde(default)]
    pub berth: Option<String>,
}

impl Passenger {
    /// Berth choice to select, if any.
    pub fn berth_choice(&self) -> Option<&str> {
        self.berth
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty() && !b.eq_ignore_ascii_case("No Preference"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub mobile_number: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Upi,
    Wallet,
    CreditCard,
    DebitCard,
    NetBanking,
}

impl PaymentMethod {
    /// Label of the gateway option for the supported methods.
    pub fn gateway_label(self) -> Option<&'static str> {
        match self {
            PaymentMethod::Upi => Some("BHIM/ UPI"),
            PaymentMethod::Wallet => Some("IRCTC eWallet"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preferences {
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub upi_id: Option<String>,
    #[serde(default)]
    pub auto_upgrade: bool,
}

/// Everything one booking attempt needs. Built once at startup and shared
/// read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfig {
    pub account: Account,
    pub journey: Journey,
    pub passengers: Vec<Passenger>,
    pub contact: Contact,
    pub preferences: Preferences,
}

impl BookingConfig {
    /// Mobile number entered on the detail form. An account-level number
    /// overrides the shared contact one.
    pub fn mobile_number(&self) -> &str {
        self.account
            .mobile_number
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.contact.mobile_number.trim())
    }

    pub fn validate(&self) -> Result<()> {
        if self.account.username.trim().is_empty() || self.account.password.is_empty() {
            return Err(BotError::Config("account credentials are empty".into()));
        }
        if self.passengers.is_empty() {
            return Err(BotError::Config("at least one passenger is required".into()));
        }
        if self.passengers.len() > 6 {
            return Err(BotError::Config(format!(
                "{} passengers exceeds the per-ticket limit of 6",
                self.passengers.len()
            )));
        }
        if self.journey.train_no.trim().is_empty() {
            return Err(BotError::Config("train number is empty".into()));
        }
        let mobile = self.mobile_number();
        if mobile.len() != 10 || !mobile.chars().all(|c| c.is_ascii_digit()) {
            return Err(BotError::Config(format!(
                "mobile number '{}' must be 10 digits",
                mobile
            )));
        }
        if self.preferences.payment_method.gateway_label().is_none() {
            return Err(BotError::Config(format!(
                "payment method {:?} is not supported",
                self.preferences.payment_method
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tunables
// ---------------------------------------------------------------------------

/// The instant the scarce inventory opens, in the remote clock's zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingWindow {
    pub hour: u32,
    pub minute: u32,
    #[serde(default)]
    pub second: u32,
    /// How long before opening the search is submitted.
    #[serde(default = "default_search_lead")]
    pub search_lead_seconds: f64,
    /// Delay after opening before "Book Now" is pressed. Never negative.
    #[serde(default = "default_submit_offset")]
    pub submit_offset_seconds: f64,
}

fn default_search_lead() -> f64 {
    5.0
}

fn default_submit_offset() -> f64 {
    0.2
}

impl Default for BookingWindow {
    fn default() -> Self {
        // AC classes open at 10:00 IST.
        Self {
            hour: 10,
            minute: 0,
            second: 0,
            search_lead_seconds: default_search_lead(),
            submit_offset_seconds: default_submit_offset(),
        }
    }
}

/// Numeric knobs of the engine. None of these are load-bearing contracts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotSettings {
    pub booking_url: String,
    pub time_source_url: String,
    pub utc_offset_minutes: i32,
    pub window: Option<BookingWindow>,

    pub supervisor_interval_ms: u64,
    pub worker_interval_ms: u64,
    pub signal_check_ms: u64,

    pub retry_poll_interval_ms: u64,
    pub activate_budget_ms: u64,
    pub login_button_budget_ms: u64,
    pub typing_delay_min_ms: u64,
    pub typing_delay_max_ms: u64,

    pub challenge_ceiling: u32,
    pub solve_timeout_ms: u64,
    pub solver_ready_timeout_ms: u64,
    pub login_attempt_ceiling: u32,
    pub login_verify_timeout_ms: u64,

    pub confirmation_timeout_ms: u64,
    pub recovery_grace_ms: u64,
    pub max_consecutive_failures: u32,
    pub page_transition_timeout_ms: u64,
    pub gate_budget_ms: u64,

    pub time_refresh_secs: u64,
    pub shutdown_join_timeout_ms: u64,
    pub run_timeout_secs: Option<u64>,

    pub headless: bool,
    pub chrome_executable: Option<String>,
    pub profile_dir: Option<PathBuf>,
    pub screenshot_dir: Option<PathBuf>,
    pub ocr_url: String,
    pub status_url: Option<String>,
    pub control_port: Option<u16>,
    pub stop_others_on_success: bool,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            booking_url: "https://www.irctc.co.in/nget/train-search".to_string(),
            time_source_url:
                "https://www.irctc.co.in/eticketing/services/committable/bookingAvailability.ping"
                    .to_string(),
            utc_offset_minutes: 330,
            window: Some(BookingWindow::default()),

            supervisor_interval_ms: 250,
            worker_interval_ms: 100,
            signal_check_ms: 0,

            retry_poll_interval_ms: 250,
            activate_budget_ms: 10_000,
            login_button_budget_ms: 300_000,
            typing_delay_min_ms: 40,
            typing_delay_max_ms: 120,

            challenge_ceiling: 5,
            solve_timeout_ms: 8_000,
            solver_ready_timeout_ms: 30_000,
            login_attempt_ceiling: 20,
            login_verify_timeout_ms: 8_000,

            confirmation_timeout_ms: 120_000,
            recovery_grace_ms: 3_000,
            max_consecutive_failures: 5,
            page_transition_timeout_ms: 20_000,
            gate_budget_ms: 3 * 60 * 60 * 1000,

            time_refresh_secs: 60,
            shutdown_join_timeout_ms: 5_000,
            run_timeout_secs: None,

            headless: false,
            chrome_executable: None,
            profile_dir: None,
            screenshot_dir: None,
            ocr_url: "http://127.0.0.1:8765/solve".to_string(),
            status_url: None,
            control_port: Some(8000),
            stop_others_on_success: true,
        }
    }
}

impl BotSettings {
    pub fn supervisor_interval(&self) -> Duration {
        Duration::from_millis(self.supervisor_interval_ms.max(1))
    }

    pub fn worker_interval(&self) -> Duration {
        Duration::from_millis(self.worker_interval_ms.max(1))
    }

    pub fn signal_check(&self) -> Duration {
        Duration::from_millis(self.signal_check_ms)
    }

    pub fn retry_poll_interval(&self) -> Duration {
        Duration::from_millis(self.retry_poll_interval_ms.max(1))
    }

    pub fn activate_budget(&self) -> Duration {
        Duration::from_millis(self.activate_budget_ms)
    }

    pub fn login_button_budget(&self) -> Duration {
        Duration::from_millis(self.login_button_budget_ms)
    }

    pub fn solve_timeout(&self) -> Duration {
        Duration::from_millis(self.solve_timeout_ms)
    }

    pub fn solver_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.solver_ready_timeout_ms)
    }

    pub fn login_verify_timeout(&self) -> Duration {
        Duration::from_millis(self.login_verify_timeout_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }

    pub fn recovery_grace(&self) -> Duration {
        Duration::from_millis(self.recovery_grace_ms)
    }

    pub fn page_transition_timeout(&self) -> Duration {
        Duration::from_millis(self.page_transition_timeout_ms)
    }

    pub fn gate_budget(&self) -> Duration {
        Duration::from_millis(self.gate_budget_ms)
    }

    pub fn time_refresh(&self) -> Duration {
        Duration::from_secs(self.time_refresh_secs.max(1))
    }

    pub fn shutdown_join_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_join_timeout_ms)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    /// Apply `TATKAL_BOT_*` / `CHROME_EXECUTABLE` overrides.
    pub fn apply_env(&mut self) {
        if let Some(exe) = env_nonempty(ENV_CHROME_EXECUTABLE) {
            self.chrome_executable = Some(exe);
        }
        if let Some(v) = env_nonempty(ENV_HEADLESS) {
            self.headless = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Some(url) = env_nonempty(ENV_OCR_URL) {
            self.ocr_url = url;
        }
        if let Some(url) = env_nonempty(ENV_STATUS_URL) {
            self.status_url = Some(url);
        }
        if let Some(port) = env_nonempty(ENV_PORT).and_then(|v| v.parse::<u16>().ok()) {
            self.control_port = Some(port);
        }
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.booking_url)
            .map_err(|e| BotError::Config(format!("booking_url: {}", e)))?;
        if self.challenge_ceiling == 0 {
            return Err(BotError::Config("challenge_ceiling must be at least 1".into()));
        }
        if self.typing_delay_min_ms > self.typing_delay_max_ms {
            return Err(BotError::Config(
                "typing_delay_min_ms exceeds typing_delay_max_ms".into(),
            ));
        }
        if let Some(w) = &self.window {
            if w.hour > 23 || w.minute > 59 || w.second > 59 {
                return Err(BotError::Config(format!(
                    "window {:02}:{:02}:{:02} is not a time of day",
                    w.hour, w.minute, w.second
                )));
            }
            if !(w.submit_offset_seconds >= 0.0) {
                return Err(BotError::Config(
                    "submit_offset_seconds must be non-negative".into(),
                ));
            }
            if !(w.search_lead_seconds >= 0.0) {
                return Err(BotError::Config(
                    "search_lead_seconds must be non-negative".into(),
                ));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File loader
// ---------------------------------------------------------------------------

pub const ENV_CONFIG_PATH: &str = "TATKAL_BOT_CONFIG";
pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";
pub const ENV_HEADLESS: &str = "TATKAL_BOT_HEADLESS";
pub const ENV_OCR_URL: &str = "TATKAL_BOT_OCR_URL";
pub const ENV_STATUS_URL: &str = "TATKAL_BOT_STATUS_URL";
pub const ENV_PORT: &str = "TATKAL_BOT_PORT";

const CONFIG_FILE_NAME: &str = "tatkal-bot.json";

/// On-disk layout of `tatkal-bot.json`.
///
/// `accounts` lists extra accounts to run in parallel; the account inside
/// `booking` is always the first one.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    pub booking: BookingConfig,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub settings: BotSettings,
}

impl BotConfig {
    /// One booking per account, first account first.
    pub fn bookings(&self) -> Vec<BookingConfig> {
        let mut out = vec![self.booking.clone()];
        for account in &self.accounts {
            if account.username == self.booking.account.username {
                continue;
            }
            let mut booking = self.booking.clone();
            booking.account = account.clone();
            out.push(booking);
        }
        out
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn candidate_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut v = Vec::new();
    if let Some(p) = explicit {
        v.push(p.to_path_buf());
    }
    if let Some(p) = env_nonempty(ENV_CONFIG_PATH) {
        v.push(PathBuf::from(p));
    }
    v.push(PathBuf::from(CONFIG_FILE_NAME));
    if let Some(home) = dirs::home_dir() {
        v.push(home.join(".tatkal-bot").join("config.json"));
    }
    v
}

pub fn parse_config(contents: &str) -> Result<BotConfig> {
    let mut cfg: BotConfig = serde_json::from_str(contents)
        .map_err(|e| BotError::Config(format!("invalid config: {}", e)))?;
    cfg.settings.apply_env();
    cfg.settings.validate()?;
    cfg.booking.validate()?;
    Ok(cfg)
}

/// Load the config from the first existing candidate path.
///
/// Search order (first found wins):
/// 1. the explicit `--config` path
/// 2. `TATKAL_BOT_CONFIG`
/// 3. `./tatkal-bot.json`
/// 4. `~/.tatkal-bot/config.json`
///
/// Unlike optional tool config, a booking cannot run on defaults: a missing or
/// malformed file is an error.
pub fn load_config(explicit: Option<&Path>) -> Result<BotConfig> {
    for path in candidate_paths(explicit) {
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!("config loaded from {}", path.display());
                return parse_config(&contents);
            }
            Err(_) => continue,
        }
    }
    Err(BotError::Config(format!(
        "no {} found (set {} or pass --config)",
        CONFIG_FILE_NAME, ENV_CONFIG_PATH
    )))
}

/// Default directory for confirmation screenshots.
pub fn default_screenshot_dir() -> Option<PathBuf> {
    Some(dirs::home_dir()?.join(".tatkal-bot").join("confirmations"))
}
