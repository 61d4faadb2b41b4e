use serde::{Deserialize, Serialize};
use std::fmt;

/// Believed position in the reservation flow. Exactly one value is current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BotState {
    Starting,
    Idle,
    LoggedOut,
    LoginInProgress,
    AtDashboard,
    ResultsListed,
    DetailForm,
    Review,
    Payment,
    AwaitingConfirmation,
    Confirmed,
    Recovering,
    Failed,
    Fatal,
    Stopped,
}

/// Groups of states that share handler scratch data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseFamily {
    Bootstrap,
    Auth,
    Search,
    Booking,
    Settlement,
    Recovery,
    Terminal,
}

/// What may follow a state besides RECOVERING on handler failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessorPolicy {
    /// Advance to the next happy-path state, or stay until the page moves.
    Advance(BotState),
    /// Leave once the page is classifiable again.
    Reclassify,
    /// No successor.
    Terminal,
}

impl BotState {
    pub const ALL: [BotState; 15] = [
        BotState::Starting,
        BotState::Idle,
        BotState::LoggedOut,
        BotState::LoginInProgress,
        BotState::AtDashboard,
        BotState::ResultsListed,
        BotState::DetailForm,
        BotState::Review,
        BotState::Payment,
        BotState::AwaitingConfirmation,
        BotState::Confirmed,
        BotState::Recovering,
        BotState::Failed,
        BotState::Fatal,
        BotState::Stopped,
    ];

    pub fn family(self) -> PhaseFamily {
        match self {
            BotState::Starting | BotState::Idle => PhaseFamily::Bootstrap,
            BotState::LoggedOut | BotState::LoginInProgress => PhaseFamily::Auth,
            BotState::AtDashboard | BotState::ResultsListed => PhaseFamily::Search,
            BotState::DetailForm | BotState::Review => PhaseFamily::Booking,
            BotState::Payment | BotState::AwaitingConfirmation => PhaseFamily::Settlement,
            BotState::Recovering => PhaseFamily::Recovery,
            BotState::Confirmed | BotState::Failed | BotState::Fatal | BotState::Stopped => {
                PhaseFamily::Terminal
            }
        }
    }

    /// States that can only be reached with a live login. Seeing the generic
    /// logged-out signal from one of these is a session loss.
    pub fn is_authenticated(self) -> bool {
        matches!(
            self,
            BotState::AtDashboard
                | BotState::ResultsListed
                | BotState::DetailForm
                | BotState::Review
                | BotState::Payment
                | BotState::AwaitingConfirmation
        )
    }

    pub fn is_terminal(self) -> bool {
        self.family() == PhaseFamily::Terminal
    }

    pub fn policy(self) -> SuccessorPolicy {
        match self {
            BotState::Starting => SuccessorPolicy::Advance(BotState::Idle),
            BotState::Idle => SuccessorPolicy::Advance(BotState::LoggedOut),
            BotState::LoggedOut => SuccessorPolicy::Advance(BotState::LoginInProgress),
            BotState::LoginInProgress => SuccessorPolicy::Advance(BotState::AtDashboard),
            BotState::AtDashboard => SuccessorPolicy::Advance(BotState::ResultsListed),
            BotState::ResultsListed => SuccessorPolicy::Advance(BotState::DetailForm),
            BotState::DetailForm => SuccessorPolicy::Advance(BotState::Review),
            BotState::Review => SuccessorPolicy::Advance(BotState::Payment),
            BotState::Payment => SuccessorPolicy::Advance(BotState::AwaitingConfirmation),
            BotState::AwaitingConfirmation => SuccessorPolicy::Advance(BotState::Confirmed),
            BotState::Recovering => SuccessorPolicy::Reclassify,
            BotState::Confirmed | BotState::Failed | BotState::Fatal | BotState::Stopped => {
                SuccessorPolicy::Terminal
            }
        }
    }

    /// Next state on the happy path, if any.
    pub fn successor(self) -> Option<BotState> {
        match self.policy() {
            SuccessorPolicy::Advance(next) => Some(next),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BotState::Starting => "STARTING",
            BotState::Idle => "IDLE",
            BotState::LoggedOut => "LOGGED_OUT",
            BotState::LoginInProgress => "LOGIN_IN_PROGRESS",
            BotState::AtDashboard => "AT_DASHBOARD",
            BotState::ResultsListed => "RESULTS_LISTED",
            BotState::DetailForm => "DETAIL_FORM",
            BotState::Review => "REVIEW",
            BotState::Payment => "PAYMENT",
            BotState::AwaitingConfirmation => "AWAITING_CONFIRMATION",
            BotState::Confirmed => "CONFIRMED",
            BotState::Recovering => "RECOVERING",
            BotState::Failed => "FAILED",
            BotState::Fatal => "FATAL",
            BotState::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for BotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
