//! Page classifier loop.
//!
//! Every tick the supervisor dismisses blocking dialogs, then evaluates the
//! rule table top to bottom and commits the state of the first rule whose
//! signal is present. A tick where nothing matches leaves the register alone.

use super::EngineContext;
use crate::core::capabilities::{Locator, Signal};
use crate::core::error::{BotError, Result};
use crate::core::state::BotState;
use crate::core::types::Severity;
use std::collections::HashSet;
use tracing::{debug, error, info};

/// Classification rules, most specific first.
pub const RULES: [(Signal, BotState); 9] = [
    (Signal::BookingConfirmed, BotState::Confirmed),
    (Signal::PaymentPending, BotState::AwaitingConfirmation),
    (Signal::PaymentOptions, BotState::Payment),
    (Signal::ReviewPage, BotState::Review),
    (Signal::PassengerForm, BotState::DetailForm),
    (Signal::TrainList, BotState::ResultsListed),
    (Signal::LoginForm, BotState::LoginInProgress),
    (Signal::Dashboard, BotState::AtDashboard),
    (Signal::LoggedOut, BotState::LoggedOut),
];

fn interstitials() -> [(Signal, Locator); 3] {
    [
        (Signal::AdvisoryDialog, Locator::AdvisoryClose),
        (Signal::SessionTimeoutDialog, Locator::SessionTimeoutOk),
        (Signal::ConfirmDialog, Locator::ConfirmDialogAccept),
    ]
}

/// State implied by a set of present signals.
pub fn classify(present: &HashSet<Signal>) -> Option<BotState> {
    RULES
        .iter()
        .find(|(signal, _)| present.contains(signal))
        .map(|(_, state)| *state)
}

/// First rule whose signal is live on the page. Stops probing at the first
/// hit, which yields the same answer as [`classify`] over all signals.
async fn observe(ctx: &EngineContext) -> Result<Option<(Signal, BotState)>> {
    let wait = ctx.settings.signal_check();
    for (signal, state) in RULES {
        if ctx.caps.observer.is_signal_present(signal, wait).await? {
            return Ok(Some((signal, state)));
        }
    }
    Ok(None)
}

async fn dismiss_interstitials(ctx: &EngineContext) -> Result<()> {
    let wait = ctx.settings.signal_check();
    for (signal, close) in interstitials() {
        if !ctx.caps.observer.is_signal_present(signal, wait).await? {
            continue;
        }
        match ctx.caps.executor.click(&close).await {
            Ok(()) => {
                debug!("dismissed {:?}", signal);
                ctx.register.record(format!("dismissed {:?}", signal));
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => debug!("could not dismiss {:?}: {}", signal, e),
        }
    }
    Ok(())
}

/// One classification pass.
pub async fn tick(ctx: &EngineContext) -> Result<()> {
    let current = ctx.register.get();
    if current.is_terminal() {
        return Ok(());
    }

    dismiss_interstitials(ctx).await?;

    let Some((signal, inferred)) = observe(ctx).await? else {
        return Ok(());
    };

    if inferred == BotState::LoggedOut && current.is_authenticated() {
        let message = format!("session dropped while in {}, forcing re-login", current);
        error!("🚨 watchdog: {}", message);
        if ctx.register.infer(inferred, "watchdog: logged-out signal") {
            ctx.register.record_with(Severity::Critical, message);
        }
        return Ok(());
    }

    ctx.register.infer(inferred, &format!("{:?} visible", signal));
    Ok(())
}

pub async fn run(ctx: EngineContext) {
    let interval = ctx.settings.supervisor_interval();
    info!("👁️ supervisor started ({}ms)", interval.as_millis());

    loop {
        if ctx.stop.is_stopped() || ctx.register.get().is_terminal() {
            break;
        }

        match tick(&ctx).await {
            Ok(()) => {}
            Err(BotError::Stopped) => break,
            Err(e) if e.is_fatal() => {
                error!("💀 supervisor: {}", e);
                ctx.register.record_error(e.to_string());
                ctx.register.force(BotState::Fatal, &e.to_string());
                ctx.stop.trigger();
                break;
            }
            Err(e) => debug!("supervisor tick skipped: {}", e),
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = ctx.stop.cancelled() => break,
        }
    }

    debug!("supervisor stopped");
}
