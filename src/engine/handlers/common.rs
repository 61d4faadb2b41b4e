use crate::core::capabilities::{Locator, Signal};
use crate::core::config::BookingWindow;
use crate::core::error::{BotError, Result};
use crate::core::state::BotState;
use crate::engine::EngineContext;
use crate::resilience::{retry_activate, retry_transient};
use tokio::time::Instant;
use tracing::{info, warn};

/// `retry_activate` with the default budget, turned into an error on failure.
pub(super) async fn activate(ctx: &EngineContext, locator: &Locator) -> Result<()> {
    if retry_activate(ctx, locator, ctx.settings.activate_budget()).await {
        return Ok(());
    }
    ctx.stop.check()?;
    Err(BotError::ElementNotFound(locator.to_string()))
}

/// Open a dropdown and pick one of its entries.
pub(super) async fn choose(ctx: &EngineContext, dropdown: &Locator, option: &Locator) -> Result<()> {
    activate(ctx, dropdown).await?;
    activate(ctx, option).await
}

pub(super) async fn select(ctx: &EngineContext, locator: &Locator, visible_text: &str) -> Result<()> {
    let executor = &ctx.caps.executor;
    retry_transient(ctx, ctx.settings.activate_budget(), move || {
        executor.select_option(locator, visible_text)
    })
    .await
}

pub(super) async fn set_value(ctx: &EngineContext, locator: &Locator, value: &str) -> Result<()> {
    let executor = &ctx.caps.executor;
    retry_transient(ctx, ctx.settings.activate_budget(), move || {
        executor.set_value(locator, value)
    })
    .await
}

/// Current presence of `signal`; transient observer errors read as absent.
pub(super) async fn signal_now(ctx: &EngineContext, signal: Signal) -> Result<bool> {
    match ctx
        .caps
        .observer
        .is_signal_present(signal, ctx.settings.signal_check())
        .await
    {
        Ok(present) => Ok(present),
        Err(e) if e.is_fatal() => Err(e),
        Err(_) => Ok(false),
    }
}

/// Wait for the register to move off `from` after an action that should
/// change the page.
pub async fn await_departure(ctx: &EngineContext, from: BotState, after: &str) -> Result<()> {
    let within = ctx.settings.page_transition_timeout();
    let mut changes = ctx.register.subscribe();
    let departed = async { changes.wait_for(|s| *s != from).await.is_ok() };
    let left = tokio::select! {
        r = tokio::time::timeout(within, departed) => r.unwrap_or(false),
        _ = ctx.stop.cancelled() => return Err(BotError::Stopped),
    };
    if left {
        Ok(())
    } else {
        Err(BotError::Timeout(format!(
            "still in {} {}ms after {}",
            from,
            within.as_millis(),
            after
        )))
    }
}

/// Hold in `from` until the booking window plus `offset_seconds` on the
/// remote clock.
///
/// Fails with `Preempted` as soon as the register leaves `from` (a logout seen
/// by the supervisor, say), so the worker can handle the new state at once.
pub async fn gate(
    ctx: &EngineContext,
    from: BotState,
    window: &BookingWindow,
    offset_seconds: f64,
    label: &str,
) -> Result<()> {
    let target = ctx
        .time
        .target_for(window.hour, window.minute, window.second, offset_seconds)?;
    let now = Instant::now();
    if target > now {
        let wait = target - now;
        info!("⏳ {} gate: holding {:.3}s", label, wait.as_secs_f64());
        ctx.register
            .record(format!("{} gate: holding {}ms", label, wait.as_millis()));
    }

    let mut changes = ctx.register.subscribe();
    let departed = async {
        if changes.wait_for(|s| *s != from).await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let reached = tokio::select! {
        reached = ctx.time.wait_until(target, ctx.settings.gate_budget(), &ctx.stop) => reached,
        _ = departed => {
            let now_in = ctx.register.get();
            warn!("{} gate abandoned: {} → {}", label, from, now_in);
            return Err(BotError::Preempted(from.to_string()));
        }
    };

    if reached {
        info!("🚦 {} gate open", label);
        return Ok(());
    }
    ctx.stop.check()?;
    Err(BotError::Timeout(format!(
        "{} gate not reached within {}s",
        label,
        ctx.settings.gate_budget().as_secs()
    )))
}
