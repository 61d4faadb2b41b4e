use super::common::{activate, await_departure};
use crate::core::capabilities::Locator;
use crate::core::error::{BotError, Result};
use crate::core::state::BotState;
use crate::engine::EngineContext;
use tracing::{info, warn};

/// Choose the configured gateway option and hand off to the payer.
pub(super) async fn payment(ctx: &EngineContext) -> Result<()> {
    let prefs = &ctx.booking.preferences;
    let label = prefs.payment_method.gateway_label().ok_or_else(|| {
        BotError::Config(format!(
            "payment method {:?} cannot be driven",
            prefs.payment_method
        ))
    })?;

    info!("💳 paying via {}", label);
    activate(ctx, &Locator::PaymentMethod(label.to_string())).await?;
    activate(ctx, &Locator::PayAndBook).await?;

    match prefs.upi_id.as_deref() {
        Some(upi) => ctx
            .register
            .record(format!("payment initiated via {}, approve it for {}", label, upi)),
        None => ctx
            .register
            .record(format!("payment initiated via {}", label)),
    }
    await_departure(ctx, BotState::Payment, "pay and book").await
}

/// Wait for the booking to be confirmed, failing the run when it is not seen
/// in time.
pub(super) async fn awaiting_confirmation(ctx: &EngineContext) -> Result<()> {
    let within = ctx.settings.confirmation_timeout();
    info!("⏳ waiting up to {}s for confirmation", within.as_secs());

    let mut changes = ctx.register.subscribe();
    let settled = async {
        let _ = changes
            .wait_for(|s| *s != BotState::AwaitingConfirmation)
            .await;
    };
    let left = tokio::select! {
        r = tokio::time::timeout(within, settled) => r.is_ok(),
        _ = ctx.stop.cancelled() => return Err(BotError::Stopped),
    };
    if left {
        return Ok(());
    }

    warn!(
        "payment initiated but no confirmation within {}s",
        within.as_secs()
    );
    ctx.register.record_error(format!(
        "payment initiated, confirmation not observed within {}s; check bookings manually",
        within.as_secs()
    ));
    ctx.register.advance_from(
        BotState::AwaitingConfirmation,
        BotState::Failed,
        "confirmation not observed",
    );
    Ok(())
}
