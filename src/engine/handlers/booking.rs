use super::common::{activate, await_departure, select};
use crate::core::capabilities::Locator;
use crate::core::error::Result;
use crate::core::state::BotState;
use crate::engine::EngineContext;
use crate::resilience::{paced_type, solve_challenge_async, ChallengeSpec};
use std::future;
use tracing::{info, warn};

pub(super) async fn detail_form(ctx: &EngineContext) -> Result<()> {
    let booking = &ctx.booking;
    info!("🧾 filling {} passenger(s)", booking.passengers.len());

    paced_type(ctx, &Locator::MobileInput, booking.mobile_number()).await?;

    for (i, passenger) in booking.passengers.iter().enumerate() {
        if i > 0 {
            activate(ctx, &Locator::AddPassenger).await?;
        }
        paced_type(ctx, &Locator::PassengerName(i), &passenger.name).await?;
        paced_type(ctx, &Locator::PassengerAge(i), &passenger.age.to_string()).await?;
        select(ctx, &Locator::PassengerGender(i), &passenger.gender).await?;
        if let Some(berth) = passenger.berth_choice() {
            select(ctx, &Locator::PassengerBerth(i), berth).await?;
        }
    }

    if let Err(e) = apply_auto_upgrade(ctx).await {
        warn!("could not set auto-upgrade preference: {}", e);
    }

    ctx.register.record("passenger details filled");
    activate(ctx, &Locator::ContinueButton).await?;
    await_departure(ctx, BotState::DetailForm, "continue").await
}

async fn apply_auto_upgrade(ctx: &EngineContext) -> Result<()> {
    let wanted = ctx.booking.preferences.auto_upgrade;
    let checked = ctx
        .caps
        .executor
        .read_attribute(&Locator::AutoUpgradeCheckbox, "checked")
        .await?;
    let is_checked = matches!(checked.as_deref(), Some("true") | Some("checked") | Some(""));
    if is_checked != wanted {
        ctx.caps.executor.click(&Locator::AutoUpgradeLabel).await?;
    }
    Ok(())
}

pub(super) async fn review(ctx: &EngineContext) -> Result<()> {
    info!("🧩 solving review challenge");
    let challenge = ChallengeSpec::review();
    let answer = solve_challenge_async(ctx, &challenge, future::ready(Ok(()))).await?;
    paced_type(ctx, &challenge.input, &answer).await?;
    activate(ctx, &Locator::ProceedToPay).await?;
    ctx.register.record("proceeding to payment");
    await_departure(ctx, BotState::Review, "proceed to pay").await
}
