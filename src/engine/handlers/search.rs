use super::common::{activate, await_departure, choose, gate, set_value};
use crate::core::capabilities::Locator;
use crate::core::error::{BotError, Result};
use crate::core::state::BotState;
use crate::engine::EngineContext;
use crate::resilience::{paced_type, retry_activate};
use tracing::info;

async fn fill_station(ctx: &EngineContext, input: Locator, code: &str) -> Result<()> {
    paced_type(ctx, &input, code).await?;
    activate(ctx, &Locator::StationOption(code.to_string())).await
}

/// Fill the journey form, hold until just before the window, then search.
pub(super) async fn at_dashboard(ctx: &EngineContext) -> Result<()> {
    let journey = &ctx.booking.journey;
    info!(
        "🔎 searching {} → {} on {}",
        journey.from_station,
        journey.to_station,
        journey.form_date()
    );

    fill_station(ctx, Locator::OriginInput, &journey.from_station).await?;
    fill_station(ctx, Locator::DestinationInput, &journey.to_station).await?;
    set_value(ctx, &Locator::JourneyDateInput, &journey.form_date()).await?;
    choose(
        ctx,
        &Locator::ClassDropdown,
        &Locator::ClassOption(journey.class_code().to_string()),
    )
    .await?;
    choose(
        ctx,
        &Locator::QuotaDropdown,
        &Locator::QuotaOption(journey.quota.clone()),
    )
    .await?;
    ctx.register.record("journey form filled");

    if let Some(window) = ctx.settings.window.as_ref() {
        gate(
            ctx,
            BotState::AtDashboard,
            window,
            -window.search_lead_seconds,
            "search",
        )
        .await?;
    }

    activate(ctx, &Locator::FindTrainsButton).await?;
    ctx.register.record("search submitted");
    await_departure(ctx, BotState::AtDashboard, "search").await
}

/// Pick the class inside the train card, hold until just after the window,
/// then book.
pub(super) async fn results_listed(ctx: &EngineContext) -> Result<()> {
    let journey = &ctx.booking.journey;
    let train = journey.train_no.clone();
    let class_cell = Locator::TrainClass {
        train: train.clone(),
        class: journey.class_code().to_string(),
    };

    if !retry_activate(ctx, &class_cell, ctx.settings.activate_budget()).await {
        ctx.stop.check()?;
        return Err(BotError::TrainNotFound(train));
    }
    ctx.register
        .record(format!("selected {} on train {}", journey.class_code(), train));

    if let Some(window) = ctx.settings.window.as_ref() {
        gate(
            ctx,
            BotState::ResultsListed,
            window,
            window.submit_offset_seconds,
            "book",
        )
        .await?;
    }

    activate(ctx, &Locator::BookNow { train }).await?;
    ctx.register.record("book now pressed");
    await_departure(ctx, BotState::ResultsListed, "book now").await
}
