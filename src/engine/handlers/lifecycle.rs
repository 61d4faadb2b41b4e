use crate::core::error::{BotError, Result};
use crate::core::state::BotState;
use crate::engine::EngineContext;
use chrono::Local;
use tracing::{info, warn};

const RELOADS_PER_RECOVERY: u32 = 3;

pub(super) async fn starting(ctx: &EngineContext) -> Result<()> {
    let url = &ctx.settings.booking_url;
    info!("🌐 opening {}", url);
    ctx.caps.executor.navigate(url).await?;
    ctx.register.record(format!("opened {}", url));
    ctx.register
        .advance_from(BotState::Starting, BotState::Idle, "booking page opened");
    Ok(())
}

/// Give the supervisor a grace period to reclassify the page, then reload
/// the booking page until it does.
pub(super) async fn recovering(ctx: &EngineContext) -> Result<()> {
    let grace = ctx.settings.recovery_grace();
    for reload in 1..=RELOADS_PER_RECOVERY {
        ctx.pause(grace).await?;
        if ctx.register.get() != BotState::Recovering {
            return Ok(());
        }
        warn!(
            "🔄 page still unclassified after {}ms, reloading ({}/{})",
            grace.as_millis(),
            reload,
            RELOADS_PER_RECOVERY
        );
        ctx.register.record("reloading booking page to recover");
        ctx.caps.executor.navigate(&ctx.settings.booking_url).await?;
    }

    ctx.pause(grace).await?;
    if ctx.register.get() != BotState::Recovering {
        return Ok(());
    }
    Err(BotError::Navigation(format!(
        "page unclassifiable after {} reloads",
        RELOADS_PER_RECOVERY
    )))
}

/// Best-effort proof of booking.
pub(super) async fn confirmed(ctx: &EngineContext) -> Result<()> {
    info!("🎉 booking confirmed for {}", ctx.booking.account.username);
    ctx.register.record("booking confirmed");

    let Some(dir) = ctx.settings.screenshot_dir.as_ref() else {
        return Ok(());
    };
    let png = match ctx.caps.executor.screenshot().await {
        Ok(png) => png,
        Err(e) => {
            warn!("confirmation screenshot failed: {}", e);
            return Ok(());
        }
    };

    let file = dir.join(format!(
        "booking_success_{}_{}.png",
        ctx.booking.account.username,
        Local::now().format("%Y%m%d-%H%M%S")
    ));
    let written = async {
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(&file, &png).await
    }
    .await;
    match written {
        Ok(()) => {
            info!("📸 confirmation saved to {}", file.display());
            ctx.register
                .record(format!("confirmation screenshot saved to {}", file.display()));
        }
        Err(e) => warn!("could not save {}: {}", file.display(), e),
    }
    Ok(())
}
