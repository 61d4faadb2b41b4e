use crate::core::capabilities::Locator;
use crate::core::error::{BotError, Result};
use crate::engine::EngineContext;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Activate `locator` within `budget`.
///
/// Each attempt tries a direct click and, when that fails (not rendered yet,
/// stale, covered by an overlay), a programmatic activation. Between attempts
/// it sleeps one poll interval capped to what is left of the budget, so a
/// locator that never resolves returns `false` after `budget` and before
/// `budget` plus one poll interval.
pub async fn retry_activate(ctx: &EngineContext, locator: &Locator, budget: Duration) -> bool {
    let deadline = Instant::now() + budget;
    let poll = ctx.settings.retry_poll_interval();
    let executor = &ctx.caps.executor;
    let mut attempts = 0u32;
    let mut last_error: Option<BotError> = None;

    loop {
        if ctx.stop.is_stopped() {
            return false;
        }
        attempts += 1;

        match executor.click(locator).await {
            Ok(()) => {
                debug!("activated {} (attempt {})", locator, attempts);
                return true;
            }
            Err(click_err) => match executor.activate_fallback(locator).await {
                Ok(()) => {
                    debug!(
                        "activated {} via fallback (attempt {}, click: {})",
                        locator, attempts, click_err
                    );
                    return true;
                }
                Err(e) => {
                    if e.is_fatal() {
                        warn!("giving up on {}: {}", locator, e);
                        ctx.register
                            .record_error(format!("could not activate {}: {}", locator, e));
                        return false;
                    }
                    last_error = Some(e);
                }
            },
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        let step = poll.min(deadline - now);
        tokio::select! {
            _ = tokio::time::sleep(step) => {}
            _ = ctx.stop.cancelled() => return false,
        }
    }

    let reason = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no attempt made".to_string());
    warn!(
        "❌ {} not activatable within {:?} ({} attempts): {}",
        locator, budget, attempts, reason
    );
    ctx.register.record_error(format!(
        "could not activate {} within {}ms after {} attempts: {}",
        locator,
        budget.as_millis(),
        attempts,
        reason
    ));
    false
}

/// Re-run `op` while it fails with a transient UI error, up to `budget`.
/// Any other error, or the last transient one, is returned.
pub async fn retry_transient<T, F, Fut>(ctx: &EngineContext, budget: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let deadline = Instant::now() + budget;
    let poll = ctx.settings.retry_poll_interval();
    loop {
        ctx.stop.check()?;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(e);
                }
                debug!("transient: {} (retrying)", e);
                ctx.pause(poll.min(deadline - now)).await?;
            }
            Err(e) => return Err(e),
        }
    }
}
