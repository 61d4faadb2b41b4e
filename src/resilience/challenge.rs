//! Background challenge (captcha) resolution.
//!
//! The image is read in the foreground through the shared session, then only
//! the decoded bytes (or the URI) move to a spawned solve task. The caller's
//! `overlap` work, typically filling the credential fields, runs while the
//! solver is busy.

use crate::core::capabilities::{ChallengeImage, Locator};
use crate::core::error::{BotError, Result};
use crate::engine::EngineContext;
use base64::Engine as _;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use super::retry::{retry_activate, retry_transient};

/// Where a challenge lives on the page.
#[derive(Debug, Clone)]
pub struct ChallengeSpec {
    pub label: &'static str,
    pub image: Locator,
    pub input: Locator,
    pub refresh: Locator,
}

impl ChallengeSpec {
    pub fn login() -> Self {
        Self {
            label: "login",
            image: Locator::CaptchaImage,
            input: Locator::CaptchaInput,
            refresh: Locator::CaptchaRefresh,
        }
    }

    pub fn review() -> Self {
        Self {
            label: "review",
            image: Locator::ReviewCaptchaImage,
            input: Locator::ReviewCaptchaInput,
            refresh: Locator::ReviewCaptchaRefresh,
        }
    }
}

const REFRESH_BUDGET: Duration = Duration::from_secs(3);

/// Turn an image `src` into something a solver can use without the page.
pub fn challenge_image_from_src(src: &str) -> Result<ChallengeImage> {
    let src = src.trim();
    if src.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("data:")) {
        let (_, payload) = src
            .split_once(',')
            .ok_or_else(|| BotError::Solver("malformed data URI".into()))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| BotError::Solver(format!("challenge image is not base64: {}", e)))?;
        return Ok(ChallengeImage::Bytes(bytes));
    }
    if src.is_empty() {
        return Err(BotError::ElementNotFound("challenge image has no src".into()));
    }
    Ok(ChallengeImage::Uri(src.to_string()))
}

async fn read_challenge_image(ctx: &EngineContext, locator: &Locator) -> Result<ChallengeImage> {
    let executor = &ctx.caps.executor;
    let src = retry_transient(ctx, ctx.settings.activate_budget(), move || async move {
        executor
            .read_attribute(locator, "src")
            .await?
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| BotError::ElementNotFound(format!("{} src", locator)))
    })
    .await?;
    challenge_image_from_src(&src)
}

/// Solve the challenge described by `spec`, running `overlap` alongside the
/// first solve.
///
/// Every failed attempt (empty answer, solver error, timeout) activates the
/// refresh control once before the next attempt. After `challenge_ceiling`
/// failed attempts the result is `ChallengeExhausted`.
pub async fn solve_challenge_async<F>(
    ctx: &EngineContext,
    spec: &ChallengeSpec,
    overlap: F,
) -> Result<String>
where
    F: Future<Output = Result<()>>,
{
    let ceiling = ctx.settings.challenge_ceiling.max(1);
    let solve_timeout = ctx.settings.solve_timeout();
    let mut overlap = Some(overlap);

    for attempt in 1..=ceiling {
        ctx.stop.check()?;

        let image = read_challenge_image(ctx, &spec.image).await?;
        let solver = Arc::clone(&ctx.caps.solver);
        let deadline = Instant::now() + solve_timeout;
        let mut task = tokio::spawn(async move { solver.solve(image).await });

        if let Some(work) = overlap.take() {
            if let Err(e) = work.await {
                task.abort();
                return Err(e);
            }
        }

        let joined = tokio::select! {
            joined = tokio::time::timeout_at(deadline, &mut task) => joined,
            _ = ctx.stop.cancelled() => {
                task.abort();
                return Err(BotError::Stopped);
            }
        };

        let failure = match joined {
            Ok(Ok(Ok(Some(answer)))) if !answer.trim().is_empty() => {
                info!(
                    "🧩 {} challenge solved on attempt {}/{}",
                    spec.label, attempt, ceiling
                );
                ctx.register.record(format!(
                    "{} challenge solved on attempt {}",
                    spec.label, attempt
                ));
                return Ok(answer.trim().to_string());
            }
            Ok(Ok(Ok(_))) => "empty answer".to_string(),
            Ok(Ok(Err(e))) => format!("solver error: {}", e),
            Ok(Err(join_err)) => format!("solver task failed: {}", join_err),
            Err(_) => {
                task.abort();
                format!("no answer within {}ms", solve_timeout.as_millis())
            }
        };

        warn!(
            "{} challenge attempt {}/{} failed: {}",
            spec.label, attempt, ceiling, failure
        );
        ctx.register.record(format!(
            "{} challenge attempt {}/{} failed ({}); refreshing challenge",
            spec.label, attempt, ceiling, failure
        ));
        if !retry_activate(ctx, &spec.refresh, REFRESH_BUDGET).await {
            ctx.stop.check()?;
        }
    }

    Err(BotError::ChallengeExhausted { attempts: ceiling })
}
