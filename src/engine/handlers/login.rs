use super::common::{activate, signal_now};
use crate::core::capabilities::{Locator, Signal};
use crate::core::error::{BotError, Result};
use crate::engine::EngineContext;
use crate::resilience::{paced_type, retry_activate, solve_challenge_async, ChallengeSpec};
use tokio::time::Instant;
use tracing::{info, warn};

/// Scratch counter of sign-in submissions in the current auth phase.
pub const LOGIN_ATTEMPTS_KEY: &str = "login.attempts";

pub(super) async fn logged_out(ctx: &EngineContext) -> Result<()> {
    info!("🔐 opening login form");
    let button = Locator::LoginButton;
    if retry_activate(ctx, &button, ctx.settings.login_button_budget()).await {
        ctx.register.record("login form requested");
        return Ok(());
    }
    ctx.stop.check()?;
    Err(BotError::ElementNotFound(button.to_string()))
}

pub(super) async fn login_in_progress(ctx: &EngineContext) -> Result<()> {
    let ceiling = ctx.settings.login_attempt_ceiling.max(1);
    let attempt = ctx.register.scratch_increment(LOGIN_ATTEMPTS_KEY);
    if attempt > u64::from(ceiling) {
        return Err(BotError::ChallengeExhausted { attempts: ceiling });
    }
    info!("🔐 login attempt {}/{}", attempt, ceiling);

    let account = &ctx.booking.account;
    let username = Locator::UsernameInput;
    let password = Locator::PasswordInput;
    let credentials = async {
        paced_type(ctx, &username, &account.username).await?;
        paced_type(ctx, &password, &account.password).await
    };

    let challenge = ChallengeSpec::login();
    let answer = solve_challenge_async(ctx, &challenge, credentials).await?;
    paced_type(ctx, &challenge.input, &answer).await?;
    activate(ctx, &Locator::SignInButton).await?;

    if verify_login(ctx).await? {
        info!("✅ logged in as {}", account.username);
        ctx.register
            .record(format!("logged in on attempt {}", attempt));
        return Ok(());
    }

    warn!("login attempt {} rejected", attempt);
    ctx.register
        .record_error(format!("login attempt {} rejected", attempt));
    retry_activate(ctx, &challenge.refresh, ctx.settings.retry_poll_interval() * 4).await;
    Err(BotError::ChallengeRejected)
}

/// Whether the sign-in went through: either the register already left the
/// login phase or the dashboard is visible.
async fn verify_login(ctx: &EngineContext) -> Result<bool> {
    let deadline = Instant::now() + ctx.settings.login_verify_timeout();
    let poll = ctx.settings.retry_poll_interval();
    loop {
        let state = ctx.register.get();
        if state.is_authenticated() || state.is_terminal() {
            return Ok(true);
        }
        if signal_now(ctx, Signal::Dashboard).await? {
            return Ok(true);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(false);
        }
        ctx.pause(poll.min(deadline - now)).await?;
    }
}

