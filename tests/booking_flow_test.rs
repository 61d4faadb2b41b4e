/// End-to-end booking flows against the scripted site.
mod common;

use common::{Harness, Screen, ScriptedPage, StubSolver, CAPTCHA_ANSWER};
use std::time::Duration;
use tatkal_bot::core::capabilities::Locator;
use tatkal_bot::engine::handlers::dispatch_table;
use tatkal_bot::engine::supervisor;
use tatkal_bot::{BotError, BotState, Orchestrator};
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

#[tokio::test(start_paused = true)]
async fn login_reaches_the_dashboard() {
    common::init_logger();
    let h = Harness::new(
        ScriptedPage::new(Screen::LoginForm),
        StubSolver::answering(CAPTCHA_ANSWER),
    );
    let ctx = h.context(BotState::Idle, common::settings());
    let table = dispatch_table();

    supervisor::tick(&ctx).await.unwrap();
    assert_eq!(ctx.register.get(), BotState::LoginInProgress);

    assert_ok!((table[&BotState::LoginInProgress])(&ctx).await);
    supervisor::tick(&ctx).await.unwrap();

    assert_eq!(ctx.register.get(), BotState::AtDashboard);
    assert_eq!(h.page.typed(&Locator::UsernameInput).as_deref(), Some("user1"));
    assert_eq!(h.page.typed(&Locator::PasswordInput).as_deref(), Some("secret"));
    assert_eq!(h.page.typed(&Locator::CaptchaInput).as_deref(), Some(CAPTCHA_ANSWER));
    assert_eq!(h.page.clicks_on(&Locator::SignInButton), 1);
    assert_eq!(h.solver.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn empty_answers_refresh_the_challenge() {
    common::init_logger();
    let h = Harness::new(
        ScriptedPage::new(Screen::LoginForm),
        StubSolver::scripted(vec![None, None, None, None], Some(CAPTCHA_ANSWER)),
    );
    let mut settings = common::settings();
    settings.challenge_ceiling = 5;
    let ctx = h.context(BotState::LoginInProgress, settings);

    assert_ok!((dispatch_table()[&BotState::LoginInProgress])(&ctx).await);

    assert_eq!(h.solver.calls(), 5);
    assert_eq!(h.page.clicks_on(&Locator::CaptchaRefresh), 4);
    assert_eq!(h.sink.count_containing("refreshing challenge"), 4);
    assert_eq!(h.page.screen(), Screen::Dashboard);
}

#[tokio::test(start_paused = true)]
async fn unsolvable_challenge_is_exhausted() {
    common::init_logger();
    let h = Harness::new(
        ScriptedPage::new(Screen::LoginForm),
        StubSolver::scripted(Vec::new(), None),
    );
    let mut settings = common::settings();
    settings.challenge_ceiling = 3;
    let ctx = h.context(BotState::LoginInProgress, settings);

    let err = assert_err!((dispatch_table()[&BotState::LoginInProgress])(&ctx).await);

    assert!(matches!(err, BotError::ChallengeExhausted { attempts: 3 }));
    assert_eq!(h.page.clicks_on(&Locator::CaptchaRefresh), 3);
    assert_eq!(h.page.clicks_on(&Locator::SignInButton), 0);
}

#[tokio::test(start_paused = true)]
async fn slow_solves_time_out_and_refresh() {
    common::init_logger();
    let h = Harness::new(
        ScriptedPage::new(Screen::LoginForm),
        StubSolver::slow(CAPTCHA_ANSWER, Duration::from_secs(5)),
    );
    let mut settings = common::settings();
    settings.challenge_ceiling = 3;
    settings.solve_timeout_ms = 1_000;
    let ctx = h.context(BotState::LoginInProgress, settings);

    let started = Instant::now();
    let err = assert_err!((dispatch_table()[&BotState::LoginInProgress])(&ctx).await);
    let elapsed = started.elapsed();

    assert!(matches!(err, BotError::ChallengeExhausted { attempts: 3 }));
    assert_eq!(h.solver.calls(), 3);
    assert_eq!(h.page.clicks_on(&Locator::CaptchaRefresh), 3);
    assert_eq!(h.sink.count_containing("no answer within 1000ms"), 3);
    assert!(elapsed >= Duration::from_secs(3), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(3_500), "{:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn credentials_are_typed_while_the_solver_works() {
    common::init_logger();
    let h = Harness::new(
        ScriptedPage::new(Screen::LoginForm),
        StubSolver::slow(CAPTCHA_ANSWER, Duration::from_millis(800)),
    );
    let mut settings = common::settings();
    settings.typing_delay_min_ms = 50;
    settings.typing_delay_max_ms = 50;
    let ctx = h.context(BotState::LoginInProgress, settings);

    let started = Instant::now();
    assert_ok!((dispatch_table()[&BotState::LoginInProgress])(&ctx).await);
    let elapsed = started.elapsed();

    // 11 credential keystrokes (550ms) hide under the 800ms solve; the 4
    // answer keystrokes follow it.
    assert_eq!(h.solver.calls(), 1);
    assert!(elapsed >= Duration::from_millis(1_000), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1_300), "{:?}", elapsed);
    assert_eq!(h.page.screen(), Screen::Dashboard);
}

#[tokio::test(start_paused = true)]
async fn missing_confirmation_fails_the_run() {
    common::init_logger();
    let h = Harness::new(
        ScriptedPage::new(Screen::PaymentPending),
        StubSolver::answering(CAPTCHA_ANSWER),
    );
    h.page.never_confirm();
    let mut settings = common::settings();
    settings.confirmation_timeout_ms = 1_000;
    let ctx = h.context(BotState::AwaitingConfirmation, settings);

    (dispatch_table()[&BotState::AwaitingConfirmation])(&ctx)
        .await
        .unwrap();

    assert_eq!(ctx.register.get(), BotState::Failed);
    assert_eq!(h.sink.count_containing("check bookings manually"), 1);
}

#[tokio::test(start_paused = true)]
async fn confirmation_screenshot_is_saved() {
    common::init_logger();
    let h = Harness::new(
        ScriptedPage::new(Screen::Confirmed),
        StubSolver::answering(CAPTCHA_ANSWER),
    );
    let dir = std::env::temp_dir().join(format!("tatkal-bot-{}", uuid::Uuid::new_v4()));
    let mut settings = common::settings();
    settings.screenshot_dir = Some(dir.clone());
    let ctx = h.context(BotState::Confirmed, settings);

    (dispatch_table()[&BotState::Confirmed])(&ctx).await.unwrap();

    let saved: Vec<_> = std::fs::read_dir(&dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(saved.len(), 1);
    assert!(saved[0].starts_with("booking_success_user1_"));
    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test(start_paused = true)]
async fn full_run_books_the_ticket() {
    common::init_logger();
    let h = Harness::new(
        ScriptedPage::new(Screen::Blank),
        StubSolver::answering(CAPTCHA_ANSWER),
    );
    let orchestrator =
        Orchestrator::new(common::booking(), common::settings(), h.caps.clone()).unwrap();
    let handle = orchestrator.handle();

    let outcome = orchestrator.run().await;

    assert_eq!(outcome.final_state, BotState::Confirmed);
    assert!(outcome.is_confirmed());
    assert_eq!(handle.current_state(), BotState::Confirmed);

    let visited: Vec<BotState> = outcome.transitions.iter().map(|c| c.to).collect();
    for state in [
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
    ] {
        assert!(visited.contains(&state), "never reached {}: {:?}", state, visited);
    }

    assert_eq!(h.page.navigations(), 1);
    assert_eq!(
        h.page.typed(&Locator::PassengerName(1)).as_deref(),
        Some("Passenger Two")
    );
    assert_eq!(h.page.clicks_on(&Locator::PayAndBook), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_request_ends_the_run() {
    common::init_logger();
    let h = Harness::new(
        ScriptedPage::new(Screen::Home),
        StubSolver::answering(CAPTCHA_ANSWER),
    );
    h.page.kill(Locator::LoginButton);
    let orchestrator =
        Orchestrator::new(common::booking(), common::settings(), h.caps.clone()).unwrap();
    let handle = orchestrator.handle();
    let run = tokio::spawn(orchestrator.run());

    tokio::time::sleep(Duration::from_millis(500)).await;
    handle.stop();
    let outcome = run.await.unwrap();

    assert_eq!(outcome.final_state, BotState::Stopped);
    assert_eq!(h.page.clicks_on(&Locator::PayAndBook), 0);
}

#[tokio::test(start_paused = true)]
async fn unexpected_logout_is_recovered() {
    common::init_logger();
    let h = Harness::new(
        ScriptedPage::new(Screen::TrainList),
        StubSolver::answering(CAPTCHA_ANSWER),
    );
    let ctx = h.context(BotState::ResultsListed, common::settings());

    h.page.log_out();
    supervisor::tick(&ctx).await.unwrap();
    assert_eq!(ctx.register.get(), BotState::LoggedOut);

    assert_ok!((dispatch_table()[&BotState::LoggedOut])(&ctx).await);
    supervisor::tick(&ctx).await.unwrap();
    assert_eq!(ctx.register.get(), BotState::LoginInProgress);
}
