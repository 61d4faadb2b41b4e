/// Engine primitives against a scripted page: classification, edge-triggered
/// dispatch, bounded retries and remote-clock gating.
mod common;

use chrono::{FixedOffset, TimeDelta, Timelike};
use common::{Harness, Screen, ScriptedPage, StubSolver};
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tatkal_bot::core::capabilities::{Locator, Signal};
use tatkal_bot::core::types::Severity;
use tatkal_bot::engine::handlers::HandlerFn;
use tatkal_bot::engine::supervisor;
use tatkal_bot::engine::worker::Worker;
use tatkal_bot::engine::EngineContext;
use tatkal_bot::resilience::retry_activate;
use tatkal_bot::{BotError, BotState, Result};
use tokio::time::Instant;

fn harness(screen: Screen) -> Harness {
    common::init_logger();
    Harness::new(ScriptedPage::new(screen), StubSolver::answering(common::CAPTCHA_ANSWER))
}

#[tokio::test(start_paused = true)]
async fn supervisor_prefers_login_form_over_logged_out() {
    let h = harness(Screen::LoginForm);
    let ctx = h.context(BotState::Idle, common::settings());

    supervisor::tick(&ctx).await.unwrap();
    assert_eq!(ctx.register.get(), BotState::LoginInProgress);
}

#[tokio::test(start_paused = true)]
async fn unrecognized_tick_leaves_state_unchanged() {
    let h = harness(Screen::Dashboard);
    let ctx = h.context(BotState::Idle, common::settings());

    supervisor::tick(&ctx).await.unwrap();
    assert_eq!(ctx.register.get(), BotState::AtDashboard);

    h.page.blank_out(true);
    supervisor::tick(&ctx).await.unwrap();
    assert_eq!(ctx.register.get(), BotState::AtDashboard);

    h.page.blank_out(false);
    supervisor::tick(&ctx).await.unwrap();
    assert_eq!(ctx.register.get(), BotState::AtDashboard);

    let arrivals = ctx
        .register
        .changes()
        .iter()
        .filter(|c| c.to == BotState::AtDashboard)
        .count();
    assert_eq!(arrivals, 1, "the gap must not produce a transition");
}

#[tokio::test(start_paused = true)]
async fn watchdog_flags_unexpected_logout() {
    let h = harness(Screen::Home);
    let ctx = h.context(BotState::ResultsListed, common::settings());

    supervisor::tick(&ctx).await.unwrap();

    assert_eq!(ctx.register.get(), BotState::LoggedOut);
    let critical = h
        .sink
        .entries()
        .into_iter()
        .filter(|e| e.severity == Severity::Critical)
        .count();
    assert_eq!(critical, 1);
}

#[tokio::test(start_paused = true)]
async fn interstitials_are_dismissed_before_classifying() {
    let h = harness(Screen::Dashboard);
    h.page.show_dialog(Signal::AdvisoryDialog);
    let ctx = h.context(BotState::Idle, common::settings());

    supervisor::tick(&ctx).await.unwrap();

    assert_eq!(h.page.clicks_on(&Locator::AdvisoryClose), 1);
    assert_eq!(ctx.register.get(), BotState::AtDashboard);
}

#[tokio::test(start_paused = true)]
async fn recovering_is_always_reclassified() {
    let h = harness(Screen::TrainList);
    let ctx = h.context(BotState::Recovering, common::settings());

    supervisor::tick(&ctx).await.unwrap();
    assert_eq!(ctx.register.get(), BotState::ResultsListed);
}

#[tokio::test(start_paused = true)]
async fn terminal_states_are_not_reclassified() {
    let h = harness(Screen::Dashboard);
    let ctx = h.context(BotState::Failed, common::settings());

    supervisor::tick(&ctx).await.unwrap();
    assert_eq!(ctx.register.get(), BotState::Failed);
    assert_eq!(h.page.observations(), 0);
}

static IDLE_RUNS: AtomicUsize = AtomicUsize::new(0);

fn count_idle(_ctx: &EngineContext) -> BoxFuture<'_, Result<()>> {
    async {
        IDLE_RUNS.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
    .boxed()
}

fn always_fails(_ctx: &EngineContext) -> BoxFuture<'_, Result<()>> {
    async { Err(BotError::Driver("page did not react".into())) }.boxed()
}

#[tokio::test(start_paused = true)]
async fn worker_runs_each_state_edge_once() {
    let h = harness(Screen::Blank);
    let ctx = h.context(BotState::Idle, common::settings());
    let mut table: HashMap<BotState, HandlerFn> = HashMap::new();
    table.insert(BotState::Idle, count_idle);
    let mut worker = Worker::with_table(ctx.clone(), table);

    assert!(worker.tick().await);
    assert!(!worker.tick().await);
    assert!(!worker.tick().await);
    assert_eq!(IDLE_RUNS.load(Ordering::SeqCst), 1);

    ctx.register.force(BotState::AtDashboard, "moved on");
    assert!(!worker.tick().await, "no handler for AT_DASHBOARD here");
    ctx.register.force(BotState::Idle, "back again");
    assert!(worker.tick().await);
    assert_eq!(IDLE_RUNS.load(Ordering::SeqCst), 2);
    assert_eq!(worker.last_processed(), Some(BotState::Idle));
}

#[tokio::test(start_paused = true)]
async fn failed_handler_routes_through_recovering() {
    let h = harness(Screen::TrainList);
    h.page.kill(Locator::TrainClass {
        train: "12834".into(),
        class: "3A".into(),
    });
    let ctx = h.context(BotState::ResultsListed, common::settings());
    let mut worker = Worker::new(ctx.clone());

    worker.tick().await;

    assert_eq!(ctx.register.get(), BotState::Recovering);
    assert_eq!(worker.last_processed(), None);
    assert!(h.sink.count_containing("train 12834 not found") >= 1);
}

#[tokio::test(start_paused = true)]
async fn repeated_failures_in_one_state_fail_the_run() {
    let h = harness(Screen::Blank);
    let mut settings = common::settings();
    settings.max_consecutive_failures = 2;
    let ctx = h.context(BotState::AtDashboard, settings);
    let mut table: HashMap<BotState, HandlerFn> = HashMap::new();
    table.insert(BotState::AtDashboard, always_fails);
    let mut worker = Worker::with_table(ctx.clone(), table);

    worker.tick().await;
    assert_eq!(ctx.register.get(), BotState::Recovering);

    ctx.register.force(BotState::AtDashboard, "page came back");
    worker.tick().await;
    assert_eq!(ctx.register.get(), BotState::Failed);
}

#[tokio::test(start_paused = true)]
async fn lost_session_is_fatal() {
    let h = harness(Screen::Blank);
    h.page.lose_session();
    let ctx = h.context(BotState::Starting, common::settings());
    let mut worker = Worker::new(ctx.clone());

    worker.tick().await;

    assert_eq!(ctx.register.get(), BotState::Fatal);
    assert!(ctx.stop.is_stopped());
}

#[tokio::test(start_paused = true)]
async fn retry_activate_gives_up_within_budget_plus_one_poll() {
    let h = harness(Screen::Home);
    h.page.kill(Locator::LoginButton);
    let settings = common::settings();
    let poll = settings.retry_poll_interval();
    let ctx = h.context(BotState::LoggedOut, settings);
    let budget = Duration::from_millis(1_000);

    let started = Instant::now();
    let activated = retry_activate(&ctx, &Locator::LoginButton, budget).await;
    let elapsed = started.elapsed();

    assert!(!activated);
    assert!(elapsed >= budget, "gave up early: {:?}", elapsed);
    assert!(elapsed <= budget + poll, "overran: {:?}", elapsed);
    assert!(h.sink.count_containing("could not activate LoginButton") >= 1);
}

#[tokio::test(start_paused = true)]
async fn retry_activate_stops_promptly() {
    let h = harness(Screen::Home);
    h.page.kill(Locator::LoginButton);
    let ctx = h.context(BotState::LoggedOut, common::settings());

    let stopper = {
        let stop = ctx.stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            stop.trigger();
        })
    };
    let started = Instant::now();
    assert!(!retry_activate(&ctx, &Locator::LoginButton, Duration::from_secs(60)).await);
    assert!(started.elapsed() < Duration::from_secs(1));
    stopper.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn gate_target_follows_the_remote_clock() {
    common::init_logger();
    let h = Harness::with_clock(
        ScriptedPage::new(Screen::Blank),
        StubSolver::answering(common::CAPTCHA_ANSWER),
        TimeDelta::seconds(2),
    );
    let ctx = h.context(BotState::AtDashboard, common::settings());
    let sample = ctx.time.sample().await;

    let ist = FixedOffset::east_opt(330 * 60).unwrap();
    let local_target = (sample.local_wall + TimeDelta::seconds(10))
        .with_timezone(&ist)
        .with_nanosecond(0)
        .unwrap();
    let target = ctx
        .time
        .target_for(
            local_target.hour(),
            local_target.minute(),
            local_target.second(),
            0.0,
        )
        .unwrap();

    let by_local_clock = local_target.signed_duration_since(sample.local_wall);
    let by_remote_clock = TimeDelta::from_std(target - sample.local_mono).unwrap();
    let lead = by_local_clock - by_remote_clock;
    assert!(
        (lead - TimeDelta::seconds(2)).num_milliseconds().abs() <= 5,
        "gate should open 2s before the local clock says so, got {:?}",
        lead
    );

    // Elapsed time is measured on the monotonic clock only.
    tokio::time::advance(Duration::from_secs(3)).await;
    let again = ctx
        .time
        .target_for(
            local_target.hour(),
            local_target.minute(),
            local_target.second(),
            0.0,
        )
        .unwrap();
    assert_eq!(again, target);
}

#[tokio::test(start_paused = true)]
async fn wait_until_past_target_returns_immediately() {
    let h = harness(Screen::Blank);
    let ctx = h.context(BotState::ResultsListed, common::settings());
    ctx.time.sample().await;

    let now = Instant::now();
    let target = now - Duration::from_millis(50);
    assert!(
        ctx.time
            .wait_until(target, Duration::from_secs(1), &ctx.stop)
            .await
    );
    assert_eq!(Instant::now(), now);
}

#[tokio::test(start_paused = true)]
async fn wait_until_respects_budget() {
    let h = harness(Screen::Blank);
    let ctx = h.context(BotState::ResultsListed, common::settings());

    let target = Instant::now() + Duration::from_secs(10);
    let started = Instant::now();
    assert!(
        !ctx.time
            .wait_until(target, Duration::from_millis(300), &ctx.stop)
            .await
    );
    assert_eq!(started.elapsed(), Duration::from_millis(300));
}
