//! Per-state domain actions and the table that dispatches them.
//!
//! A handler is a plain function of the engine context. It performs one
//! bounded unit of work for its state and either returns (the supervisor
//! picks up the page change) or fails (the worker routes through
//! RECOVERING).

mod booking;
mod common;
mod lifecycle;
mod login;
mod search;
mod settlement;

use super::EngineContext;
use crate::core::error::Result;
use crate::core::state::BotState;
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;

pub use common::{await_departure, gate};
pub use login::LOGIN_ATTEMPTS_KEY;

pub type HandlerFn = for<'a> fn(&'a EngineContext) -> BoxFuture<'a, Result<()>>;

fn starting(ctx: &EngineContext) -> BoxFuture<'_, Result<()>> {
    lifecycle::starting(ctx).boxed()
}

fn logged_out(ctx: &EngineContext) -> BoxFuture<'_, Result<()>> {
    login::logged_out(ctx).boxed()
}

fn login_in_progress(ctx: &EngineContext) -> BoxFuture<'_, Result<()>> {
    login::login_in_progress(ctx).boxed()
}

fn at_dashboard(ctx: &EngineContext) -> BoxFuture<'_, Result<()>> {
    search::at_dashboard(ctx).boxed()
}

fn results_listed(ctx: &EngineContext) -> BoxFuture<'_, Result<()>> {
    search::results_listed(ctx).boxed()
}

fn detail_form(ctx: &EngineContext) -> BoxFuture<'_, Result<()>> {
    booking::detail_form(ctx).boxed()
}

fn review(ctx: &EngineContext) -> BoxFuture<'_, Result<()>> {
    booking::review(ctx).boxed()
}

fn payment(ctx: &EngineContext) -> BoxFuture<'_, Result<()>> {
    settlement::payment(ctx).boxed()
}

fn awaiting_confirmation(ctx: &EngineContext) -> BoxFuture<'_, Result<()>> {
    settlement::awaiting_confirmation(ctx).boxed()
}

fn confirmed(ctx: &EngineContext) -> BoxFuture<'_, Result<()>> {
    lifecycle::confirmed(ctx).boxed()
}

fn recovering(ctx: &EngineContext) -> BoxFuture<'_, Result<()>> {
    lifecycle::recovering(ctx).boxed()
}

/// States without an entry (IDLE and the failure terminals) are left to the
/// supervisor.
pub fn dispatch_table() -> HashMap<BotState, HandlerFn> {
    HashMap::from([
        (BotState::Starting, starting as HandlerFn),
        (BotState::LoggedOut, logged_out as HandlerFn),
        (BotState::LoginInProgress, login_in_progress as HandlerFn),
        (BotState::AtDashboard, at_dashboard as HandlerFn),
        (BotState::ResultsListed, results_listed as HandlerFn),
        (BotState::DetailForm, detail_form as HandlerFn),
        (BotState::Review, review as HandlerFn),
        (BotState::Payment, payment as HandlerFn),
        (BotState::AwaitingConfirmation, awaiting_confirmation as HandlerFn),
        (BotState::Confirmed, confirmed as HandlerFn),
        (BotState::Recovering, recovering as HandlerFn),
    ])
}
