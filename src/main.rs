use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

use tatkal_bot::browser::ChromeSession;
use tatkal_bot::core::capabilities::{StatusSink, TimeSource};
use tatkal_bot::core::config::default_screenshot_dir;
use tatkal_bot::solver::{shared_solver, HttpOcrSolver, ReadySolver};
use tatkal_bot::status::{ControlState, FanoutSink, HttpStatusSink, StatusBoard, TracingSink};
use tatkal_bot::timesync::HttpTimeSource;
use tatkal_bot::{
    load_config, Capabilities, Orchestrator, OrchestratorHandle, RunOutcome, StopSignal,
    TimeSynchronizer,
};

fn flag_value(name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    let mut args = std::env::args().peekable();
    while let Some(a) = args.next() {
        if a == name {
            return args.next();
        } else if let Some(rest) = a.strip_prefix(&prefix) {
            return Some(rest.to_string());
        }
    }
    None
}

fn parse_port_from_args() -> Option<u16> {
    flag_value("--port").and_then(|v| v.trim().parse::<u16>().ok())
}

fn parse_config_path_from_args() -> Option<PathBuf> {
    flag_value("--config").map(PathBuf::from)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = load_config(parse_config_path_from_args().as_deref())?;
    let mut settings = config.settings.clone();
    if settings.screenshot_dir.is_none() {
        settings.screenshot_dir = default_screenshot_dir();
    }
    if let Some(port) = parse_port_from_args() {
        settings.control_port = Some(port);
    }

    let bookings = config.bookings();
    let journey = &config.booking.journey;
    info!(
        "🚆 tatkal-bot {} starting: {} account(s), train {} {}→{} on {}",
        env!("CARGO_PKG_VERSION"),
        bookings.len(),
        journey.train_no,
        journey.from_station,
        journey.to_station,
        journey.date
    );

    // One recognizer for every account; solves wait until it answers.
    let ocr = Arc::new(HttpOcrSolver::new(settings.ocr_url.clone())?);
    let solver = shared_solver(|| ReadySolver::new(ocr.clone(), settings.solver_ready_timeout()));
    Arc::clone(&ocr).spawn_warm_up(Arc::clone(&solver), settings.solver_ready_timeout());

    let time_source: Arc<dyn TimeSource> =
        Arc::new(HttpTimeSource::new(settings.time_source_url.clone())?);
    let time = Arc::new(TimeSynchronizer::new(
        Arc::clone(&time_source),
        settings.utc_offset_minutes,
    )?);
    let sample = time.sample().await;
    info!(
        "🕒 remote clock {}ms ahead of local ({:?})",
        sample.remote_ahead().num_milliseconds(),
        sample.source
    );

    let status_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .connect_timeout(Duration::from_secs(3))
        .build()?;
    let board = StatusBoard::new(200);

    let mut orchestrators = Vec::new();
    for booking in bookings {
        let account = booking.account.username.clone();
        let session = match ChromeSession::launch(&settings, &account).await {
            Ok(s) => Arc::new(s),
            Err(e) => {
                error!("❌ could not start a browser for {}: {}", account, e);
                continue;
            }
        };

        let mut sinks: Vec<Arc<dyn StatusSink>> = vec![
            Arc::new(TracingSink::new(account.clone())),
            Arc::new(board.sink_for(account.clone())),
        ];
        if let Some(url) = settings.status_url.as_ref() {
            sinks.push(Arc::new(HttpStatusSink::spawn(
                status_client.clone(),
                url.clone(),
                account.clone(),
            )));
        }

        let caps = Capabilities {
            observer: session.clone(),
            executor: session,
            solver: solver.clone(),
            time_source: Arc::clone(&time_source),
            sink: Arc::new(FanoutSink::new(sinks)),
        };
        orchestrators.push(Orchestrator::with_time(
            booking,
            settings.clone(),
            caps,
            Arc::clone(&time),
        ));
    }
    if orchestrators.is_empty() {
        anyhow::bail!("no browser session could be started; check CHROME_EXECUTABLE");
    }

    let handles: Vec<OrchestratorHandle> = orchestrators.iter().map(Orchestrator::handle).collect();

    let server_stop = StopSignal::new();
    let server = match settings.control_port {
        Some(port) => Some(
            spawn_control_server(
                port,
                ControlState {
                    handles: handles.clone(),
                    board,
                },
                server_stop.clone(),
            )
            .await?,
        ),
        None => None,
    };

    {
        let handles = handles.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            warn!("🛑 shutdown signal received, stopping all bots");
            for h in &handles {
                h.stop();
            }
        });
    }

    let mut runs = JoinSet::new();
    for orchestrator in orchestrators {
        runs.spawn(orchestrator.run());
    }

    let mut outcomes: Vec<RunOutcome> = Vec::new();
    while let Some(joined) = runs.join_next().await {
        match joined {
            Ok(outcome) => {
                if outcome.is_confirmed() && settings.stop_others_on_success {
                    info!("🎉 {} confirmed, stopping the other bots", outcome.account);
                    for h in handles.iter().filter(|h| h.run_id() != outcome.run_id) {
                        h.stop();
                    }
                }
                outcomes.push(outcome);
            }
            Err(e) => error!("bot task ended abnormally: {}", e),
        }
    }

    server_stop.trigger();
    if let Some(task) = server {
        let _ = task.await;
    }

    for o in &outcomes {
        info!(
            "{} finished in {} after {} transitions",
            o.account,
            o.final_state,
            o.transitions.len()
        );
    }
    if !outcomes.iter().any(RunOutcome::is_confirmed) {
        warn!("no booking was confirmed");
        std::process::exit(1);
    }
    Ok(())
}

async fn spawn_control_server(
    port: u16,
    state: ControlState,
    stop: StopSignal,
) -> anyhow::Result<JoinHandle<()>> {
    let app = tatkal_bot::status::router(Arc::new(state));
    let bind_addr = format!("127.0.0.1:{}", port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            anyhow::bail!(
                "Address already in use: {}. Stop the existing process or run with --port {} (or set TATKAL_BOT_PORT).",
                bind_addr,
                port.saturating_add(1)
            )
        }
        Err(e) => return Err(e.into()),
    };
    info!("🎛️ control API listening on http://{}", bind_addr);

    Ok(tokio::spawn(async move {
        let shutdown = async move { stop.cancelled().await };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!("control API stopped: {}", e);
        }
    }))
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).ok();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                if let Some(ref mut s) = sigterm {
                    s.recv().await;
                } else {
                    futures::future::pending::<()>().await;
                }
            } => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
