use camtrap_ingest::{app_state::AppState, config::AppConfig, pipeline::teardown};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const COMPLETION_POLL_TIMEOUT: Duration = Duration::from_secs(5);
const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Teardown coordinator: samples queue depths for every stable batch,
/// consumes completion notifications, and periodically reclaims stale
/// infra whose notification was lost.
///
/// The completion consumer runs as its own loop rather than inside a
/// `select!` arm: BRPOP is not cancellation-safe, and dropping its future
/// mid-flight would lose a notice the server already popped.
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting teardown coordinator");

    let config = AppConfig::from_env().expect("Failed to load configuration");
    let state = AppState::new(config).expect("Failed to initialize services");

    // Direct deletion request: tear down one batch and exit.
    if let Ok(batch_id) = std::env::var("DELETE_BATCH") {
        match teardown::handle_delete_request(&state, &batch_id).await {
            Ok(()) => tracing::info!(batch_id = %batch_id, "batch torn down"),
            Err(e) => {
                tracing::error!(batch_id = %batch_id, error = %e, "teardown failed");
                std::process::exit(1);
            }
        }
        return;
    }

    let sampler_state = state.clone();
    tokio::spawn(async move {
        let mut timer =
            tokio::time::interval(Duration::from_secs(sampler_state.config.poll_interval_secs));
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            timer.tick().await;
            match sampler_state.infra.sample_completions().await {
                Ok(published) if published > 0 => {
                    tracing::info!(published, "completion notifications published");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "depth sampling pass failed"),
            }
        }
    });

    let sweep_state = state.clone();
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(SWEEP_INTERVAL);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so startup doesn't sweep.
        timer.tick().await;
        loop {
            timer.tick().await;
            match teardown::run_sweep(&sweep_state).await {
                Ok(report) => tracing::info!(
                    examined = report.examined,
                    deleted = report.deleted,
                    skipped = report.skipped,
                    failed = report.failed,
                    "sweep pass complete"
                ),
                Err(e) => tracing::error!(error = %e, "sweep pass failed"),
            }
        }
    });

    loop {
        match state.infra.pop_completion(COMPLETION_POLL_TIMEOUT).await {
            Ok(Some(notice)) => {
                if let Err(e) = teardown::handle_completion(&state, &notice.alarm).await {
                    // Teardown is retry-safe; leave the error to the
                    // operator and keep serving other batches.
                    tracing::error!(alarm = %notice.alarm, error = %e, "completion teardown failed");
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, "completion poll failed");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
