use camtrap_ingest::{
    app_state::AppState,
    config::AppConfig,
    models::infra::InfraState,
    pipeline::processor::{self, ProcessOutcome},
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL_MS: u64 = 1000; // 1 second

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting image processing worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");
    let state = AppState::new(config).expect("Failed to initialize services");

    PrometheusBuilder::new()
        .install()
        .expect("Failed to install Prometheus metrics exporter");

    metrics::describe_counter!("images_processed_total", "Images accepted and replicated");
    metrics::describe_counter!("images_quarantined_total", "Images quarantined after rejection");
    metrics::describe_counter!("images_parked_total", "Images parked by maintenance bypass");
    metrics::describe_counter!("image_jobs_released_total", "Jobs released for redelivery");

    tracing::info!("Worker ready, starting job processing loop");

    loop {
        match process_next_job(&state).await {
            Ok(true) => {
                tracing::debug!("Job processed, checking for next job");
            }
            Ok(false) => {
                tracing::trace!("No jobs available, sleeping");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Error polling for jobs, will retry");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
        }
    }
}

/// Pull one job from any stable batch queue and process it.
/// Returns Ok(true) if a job was processed, Ok(false) if none was available.
async fn process_next_job(state: &AppState) -> Result<bool, Box<dyn std::error::Error>> {
    for record in state.infra.list().await? {
        if record.state != InfraState::Stable {
            continue;
        }
        let queue = state.infra.queue(&record.name);
        let job = match queue.dequeue().await? {
            Some(job) => job,
            None => continue,
        };

        tracing::info!(
            batch_id = %job.batch_id,
            key = %job.key,
            "Processing queued image"
        );

        match processor::process_image(state, &job).await {
            Ok(outcome) => {
                queue.complete(&job).await?;
                match outcome {
                    ProcessOutcome::Processed { image_id } => {
                        metrics::counter!("images_processed_total").increment(1);
                        tracing::info!(batch_id = %job.batch_id, image_id = %image_id, "Image complete");
                    }
                    ProcessOutcome::Quarantined { code } => {
                        metrics::counter!("images_quarantined_total").increment(1);
                        tracing::warn!(batch_id = %job.batch_id, code = %code, "Image quarantined");
                    }
                    ProcessOutcome::Parked => {
                        metrics::counter!("images_parked_total").increment(1);
                    }
                }
            }
            Err(e) => {
                // Hard failure before the bytes could even be quarantined:
                // hand the message back for redelivery, the DLQ catches
                // repeat offenders.
                tracing::error!(batch_id = %job.batch_id, key = %job.key, error = %e, "Processing failed, releasing job");
                metrics::counter!("image_jobs_released_total").increment(1);
                queue.release(&job).await?;
            }
        }

        return Ok(true);
    }

    Ok(false)
}
