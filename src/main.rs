use camtrap_ingest::{
    app_state::AppState, config::AppConfig, models::batch::ObjectRef, pipeline::intake,
};
use tracing_subscriber::EnvFilter;

/// One-shot intake task. The scheduler passes the uploaded archive's
/// location as a JSON `TASK` environment payload, e.g.
/// `{"bucket":"staging","key":"upload.zip"}`.
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env().expect("Failed to load configuration");
    let state = AppState::new(config).expect("Failed to initialize services");

    let task = std::env::var("TASK").expect("TASK environment payload is required");
    let archive: ObjectRef =
        serde_json::from_str(&task).expect("TASK must be a {bucket, key} JSON object");

    match intake::run_intake(&state, &archive).await {
        Ok(report) => {
            tracing::info!(
                batch_id = %report.batch_id,
                total = report.total,
                "intake finished"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "intake failed");
            std::process::exit(1);
        }
    }
}
