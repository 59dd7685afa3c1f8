use chrono::{DateTime, Duration, Utc};

use crate::app_state::AppState;
use crate::models::batch::{BatchStatus, BatchUpdate};
use crate::models::infra::{
    batch_id_from_infra, infra_name_from_alarm, AlarmState, InfraRecord, InfraState,
};
use crate::services::catalog::CatalogError;
use crate::services::infra::InfraError;

/// Summary of one sweep pass.
#[derive(Debug, Default, Clone)]
pub struct SweepReport {
    pub examined: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// React to a completion notification: tear down the batch's infra and
/// finalize its catalog record.
pub async fn handle_completion(state: &AppState, alarm_name: &str) -> Result<(), TeardownError> {
    let infra_name = infra_name_from_alarm(alarm_name)
        .ok_or_else(|| TeardownError::BadIdentifier(alarm_name.to_string()))?;
    let batch_id = batch_id_from_infra(infra_name, &state.config.app_name)
        .ok_or_else(|| TeardownError::BadIdentifier(infra_name.to_string()))?
        .to_string();
    teardown(state, infra_name, &batch_id).await
}

/// Programmatic teardown for an explicit batch id.
pub async fn handle_delete_request(state: &AppState, batch_id: &str) -> Result<(), TeardownError> {
    let infra_name = state.infra.infra_name(batch_id);
    teardown(state, &infra_name, batch_id).await
}

/// Delete infra, then finalize the batch. A finalization failure is
/// reported to the catalog and returned so the caller's retry policy can
/// re-run the whole teardown; infra deletion is idempotent, so the retry is
/// safe.
async fn teardown(state: &AppState, infra_name: &str, batch_id: &str) -> Result<(), TeardownError> {
    tracing::info!(batch_id = %batch_id, infra = %infra_name, "tearing down batch infra");
    state.infra.delete(infra_name).await?;

    if let Err(e) = finalize(state, batch_id).await {
        if let Err(report_err) = state
            .catalog
            .create_batch_error(batch_id, &e.to_string())
            .await
        {
            tracing::error!(
                batch_id = %batch_id,
                error = %report_err,
                "failed to report finalization error"
            );
        }
        return Err(e);
    }

    tracing::info!(batch_id = %batch_id, "batch finalized");
    Ok(())
}

async fn finalize(state: &AppState, batch_id: &str) -> Result<(), TeardownError> {
    let now = Utc::now();
    state
        .catalog
        .update_batch(
            batch_id,
            &BatchUpdate {
                processing_end: Some(now),
                ingestion_complete: Some(now),
                status: Some(BatchStatus::Complete),
                ..Default::default()
            },
        )
        .await?;
    Ok(())
}

/// Scheduled backstop for lost completion notifications. Deletes only infra
/// old enough to be past the grace period whose alarm reports NoData — a
/// merely-empty-right-now queue is never grounds for teardown.
pub async fn run_sweep(state: &AppState) -> Result<SweepReport, TeardownError> {
    let now = Utc::now();
    let grace = Duration::hours(state.config.sweep_grace_hours);
    let mut report = SweepReport::default();

    for record in state.infra.list().await? {
        if !sweep_candidate(&record, &state.config.app_name, now, grace) {
            continue;
        }
        report.examined += 1;

        let alarm = state.infra.alarm_state(&record.alarm_name()).await?;
        if alarm != AlarmState::NoData {
            tracing::debug!(infra = %record.name, ?alarm, "sweep skipping live infra");
            report.skipped += 1;
            continue;
        }

        tracing::warn!(
            batch_id = %record.batch_id,
            infra = %record.name,
            "sweep reclaiming stale infra with silent alarm"
        );
        match teardown(state, &record.name, &record.batch_id).await {
            Ok(()) => report.deleted += 1,
            Err(e) => {
                tracing::error!(infra = %record.name, error = %e, "sweep teardown failed");
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

/// Eligibility by naming convention, state and age; the alarm check happens
/// separately because it needs the broker.
fn sweep_candidate(
    record: &InfraRecord,
    app_name: &str,
    now: DateTime<Utc>,
    grace: Duration,
) -> bool {
    record.name.starts_with(&format!("{app_name}-batch-"))
        && record.state != InfraState::Deleted
        && now.signed_duration_since(record.created_at) > grace
}

#[derive(Debug, thiserror::Error)]
pub enum TeardownError {
    #[error("infra failure: {0}")]
    Infra(#[from] InfraError),

    #[error("catalog failure: {0}")]
    Catalog(#[from] CatalogError),

    #[error("unrecognized infra identifier: {0}")]
    BadIdentifier(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, state: InfraState, age_hours: i64) -> InfraRecord {
        InfraRecord {
            stack_id: "s".to_string(),
            batch_id: "batch-1".to_string(),
            name: name.to_string(),
            created_at: Utc::now() - Duration::hours(age_hours),
            state,
            source: None,
            notified: false,
        }
    }

    #[test]
    fn young_infra_is_never_a_candidate() {
        let r = record("camtrap-ingest-batch-1", InfraState::Stable, 2);
        assert!(!sweep_candidate(&r, "camtrap-ingest", Utc::now(), Duration::hours(24)));
    }

    #[test]
    fn old_stable_infra_is_a_candidate() {
        let r = record("camtrap-ingest-batch-1", InfraState::Stable, 30);
        assert!(sweep_candidate(&r, "camtrap-ingest", Utc::now(), Duration::hours(24)));
    }

    #[test]
    fn deleted_infra_is_excluded() {
        let r = record("camtrap-ingest-batch-1", InfraState::Deleted, 30);
        assert!(!sweep_candidate(&r, "camtrap-ingest", Utc::now(), Duration::hours(24)));
    }

    #[test]
    fn foreign_naming_is_excluded() {
        let r = record("other-app-batch-1", InfraState::Stable, 30);
        assert!(!sweep_candidate(&r, "camtrap-ingest", Utc::now(), Duration::hours(24)));
    }
}
