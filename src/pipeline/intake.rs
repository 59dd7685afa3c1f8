use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use zip::ZipArchive;

use crate::app_state::AppState;
use crate::models::batch::{new_batch_id, Batch, BatchStatus, BatchUpdate, ObjectRef};
use crate::services::catalog::CatalogError;
use crate::services::infra::InfraError;
use crate::services::queue::{ImageJob, QueueError};
use crate::services::storage::StorageError;

/// Extensions accepted into a batch, compared case-insensitively.
const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "png"];

/// Outcome of one archive intake.
#[derive(Debug, Clone)]
pub struct IntakeReport {
    pub batch_id: String,
    pub total: u64,
}

/// Collaborators the intake orchestration drives. `AppState` is the real
/// implementation; tests substitute a recording double to assert the
/// call sequence without a broker or object store.
#[async_trait]
pub trait IntakeOps: Send + Sync {
    async fn create_batch(&self, batch: &Batch) -> Result<(), IntakeError>;

    async fn update_batch(&self, batch_id: &str, update: &BatchUpdate) -> Result<(), IntakeError>;

    /// Provision the batch's infra and block until it is STABLE.
    /// Returns the infra name whose queue receives the jobs.
    async fn provision(&self, batch_id: &str, archive: &ObjectRef) -> Result<String, IntakeError>;

    /// Upload one entry's bytes under the job's key and enqueue the job.
    async fn stage_entry(
        &self,
        infra_name: &str,
        job: ImageJob,
        data: Vec<u8>,
        content_type: String,
    ) -> Result<(), IntakeError>;

    async fn delete_archive(&self, archive: &ObjectRef) -> Result<(), IntakeError>;
}

#[async_trait]
impl IntakeOps for AppState {
    async fn create_batch(&self, batch: &Batch) -> Result<(), IntakeError> {
        self.catalog.create_batch(batch).await?;
        Ok(())
    }

    async fn update_batch(&self, batch_id: &str, update: &BatchUpdate) -> Result<(), IntakeError> {
        self.catalog.update_batch(batch_id, update).await?;
        Ok(())
    }

    async fn provision(&self, batch_id: &str, archive: &ObjectRef) -> Result<String, IntakeError> {
        // Infra must be STABLE before any message is enqueued; a missing
        // consumer binding would silently drop work.
        let mut handle = self.infra.create(batch_id, archive).await?;
        handle.wait_until_stable().await?;
        Ok(handle.record.name)
    }

    async fn stage_entry(
        &self,
        infra_name: &str,
        job: ImageJob,
        data: Vec<u8>,
        content_type: String,
    ) -> Result<(), IntakeError> {
        self.storage
            .put(&job.bucket, &job.key, &data, &content_type)
            .await?;
        self.infra.queue(infra_name).enqueue(&job).await?;
        Ok(())
    }

    async fn delete_archive(&self, archive: &ObjectRef) -> Result<(), IntakeError> {
        self.storage.delete(&archive.bucket, &archive.key).await?;
        Ok(())
    }
}

/// Ingest an uploaded archive: validate entries, provision the batch's
/// ephemeral infra, fan out content-addressed uploads, report the total and
/// delete the source archive.
///
/// Any failure after the batch record exists is reported to the catalog
/// best-effort, then propagated so the invoking scheduler can retry.
pub async fn run_intake(
    state: &AppState,
    archive: &ObjectRef,
) -> Result<IntakeReport, IntakeError> {
    let batch_id = new_batch_id();
    tracing::info!(
        batch_id = %batch_id,
        bucket = %archive.bucket,
        key = %archive.key,
        "starting archive intake"
    );

    match intake_inner(state, archive, &batch_id).await {
        Ok(report) => Ok(report),
        Err(e) => {
            if let Err(report_err) = state
                .catalog
                .create_batch_error(&batch_id, &e.to_string())
                .await
            {
                tracing::error!(
                    batch_id = %batch_id,
                    error = %report_err,
                    "failed to report batch error to catalog"
                );
            }
            Err(e)
        }
    }
}

async fn intake_inner(
    state: &AppState,
    archive: &ObjectRef,
    batch_id: &str,
) -> Result<IntakeReport, IntakeError> {
    let e_tag = state.storage.head(&archive.bucket, &archive.key).await?;

    // Stream the archive to an anonymous temp file; a batch zip can be far
    // larger than worker memory. ZipArchive then seeks within the file.
    let mut tmp = tokio::fs::File::from_std(tempfile::tempfile()?);
    state
        .storage
        .get_to_writer(&archive.bucket, &archive.key, &mut tmp)
        .await?;
    tmp.flush().await?;
    let mut file = tmp.into_std().await;
    file.seek(SeekFrom::Start(0))?;
    let zip = ZipArchive::new(file)?;

    let ops = Arc::new(state.clone());
    ingest_archive(
        &ops,
        state.config.upload_concurrency,
        zip,
        archive,
        batch_id,
        e_tag,
    )
    .await
}

/// Orchestrate one validated archive through the intake contract. Generic
/// over the archive reader and the collaborators so the branching (empty
/// short-circuit vs. provision-and-stage) is testable without I/O.
pub(crate) async fn ingest_archive<O, R>(
    ops: &Arc<O>,
    upload_concurrency: usize,
    mut zip: ZipArchive<R>,
    archive: &ObjectRef,
    batch_id: &str,
    e_tag: Option<String>,
) -> Result<IntakeReport, IntakeError>
where
    O: IntakeOps + 'static,
    R: Read + Seek,
{
    let started = Utc::now();
    ops.create_batch(&Batch::new(batch_id, archive, started))
        .await?;

    let entries = qualifying_entries(&mut zip)?;
    let total = entries.len() as u64;
    tracing::info!(batch_id = %batch_id, total, "archive validated");

    if total == 0 {
        // Nothing to process: close the batch out immediately, no infra.
        ops.update_batch(batch_id, &empty_batch_close(started, e_tag))
            .await?;
        ops.delete_archive(archive).await?;
        return Ok(IntakeReport {
            batch_id: batch_id.to_string(),
            total: 0,
        });
    }

    let infra_name = ops.provision(batch_id, archive).await?;
    tracing::info!(batch_id = %batch_id, infra = %infra_name, "infra stable");

    // Bounded fan-out: a permit is held for the lifetime of each entry's
    // buffered bytes, capping peak memory and in-flight uploads.
    let semaphore = Arc::new(Semaphore::new(upload_concurrency));
    let mut tasks = Vec::with_capacity(entries.len());

    for index in entries {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| IntakeError::Internal(e.to_string()))?;

        let mut entry = zip.by_index(index)?;
        let file_name = entry.name().to_string();
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        drop(entry);

        let key = content_key(batch_id, &data, &file_name);
        let content_type = content_type_for(&file_name).to_string();
        let job = ImageJob {
            bucket: archive.bucket.clone(),
            key,
            batch_id: batch_id.to_string(),
            file_name: file_name.clone(),
        };
        let ops = ops.clone();
        let infra_name = infra_name.clone();

        tasks.push(tokio::spawn(async move {
            let result = ops.stage_entry(&infra_name, job, data, content_type).await;
            drop(permit);
            (file_name, result)
        }));
    }

    let mut first_failure = None;
    let mut uploaded = 0u64;
    for joined in futures::future::join_all(tasks).await {
        let (file_name, result) = joined.map_err(|e| IntakeError::Internal(e.to_string()))?;
        match result {
            Ok(()) => {
                uploaded += 1;
                tracing::debug!(batch_id = %batch_id, file = %file_name, "entry uploaded");
            }
            Err(e) => {
                tracing::warn!(batch_id = %batch_id, file = %file_name, error = %e, "entry upload failed");
                first_failure.get_or_insert(e);
            }
        }
    }

    if let Some(failure) = first_failure {
        // Content-addressed keys make the retried intake idempotent.
        return Err(failure);
    }

    ops.update_batch(
        batch_id,
        &BatchUpdate {
            total: Some(total),
            e_tag,
            processing_start: Some(started),
            status: Some(BatchStatus::Processing),
            ..Default::default()
        },
    )
    .await?;

    ops.delete_archive(archive).await?;
    tracing::info!(batch_id = %batch_id, total, uploaded, "intake complete, source archive deleted");

    Ok(IntakeReport {
        batch_id: batch_id.to_string(),
        total,
    })
}

/// Closing update for a batch whose archive held nothing to process: the
/// processing window collapses to a point and the batch goes COMPLETE.
fn empty_batch_close(now: chrono::DateTime<Utc>, e_tag: Option<String>) -> BatchUpdate {
    BatchUpdate {
        total: Some(0),
        e_tag,
        processing_start: Some(now),
        processing_end: Some(now),
        ingestion_complete: Some(now),
        status: Some(BatchStatus::Complete),
    }
}

/// Indices of archive entries that qualify for ingestion.
fn qualifying_entries<R: Read + Seek>(zip: &mut ZipArchive<R>) -> Result<Vec<usize>, IntakeError> {
    let mut indices = Vec::new();
    for index in 0..zip.len() {
        let entry = zip.by_index(index)?;
        if !entry.is_dir() && qualifies(entry.name()) {
            indices.push(index);
        }
    }
    Ok(indices)
}

/// An entry qualifies when it has a supported extension and is not hidden.
/// Unsupported and hidden entries are silently excluded, never fatal.
fn qualifies(entry_name: &str) -> bool {
    let base = entry_name.rsplit('/').next().unwrap_or(entry_name);
    if base.is_empty() || base.starts_with('.') {
        return false;
    }
    match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            let ext = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        }
        _ => false,
    }
}

/// Content-addressed key: identical bytes yield the identical key no matter
/// the original file name, making re-uploads idempotent.
fn content_key(batch_id: &str, data: &[u8], entry_name: &str) -> String {
    let hash = blake3::hash(data).to_hex();
    let ext = entry_name
        .rsplit('/')
        .next()
        .and_then(|base| base.rsplit_once('.'))
        .map(|(_, ext)| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default();
    format!("{batch_id}/{hash}{ext}")
}

fn content_type_for(entry_name: &str) -> &'static str {
    match entry_name
        .rsplit('.')
        .next()
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("catalog failure: {0}")]
    Catalog(#[from] CatalogError),

    #[error("queue failure: {0}")]
    Queue(#[from] QueueError),

    #[error("infra provisioning failure: {0}")]
    Infra(#[from] InfraError),

    #[error("archive unreadable: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("archive entry unreadable: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}
