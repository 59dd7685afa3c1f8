use std::collections::BTreeMap;
use std::io::Cursor;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use image::ImageFormat;

use crate::app_state::AppState;
use crate::config::AppConfig;
use crate::models::batch::ObjectRef;
use crate::models::image_task::ImageTask;
use crate::services::catalog::{CatalogError, CreateImageOutcome};
use crate::services::classify;
use crate::services::exif::ExifError;
use crate::services::queue::ImageJob;
use crate::services::storage::StorageError;

/// Output size tiers: `None` copies the original through unchanged, bounded
/// dimensions produce an aspect-preserving thumbnail.
const SIZE_TIERS: &[(&str, Option<(u32, u32)>)] = &[
    ("original", None),
    ("medium", Some((940, 940))),
    ("small", Some((120, 120))),
];

const EXIF_DATE_TIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Terminal disposition of one queue message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Maintenance bypass parked the object untouched.
    Parked,
    Processed {
        image_id: String,
    },
    Quarantined {
        code: String,
    },
}

/// Collaborators the per-image pipeline drives. `AppState` is the real
/// implementation; tests substitute a scripted double so the disposition
/// paths run without external services.
#[async_trait]
pub trait ProcessorOps: Send + Sync {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ProcessError>;

    async fn store(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<(), ProcessError>;

    async fn copy(
        &self,
        src: &ObjectRef,
        dest_bucket: &str,
        dest_key: &str,
    ) -> Result<(), ProcessError>;

    /// Delete a spent staging object.
    async fn discard(&self, bucket: &str, key: &str) -> Result<(), ProcessError>;

    async fn extract_exif(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<BTreeMap<String, String>, ProcessError>;

    async fn submit_image(&self, task: &ImageTask) -> Result<CreateImageOutcome, ProcessError>;

    async fn report_image_error(
        &self,
        image_id: &str,
        batch_id: &str,
        path: &str,
        error: &str,
    ) -> Result<(), ProcessError>;
}

#[async_trait]
impl ProcessorOps for AppState {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ProcessError> {
        Ok(self.storage.get(bucket, key).await?)
    }

    async fn store(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<(), ProcessError> {
        Ok(self.storage.put(bucket, key, data, content_type).await?)
    }

    async fn copy(
        &self,
        src: &ObjectRef,
        dest_bucket: &str,
        dest_key: &str,
    ) -> Result<(), ProcessError> {
        Ok(self
            .storage
            .copy(src, dest_bucket, dest_key, "application/octet-stream")
            .await?)
    }

    async fn discard(&self, bucket: &str, key: &str) -> Result<(), ProcessError> {
        Ok(self.storage.delete(bucket, key).await?)
    }

    async fn extract_exif(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<BTreeMap<String, String>, ProcessError> {
        Ok(self.exif.extract(bucket, key).await?)
    }

    async fn submit_image(&self, task: &ImageTask) -> Result<CreateImageOutcome, ProcessError> {
        Ok(self.catalog.create_image(task).await?)
    }

    async fn report_image_error(
        &self,
        image_id: &str,
        batch_id: &str,
        path: &str,
        error: &str,
    ) -> Result<(), ProcessError> {
        Ok(self
            .catalog
            .create_image_error(image_id, batch_id, path, error)
            .await?)
    }
}

/// Process one queued image reference end to end.
pub async fn process_image(
    state: &AppState,
    job: &ImageJob,
) -> Result<ProcessOutcome, ProcessError> {
    let config = state.config.clone();
    process_with(state, &config, job).await
}

/// Per-image failures are scoped to this message: validation rejections and
/// unexpected exceptions both end in quarantine and a successful return, so
/// sibling messages and the batch-level infra are never affected. Only a
/// failure to even reach the object store or quarantine the bytes bubbles
/// out, leaving redelivery (and eventually the DLQ) to the queue.
pub(crate) async fn process_with<O: ProcessorOps>(
    ops: &O,
    config: &AppConfig,
    job: &ImageJob,
) -> Result<ProcessOutcome, ProcessError> {
    if config.maintenance_mode {
        return park(ops, config, job).await;
    }

    let bytes = ops.fetch(&job.bucket, &job.key).await?;

    let mut image_id: Option<String> = None;
    let outcome = match process_inner(ops, config, job, &bytes, &mut image_id).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!(
                batch_id = %job.batch_id,
                key = %job.key,
                error = %e,
                "unexpected processing failure, quarantining"
            );
            if let Some(id) = &image_id {
                if let Err(report_err) = ops
                    .report_image_error(id, &job.batch_id, &job.file_name, &e.to_string())
                    .await
                {
                    tracing::warn!(
                        batch_id = %job.batch_id,
                        image_id = %id,
                        error = %report_err,
                        "failed to post supplementary image error"
                    );
                }
            }
            let code = classify::normalize_failure(&e.to_string());
            quarantine(ops, config, job, &code, image_id.as_deref()).await?;
            ProcessOutcome::Quarantined { code }
        }
    };

    // The staging copy is spent once the disposition is terminal. A failed
    // delete must not trigger redelivery: the catalog record already
    // exists, and reprocessing would misclassify the image as a duplicate.
    if let Err(e) = ops.discard(&job.bucket, &job.key).await {
        tracing::warn!(
            batch_id = %job.batch_id,
            key = %job.key,
            error = %e,
            "failed to delete staging object"
        );
    }

    Ok(outcome)
}

async fn process_inner<O: ProcessorOps>(
    ops: &O,
    config: &AppConfig,
    job: &ImageJob,
    bytes: &[u8],
    image_id_slot: &mut Option<String>,
) -> Result<ProcessOutcome, ProcessError> {
    let mut task = enrich(ops, job, bytes).await?;

    // Integrity check is a soft error: the record still reaches the catalog
    // with the decode failure noted.
    if let Err(e) = image::load_from_memory(bytes) {
        tracing::warn!(batch_id = %job.batch_id, key = %job.key, error = %e, "image failed to decode");
        task.exif
            .entry("IntegrityError".to_string())
            .or_insert_with(|| e.to_string());
    }

    let outcome = ops.submit_image(&task).await?;
    image_id_slot.clone_from(&outcome.image_id);

    if outcome.errors.is_empty() {
        let image_id = outcome.image_id.ok_or(ProcessError::MissingImageId)?;
        replicate(ops, config, &task, &image_id, bytes).await?;
        task.mark_processed();
        tracing::info!(
            batch_id = %job.batch_id,
            image_id = %image_id,
            status = %task.status,
            "image processed"
        );
        Ok(ProcessOutcome::Processed { image_id })
    } else {
        let code = classify::classify_validation(&outcome.errors, &config.duplicate_marker);
        task.mark_quarantined(&code);
        quarantine(ops, config, job, &code, outcome.image_id.as_deref()).await?;
        tracing::info!(
            batch_id = %job.batch_id,
            key = %job.key,
            status = %task.status,
            reason = task.quarantine_reason.as_deref().unwrap_or(classify::UNKNOWN_ERROR),
            "catalog rejected image, quarantined"
        );
        Ok(ProcessOutcome::Quarantined { code })
    }
}

/// Maintenance bypass: move the object verbatim to the parking lot. No
/// catalog write happens.
async fn park<O: ProcessorOps>(
    ops: &O,
    config: &AppConfig,
    job: &ImageJob,
) -> Result<ProcessOutcome, ProcessError> {
    let parking_bucket = config
        .parking_bucket
        .as_deref()
        .ok_or_else(|| ProcessError::Config("maintenance_mode set without parking_bucket".into()))?;

    let src = ObjectRef::new(&job.bucket, &job.key);
    ops.copy(&src, parking_bucket, &job.key).await?;
    ops.discard(&job.bucket, &job.key).await?;
    tracing::info!(batch_id = %job.batch_id, key = %job.key, "maintenance mode, object parked");
    Ok(ProcessOutcome::Parked)
}

/// Build the enriched task from EXIF service output and the object bytes.
async fn enrich<O: ProcessorOps>(
    ops: &O,
    job: &ImageJob,
    bytes: &[u8],
) -> Result<ImageTask, ProcessError> {
    let exif_fields = ops.extract_exif(&job.bucket, &job.key).await?;

    let file_name = base_name(&job.file_name).to_string();
    let sniffed = image::guess_format(bytes)
        .ok()
        .map(|f| f.to_mime_type().to_string());
    let merged = enrich_metadata(&file_name, exif_fields, sniffed.as_deref());

    let mime_type = merged
        .get("MIMEType")
        .cloned()
        .unwrap_or_else(|| "image/jpeg".to_string());

    Ok(ImageTask {
        file_name,
        source: ObjectRef::new(&job.bucket, &job.key),
        batch_id: job.batch_id.clone(),
        content_hash: blake3::hash(bytes).to_hex().to_string(),
        mime_type,
        exif: merged,
        size_bytes: bytes.len() as u64,
        status: crate::models::image_task::ImageStatus::Pending,
        quarantine_reason: None,
    })
}

/// Merge EXIF fields into the explicit metadata, first-write-wins, and
/// derive the required fields.
fn enrich_metadata(
    file_name: &str,
    exif_fields: BTreeMap<String, String>,
    sniffed_mime: Option<&str>,
) -> BTreeMap<String, String> {
    let mut md = BTreeMap::new();
    md.insert("FileName".to_string(), file_name.to_string());

    // Explicit fields already present are never overwritten.
    for (key, value) in exif_fields {
        md.entry(key).or_insert(value);
    }

    let parsed_ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match md.get_mut("FileTypeExtension") {
        Some(ext) => *ext = ext.to_ascii_lowercase(),
        None => {
            md.insert("FileTypeExtension".to_string(), parsed_ext);
        }
    }

    if !md.contains_key("MIMEType") {
        md.insert(
            "MIMEType".to_string(),
            sniffed_mime.unwrap_or("image/jpeg").to_string(),
        );
    }

    md.entry("SerialNumber".to_string())
        .or_insert_with(|| "unknown".to_string());

    // Camera timestamps use the EXIF colon format; normalize when parseable
    // and leave the raw value alone otherwise.
    if let Some(raw) = md.get("DateTimeOriginal") {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, EXIF_DATE_TIME_FORMAT) {
            md.insert(
                "DateTimeOriginal".to_string(),
                dt.and_utc().to_rfc3339(),
            );
        }
    }

    md
}

/// Replicate accepted bytes to the tiered serving layout and, when
/// configured, the archive bucket.
async fn replicate<O: ProcessorOps>(
    ops: &O,
    config: &AppConfig,
    task: &ImageTask,
    image_id: &str,
    bytes: &[u8],
) -> Result<(), ProcessError> {
    let ext = task.extension();
    let serving = &config.serving_bucket;

    for (size, dims) in SIZE_TIERS {
        let key = tier_key(image_id, size, &ext);
        tracing::debug!(batch_id = %task.batch_id, key = %key, "replicating tier");
        match dims {
            Some((w, h)) => {
                let resized = resize_to(bytes, *w, *h, &ext)?;
                ops.store(serving, &key, &resized, &task.mime_type).await?;
            }
            None => {
                ops.store(serving, &key, bytes, &task.mime_type).await?;
            }
        }
    }

    if let Some(archive_bucket) = &config.archive_bucket {
        let serial = task
            .exif
            .get("SerialNumber")
            .map(String::as_str)
            .unwrap_or("unknown");
        let stem = task
            .file_name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&task.file_name);
        let key = archival_key(serial, stem, &task.content_hash, &ext);
        ops.store(archive_bucket, &key, bytes, &task.mime_type)
            .await?;
    }

    Ok(())
}

/// Serving-tier key. Extensionless images get a bare key rather than a
/// trailing dot.
fn tier_key(image_id: &str, size: &str, ext: &str) -> String {
    if ext.is_empty() {
        format!("{size}/{image_id}-{size}")
    } else {
        format!("{size}/{image_id}-{size}.{ext}")
    }
}

/// Archive-bucket key: per-camera prefix, original stem, content hash.
fn archival_key(serial: &str, stem: &str, hash: &str, ext: &str) -> String {
    if ext.is_empty() {
        format!("{serial}/{stem}_{hash}")
    } else {
        format!("{serial}/{stem}_{hash}.{ext}")
    }
}

/// Aspect-ratio-preserving resize into a bounding box, re-encoded in the
/// original format.
fn resize_to(bytes: &[u8], width: u32, height: u32, ext: &str) -> Result<Vec<u8>, ProcessError> {
    let format = ImageFormat::from_extension(ext).unwrap_or(ImageFormat::Jpeg);
    let img = image::load_from_memory(bytes)?;
    let resized = img.thumbnail(width, height);
    let mut out = Cursor::new(Vec::new());
    resized.write_to(&mut out, format)?;
    Ok(out.into_inner())
}

/// Quarantine the original bytes under the classified dead-letter path.
async fn quarantine<O: ProcessorOps>(
    ops: &O,
    config: &AppConfig,
    job: &ImageJob,
    code: &str,
    image_id: Option<&str>,
) -> Result<(), ProcessError> {
    let key = classify::quarantine_key(code, image_id, &job.file_name);
    let src = ObjectRef::new(&job.bucket, &job.key);
    ops.copy(&src, &config.dead_letter_bucket, &key).await?;
    Ok(())
}

fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("catalog failure: {0}")]
    Catalog(#[from] CatalogError),

    #[error("EXIF service failure: {0}")]
    Exif(#[from] ExifError),

    #[error("image operation failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("catalog accepted image but returned no id")]
    MissingImageId,

    #[error("configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn exif(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn test_config() -> AppConfig {
        AppConfig {
            app_name: "camtrap-ingest".to_string(),
            redis_url: "redis://localhost".to_string(),
            catalog_url: "http://localhost".to_string(),
            catalog_api_key: "key".to_string(),
            exif_url: "http://localhost".to_string(),
            s3_endpoint: "http://localhost".to_string(),
            s3_access_key: "a".to_string(),
            s3_secret_key: "s".to_string(),
            serving_bucket: "serving".to_string(),
            dead_letter_bucket: "dead-letter".to_string(),
            archive_bucket: Some("archive".to_string()),
            parking_bucket: Some("parking".to_string()),
            maintenance_mode: false,
            upload_concurrency: 4,
            duplicate_marker: "duplicate key".to_string(),
            poll_interval_secs: 60,
            required_empty_polls: 10,
            sweep_grace_hours: 24,
        }
    }

    fn test_job() -> ImageJob {
        ImageJob {
            bucket: "staging".to_string(),
            key: "batch-1/abc.png".to_string(),
            batch_id: "batch-1".to_string(),
            file_name: "cam/IMG_0001.png".to_string(),
        }
    }

    fn png_bytes() -> Vec<u8> {
        let img = image::DynamicImage::new_rgb8(4, 4);
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    /// Scripted collaborator double recording every storage mutation.
    struct FakeOps {
        bytes: Vec<u8>,
        exif: BTreeMap<String, String>,
        outcome: CreateImageOutcome,
        stored: Mutex<Vec<(String, String)>>,
        copies: Mutex<Vec<(String, String)>>,
        discards: Mutex<Vec<(String, String)>>,
        reported: Mutex<Vec<String>>,
    }

    impl FakeOps {
        fn new(bytes: Vec<u8>, outcome: CreateImageOutcome) -> Self {
            Self {
                bytes,
                exif: BTreeMap::new(),
                outcome,
                stored: Mutex::new(Vec::new()),
                copies: Mutex::new(Vec::new()),
                discards: Mutex::new(Vec::new()),
                reported: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ProcessorOps for FakeOps {
        async fn fetch(&self, _bucket: &str, _key: &str) -> Result<Vec<u8>, ProcessError> {
            Ok(self.bytes.clone())
        }

        async fn store(
            &self,
            bucket: &str,
            key: &str,
            _data: &[u8],
            _content_type: &str,
        ) -> Result<(), ProcessError> {
            self.stored
                .lock()
                .unwrap()
                .push((bucket.to_string(), key.to_string()));
            Ok(())
        }

        async fn copy(
            &self,
            _src: &ObjectRef,
            dest_bucket: &str,
            dest_key: &str,
        ) -> Result<(), ProcessError> {
            self.copies
                .lock()
                .unwrap()
                .push((dest_bucket.to_string(), dest_key.to_string()));
            Ok(())
        }

        async fn discard(&self, bucket: &str, key: &str) -> Result<(), ProcessError> {
            self.discards
                .lock()
                .unwrap()
                .push((bucket.to_string(), key.to_string()));
            Ok(())
        }

        async fn extract_exif(
            &self,
            _bucket: &str,
            _key: &str,
        ) -> Result<BTreeMap<String, String>, ProcessError> {
            Ok(self.exif.clone())
        }

        async fn submit_image(
            &self,
            _task: &ImageTask,
        ) -> Result<CreateImageOutcome, ProcessError> {
            Ok(self.outcome.clone())
        }

        async fn report_image_error(
            &self,
            image_id: &str,
            _batch_id: &str,
            _path: &str,
            _error: &str,
        ) -> Result<(), ProcessError> {
            self.reported.lock().unwrap().push(image_id.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn accepted_image_replicates_tiers_and_deletes_staging() {
        let ops = FakeOps::new(
            png_bytes(),
            CreateImageOutcome {
                image_id: Some("img-1".to_string()),
                errors: vec![],
            },
        );
        let job = test_job();

        let outcome = process_with(&ops, &test_config(), &job).await.unwrap();
        assert_eq!(
            outcome,
            ProcessOutcome::Processed {
                image_id: "img-1".to_string()
            }
        );

        let stored = ops.stored.lock().unwrap();
        let serving_keys: Vec<&str> = stored
            .iter()
            .filter(|(b, _)| b == "serving")
            .map(|(_, k)| k.as_str())
            .collect();
        assert_eq!(
            serving_keys,
            [
                "original/img-1-original.png",
                "medium/img-1-medium.png",
                "small/img-1-small.png"
            ]
        );
        assert!(stored.iter().any(|(b, _)| b == "archive"));

        assert_eq!(
            ops.discards.lock().unwrap().as_slice(),
            [("staging".to_string(), "batch-1/abc.png".to_string())]
        );
    }

    #[tokio::test]
    async fn catalog_rejection_quarantines_and_deletes_staging() {
        let ops = FakeOps::new(
            png_bytes(),
            CreateImageOutcome {
                image_id: Some("img-9".to_string()),
                errors: vec!["E11000 duplicate key error".to_string()],
            },
        );
        let job = test_job();

        let outcome = process_with(&ops, &test_config(), &job).await.unwrap();
        assert_eq!(
            outcome,
            ProcessOutcome::Quarantined {
                code: classify::DUPLICATE_IMAGE.to_string()
            }
        );

        assert_eq!(
            ops.copies.lock().unwrap().as_slice(),
            [(
                "dead-letter".to_string(),
                "DUPLICATE_IMAGE/img-9/IMG_0001.png".to_string()
            )]
        );
        assert!(ops.stored.lock().unwrap().is_empty());
        assert_eq!(ops.discards.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn undecodable_bytes_quarantine_and_report() {
        let ops = FakeOps::new(
            b"not an image at all".to_vec(),
            CreateImageOutcome {
                image_id: Some("img-3".to_string()),
                errors: vec![],
            },
        );
        let job = test_job();

        // Replication fails on the garbage bytes; the failure is scoped to
        // this message and ends in quarantine, not redelivery.
        let outcome = process_with(&ops, &test_config(), &job).await.unwrap();
        assert!(matches!(outcome, ProcessOutcome::Quarantined { .. }));

        assert_eq!(ops.reported.lock().unwrap().as_slice(), ["img-3"]);
        let copies = ops.copies.lock().unwrap();
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].0, "dead-letter");
        assert_eq!(ops.discards.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn maintenance_mode_moves_object_to_parking() {
        let mut config = test_config();
        config.maintenance_mode = true;
        let ops = FakeOps::new(
            png_bytes(),
            CreateImageOutcome {
                image_id: None,
                errors: vec![],
            },
        );
        let job = test_job();

        let outcome = process_with(&ops, &config, &job).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Parked);

        assert_eq!(
            ops.copies.lock().unwrap().as_slice(),
            [("parking".to_string(), "batch-1/abc.png".to_string())]
        );
        assert_eq!(ops.discards.lock().unwrap().len(), 1);
        assert!(ops.stored.lock().unwrap().is_empty());
    }

    #[test]
    fn explicit_fields_win_over_exif() {
        let md = enrich_metadata(
            "IMG_1.jpg",
            exif(&[("FileName", "exif-name.jpg"), ("Make", "Reconyx")]),
            None,
        );
        assert_eq!(md["FileName"], "IMG_1.jpg");
        assert_eq!(md["Make"], "Reconyx");
    }

    #[test]
    fn extension_derived_from_name_when_absent() {
        let md = enrich_metadata("IMG_1.JPG", exif(&[]), None);
        assert_eq!(md["FileTypeExtension"], "jpg");
    }

    #[test]
    fn explicit_extension_is_lowercased() {
        let md = enrich_metadata("IMG_1.png", exif(&[("FileTypeExtension", "PNG")]), None);
        assert_eq!(md["FileTypeExtension"], "png");
    }

    #[test]
    fn mime_falls_back_explicit_then_sniffed_then_jpeg() {
        let explicit = enrich_metadata(
            "a.jpg",
            exif(&[("MIMEType", "image/png")]),
            Some("image/webp"),
        );
        assert_eq!(explicit["MIMEType"], "image/png");

        let sniffed = enrich_metadata("a.jpg", exif(&[]), Some("image/webp"));
        assert_eq!(sniffed["MIMEType"], "image/webp");

        let fallback = enrich_metadata("a.jpg", exif(&[]), None);
        assert_eq!(fallback["MIMEType"], "image/jpeg");
    }

    #[test]
    fn serial_number_defaults_to_unknown() {
        let md = enrich_metadata("a.jpg", exif(&[]), None);
        assert_eq!(md["SerialNumber"], "unknown");

        let present = enrich_metadata("a.jpg", exif(&[("SerialNumber", "HC600-042")]), None);
        assert_eq!(present["SerialNumber"], "HC600-042");
    }

    #[test]
    fn exif_timestamp_normalizes_to_rfc3339() {
        let md = enrich_metadata(
            "a.jpg",
            exif(&[("DateTimeOriginal", "2023:06:14 08:30:00")]),
            None,
        );
        assert_eq!(md["DateTimeOriginal"], "2023-06-14T08:30:00+00:00");
    }

    #[test]
    fn unparseable_timestamp_is_left_alone() {
        let md = enrich_metadata("a.jpg", exif(&[("DateTimeOriginal", "last tuesday")]), None);
        assert_eq!(md["DateTimeOriginal"], "last tuesday");
    }

    #[test]
    fn empty_extension_yields_no_trailing_dot() {
        assert_eq!(tier_key("img-1", "small", "png"), "small/img-1-small.png");
        assert_eq!(tier_key("img-1", "small", ""), "small/img-1-small");
        assert_eq!(
            archival_key("HC600", "IMG_1", "abc123", "jpg"),
            "HC600/IMG_1_abc123.jpg"
        );
        assert_eq!(archival_key("HC600", "IMG_1", "abc123", ""), "HC600/IMG_1_abc123");
    }

    #[test]
    fn resize_bounds_preserve_aspect_ratio() {
        let img = image::DynamicImage::new_rgb8(400, 200);
        let mut bytes = Cursor::new(Vec::new());
        img.write_to(&mut bytes, ImageFormat::Png).unwrap();

        let resized = resize_to(&bytes.into_inner(), 120, 120, "png").unwrap();
        let out = image::load_from_memory(&resized).unwrap();
        assert_eq!(out.width(), 120);
        assert_eq!(out.height(), 60);
    }

    #[test]
    fn garbage_bytes_fail_resize() {
        assert!(resize_to(b"not an image", 120, 120, "jpg").is_err());
    }
}
