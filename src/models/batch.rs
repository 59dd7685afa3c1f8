use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle status of an ingestion batch. The catalog owns the durable
/// record; this crate only drives transitions through catalog mutations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Uploaded,
    Extracting,
    Provisioned,
    Processing,
    Complete,
    Error,
}

/// A reference to an object in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Base name of the key (the part after the last `/`).
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

/// One archive-upload's worth of images tracked as a unit. Serialized as
/// the catalog's createBatch input; the catalog owns the durable record
/// from then on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    #[serde(rename = "_id")]
    pub id: String,
    pub source_archive: ObjectRef,
    pub total: u64,
    pub processing_start: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingestion_complete: Option<DateTime<Utc>>,
    pub status: BatchStatus,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<String>,
}

impl Batch {
    /// Fresh batch record at archive intake. The qualifying total is not
    /// known yet; the coordinator pushes it in a later update.
    pub fn new(id: &str, source_archive: &ObjectRef, processing_start: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            source_archive: source_archive.clone(),
            total: 0,
            processing_start,
            processing_end: None,
            ingestion_complete: None,
            status: BatchStatus::Uploaded,
            errors: Vec::new(),
        }
    }
}

/// Generate a fresh batch id with the `batch-` prefix the rest of the
/// pipeline keys off (infra names, completion notifications).
pub fn new_batch_id() -> String {
    format!("batch-{}", Uuid::new_v4())
}

/// Fields pushed to the catalog's updateBatch mutation. Only populated
/// fields are serialized.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingestion_complete: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<BatchStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_id_carries_prefix() {
        let id = new_batch_id();
        assert!(id.starts_with("batch-"));
        assert_eq!(id.len(), "batch-".len() + 36);
    }

    #[test]
    fn object_ref_file_name_strips_directories() {
        let r = ObjectRef::new("staging", "batch-x/nested/IMG_0001.JPG");
        assert_eq!(r.file_name(), "IMG_0001.JPG");
        let flat = ObjectRef::new("staging", "upload.zip");
        assert_eq!(flat.file_name(), "upload.zip");
    }

    #[test]
    fn new_batch_serializes_as_catalog_input() {
        let batch = Batch::new(
            "batch-1",
            &ObjectRef::new("staging", "upload.zip"),
            Utc::now(),
        );
        let json = serde_json::to_value(&batch).unwrap();
        assert_eq!(json["_id"], "batch-1");
        assert_eq!(json["status"], "UPLOADED");
        assert_eq!(json["total"], 0);
        assert_eq!(json["sourceArchive"]["bucket"], "staging");
        assert!(json.get("processingEnd").is_none());
    }

    #[test]
    fn batch_update_skips_unset_fields() {
        let update = BatchUpdate {
            total: Some(8),
            ..Default::default()
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({ "total": 8 }));
    }
}
