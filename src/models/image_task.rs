use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::models::batch::ObjectRef;

/// Terminal disposition of a single queued image.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ImageStatus {
    Pending,
    Processed,
    Quarantined,
}

/// Metadata assembled for one image before submission to the catalog.
///
/// `exif` holds the merged field map: explicit fields are written first and
/// EXIF-sourced fields never overwrite them (first-write-wins).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageTask {
    pub file_name: String,
    pub source: ObjectRef,
    pub batch_id: String,
    pub content_hash: String,
    pub mime_type: String,
    pub exif: BTreeMap<String, String>,
    pub size_bytes: u64,
    pub status: ImageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quarantine_reason: Option<String>,
}

impl ImageTask {
    /// Terminal transition after replication succeeds.
    pub fn mark_processed(&mut self) {
        self.status = ImageStatus::Processed;
    }

    /// Terminal transition into quarantine with its classified reason.
    pub fn mark_quarantined(&mut self, reason: &str) {
        self.status = ImageStatus::Quarantined;
        self.quarantine_reason = Some(reason.to_string());
    }

    /// Lower-cased extension without the leading dot, e.g. `jpg`.
    pub fn extension(&self) -> String {
        self.exif
            .get("FileTypeExtension")
            .cloned()
            .unwrap_or_else(|| {
                self.file_name
                    .rsplit_once('.')
                    .map(|(_, ext)| ext.to_ascii_lowercase())
                    .unwrap_or_default()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_with(exif: BTreeMap<String, String>, file_name: &str) -> ImageTask {
        ImageTask {
            file_name: file_name.to_string(),
            source: ObjectRef::new("staging", format!("batch-x/{file_name}")),
            batch_id: "batch-x".to_string(),
            content_hash: "abc".to_string(),
            mime_type: "image/jpeg".to_string(),
            exif,
            size_bytes: 1,
            status: ImageStatus::Pending,
            quarantine_reason: None,
        }
    }

    #[test]
    fn extension_prefers_explicit_field() {
        let mut exif = BTreeMap::new();
        exif.insert("FileTypeExtension".to_string(), "jpg".to_string());
        assert_eq!(task_with(exif, "photo.png").extension(), "jpg");
    }

    #[test]
    fn extension_falls_back_to_file_name() {
        assert_eq!(task_with(BTreeMap::new(), "IMG_1.PNG").extension(), "png");
        assert_eq!(task_with(BTreeMap::new(), "noext").extension(), "");
    }

    #[test]
    fn terminal_transitions_set_status_and_reason() {
        let mut task = task_with(BTreeMap::new(), "IMG_1.jpg");
        assert_eq!(task.status, ImageStatus::Pending);

        task.mark_processed();
        assert_eq!(task.status, ImageStatus::Processed);
        assert_eq!(task.quarantine_reason, None);

        let mut rejected = task_with(BTreeMap::new(), "IMG_2.jpg");
        rejected.mark_quarantined("DUPLICATE_IMAGE");
        assert_eq!(rejected.status, ImageStatus::Quarantined);
        assert_eq!(rejected.quarantine_reason.as_deref(), Some("DUPLICATE_IMAGE"));
    }
}
