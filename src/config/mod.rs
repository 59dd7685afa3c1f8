use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Application name used to prefix ephemeral infra (queue/alarm keys).
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Redis connection string backing the per-batch work queues
    pub redis_url: String,

    /// Catalog API endpoint (GraphQL-style, single URL)
    pub catalog_url: String,

    /// Catalog API key, sent as the x-api-key header
    pub catalog_api_key: String,

    /// EXIF extraction service endpoint
    pub exif_url: String,

    /// Object store endpoint URL (S3-compatible)
    pub s3_endpoint: String,

    /// Object store access key ID
    pub s3_access_key: String,

    /// Object store secret access key
    pub s3_secret_key: String,

    /// Bucket receiving tiered serving copies
    pub serving_bucket: String,

    /// Bucket receiving quarantined originals, keyed by classified error code
    pub dead_letter_bucket: String,

    /// Optional long-term archive bucket; archival copy is skipped when unset
    #[serde(default)]
    pub archive_bucket: Option<String>,

    /// Parking-lot bucket used by the maintenance bypass
    #[serde(default)]
    pub parking_bucket: Option<String>,

    /// When set, workers park objects verbatim instead of processing them
    #[serde(default)]
    pub maintenance_mode: bool,

    /// Max in-flight uploads during archive fan-out
    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,

    /// Substring marking a catalog uniqueness-constraint rejection
    #[serde(default = "default_duplicate_marker")]
    pub duplicate_marker: String,

    /// Completion sampler poll interval in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Consecutive empty polls required before completion fires
    #[serde(default = "default_empty_polls")]
    pub required_empty_polls: usize,

    /// Minimum infra age in hours before the sweep will consider it
    #[serde(default = "default_sweep_grace_hours")]
    pub sweep_grace_hours: i64,
}

fn default_app_name() -> String {
    "camtrap-ingest".to_string()
}

fn default_upload_concurrency() -> usize {
    100
}

fn default_duplicate_marker() -> String {
    "duplicate key".to_string()
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_empty_polls() -> usize {
    10
}

fn default_sweep_grace_hours() -> i64 {
    24
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
