use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::models::batch::{Batch, BatchUpdate};
use crate::models::image_task::ImageTask;

/// Outbound calls fail cleanly instead of hanging on a wedged endpoint.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const CREATE_BATCH: &str = "
    mutation CreateBatch($input: CreateBatchInput!) {
        createBatch(input: $input) { batch { _id } }
    }
";

const UPDATE_BATCH: &str = "
    mutation UpdateBatch($input: UpdateBatchInput!) {
        updateBatch(input: $input) { batch { _id } }
    }
";

const CREATE_BATCH_ERROR: &str = "
    mutation CreateBatchError($input: CreateBatchErrorInput!) {
        createBatchError(input: $input) { _id }
    }
";

const CREATE_IMAGE: &str = "
    mutation CreateImageRecord($input: CreateImageInput!) {
        createImage(input: $input) { image { _id } }
    }
";

const CREATE_IMAGE_ERROR: &str = "
    mutation CreateImageError($input: CreateImageErrorInput!) {
        createImageError(input: $input) { _id }
    }
";

/// Client for the catalog API's batch/image lifecycle mutations.
pub struct CatalogClient {
    http: Client,
    url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

/// Result of submitting image metadata. A populated `errors` list means the
/// catalog accepted the request but rejected the record (validation), which
/// the worker classifies rather than treating as a transport failure.
#[derive(Debug, Clone)]
pub struct CreateImageOutcome {
    pub image_id: Option<String>,
    pub errors: Vec<String>,
}

impl CatalogClient {
    pub fn new(url: &str, api_key: &str) -> Result<Self, CatalogError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(CatalogError::Http)?;
        Ok(Self {
            http,
            url: url.to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn execute(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<GraphQlResponse, CatalogError> {
        let response = self
            .http
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(CatalogError::Http)?;

        response.json().await.map_err(CatalogError::Http)
    }

    /// Execute a mutation where any catalog-reported error is fatal.
    async fn execute_strict(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<(), CatalogError> {
        let response = self.execute(query, variables).await?;
        match response.errors.into_iter().next() {
            Some(first) => Err(CatalogError::Rejected(first.message)),
            None => Ok(()),
        }
    }

    pub async fn create_batch(&self, batch: &Batch) -> Result<(), CatalogError> {
        self.execute_strict(CREATE_BATCH, json!({ "input": batch }))
            .await
    }

    pub async fn update_batch(
        &self,
        batch_id: &str,
        update: &BatchUpdate,
    ) -> Result<(), CatalogError> {
        self.execute_strict(
            UPDATE_BATCH,
            json!({ "input": { "_id": batch_id, "updates": update } }),
        )
        .await
    }

    pub async fn create_batch_error(
        &self,
        batch_id: &str,
        error: &str,
    ) -> Result<(), CatalogError> {
        self.execute_strict(
            CREATE_BATCH_ERROR,
            json!({ "input": { "batch": batch_id, "error": error } }),
        )
        .await
    }

    /// Submit enriched image metadata. Validation rejections come back in
    /// the outcome's `errors`; only transport-level failures return `Err`.
    pub async fn create_image(
        &self,
        task: &ImageTask,
    ) -> Result<CreateImageOutcome, CatalogError> {
        let response = self
            .execute(CREATE_IMAGE, json!({ "input": { "md": task } }))
            .await?;

        let image_id = response
            .data
            .as_ref()
            .and_then(|d| d.pointer("/createImage/image/_id"))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        Ok(CreateImageOutcome {
            image_id,
            errors: response.errors.into_iter().map(|e| e.message).collect(),
        })
    }

    /// Supplementary error record tied to a partially-created image.
    pub async fn create_image_error(
        &self,
        image_id: &str,
        batch_id: &str,
        path: &str,
        error: &str,
    ) -> Result<(), CatalogError> {
        self.execute_strict(
            CREATE_IMAGE_ERROR,
            json!({ "input": {
                "image": image_id,
                "batch": batch_id,
                "path": path,
                "error": error,
            } }),
        )
        .await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("catalog rejected mutation: {0}")]
    Rejected(String),
}
