use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Client;

/// Client for the external EXIF extraction service.
pub struct ExifClient {
    http: Client,
    url: String,
}

impl ExifClient {
    pub fn new(url: &str) -> Result<Self, ExifError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(ExifError::Http)?;
        Ok(Self {
            http,
            url: url.to_string(),
        })
    }

    /// Extract EXIF fields for an object already in the store.
    ///
    /// Group prefixes (`EXIF:Make` style) are stripped from keys and values
    /// are flattened to strings so the merge into task metadata is uniform.
    pub async fn extract(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<BTreeMap<String, String>, ExifError> {
        let raw: BTreeMap<String, serde_json::Value> = self
            .http
            .get(&self.url)
            .query(&[("bucket", bucket), ("key", key)])
            .send()
            .await
            .map_err(ExifError::Http)?
            .json()
            .await
            .map_err(ExifError::Http)?;

        Ok(raw
            .into_iter()
            .map(|(k, v)| (strip_group(&k).to_string(), flatten(v)))
            .collect())
    }
}

fn strip_group(key: &str) -> &str {
    match key.split_once(':') {
        Some((_, rest)) => rest,
        None => key,
    }
}

fn flatten(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExifError {
    #[error("EXIF service request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_prefixes_are_stripped() {
        assert_eq!(strip_group("EXIF:SerialNumber"), "SerialNumber");
        assert_eq!(strip_group("Make"), "Make");
    }

    #[test]
    fn values_flatten_to_strings() {
        assert_eq!(flatten(serde_json::json!("Reconyx")), "Reconyx");
        assert_eq!(flatten(serde_json::json!(940)), "940");
    }
}
