use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::services::{
    catalog::CatalogClient, exif::ExifClient, infra::InfraProvisioner, storage::ObjectStore,
};

/// Shared service handles passed to every pipeline component.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub storage: Arc<ObjectStore>,
    pub catalog: Arc<CatalogClient>,
    pub exif: Arc<ExifClient>,
    pub infra: Arc<InfraProvisioner>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let storage = ObjectStore::new(
            &config.s3_endpoint,
            &config.s3_access_key,
            &config.s3_secret_key,
        )?;
        let catalog = CatalogClient::new(&config.catalog_url, &config.catalog_api_key)?;
        let exif = ExifClient::new(&config.exif_url)?;
        let redis = redis::Client::open(config.redis_url.as_str())?;
        let infra = InfraProvisioner::new(
            redis,
            &config.app_name,
            Duration::from_secs(config.poll_interval_secs),
            config.required_empty_polls,
        );

        Ok(Self {
            config: Arc::new(config),
            storage: Arc::new(storage),
            catalog: Arc::new(catalog),
            exif: Arc::new(exif),
            infra: Arc::new(infra),
        })
    }
}
