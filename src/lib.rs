//! Camera-trap image batch ingestion pipeline.
//!
//! A batch arrives as a zip archive in the staging bucket. The intake
//! coordinator validates and deduplicates its entries, provisions ephemeral
//! per-batch queue infra, and fans uploads out under content-addressed keys.
//! Workers drain the queue one image at a time, enriching metadata and
//! replicating or quarantining bytes. The teardown daemon samples queue
//! depths to detect the drained queue, then deletes the infra and
//! finalizes the batch record.

pub mod app_state;
pub mod config;
pub mod models;
pub mod pipeline;
pub mod services;
