pub mod catalog;
pub mod classify;
pub mod exif;
pub mod infra;
pub mod queue;
pub mod storage;
