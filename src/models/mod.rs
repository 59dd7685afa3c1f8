pub mod batch;
pub mod image_task;
pub mod infra;
