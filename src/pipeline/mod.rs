pub mod intake;
pub mod processor;
pub mod teardown;
