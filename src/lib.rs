pub mod config;
pub mod error;
pub mod executor;
pub mod fetch;
pub mod humanize;
pub mod logging;
pub mod manifest;
pub mod observability;
pub mod orchestrator;
pub mod record;
pub mod shared;
pub mod sink;
pub mod storage;
pub mod task;
pub mod timer;
