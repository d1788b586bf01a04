//! Configuration models for backoff, concurrency, plugins and queues.

pub mod scheduler;

pub use scheduler::{SchedulerConfig, ENV_PREFIX};
