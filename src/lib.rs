//! # kube_queue
//!
//! A pluggable admission scheduler for gated batch jobs.
//!
//! Jobs are represented by queue units. Units wait in named queues until
//! the scheduling loop admits them under namespace resource quotas. Admission
//! is split into plugins: multi-queue sort decides which queue is visited
//! first, queue sort orders the units inside a queue, filter plugins decide
//! whether a unit fits, and reserve plugins account for what admitted units
//! hold until the system of record confirms them.
//!
//! ## Flow of one unit
//!
//! - The unit feed reports a new unit; the [`core::Controller`] adds it to
//!   its queue.
//! - A [`core::Scheduler`] cycle pops it from the first non-empty queue in
//!   priority order and runs the filter plugins, then the reserve plugins.
//! - On success the unit is marked `Dequeued` in the system of record on a
//!   bounded background task.
//! - On any failure the unit's attempt count grows and it waits out an
//!   exponential backoff window before it is tried again.
//!
//! ## Wiring
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kube_queue::builders::SchedulerBuilder;
//! use kube_queue::config::SchedulerConfig;
//! use kube_queue::infra::{InMemoryQuotaLister, InMemoryUnitStore};
//! use kube_queue::runtime::TokioSpawner;
//!
//! let parts = SchedulerBuilder::new(SchedulerConfig::default(), TokioSpawner::current()?)
//!     .unit_client(Arc::new(InMemoryUnitStore::new()))
//!     .quota_lister(Arc::new(InMemoryQuotaLister::new()))
//!     .build()?;
//! parts.controller.add_queue(kube_queue::core::QueueSpec::new("team-a", 10))?;
//! tokio::spawn(async move { parts.scheduler.run().await });
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions and reservation accounting.
pub mod core;
/// Configuration models for backoff, concurrency, plugins and queues.
pub mod config;
/// Builders to construct scheduler components from configuration.
pub mod builders;
/// In-memory adapters for the external collaborators.
pub mod infra;
/// In-tree scheduling plugins.
pub mod plugins;
/// Runtime adapters and the event API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
