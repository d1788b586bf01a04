//! Quota source backends.

pub mod memory;

pub use memory::InMemoryQuotaLister;
