//! Unit store backends.

pub mod memory;

pub use memory::InMemoryUnitStore;
