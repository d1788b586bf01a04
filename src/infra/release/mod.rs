//! Release handler backends.

pub mod memory;

pub use memory::RecordingReleaseHandler;
