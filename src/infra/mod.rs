//! In-memory adapters for the unit store, quota source and release
//! handlers.

pub mod quota;
pub mod release;
pub mod store;

pub use quota::InMemoryQuotaLister;
pub use release::RecordingReleaseHandler;
pub use store::InMemoryUnitStore;
