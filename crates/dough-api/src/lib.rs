pub mod client;
pub mod error;
pub mod snapshot;

pub use client::{ApiClient, SystemInfo};
pub use error::ApiError;
pub use snapshot::{load_initial, InitialSnapshot, SnapshotSource};
