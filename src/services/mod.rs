//! Services module
//!
//! Business logic services that coordinate between the embedding
//! application, the repository, and the cloud mirror.

pub mod items;
pub mod sync;

pub use items::ItemsService;
pub use sync::{SyncHandle, SyncService};
