pub mod files;
pub mod lock;
pub mod store;

pub use lock::PathLocks;
pub use store::{EnqueueOutcome, QueueItemPatch, Store};
