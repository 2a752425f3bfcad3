//! Batch processing of documents.

mod coordinator;

pub use coordinator::{BatchCoordinator, BatchCoordinatorBuilder};
