pub mod classifier;
pub mod insights;
pub mod local_store;
pub mod reading_service;
pub mod retry;
pub mod sync;

// Domain services
// Classification, the two reading collections and the orchestrating service.

// Re-export the service and its factory
pub use reading_service::{create_default_reading_service, PendingShare, ReadingService, ReadingServiceError};
pub use sync::{FeedState, RemoteSyncClient, SharedLoadState, SharedSnapshot, SubmitOutcome, Subscription, SyncError};

// Re-export the in-memory service factory when the mock feature is enabled
#[cfg(any(test, feature = "mock"))]
pub use crate::testing::create_in_memory_reading_service;
