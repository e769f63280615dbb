// Repository module structure
pub mod errors;
mod in_memory;
mod key_value;
mod shared;

// Re-export commonly used types
pub use errors::RepositoryError;
pub use in_memory::{InMemoryKeyValueStore, InMemorySharedBackend};
pub use key_value::KeyValueStore;
#[cfg(feature = "sqlite")]
pub use key_value::SqliteKeyValueStore;
pub use shared::{sort_newest_first, InsertFeed, SharedReadingsBackend};

// Test doubles for both testing and when mock feature is enabled
#[cfg(any(test, feature = "mock"))]
pub mod mocks;
