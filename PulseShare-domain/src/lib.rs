// PulseShare Domain
// This crate contains the business logic: classification, the local history,
// the shared feed and the service the UI talks to

// Services that implement business logic
pub mod services;

// Session context from the authentication collaborator
pub mod auth;

// Domain entities
pub mod entities;

// Advisory notifications for the UI
pub mod notify;

// Configuration and logging bootstrap
pub mod config;
pub mod logging;

// Health checks and system status
pub mod health;

// Re-export the database module from the data layer for convenience
pub use pulse_share_data::database;

// Testing utilities - only available in tests or with the mock feature
#[cfg(any(test, feature = "mock"))]
pub mod testing;
