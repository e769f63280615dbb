// PulseShare Data
// This crate handles local persistence and access to the shared readings store

// Database connection management
#[cfg(feature = "sqlite")]
pub mod database;

// Repository implementations for data access
pub mod repository;

// Data storage models
pub mod models;

// HTTP and realtime access to the hosted shared store
#[cfg(feature = "remote")]
pub mod remote;
