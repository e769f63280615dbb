//! SQLite connection pool for the device-local database
//!
//! The pool backs the key/value table that holds the local reading history.

use std::env;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use tracing::{error, info};

use super::migrations::run_sqlite_migrations;
use super::DatabaseError;

/// Path used when `DB_SQLITE_PATH` is not set
pub const DEFAULT_SQLITE_PATH: &str = "./data/pulse_share.db";

/// Pooled SQLite connections
pub type SqlitePool = r2d2::Pool<SqliteConnectionManager>;

/// Database connection pool handle
#[derive(Debug, Clone)]
pub enum DatabasePool {
    /// SQLite connection pool
    SQLite(Arc<SqlitePool>),
}

impl DatabasePool {
    /// Borrow the underlying SQLite pool
    pub fn sqlite(&self) -> &Arc<SqlitePool> {
        match self {
            DatabasePool::SQLite(pool) => pool,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Path to SQLite database file, `None` for an in-memory database
    pub sqlite_path: Option<String>,
    /// Maximum number of connections
    pub max_connections: u32,
    /// Connection timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: Some(DEFAULT_SQLITE_PATH.to_string()),
            max_connections: 4,
            timeout_seconds: 30,
        }
    }
}

impl DatabaseConfig {
    /// Configuration for a throwaway in-memory database
    pub fn in_memory() -> Self {
        Self {
            sqlite_path: None,
            // every in-memory connection is its own database
            max_connections: 1,
            ..Self::default()
        }
    }

    /// Create a new database configuration from environment variables
    pub fn from_env() -> Result<Self, DatabaseError> {
        let defaults = Self::default();

        let sqlite_path = match env::var("DB_SQLITE_PATH") {
            Ok(path) if path == ":memory:" => None,
            Ok(path) => Some(path),
            Err(_) => defaults.sqlite_path,
        };

        let max_connections = parse_env("DB_MAX_CONNECTIONS", defaults.max_connections)?;
        let timeout_seconds = parse_env("DB_TIMEOUT_SECONDS", defaults.timeout_seconds)?;

        match sqlite_path {
            Some(ref path) => info!("Using SQLite database at: {}", path),
            None => info!("Using in-memory SQLite database"),
        }

        Ok(DatabaseConfig {
            sqlite_path,
            max_connections,
            timeout_seconds,
        })
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, DatabaseError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| DatabaseError::ConfigError(format!("{} must be a number, got '{}'", name, raw))),
        Err(_) => Ok(default),
    }
}

/// Open a SQLite pool and run migrations on it.
///
/// An unusable file location is an error; the caller decides whether to
/// carry on with an in-memory database instead.
pub fn open_sqlite_pool(config: &DatabaseConfig) -> Result<DatabasePool, DatabaseError> {
    let pool = match config.sqlite_path {
        Some(ref path) => open_file_pool(path, config).map_err(|e| {
            error!("Failed to open SQLite database at {}: {}", path, e);
            e
        })?,
        None => open_in_memory_pool(config)?,
    };

    let conn = pool.get()?;
    run_sqlite_migrations(&conn).map_err(DatabaseError::MigrationError)?;

    Ok(DatabasePool::SQLite(Arc::new(pool)))
}

fn open_file_pool(path: &str, config: &DatabaseConfig) -> Result<SqlitePool, DatabaseError> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            info!("Creating parent directory: {:?}", parent);
            fs::create_dir_all(parent)
                .map_err(|e| DatabaseError::GenericError(format!("cannot create {:?}: {}", parent, e)))?;
        }
    }

    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;

    // r2d2 retries a failing manager until the connection timeout, so check
    // the file opens before building the pool
    Connection::open_with_flags(path, flags)?;

    let manager = SqliteConnectionManager::file(path).with_flags(flags);
    let pool = r2d2::Pool::builder()
        .max_size(config.max_connections.max(1))
        .connection_timeout(Duration::from_secs(config.timeout_seconds))
        .build(manager)?;
    info!("SQLite connection pool created at {}", path);

    Ok(pool)
}

fn open_in_memory_pool(config: &DatabaseConfig) -> Result<SqlitePool, DatabaseError> {
    info!("Initializing in-memory SQLite database");

    let manager = SqliteConnectionManager::memory();

    // every connection is its own database, so the single one must never be recycled
    let pool = r2d2::Pool::builder()
        .max_size(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connection_timeout(Duration::from_secs(config.timeout_seconds))
        .build(manager)?;

    Ok(pool)
}

/// Describe the database behind a pool, for health reporting
pub fn get_connection_info(pool: &DatabasePool) -> Result<String, DatabaseError> {
    let pool = pool.sqlite();
    let conn = pool.get()?;

    let path: String = conn.query_row("PRAGMA database_list", [], |row| row.get(2))?;
    let location = if path.is_empty() || path == ":memory:" {
        "SQLite in-memory database".to_string()
    } else {
        format!("SQLite database at {}", path)
    };

    let state = pool.state();
    Ok(format!(
        "{} (connections: active={}, idle={})",
        location, state.connections, state.idle_connections
    ))
}
