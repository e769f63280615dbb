//! Health reporting for the local history and the shared feed

use std::collections::HashMap;

use pulse_share_data::database::{self, DatabasePool};

use crate::services::{FeedState, ReadingService, SharedLoadState};

/// System health status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemStatus {
    /// All components are healthy
    Healthy,
    /// Some components are degraded but the system is functional
    Degraded,
    /// System is not functioning properly
    Unhealthy,
}

/// Component health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ComponentStatus {
    /// Component is functioning normally
    Healthy,
    /// Component is functioning but with reduced capability
    Degraded,
    /// Component is not functioning
    Unhealthy,
}

/// Represents a health component with status and optional details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthComponent {
    /// Status of the component
    pub status: ComponentStatus,
    /// Optional details about the component status
    pub details: Option<String>,
}

impl HealthComponent {
    fn healthy() -> Self {
        Self {
            status: ComponentStatus::Healthy,
            details: None,
        }
    }

    fn with(status: ComponentStatus, details: impl Into<String>) -> Self {
        Self {
            status,
            details: Some(details.into()),
        }
    }
}

/// Represents the overall health of the system
#[derive(Debug, Clone)]
pub struct SystemHealth {
    /// Overall system status
    pub status: SystemStatus,
    /// Map of component names to their health status
    pub components: HashMap<String, HealthComponent>,
}

impl SystemHealth {
    fn from_components(components: HashMap<String, HealthComponent>) -> Self {
        let worst = components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);

        let status = match worst {
            ComponentStatus::Healthy => SystemStatus::Healthy,
            ComponentStatus::Degraded => SystemStatus::Degraded,
            ComponentStatus::Unhealthy => SystemStatus::Unhealthy,
        };

        SystemHealth { status, components }
    }

    pub fn component(&self, name: &str) -> Option<&HealthComponent> {
        self.components.get(name)
    }
}

/// Check that the database behind `pool` answers
pub fn check_database_status(pool: &DatabasePool) -> Result<String, String> {
    database::get_connection_info(pool).map_err(|e| format!("Database connection error: {}", e))
}

fn local_store_component(service: &ReadingService) -> HealthComponent {
    if service.is_local_degraded() {
        HealthComponent::with(
            ComponentStatus::Degraded,
            "A local write failed; readings from this session may not survive a restart",
        )
    } else {
        HealthComponent::healthy()
    }
}

fn shared_feed_component(service: &ReadingService) -> HealthComponent {
    let snapshot = service.shared_snapshot();

    match (&snapshot.load, snapshot.feed) {
        (SharedLoadState::Failed(reason), _) => {
            HealthComponent::with(ComponentStatus::Unhealthy, format!("Shared readings failed to load: {}", reason))
        }
        (SharedLoadState::NotLoaded, _) => HealthComponent::with(ComponentStatus::Degraded, "Shared readings not loaded yet"),
        (SharedLoadState::Loaded, FeedState::Live) => HealthComponent::healthy(),
        (SharedLoadState::Loaded, FeedState::Closed) => {
            HealthComponent::with(ComponentStatus::Degraded, "Live feed closed; refresh to catch up")
        }
        (SharedLoadState::Loaded, FeedState::Idle) => {
            HealthComponent::with(ComponentStatus::Degraded, "No live feed; shared readings update on refresh only")
        }
    }
}

/// Health of the local history and the shared feed
pub fn sync_health(service: &ReadingService) -> SystemHealth {
    let components = vec![
        ("local_store".to_string(), local_store_component(service)),
        ("shared_feed".to_string(), shared_feed_component(service)),
    ];
    SystemHealth::from_components(components.into_iter().collect())
}

/// Sync health plus the database behind the local history
pub fn get_system_health(service: &ReadingService, pool: &DatabasePool) -> SystemHealth {
    let mut health = sync_health(service);

    let db_component = match check_database_status(pool) {
        Ok(info) => HealthComponent::with(ComponentStatus::Healthy, info),
        Err(e) => HealthComponent::with(ComponentStatus::Unhealthy, e),
    };
    health.components.insert("database".to_string(), db_component);

    SystemHealth::from_components(health.components)
}
