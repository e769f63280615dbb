use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::Session;

/// Types of session events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEventType {
    SignIn,
    SignOut,
    /// Signed-in user replaced by another one
    UserChanged,
}

impl std::fmt::Display for SessionEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEventType::SignIn => write!(f, "SIGN_IN"),
            SessionEventType::SignOut => write!(f, "SIGN_OUT"),
            SessionEventType::UserChanged => write!(f, "USER_CHANGED"),
        }
    }
}

/// Session change record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub event_type: SessionEventType,
    /// User ID after the change, or before it for a sign-out
    pub user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub admin: bool,
}

impl SessionEvent {
    /// Describe the change from `previous` to `next`, if there was one
    pub fn between(previous: &Session, next: &Session) -> Option<Self> {
        let event_type = match (&previous.user, &next.user) {
            (None, Some(_)) => SessionEventType::SignIn,
            (Some(_), None) => SessionEventType::SignOut,
            (Some(before), Some(after)) if before.user_id != after.user_id => SessionEventType::UserChanged,
            _ => return None,
        };

        let user = next.user.as_ref().or(previous.user.as_ref());
        Some(Self {
            event_type,
            user_id: user.map(|u| u.user_id.clone()),
            timestamp: Utc::now(),
            admin: next.is_admin(),
        })
    }
}

/// Log a session event
pub fn log_session_event(event: &SessionEvent) {
    info!(
        "SESSION-LOG [{}] [{}] [admin={}] {}",
        event.event_type,
        event.user_id.as_deref().unwrap_or("anonymous"),
        event.admin,
        event.timestamp.to_rfc3339()
    );
}
