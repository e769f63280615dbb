//! Session context supplied by the authentication collaborator.
//!
//! The core only needs to know who, if anyone, is signed in. Sign-in flows
//! live outside this crate; they hand the result over as a [`Session`].

use serde::{Deserialize, Serialize};

use crate::entities::ANONYMOUS;

pub mod logging;

/// Role that unlocks admin views in the UI
pub const ADMIN_ROLE: &str = "admin";

/// The signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    /// User ID from the identity provider
    pub user_id: String,
    /// Email, when the provider shares it
    pub email: Option<String>,
    /// Role flag, e.g. "admin"
    pub role: Option<String>,
}

impl SessionUser {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
            role: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Identifier stored as the subject of this user's readings
    pub fn identity(&self) -> &str {
        self.email
            .as_deref()
            .filter(|email| !email.trim().is_empty())
            .unwrap_or(&self.user_id)
    }
}

/// Who is using the app right now
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user: Option<SessionUser>,
}

impl Session {
    /// Nobody signed in
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn signed_in(user: SessionUser) -> Self {
        Self { user: Some(user) }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Only used to gate UI; the data rules ignore it
    pub fn is_admin(&self) -> bool {
        self.user
            .as_ref()
            .and_then(|user| user.role.as_deref())
            .is_some_and(|role| role.eq_ignore_ascii_case(ADMIN_ROLE))
    }

    /// Subject name for a new reading.
    ///
    /// A signed-in identity wins over the name typed into the form; with
    /// neither, the reading is anonymous.
    pub fn subject_name(&self, entered: Option<&str>) -> String {
        if let Some(user) = &self.user {
            return user.identity().to_string();
        }

        entered
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(ANONYMOUS)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_overrides_entered_name() {
        let session = Session::signed_in(SessionUser::new("u-1").with_email("alice@x.com"));
        assert_eq!(session.subject_name(Some("Bob")), "alice@x.com");
    }

    #[test]
    fn test_user_id_used_without_email() {
        let session = Session::signed_in(SessionUser::new("u-1"));
        assert_eq!(session.subject_name(None), "u-1");
    }

    #[test]
    fn test_anonymous_fallback() {
        let session = Session::anonymous();
        assert_eq!(session.subject_name(None), ANONYMOUS);
        assert_eq!(session.subject_name(Some("  ")), ANONYMOUS);
        assert_eq!(session.subject_name(Some("Bob")), "Bob");
    }

    #[test]
    fn test_admin_flag() {
        assert!(Session::signed_in(SessionUser::new("u").with_role("Admin")).is_admin());
        assert!(!Session::signed_in(SessionUser::new("u").with_role("member")).is_admin());
        assert!(!Session::anonymous().is_admin());
    }
}
