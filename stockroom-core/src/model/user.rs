//! User - Identity records and their payloads.
//!
//! TigerStyle: the password hash is an opaque secret. It has no serialized
//! form and its `Debug` output is redacted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::validation::{
    check_email, check_max_bytes, check_required, Validate, ValidationErrors,
};
use crate::auth::Role;
use crate::constants::{USER_EMAIL_BYTES_MAX, USER_NAME_BYTES_MAX, USER_PASSWORD_BYTES_MAX};

// =============================================================================
// Hashed Password
// =============================================================================

/// Argon2id PHC string for a user's password.
#[derive(Clone, PartialEq, Eq)]
pub struct HashedPassword(String);

impl HashedPassword {
    /// Wrap a stored PHC string.
    #[must_use]
    pub fn new(phc: String) -> Self {
        Self(phc)
    }

    /// The PHC string, for storage and verification only.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for HashedPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HashedPassword([redacted])")
    }
}

// =============================================================================
// User
// =============================================================================

/// Someone with access to the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    /// Unique identifier (UUID, lowercase hyphenated)
    pub id: String,
    /// Display name
    pub name: String,
    /// Normalised email, unique across all users
    pub email: String,
    /// Never empty
    pub roles: Vec<Role>,
    /// Never serialized
    #[serde(skip)]
    pub password_hash: HashedPassword,
    /// Creation timestamp
    pub date_created: DateTime<Utc>,
    /// Last update timestamp
    pub date_updated: DateTime<Utc>,
}

impl User {
    /// Build a fresh record from a validated payload.
    ///
    /// # Panics
    /// Panics if the payload carries no roles.
    #[must_use]
    pub fn from_new(
        id: String,
        new: &NewUser,
        password_hash: HashedPassword,
        now: DateTime<Utc>,
    ) -> Self {
        // Precondition
        assert!(!new.roles.is_empty(), "user must have at least one role");

        Self {
            id,
            name: new.name.clone(),
            email: normalize_email(&new.email),
            roles: new.roles.clone(),
            password_hash,
            date_created: now,
            date_updated: now,
        }
    }

    /// Check if the user holds `role`.
    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Apply a validated patch. `password_hash` must already be computed
    /// from `patch.password` when that field is set.
    pub fn apply(
        &mut self,
        patch: &UpdateUser,
        password_hash: Option<HashedPassword>,
        now: DateTime<Utc>,
    ) {
        if let Some(name) = &patch.name {
            self.name.clone_from(name);
        }
        if let Some(email) = &patch.email {
            self.email = normalize_email(email);
        }
        if let Some(roles) = &patch.roles {
            assert!(!roles.is_empty(), "user must have at least one role");
            self.roles.clone_from(roles);
        }
        if let Some(hash) = password_hash {
            self.password_hash = hash;
        }
        self.date_updated = now;
    }
}

/// Canonical form used for uniqueness and lookup: trimmed, lower-cased.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// =============================================================================
// Payloads
// =============================================================================

/// Everything needed to create a user.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    /// Display name
    pub name: String,
    /// Email; normalised before storage
    pub email: String,
    /// At least one role
    pub roles: Vec<Role>,
    /// Plain-text password, hashed before storage
    pub password: String,
    /// Must equal `password`
    pub password_confirm: String,
}

impl Validate for NewUser {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        check_required(&mut errors, "name", &self.name);
        check_max_bytes(&mut errors, "name", &self.name, USER_NAME_BYTES_MAX);
        check_email(&mut errors, "email", &self.email, USER_EMAIL_BYTES_MAX);
        if self.roles.is_empty() {
            errors.push("roles", "must not be empty");
        }
        if self.password.is_empty() {
            errors.push("password", "is required");
        }
        check_max_bytes(&mut errors, "password", &self.password, USER_PASSWORD_BYTES_MAX);
        if self.password_confirm != self.password {
            errors.push("password_confirm", "must match password");
        }

        errors.into_result()
    }
}

/// Partial update: `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUser {
    /// New display name
    pub name: Option<String>,
    /// New email
    pub email: Option<String>,
    /// Replacement role set
    pub roles: Option<Vec<Role>>,
    /// New plain-text password
    pub password: Option<String>,
    /// Must equal `password` when that is set
    pub password_confirm: Option<String>,
}

impl Validate for UpdateUser {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Some(name) = &self.name {
            check_required(&mut errors, "name", name);
            check_max_bytes(&mut errors, "name", name, USER_NAME_BYTES_MAX);
        }
        if let Some(email) = &self.email {
            check_email(&mut errors, "email", email, USER_EMAIL_BYTES_MAX);
        }
        if matches!(&self.roles, Some(roles) if roles.is_empty()) {
            errors.push("roles", "must not be empty");
        }
        if let Some(password) = &self.password {
            if password.is_empty() {
                errors.push("password", "is required");
            }
            check_max_bytes(&mut errors, "password", password, USER_PASSWORD_BYTES_MAX);
            if self.password_confirm.as_deref() != Some(password.as_str()) {
                errors.push("password_confirm", "must match password");
            }
        } else if self.password_confirm.is_some() {
            errors.push("password_confirm", "must match password");
        }

        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn new_user() -> NewUser {
        NewUser {
            name: "William Doe".to_string(),
            email: "bill@example.com".to_string(),
            roles: vec![Role::Admin],
            password: "gophers".to_string(),
            password_confirm: "gophers".to_string(),
        }
    }

    fn sample_user() -> User {
        let now = Utc.with_ymd_and_hms(2018, 10, 1, 0, 0, 0).unwrap();
        User::from_new(
            "718ffbea-f4a1-4667-8ae3-b349da52675e".to_string(),
            &new_user(),
            HashedPassword::new("$argon2id$v=19$secret".to_string()),
            now,
        )
    }

    #[test]
    fn test_new_user_valid() {
        assert!(new_user().validate().is_ok());
    }

    #[test]
    fn test_new_user_reports_every_violation() {
        let payload = NewUser {
            name: String::new(),
            email: "not-an-email".to_string(),
            roles: vec![],
            password: "a".to_string(),
            password_confirm: "b".to_string(),
        };

        let errors = payload.validate().unwrap_err();
        assert!(errors.has_field("name"));
        assert!(errors.has_field("email"));
        assert!(errors.has_field("roles"));
        assert!(errors.has_field("password_confirm"));
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_update_user_only_checks_present_fields() {
        assert!(UpdateUser::default().validate().is_ok());

        let patch = UpdateUser {
            name: Some("John Doe".to_string()),
            ..Default::default()
        };
        assert!(patch.validate().is_ok());

        let patch = UpdateUser {
            roles: Some(vec![]),
            password: Some("new".to_string()),
            ..Default::default()
        };
        let errors = patch.validate().unwrap_err();
        assert!(errors.has_field("roles"));
        assert!(errors.has_field("password_confirm"));
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Bill@Example.COM "), "bill@example.com");
    }

    #[test]
    fn test_password_hash_never_serialized() {
        let user = sample_user();
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(!json.to_string().contains("argon2"));
        assert!(!format!("{user:?}").contains("argon2"));
    }

    #[test]
    fn test_apply_patch_changes_only_set_fields() {
        let mut user = sample_user();
        let before = user.clone();
        let later = before.date_created + chrono::Duration::seconds(5);

        let patch = UpdateUser {
            name: Some("X".to_string()),
            ..Default::default()
        };
        user.apply(&patch, None, later);

        assert_eq!(user.name, "X");
        assert_eq!(user.email, before.email);
        assert_eq!(user.roles, before.roles);
        assert_eq!(user.password_hash, before.password_hash);
        assert_eq!(user.date_created, before.date_created);
        assert_eq!(user.date_updated, later);
    }
}
