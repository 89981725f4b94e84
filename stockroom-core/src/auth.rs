//! Auth - Roles, claims, access policy and password hashing.
//!
//! TigerStyle: one policy, applied identically by every backend.
//!
//! Token issuance and verification are the caller's business. This module only
//! produces the identity payload that a token would carry, and decides whether
//! a payload may touch a given record.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::constants::CLAIMS_TTL_SECS;
use crate::storage::{StorageError, StorageResult};

// =============================================================================
// Role
// =============================================================================

/// Closed role vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Privileged: may act on any user or product
    Admin,
    /// Regular account
    User,
}

impl Role {
    /// Get string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    /// Parse from string, case-insensitive.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "user" => Some(Self::User),
            _ => None,
        }
    }

    /// Get all roles in order.
    #[must_use]
    pub fn all() -> &'static [Role] {
        &[Self::Admin, Self::User]
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Claims
// =============================================================================

/// Authenticated identity: who, with which roles, valid for which window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User ID of the authenticated caller
    #[serde(rename = "sub")]
    pub subject: String,
    /// Roles held at the time of issue
    pub roles: Vec<Role>,
    /// Issue time, unix seconds
    #[serde(rename = "iat")]
    pub issued_at: i64,
    /// Expiry time, unix seconds
    #[serde(rename = "exp")]
    pub expires_at: i64,
}

impl Claims {
    /// Create claims issued at `now`, valid for `ttl_secs`.
    ///
    /// # Panics
    /// Panics if `ttl_secs` is not positive.
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        roles: Vec<Role>,
        now: DateTime<Utc>,
        ttl_secs: i64,
    ) -> Self {
        assert!(ttl_secs > 0, "ttl_secs must be positive, got {ttl_secs}");

        let issued_at = now.timestamp();
        Self {
            subject: subject.into(),
            roles,
            issued_at,
            expires_at: issued_at + ttl_secs,
        }
    }

    /// Claims with the default lifetime.
    #[must_use]
    pub fn issue(subject: impl Into<String>, roles: Vec<Role>, now: DateTime<Utc>) -> Self {
        Self::new(subject, roles, now, CLAIMS_TTL_SECS)
    }

    /// Check if the claims include `role`.
    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Check if the caller is privileged.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    /// Check if the validity window has closed at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.expires_at
    }
}

// =============================================================================
// Access Policy
// =============================================================================

/// A caller may view or modify a user record only if privileged or it is their own.
///
/// # Errors
/// `StorageError::Forbidden` otherwise.
pub fn authorize_user(claims: &Claims, user_id: &str) -> StorageResult<()> {
    if claims.is_admin() || claims.subject == user_id {
        return Ok(());
    }
    Err(StorageError::Forbidden)
}

/// A caller may modify a product only if privileged or its creator.
///
/// # Errors
/// `StorageError::Forbidden` otherwise.
pub fn authorize_product(claims: &Claims, owner_id: &str) -> StorageResult<()> {
    if claims.is_admin() || claims.subject == owner_id {
        return Ok(());
    }
    Err(StorageError::Forbidden)
}

// =============================================================================
// Password Hashing
// =============================================================================

/// Verified against when the email is unknown, so both failure paths cost the same.
static UNKNOWN_USER_HASH: Lazy<Option<String>> =
    Lazy::new(|| hash_password("stockroom-unknown-user").ok());

/// Hash a password into an Argon2id PHC string.
///
/// # Errors
/// `StorageError::Unavailable` if the hasher fails.
pub fn hash_password(password: &str) -> StorageResult<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| StorageError::unavailable(format!("generating password hash: {e}")))
}

/// Verify a password against a stored PHC string.
///
/// Comparison is constant-time inside the argon2 crate. A malformed stored
/// hash never verifies.
#[must_use]
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Burn the same work as a real verification for an unknown account.
pub fn verify_unknown_user(password: &str) {
    if let Some(hash) = UNKNOWN_USER_HASH.as_deref() {
        let _ = verify_password(password, hash);
    }
}
