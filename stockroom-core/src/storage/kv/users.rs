//! SledUserStore - users with a hand-maintained email index.
//!
//! Every write that touches both a record and its index pointer runs in one
//! sled transaction, so the two never disagree after a crash.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sled::transaction::abort;

use super::codec::{self, UserRecord};
use super::keys::{email_key, record_key, RECORD_PREFIX};
use super::{aborting, blocking, sled_err, tx_err, KvStore, TxResult};
use crate::auth::{self, Claims};
use crate::model::{normalize_email, NewUser, UpdateUser, User};
use crate::storage::backend::{self, StatusChecker, UserStorage};
use crate::storage::error::{new_id, parse_id, StorageError, StorageResult};

// =============================================================================
// SledUserStore
// =============================================================================

/// Embedded user storage.
#[derive(Debug, Clone)]
pub struct SledUserStore {
    store: KvStore,
}

impl SledUserStore {
    /// Wrap an open store.
    #[must_use]
    pub fn new(store: KvStore) -> Self {
        Self { store }
    }
}

fn decode_user(bytes: &[u8]) -> StorageResult<User> {
    codec::decode::<UserRecord>(bytes)?.into_user()
}

#[async_trait]
impl StatusChecker for SledUserStore {
    #[tracing::instrument(name = "user.sled.status_check", skip_all)]
    async fn status_check(&self) -> StorageResult<()> {
        self.store.ping().await
    }
}

#[async_trait]
impl UserStorage for SledUserStore {
    #[tracing::instrument(name = "user.sled.list", skip_all)]
    async fn list(&self) -> StorageResult<Vec<User>> {
        let users = self.store.users().clone();

        blocking(move || {
            // Index pointers live under another prefix and are never visited.
            users
                .scan_prefix(RECORD_PREFIX)
                .values()
                .map(|value| {
                    let value = value.map_err(|e| sled_err("scanning users", &e))?;
                    decode_user(&value)
                })
                .collect()
        })
        .await
    }

    #[tracing::instrument(
        name = "user.sled.retrieve",
        skip(self, claims),
        fields(subject = %claims.subject)
    )]
    async fn retrieve(&self, claims: &Claims, id: &str) -> StorageResult<User> {
        let id = parse_id(id)?;
        auth::authorize_user(claims, &id)?;
        let users = self.store.users().clone();

        blocking(move || {
            let value = users
                .get(record_key(&id))
                .map_err(|e| sled_err(&format!("reading user {id}"), &e))?;
            match value {
                Some(value) => decode_user(&value),
                None => Err(StorageError::NotFound),
            }
        })
        .await
    }

    #[tracing::instrument(name = "user.sled.create", skip_all)]
    async fn create(&self, new: &NewUser, now: DateTime<Utc>) -> StorageResult<User> {
        let hash = backend::hash_password(&new.password).await?;
        let user = User::from_new(new_id(), new, hash, now);

        let record = codec::encode(&UserRecord::from(&user))?;
        let id = user.id.clone();
        let email = user.email.clone();
        let users = self.store.users().clone();

        blocking(move || {
            let rkey = record_key(&id);
            let ekey = email_key(&email);

            users
                .transaction(|tx| -> TxResult<()> {
                    // No engine constraint here: the index is the constraint.
                    if tx.get(ekey.as_slice())?.is_some() {
                        return abort(StorageError::email_taken());
                    }
                    tx.insert(rkey.as_slice(), record.as_slice())?;
                    tx.insert(ekey.as_slice(), id.as_bytes())?;
                    Ok(())
                })
                .map_err(|e| tx_err("inserting user", e))
        })
        .await?;

        tracing::debug!(id = %user.id, "user created");
        Ok(user)
    }

    #[tracing::instrument(
        name = "user.sled.update",
        skip(self, claims, patch, now),
        fields(subject = %claims.subject)
    )]
    async fn update(
        &self,
        claims: &Claims,
        id: &str,
        patch: &UpdateUser,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let id = parse_id(id)?;
        auth::authorize_user(claims, &id)?;

        // Hash outside the transaction; sled may re-run the closure on conflict.
        let hash = match &patch.password {
            Some(password) => Some(backend::hash_password(password).await?),
            None => None,
        };
        let patch = patch.clone();
        let users = self.store.users().clone();

        blocking(move || {
            let rkey = record_key(&id);

            users
                .transaction(|tx| -> TxResult<()> {
                    let Some(current) = tx.get(rkey.as_slice())? else {
                        return abort(StorageError::NotFound);
                    };
                    let mut user = aborting(decode_user(&current))?;
                    let old_email = user.email.clone();

                    user.apply(&patch, hash.clone(), now);

                    if user.email != old_email {
                        let fresh = email_key(&user.email);
                        if tx.get(fresh.as_slice())?.is_some() {
                            return abort(StorageError::email_taken());
                        }
                        tx.remove(email_key(&old_email))?;
                        tx.insert(fresh, id.as_bytes())?;
                    }

                    let record = aborting(codec::encode(&UserRecord::from(&user)))?;
                    tx.insert(rkey.as_slice(), record)?;
                    Ok(())
                })
                .map_err(|e| tx_err("updating user", e))
        })
        .await
    }

    #[tracing::instrument(name = "user.sled.delete", skip(self))]
    async fn delete(&self, id: &str) -> StorageResult<()> {
        let id = parse_id(id)?;
        let users = self.store.users().clone();

        blocking(move || {
            let rkey = record_key(&id);

            users
                .transaction(|tx| -> TxResult<()> {
                    let Some(current) = tx.get(rkey.as_slice())? else {
                        return Ok(());
                    };
                    let user = aborting(decode_user(&current))?;
                    tx.remove(rkey.as_slice())?;

                    let ekey = email_key(&user.email);
                    if tx.get(ekey.as_slice())?.as_deref() == Some(id.as_bytes()) {
                        tx.remove(ekey)?;
                    }
                    Ok(())
                })
                .map_err(|e| tx_err(&format!("deleting user {id}"), e))
        })
        .await
    }

    #[tracing::instrument(name = "user.sled.authenticate", skip_all)]
    async fn authenticate(
        &self,
        now: DateTime<Utc>,
        email: &str,
        password: &str,
    ) -> StorageResult<Claims> {
        let email = normalize_email(email);
        let users = self.store.users().clone();

        let user = blocking(move || {
            if email.is_empty() {
                return Ok(None);
            }
            let ekey = email_key(&email);

            // Pointer and record are read from one snapshot.
            users
                .transaction(|tx| -> TxResult<Option<User>> {
                    let Some(id) = tx.get(ekey.as_slice())? else {
                        return Ok(None);
                    };
                    match tx.get([RECORD_PREFIX, id.as_ref()].concat())? {
                        Some(current) => aborting(decode_user(&current)).map(Some),
                        None => Ok(None),
                    }
                })
                .map_err(|e| tx_err("reading user by email", e))
        })
        .await?;

        backend::check_credentials(user, password, now).await
    }
}
