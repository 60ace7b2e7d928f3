//! `SeaORM` implementation of the `AuthService` trait.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use crate::db::{Store, UserRecord};
use crate::entities::users::UserStatus;
use crate::services::auth_service::{AuthError, AuthOutcome, AuthService};
use crate::services::password_hasher::PasswordHasher;
use crate::services::password_policy::PasswordPolicy;

/// Per-user async mutexes keyed by username so state transitions for a
/// single user are linearisable. Hashing still runs on the blocking pool;
/// the lock only serialises requests for the same user.
#[derive(Default)]
struct UserLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl UserLocks {
    fn entry(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().expect("user lock map poisoned");
        map.entry(name.to_owned())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

pub struct SeaOrmAuthService {
    store: Store,
    hasher: PasswordHasher,
    policy: Arc<PasswordPolicy>,
    locks: UserLocks,
}

impl SeaOrmAuthService {
    #[must_use]
    pub fn new(store: Store, hasher: PasswordHasher, policy: Arc<PasswordPolicy>) -> Self {
        Self {
            store,
            hasher,
            policy,
            locks: UserLocks::default(),
        }
    }

    /// Shared tail of both change flows. Order is normative: confirmation,
    /// policy, history, then the single write sequence. Nothing is mutated
    /// when any check fails.
    async fn apply_password_change(
        &self,
        user: &UserRecord,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), AuthError> {
        if new_password.is_empty() {
            return Err(AuthError::Validation(
                "New password must not be empty".to_string(),
            ));
        }

        if new_password != confirm_password {
            return Err(AuthError::Validation(
                "New password and confirmation do not match".to_string(),
            ));
        }

        if !self.policy.is_valid(new_password) {
            return Err(AuthError::Validation(
                "New password does not meet the password policy".to_string(),
            ));
        }

        if self.in_recent_history(user.id, new_password).await? {
            return Err(AuthError::Validation(
                "New password was used recently; choose a different one".to_string(),
            ));
        }

        let new_hash = self
            .hasher
            .hash_async(new_password.to_owned())
            .await
            .map_err(AuthError::internal)?;

        self.store
            .update_password(user.id, &new_hash, Some(user.id))
            .await
            .map_err(AuthError::storage)?;
        self.store
            .append_password_history(user.id, &new_hash)
            .await
            .map_err(AuthError::storage)?;

        if user.is_first_login {
            self.store
                .clear_first_login(user.id)
                .await
                .map_err(AuthError::storage)?;
        }

        info!("Password changed for user: {}", user.name);
        Ok(())
    }

    /// True when the candidate matches any of the most recent H hashes.
    async fn in_recent_history(&self, user_id: i32, candidate: &str) -> Result<bool, AuthError> {
        let limit = self.policy.history_size();
        if limit == 0 {
            return Ok(false);
        }

        let hashes = self
            .store
            .recent_password_hashes(user_id, limit)
            .await
            .map_err(AuthError::storage)?;

        for hash in hashes {
            let matches = self
                .hasher
                .verify_async(candidate.to_owned(), hash)
                .await
                .map_err(AuthError::internal)?;
            if matches {
                return Ok(true);
            }
        }

        Ok(false)
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AuthOutcome, AuthError> {
        let lock = self.locks.entry(username);
        let _guard = lock.lock().await;

        let Some(mut user) = self
            .store
            .get_user_by_name(username)
            .await
            .map_err(AuthError::storage)?
        else {
            // Unknown usernames burn the same verification cost as a
            // mismatch so the two are indistinguishable by timing.
            self.hasher.equalize_timing(password.to_owned()).await;
            warn!("No user found for username: {username}");
            return Ok(AuthOutcome::BadCredentials);
        };

        let now = Utc::now();
        let today = now.date_naive();

        let outside_validity = user.valid_until.is_some_and(|until| until < today);
        if user.status == UserStatus::Deactivated || outside_validity {
            self.hasher.equalize_timing(password.to_owned()).await;
            warn!("Deactivated account attempted to log in: {username}");
            return Ok(AuthOutcome::BadCredentials);
        }

        if user.status == UserStatus::Locked {
            let Some(lock_until) = user.lock_until else {
                warn!("Permanently locked account attempted to log in: {username}");
                return Ok(AuthOutcome::PermanentlyLocked);
            };

            if now < lock_until + self.policy.lockout_duration() {
                // Any attempt inside the window extends it.
                self.store
                    .record_locked_attempt(user.id, now)
                    .await
                    .map_err(AuthError::storage)?;
                warn!("Login attempt on temporarily locked account: {username}");
                return Ok(AuthOutcome::TemporarilyLocked {
                    until: now + self.policy.lockout_duration(),
                });
            }

            // The timed lock has run out; clear it and continue with the
            // refreshed state.
            self.store
                .unlock_user(user.id)
                .await
                .map_err(AuthError::storage)?;
            user.status = UserStatus::Active;
            user.num_failed_login_attempts = 0;
            user.lock_until = None;
        }

        let password_matches = self
            .hasher
            .verify_async(password.to_owned(), user.password_hash.clone())
            .await
            .map_err(AuthError::internal)?;

        if !password_matches {
            let attempts = self
                .store
                .increment_failed_attempts(user.id)
                .await
                .map_err(AuthError::storage)?;

            if attempts >= self.policy.max_failed_attempts() {
                self.store
                    .lock_user(user.id, now)
                    .await
                    .map_err(AuthError::storage)?;
                warn!("User locked after {attempts} failed login attempts: {username}");
            } else {
                warn!("Incorrect password attempt for user: {username}");
            }

            return Ok(AuthOutcome::BadCredentials);
        }

        if let Some(expiry) = user.password_expiry_date
            && expiry < today
        {
            // Counters are left as-is; the caller proceeds to the mandatory
            // change, which completes the login.
            warn!("Password expired for user: {username}");
            return Ok(AuthOutcome::PasswordExpired { user_id: user.id });
        }

        if user.is_first_login {
            self.store
                .reset_failed_attempts(user.id)
                .await
                .map_err(AuthError::storage)?;
            info!("Password change required prior to first login for user: {username}");
            return Ok(AuthOutcome::FirstLoginRequired { user_id: user.id });
        }

        self.store
            .finish_login(user.id, now)
            .await
            .map_err(AuthError::storage)?;
        info!("Successfully authenticated user: {username}");

        Ok(AuthOutcome::Success { user_id: user.id })
    }

    async fn change_password(
        &self,
        user_id: i32,
        current_password: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), AuthError> {
        if current_password.is_empty() {
            return Err(AuthError::Validation(
                "Current password must not be empty".to_string(),
            ));
        }

        let user = self
            .store
            .get_user_by_id(user_id)
            .await
            .map_err(AuthError::storage)?
            .ok_or(AuthError::InvalidCredentials)?;

        let lock = self.locks.entry(&user.name);
        let _guard = lock.lock().await;

        // Re-read under the lock; the snapshot above was only for the name.
        let user = self
            .store
            .get_user_by_id(user_id)
            .await
            .map_err(AuthError::storage)?
            .ok_or(AuthError::InvalidCredentials)?;

        let current_matches = self
            .hasher
            .verify_async(current_password.to_owned(), user.password_hash.clone())
            .await
            .map_err(AuthError::internal)?;

        if !current_matches {
            warn!("Password change rejected for {}: wrong current password", user.name);
            return Err(AuthError::InvalidCredentials);
        }

        self.apply_password_change(&user, new_password, confirm_password)
            .await
    }

    async fn change_password_attested(
        &self,
        username: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), AuthError> {
        let lock = self.locks.entry(username);
        let _guard = lock.lock().await;

        let user = self
            .store
            .get_user_by_name(username)
            .await
            .map_err(AuthError::storage)?
            .ok_or(AuthError::InvalidCredentials)?;

        self.apply_password_change(&user, new_password, confirm_password)
            .await?;

        // The remedial step consummates the deferred login.
        self.store
            .finish_login(user.id, Utc::now())
            .await
            .map_err(AuthError::storage)?;

        Ok(())
    }
}
