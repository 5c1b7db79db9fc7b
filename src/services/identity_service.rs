use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::config::LockdownPolicy;
use crate::database::SharedStore;
use crate::error::Result;
use crate::models::user::User;
use crate::utils::password::verify_password;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordCheck {
    Valid,
    Invalid,
    LockedOut,
}

impl PasswordCheck {
    pub fn is_valid(self) -> bool {
        matches!(self, PasswordCheck::Valid)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignInResult {
    Success(User),
    Failed,
    LockedOut,
}

/// Credential checks with failed-attempt lockout.
#[derive(Clone)]
pub struct IdentityService {
    store: SharedStore,
    policy: LockdownPolicy,
}

impl IdentityService {
    pub fn new(store: SharedStore, policy: LockdownPolicy) -> Self {
        Self { store, policy }
    }

    pub async fn find_user(&self, id: uuid::Uuid) -> Result<Option<User>> {
        self.store.find_user_by_id(id).await
    }

    /// Verifies `password` for `user`. A locked-out account never verifies,
    /// and each mismatch counts towards the lockout threshold.
    pub async fn check_password(
        &self,
        user: &User,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<PasswordCheck> {
        if user.is_locked_out(now) {
            warn!(user_id = %user.id, lockout_end = ?user.lockout_end, "password check on locked-out account");
            return Ok(PasswordCheck::LockedOut);
        }

        if verify_password(password, &user.password_hash)? {
            if user.failed_login_count > 0 || user.lockout_end.is_some() {
                self.store.reset_login_failures(user.id).await?;
            }
            return Ok(PasswordCheck::Valid);
        }

        let failures = user.failed_login_count + 1;
        if failures >= self.policy.lockout_max_failures {
            let lockout_end = now + Duration::minutes(self.policy.lockout_minutes);
            self.store
                .record_login_failure(user.id, 0, Some(lockout_end))
                .await?;
            warn!(user_id = %user.id, %lockout_end, "account locked after repeated password failures");
            return Ok(PasswordCheck::LockedOut);
        }

        self.store
            .record_login_failure(user.id, failures, None)
            .await?;
        info!(user_id = %user.id, failures, "password mismatch");
        Ok(PasswordCheck::Invalid)
    }

    pub async fn password_sign_in(
        &self,
        email: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<SignInResult> {
        let Some(user) = self.store.find_user_by_email(email.trim()).await? else {
            info!("sign-in for unknown email");
            return Ok(SignInResult::Failed);
        };
        Ok(match self.check_password(&user, password, now).await? {
            PasswordCheck::Valid => SignInResult::Success(user),
            PasswordCheck::Invalid => SignInResult::Failed,
            PasswordCheck::LockedOut => SignInResult::LockedOut,
        })
    }
}
