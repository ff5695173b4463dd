use std::sync::Arc;

use axum::extract::FromRef;
use tracing::{info, warn};

use crate::{
    auth::{
        error::AuthError,
        jwt::JwtKeys,
        password::{hash_password, verify_password},
        reset::{constant_time_eq, generate_code},
        store::{NewUser, User, UserStore},
    },
    mailer::Mailer,
    state::AppState,
};

pub const MIN_PASSWORD_LEN: usize = 8;

/// A freshly issued access/refresh pair, ready for the transport layer to
/// deliver as cookies or headers.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Explicit account operations: register, login and the three-step
/// password-reset exchange. All durable state lives behind `UserStore`.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn UserStore>,
    mailer: Arc<dyn Mailer>,
    keys: JwtKeys,
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            mailer: state.mailer.clone(),
            keys: JwtKeys::from_config(&state.config.auth),
        }
    }
}

impl AuthService {
    pub fn new(store: Arc<dyn UserStore>, mailer: Arc<dyn Mailer>, keys: JwtKeys) -> Self {
        Self {
            store,
            mailer,
            keys,
        }
    }

    fn issue_pair(&self, user: &User) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.keys.sign_access(user)?,
            refresh_token: self.keys.sign_refresh(user)?,
        })
    }

    /// Create a user at generation 0 and issue a token pair. Uniqueness is
    /// enforced by the store, so two racing registrations cannot both win.
    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<(User, TokenPair), AuthError> {
        if password.len() < MIN_PASSWORD_LEN {
            return Err(AuthError::PasswordTooShort);
        }
        // Early checks give field-specific errors; the store's unique
        // constraints remain the race-proof backstop.
        if self.store.find_by_email(email).await?.is_some() {
            return Err(AuthError::EmailExists);
        }
        if self.store.find_by_username(username).await?.is_some() {
            return Err(AuthError::UsernameExists);
        }
        let password_hash = hash_password(password)?;
        let user = self
            .store
            .create(NewUser {
                email,
                username,
                password_hash: &password_hash,
            })
            .await?;
        let tokens = self.issue_pair(&user)?;
        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok((user, tokens))
    }

    /// Unknown email and wrong password produce the identical error so the
    /// response cannot be used to enumerate accounts.
    pub async fn login(&self, email: &str, password: &str) -> Result<(User, TokenPair), AuthError> {
        let user = match self.store.find_by_email(email).await? {
            Some(user) => user,
            None => {
                warn!(email = %email, "login unknown email");
                return Err(AuthError::InvalidCredentials);
            }
        };
        if !verify_password(password, &user.password_hash) {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AuthError::InvalidCredentials);
        }
        let tokens = self.issue_pair(&user)?;
        info!(user_id = %user.id, email = %user.email, "user logged in");
        Ok((user, tokens))
    }

    /// Generate a reset code, persist the matching signed token on the user
    /// record and deliver the code out-of-band. If delivery fails, the
    /// pending token is cleared again so neither side effect is observable.
    pub async fn forgot_password(&self, email: &str) -> Result<(), AuthError> {
        let user = self
            .store
            .find_by_email(email)
            .await?
            .ok_or(AuthError::EmailNotFound)?;

        let code = generate_code();
        let reset_token = self.keys.sign_reset(&user.email, &code)?;
        self.store
            .set_pending_reset(user.id, Some(&reset_token))
            .await?;

        let body = format!("Your password reset code is {code}. It expires in 10 minutes.");
        if let Err(e) = self
            .mailer
            .send_message(&user.email, "Password reset code", &body)
            .await
        {
            if let Err(clear_err) = self.store.set_pending_reset(user.id, None).await {
                warn!(error = %clear_err, user_id = %user.id, "failed to clear pending reset");
            }
            return Err(AuthError::Internal(e));
        }

        info!(user_id = %user.id, "reset code sent");
        Ok(())
    }

    /// Exchange the out-of-band code for the pending reset credential. Does
    /// not change the password; the caller presents the returned token to
    /// `update_password`.
    pub async fn reset_password(&self, email: &str, code: &str) -> Result<String, AuthError> {
        if code.is_empty() {
            return Err(AuthError::InvalidCode);
        }
        let pending = self
            .store
            .find_by_email(email)
            .await?
            .and_then(|user| user.pending_reset_token)
            .ok_or(AuthError::InvalidCode)?;

        let claims = self
            .keys
            .verify_reset(&pending)
            .map_err(|_| AuthError::InvalidCode)?;
        if !constant_time_eq(&claims.code, code) {
            warn!(email = %email, "reset code mismatch");
            return Err(AuthError::InvalidCode);
        }
        Ok(pending)
    }

    /// Complete the reset: the presented credential must verify and exactly
    /// match the pending token on the record, which defends against a stale
    /// credential from an earlier, superseded reset request. The generation
    /// bump revokes every outstanding refresh token for the user.
    pub async fn update_password(
        &self,
        reset_token: &str,
        new_password: &str,
    ) -> Result<User, AuthError> {
        if reset_token.is_empty() {
            return Err(AuthError::InvalidResetToken);
        }
        let claims = self
            .keys
            .verify_reset(reset_token)
            .map_err(|_| AuthError::InvalidResetToken)?;
        let user = self
            .store
            .find_by_email(&claims.email)
            .await?
            .ok_or(AuthError::InvalidResetToken)?;
        let pending = user
            .pending_reset_token
            .as_deref()
            .ok_or(AuthError::InvalidResetToken)?;
        if !constant_time_eq(pending, reset_token) {
            warn!(user_id = %user.id, "stale reset credential");
            return Err(AuthError::InvalidResetToken);
        }

        if new_password.len() < MIN_PASSWORD_LEN {
            return Err(AuthError::PasswordTooShort);
        }
        let password_hash = hash_password(new_password)?;
        let updated = self
            .store
            .apply_password_update(user.id, &password_hash, user.generation)
            .await
            .map_err(|e| match e {
                // A concurrent bump means this credential is stale.
                crate::auth::store::StoreError::Conflict => AuthError::InvalidResetToken,
                other => AuthError::from(other),
            })?;
        info!(user_id = %updated.id, generation = updated.generation, "password updated");
        Ok(updated)
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::store::memory::MemoryStore,
        mailer::doubles::{FailingMailer, RecordingMailer},
    };
    use lazy_static::lazy_static;
    use regex::Regex;

    fn test_keys() -> JwtKeys {
        use crate::config::AuthConfig;
        JwtKeys::from_config(&AuthConfig {
            access_secret: "access-secret".into(),
            refresh_secret: "refresh-secret".into(),
            reset_secret: "reset-secret".into(),
            access_ttl_secs: 3600,
            refresh_ttl_secs: 31_536_000,
            reset_ttl_secs: 600,
        })
    }

    fn make_service() -> (AuthService, Arc<MemoryStore>, Arc<RecordingMailer>) {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer::default());
        let service = AuthService::new(store.clone(), mailer.clone(), test_keys());
        (service, store, mailer)
    }

    fn sent_code(mailer: &RecordingMailer) -> String {
        lazy_static! {
            static ref CODE_RE: Regex = Regex::new(r"\b\d{6}\b").unwrap();
        }
        let sent = mailer.sent.lock().unwrap();
        let (_, _, body) = sent.last().expect("a message was sent");
        CODE_RE.find(body).expect("code in body").as_str().to_owned()
    }

    #[tokio::test]
    async fn register_then_login_succeeds_at_generation_zero() {
        let (service, _, _) = make_service();
        service
            .register("a@x.com", "alice", "password1")
            .await
            .expect("register");
        let (_, tokens) = service.login("a@x.com", "password1").await.expect("login");
        let claims = service.keys().verify_access(&tokens.access_token).expect("claims");
        assert_eq!(claims.generation, 0);
        assert_eq!(claims.email, "a@x.com");
    }

    #[tokio::test]
    async fn register_rejects_duplicate_email_regardless_of_username() {
        let (service, _, _) = make_service();
        service
            .register("a@x.com", "alice", "password1")
            .await
            .expect("register");
        let err = service
            .register("a@x.com", "somebody-else", "password2")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmailExists));
    }

    #[tokio::test]
    async fn register_rejects_duplicate_username() {
        let (service, _, _) = make_service();
        service
            .register("a@x.com", "alice", "password1")
            .await
            .expect("register");
        let err = service
            .register("b@x.com", "alice", "password2")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UsernameExists));
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let (service, _, _) = make_service();
        service
            .register("a@x.com", "alice", "password1")
            .await
            .expect("register");
        let unknown = service.login("nobody@x.com", "password1").await.unwrap_err();
        let wrong = service.login("a@x.com", "wrong-password").await.unwrap_err();
        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn reset_password_without_pending_request_fails() {
        let (service, _, _) = make_service();
        service
            .register("a@x.com", "alice", "password1")
            .await
            .expect("register");
        let err = service.reset_password("a@x.com", "000000").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCode));
    }

    #[tokio::test]
    async fn reset_password_rejects_empty_code() {
        let (service, _, mailer) = make_service();
        service
            .register("a@x.com", "alice", "password1")
            .await
            .expect("register");
        service.forgot_password("a@x.com").await.expect("forgot");
        let _ = sent_code(&mailer);
        let err = service.reset_password("a@x.com", "").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCode));
    }

    #[tokio::test]
    async fn forgot_password_unknown_email_fails() {
        let (service, _, _) = make_service();
        let err = service.forgot_password("nobody@x.com").await.unwrap_err();
        assert!(matches!(err, AuthError::EmailNotFound));
    }

    #[tokio::test]
    async fn full_reset_flow_rotates_generation_and_password() {
        let (service, store, mailer) = make_service();
        service
            .register("a@x.com", "alice", "oldPw1234")
            .await
            .expect("register");

        service.forgot_password("a@x.com").await.expect("forgot");
        let code = sent_code(&mailer);

        let credential = service
            .reset_password("a@x.com", &code)
            .await
            .expect("reset");
        let stored = store
            .find_by_email("a@x.com")
            .await
            .unwrap()
            .unwrap()
            .pending_reset_token
            .unwrap();
        assert_eq!(credential, stored);

        let updated = service
            .update_password(&credential, "newPw123")
            .await
            .expect("update");
        assert_eq!(updated.generation, 1);
        assert!(updated.pending_reset_token.is_none());

        service.login("a@x.com", "newPw123").await.expect("new password works");
        let err = service.login("a@x.com", "oldPw1234").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn reset_password_rejects_wrong_code() {
        let (service, _, mailer) = make_service();
        service
            .register("a@x.com", "alice", "password1")
            .await
            .expect("register");
        service.forgot_password("a@x.com").await.expect("forgot");
        let code = sent_code(&mailer);
        let wrong = if code == "000000" { "000001" } else { "000000" };
        let err = service.reset_password("a@x.com", wrong).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCode));
    }

    #[tokio::test]
    async fn stale_reset_credential_is_rejected_after_a_newer_request() {
        let (service, _, mailer) = make_service();
        service
            .register("a@x.com", "alice", "password1")
            .await
            .expect("register");

        service.forgot_password("a@x.com").await.expect("first forgot");
        let first_code = sent_code(&mailer);
        let first_credential = service
            .reset_password("a@x.com", &first_code)
            .await
            .expect("first reset");

        // A later request replaces the pending token.
        service.forgot_password("a@x.com").await.expect("second forgot");

        let err = service
            .update_password(&first_credential, "newPw123")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidResetToken));
    }

    #[tokio::test]
    async fn update_password_rejects_garbage_credential() {
        let (service, _, _) = make_service();
        let err = service
            .update_password("not-a-token", "newPw123")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidResetToken));
        let err = service.update_password("", "newPw123").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidResetToken));
    }

    #[tokio::test]
    async fn failed_delivery_leaves_no_pending_reset() {
        let store = Arc::new(MemoryStore::new());
        let service = AuthService::new(store.clone(), Arc::new(FailingMailer), test_keys());
        service
            .register("a@x.com", "alice", "password1")
            .await
            .expect("register");

        let err = service.forgot_password("a@x.com").await.unwrap_err();
        assert!(matches!(err, AuthError::Internal(_)));

        let user = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert!(user.pending_reset_token.is_none());
    }

    #[tokio::test]
    async fn short_passwords_are_rejected() {
        let (service, _, mailer) = make_service();
        let err = service.register("a@x.com", "alice", "short").await.unwrap_err();
        assert!(matches!(err, AuthError::PasswordTooShort));

        service
            .register("a@x.com", "alice", "password1")
            .await
            .expect("register");
        service.forgot_password("a@x.com").await.expect("forgot");
        let code = sent_code(&mailer);
        let credential = service.reset_password("a@x.com", &code).await.expect("reset");
        let err = service.update_password(&credential, "tiny").await.unwrap_err();
        assert!(matches!(err, AuthError::PasswordTooShort));
    }
}
