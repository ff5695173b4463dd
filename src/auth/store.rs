use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// A user record as persisted by the store. The core only reads and
/// mutates `password_hash`, `generation` and `pending_reset_token`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub generation: i32,
    pub pending_reset_token: Option<String>,
    pub created_at: OffsetDateTime,
}

pub struct NewUser<'a> {
    pub email: &'a str,
    pub username: &'a str,
    pub password_hash: &'a str,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already exists")]
    DuplicateEmail,
    #[error("username already exists")]
    DuplicateUsername,
    #[error("user not found")]
    NotFound,
    #[error("concurrent update conflict")]
    Conflict,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Persistence boundary for user records. Uniqueness and the generation
/// compare-and-swap are enforced inside the store so that register and
/// update-password stay atomic under concurrent requests.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Insert a new user at generation 0. Unique-constraint violations
    /// surface as `DuplicateEmail` / `DuplicateUsername`.
    async fn create(&self, new: NewUser<'_>) -> Result<User, StoreError>;

    /// Set or clear the pending reset token on a user record.
    async fn set_pending_reset(&self, id: Uuid, token: Option<&str>)
        -> Result<(), StoreError>;

    /// Replace the password hash, bump the generation counter and clear
    /// the pending reset token in one atomic update, guarded by the
    /// expected generation. A stale expectation yields `Conflict`.
    async fn apply_password_update(
        &self,
        id: Uuid,
        password_hash: &str,
        expected_generation: i32,
    ) -> Result<User, StoreError>;
}

pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const USER_COLUMNS: &str =
    "id, email, username, password_hash, generation, pending_reset_token, created_at";

fn translate_unique_violation(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.constraint() {
            Some("users_email_key") => return StoreError::DuplicateEmail,
            Some("users_username_key") => return StoreError::DuplicateUsername,
            _ => {}
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn create(&self, new: NewUser<'_>) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, username, password_hash) \
             VALUES ($1, $2, $3) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(new.email)
        .bind(new.username)
        .bind(new.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(translate_unique_violation)?;
        Ok(user)
    }

    async fn set_pending_reset(
        &self,
        id: Uuid,
        token: Option<&str>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET pending_reset_token = $2 WHERE id = $1")
            .bind(id)
            .bind(token)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn apply_password_update(
        &self,
        id: Uuid,
        password_hash: &str,
        expected_generation: i32,
    ) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users \
             SET password_hash = $2, generation = generation + 1, pending_reset_token = NULL \
             WHERE id = $1 AND generation = $3 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(password_hash)
        .bind(expected_generation)
        .fetch_optional(&self.db)
        .await?;
        user.ok_or(StoreError::Conflict)
    }
}

#[cfg(test)]
pub(crate) mod memory {
    //! In-memory store double used by service and session tests.

    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct MemoryStore {
        users: Mutex<Vec<User>>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl UserStore for MemoryStore {
        async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
            let users = self.users.lock().unwrap();
            Ok(users.iter().find(|u| u.email == email).cloned())
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
            let users = self.users.lock().unwrap();
            Ok(users.iter().find(|u| u.id == id).cloned())
        }

        async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
            let users = self.users.lock().unwrap();
            Ok(users.iter().find(|u| u.username == username).cloned())
        }

        async fn create(&self, new: NewUser<'_>) -> Result<User, StoreError> {
            let mut users = self.users.lock().unwrap();
            if users.iter().any(|u| u.email == new.email) {
                return Err(StoreError::DuplicateEmail);
            }
            if users.iter().any(|u| u.username == new.username) {
                return Err(StoreError::DuplicateUsername);
            }
            let user = User {
                id: Uuid::new_v4(),
                email: new.email.to_owned(),
                username: new.username.to_owned(),
                password_hash: new.password_hash.to_owned(),
                generation: 0,
                pending_reset_token: None,
                created_at: OffsetDateTime::now_utc(),
            };
            users.push(user.clone());
            Ok(user)
        }

        async fn set_pending_reset(
            &self,
            id: Uuid,
            token: Option<&str>,
        ) -> Result<(), StoreError> {
            let mut users = self.users.lock().unwrap();
            let user = users
                .iter_mut()
                .find(|u| u.id == id)
                .ok_or(StoreError::NotFound)?;
            user.pending_reset_token = token.map(str::to_owned);
            Ok(())
        }

        async fn apply_password_update(
            &self,
            id: Uuid,
            password_hash: &str,
            expected_generation: i32,
        ) -> Result<User, StoreError> {
            let mut users = self.users.lock().unwrap();
            let user = users
                .iter_mut()
                .find(|u| u.id == id && u.generation == expected_generation)
                .ok_or(StoreError::Conflict)?;
            user.password_hash = password_hash.to_owned();
            user.generation += 1;
            user.pending_reset_token = None;
            Ok(user.clone())
        }
    }
}
