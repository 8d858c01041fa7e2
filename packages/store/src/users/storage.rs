// ABOUTME: Account registration, credential checks, and bearer sessions
// ABOUTME: Passwords are salted SHA-256; only token hashes touch the database

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

use super::types::{Role, SessionToken, User};
use crate::storage::{StorageError, StorageResult};

const SESSION_TTL_DAYS: i64 = 7;

pub struct UserStorage {
    pool: SqlitePool,
}

impl UserStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Salted hash stored as `{salt_hex}${digest_hex}`
    fn hash_password(password: &str) -> String {
        let mut rng = rand::thread_rng();
        let salt: [u8; 16] = rng.gen();
        let salt_hex = hex::encode(salt);

        let mut hasher = Sha256::new();
        hasher.update(salt_hex.as_bytes());
        hasher.update(password.as_bytes());
        let digest = hex::encode(hasher.finalize());

        format!("{salt_hex}${digest}")
    }

    fn verify_password(password: &str, stored: &str) -> bool {
        let Some((salt_hex, expected)) = stored.split_once('$') else {
            return false;
        };

        let mut hasher = Sha256::new();
        hasher.update(salt_hex.as_bytes());
        hasher.update(password.as_bytes());
        let computed = hex::encode(hasher.finalize());

        // Constant-time comparison to prevent timing attacks
        use subtle::ConstantTimeEq;
        computed.as_bytes().ct_eq(expected.as_bytes()).into()
    }

    fn generate_session_token() -> String {
        let mut rng = rand::thread_rng();
        let random_bytes: [u8; 32] = rng.gen();
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random_bytes)
    }

    fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> StorageResult<User> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let password_hash = Self::hash_password(password);

        let result = sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, role, created_at, updated_at)
            VALUES (?, ?, ?, ?, 'user', ?, ?)
            "#,
        )
        .bind(&id)
        .bind(username)
        .bind(email)
        .bind(&password_hash)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!("Registered user {}", username);
                self.get_user(&id).await
            }
            Err(e) if StorageError::is_unique_violation(&e) => {
                let field = e
                    .as_database_error()
                    .map(|db| db.message().contains("users.username"))
                    .unwrap_or(false);
                Err(StorageError::Duplicate(if field { "username" } else { "email" }))
            }
            Err(e) => Err(StorageError::Sqlx(e)),
        }
    }

    pub async fn get_user(&self, id: &str) -> StorageResult<User> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?
            .ok_or(StorageError::NotFound("user"))?;

        row_to_user(&row)
    }

    /// Check credentials; `None` means unknown username or wrong password.
    pub async fn verify_login(
        &self,
        username: &str,
        password: &str,
    ) -> StorageResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let stored: String = row.try_get("password_hash")?;
        if !Self::verify_password(password, &stored) {
            return Ok(None);
        }

        Ok(Some(row_to_user(&row)?))
    }

    /// Open a bearer session for the user. The opaque token goes to the
    /// client; only its hash is stored.
    pub async fn create_session(&self, user_id: &str) -> StorageResult<SessionToken> {
        let token = Self::generate_session_token();
        let token_hash = Self::hash_token(&token);
        let now = Utc::now();
        let expires_at = now + Duration::days(SESSION_TTL_DAYS);

        // Expired rows pile up otherwise; sweep them while we are here
        sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, token_hash, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(&token_hash)
        .bind(now.to_rfc3339())
        .bind(expires_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        Ok(SessionToken { token, expires_at })
    }

    /// Resolve a bearer token to its user; `None` for unknown or expired
    /// sessions.
    pub async fn authenticate(&self, token: &str) -> StorageResult<Option<User>> {
        let token_hash = Self::hash_token(token);
        let now = Utc::now().to_rfc3339();

        let row = sqlx::query(
            r#"
            SELECT u.* FROM users u
            JOIN sessions s ON s.user_id = u.id
            WHERE s.token_hash = ? AND s.expires_at > ?
            "#,
        )
        .bind(&token_hash)
        .bind(&now)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        row.as_ref().map(row_to_user).transpose()
    }

    pub async fn revoke_session(&self, token: &str) -> StorageResult<()> {
        let token_hash = Self::hash_token(token);
        sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(&token_hash)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;
        Ok(())
    }

    pub async fn set_role(&self, user_id: &str, role: Role) -> StorageResult<()> {
        let result = sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound("user"));
        }
        Ok(())
    }
}

fn row_to_user(row: &SqliteRow) -> StorageResult<User> {
    let role: String = row.try_get("role")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        role: Role::from_str(&role).map_err(StorageError::Database)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StorageError::Database(format!("invalid created_at: {e}")))?,
    })
}
