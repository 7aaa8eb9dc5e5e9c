//! # User
//!
//! Registered account records. Passwords are stored as salted bcrypt hashes;
//! users are never deleted.

use sqlx::PgPool;

use crate::errors::DcalcResult;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub hash: String,
}

impl User {
    /// Insert a new account. A duplicate username surfaces as a unique
    /// violation.
    pub async fn create(pool: &PgPool, username: &str, hash: &str) -> DcalcResult<User> {
        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (username, hash) VALUES ($1, $2) RETURNING id, username, hash",
        )
        .bind(username)
        .bind(hash)
        .fetch_one(pool)
        .await?;
        Ok(user)
    }

    pub async fn find_by_username(pool: &PgPool, username: &str) -> DcalcResult<Option<User>> {
        let user =
            sqlx::query_as::<_, User>("SELECT id, username, hash FROM users WHERE username = $1")
                .bind(username)
                .fetch_optional(pool)
                .await?;
        Ok(user)
    }

    pub async fn id_for_username(pool: &PgPool, username: &str) -> DcalcResult<Option<i32>> {
        let id = sqlx::query_scalar::<_, i32>("SELECT id FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(pool)
            .await?;
        Ok(id)
    }

    /// Every registered userid; the recovery loop folds their operator
    /// timeouts into the global maximum.
    pub async fn all_ids(pool: &PgPool) -> DcalcResult<Vec<i32>> {
        let ids = sqlx::query_scalar::<_, i32>("SELECT id FROM users")
            .fetch_all(pool)
            .await?;
        Ok(ids)
    }
}
