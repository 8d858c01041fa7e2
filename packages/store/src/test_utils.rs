// ABOUTME: Shared fixtures for storage and API tests

use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

/// In-memory pool capped at one connection so every query hits the same
/// database instance.
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("Failed to create in-memory pool");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

pub async fn seed_user(pool: &SqlitePool, username: &str) -> String {
    seed_user_with_role(pool, username, "user").await
}

pub async fn seed_user_with_role(pool: &SqlitePool, username: &str, role: &str) -> String {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO users (id, username, email, password_hash, role, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(username)
    .bind(format!("{username}@example.com"))
    .bind("test-hash")
    .bind(role)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .expect("Failed to seed user");

    id
}
