//! User directory
//!
//! Profiles handed over by the auth layer, stored in SQLite. The AI contact
//! is synthetic and never written here.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::info;

use crate::models::{is_ai_user, User};

type UserRow = (String, String, Option<String>, String);

pub struct UserDirectory {
    pool: SqlitePool,
}

impl UserDirectory {
    /// Open (or create) the user database
    pub async fn new(db_path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open user database {:?}", db_path))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                full_name TEXT NOT NULL,
                profile_pic TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        info!("[Users] Initialized at {:?}", db_path);

        Ok(Self { pool })
    }

    /// Insert or update a profile. `created_at` of an existing row is kept.
    pub async fn upsert(&self, id: &str, full_name: &str, profile_pic: Option<&str>) -> Result<User> {
        anyhow::ensure!(!is_ai_user(id), "the AI contact cannot be stored");

        sqlx::query(
            r#"
            INSERT INTO users (id, full_name, profile_pic, created_at) VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET full_name = excluded.full_name, profile_pic = excluded.profile_pic
            "#,
        )
        .bind(id)
        .bind(full_name)
        .bind(profile_pic)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.get(id)
            .await?
            .context("User vanished after upsert")
    }

    pub async fn get(&self, id: &str) -> Result<Option<User>> {
        if is_ai_user(id) {
            return Ok(Some(User::ai_contact()));
        }

        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, full_name, profile_pic, created_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(user_from_row).transpose()
    }

    /// Everyone `id` can chat with: the AI contact first, then other users
    pub async fn contacts_for(&self, id: &str) -> Result<Vec<User>> {
        let rows: Vec<UserRow> = sqlx::query_as(
            "SELECT id, full_name, profile_pic, created_at FROM users WHERE id != ? ORDER BY full_name",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let mut contacts = vec![User::ai_contact()];
        for row in rows {
            contacts.push(user_from_row(row)?);
        }
        Ok(contacts)
    }
}

fn user_from_row((id, full_name, profile_pic, created_at): UserRow) -> Result<User> {
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .with_context(|| format!("Bad created_at for user {}", id))?
        .with_timezone(&Utc);
    Ok(User {
        id,
        full_name,
        profile_pic,
        is_ai: false,
        created_at,
    })
}
