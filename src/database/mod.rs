use anyhow::Result;
use sqlx::{Row, Sqlite, SqlitePool, migrate::MigrateDatabase};
use std::collections::HashSet;
use tracing::info;

use crate::models::Post;

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        // Create database file if it doesn't exist
        if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
            info!("Creating database file");
            Sqlite::create_database(db_url).await?;
        }

        let pool = SqlitePool::connect(db_url).await?;

        // Run migrations
        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("Database initialized successfully");
        Ok(Self { pool })
    }

    /// Ids of every post already persisted, for cross-run de-duplication
    pub async fn get_existing_post_ids(&self) -> Result<HashSet<String>> {
        let rows = sqlx::query("SELECT id FROM posts")
            .fetch_all(&self.pool)
            .await?;

        let ids = rows
            .into_iter()
            .map(|row| row.get::<String, _>("id"))
            .collect();

        Ok(ids)
    }

    pub async fn save_post(&self, post: &Post) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO posts (id, account, url, text, likes, timestamp, discovered_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&post.id)
        .bind(&post.account)
        .bind(&post.url)
        .bind(&post.text)
        .bind(post.likes)
        .bind(&post.timestamp)
        .bind(post.discovered_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}
