//! Persistent post queue backed by SQLite
//!
//! The store is the single source of truth for scheduled posts. It exposes
//! plain CRUD plus the atomic per-row primitives the scheduler builds its
//! coordination on: lease acquisition, lease-guarded publish completion,
//! and the publishing-guarded mutations backing the Conflict rule. It holds
//! no scheduling policy itself.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Result, StoreError};
use crate::types::{PostStatus, PublishRecord, ScheduledPost};

#[derive(Clone)]
pub struct PostStore {
    pool: SqlitePool,
}

impl PostStore {
    /// Open (or create) the store at the given filesystem path.
    pub async fn connect(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(StoreError::IoError)?;
        }

        // foreign_keys must be set per connection, so it goes on the
        // connect options rather than a one-off PRAGMA.
        let options = SqliteConnectOptions::new()
            .filename(&expanded_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(StoreError::SqlxError)?;

        Self::from_pool(pool).await
    }

    /// Open an in-memory store for tests.
    ///
    /// Limited to a single connection so every query sees the same
    /// database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(StoreError::SqlxError)?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(StoreError::SqlxError)?;

        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(StoreError::MigrationError)?;

        Ok(Self { pool })
    }

    /// Upsert a post by id, replacing every column.
    pub async fn put(&self, post: &ScheduledPost) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO posts
                (id, caption, platforms, scheduled_for, status, created_at,
                 published_at, attempts, lease_token, lease_expiry)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                caption = excluded.caption,
                platforms = excluded.platforms,
                scheduled_for = excluded.scheduled_for,
                status = excluded.status,
                published_at = excluded.published_at,
                attempts = excluded.attempts,
                lease_token = excluded.lease_token,
                lease_expiry = excluded.lease_expiry
            "#,
        )
        .bind(&post.id)
        .bind(&post.caption)
        .bind(encode_platforms(&post.platforms)?)
        .bind(post.scheduled_for)
        .bind(post.status.as_str())
        .bind(post.created_at)
        .bind(post.published_at)
        .bind(post.attempts as i64)
        .bind(&post.lease_token)
        .bind(post.lease_expiry)
        .execute(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        Ok(())
    }

    /// Upsert a post unless the existing record is mid-publish.
    ///
    /// Returns false when the row exists and is currently `publishing`; the
    /// caller maps that to a Conflict. On replacement the original
    /// `created_at` is preserved.
    pub async fn upsert_unless_publishing(&self, post: &ScheduledPost) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO posts
                (id, caption, platforms, scheduled_for, status, created_at,
                 published_at, attempts, lease_token, lease_expiry)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, NULL)
            ON CONFLICT(id) DO UPDATE SET
                caption = excluded.caption,
                platforms = excluded.platforms,
                scheduled_for = excluded.scheduled_for,
                status = excluded.status,
                published_at = excluded.published_at,
                attempts = excluded.attempts,
                lease_token = NULL,
                lease_expiry = NULL
            WHERE posts.status != 'publishing'
            "#,
        )
        .bind(&post.id)
        .bind(&post.caption)
        .bind(encode_platforms(&post.platforms)?)
        .bind(post.scheduled_for)
        .bind(post.status.as_str())
        .bind(post.created_at)
        .bind(post.published_at)
        .bind(post.attempts as i64)
        .execute(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    /// Get a post by id, or a NotFound error.
    pub async fn get(&self, post_id: &str) -> Result<ScheduledPost> {
        self.try_get(post_id).await?.ok_or_else(|| {
            crate::error::LatercastError::NotFound(format!("no post with id {}", post_id))
        })
    }

    /// Get a post by id, None when absent.
    pub async fn try_get(&self, post_id: &str) -> Result<Option<ScheduledPost>> {
        let row = sqlx::query(
            r#"
            SELECT id, caption, platforms, scheduled_for, status, created_at,
                   published_at, attempts, lease_token, lease_expiry
            FROM posts WHERE id = ?
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        row.map(row_to_post).transpose()
    }

    /// Delete a post by id. A no-op when the post does not exist.
    pub async fn delete(&self, post_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::SqlxError)?;

        Ok(())
    }

    /// Delete a post unless it is mid-publish.
    ///
    /// Returns false only when the row exists and is `publishing`; deleting
    /// an absent post is an Ok no-op.
    pub async fn delete_unless_publishing(&self, post_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ? AND status != 'publishing'")
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::SqlxError)?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        // Nothing deleted: either the post is absent (fine) or publishing.
        Ok(self.try_get(post_id).await?.is_none())
    }

    /// All posts with the given status.
    pub async fn list_by_status(&self, status: PostStatus) -> Result<Vec<ScheduledPost>> {
        let rows = sqlx::query(
            r#"
            SELECT id, caption, platforms, scheduled_for, status, created_at,
                   published_at, attempts, lease_token, lease_expiry
            FROM posts WHERE status = ?
            ORDER BY scheduled_for ASC
            "#,
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        rows.into_iter().map(row_to_post).collect()
    }

    /// Posts with the given status whose scheduled time has passed.
    pub async fn list_due_before(
        &self,
        timestamp: i64,
        status: PostStatus,
    ) -> Result<Vec<ScheduledPost>> {
        let rows = sqlx::query(
            r#"
            SELECT id, caption, platforms, scheduled_for, status, created_at,
                   published_at, attempts, lease_token, lease_expiry
            FROM posts WHERE status = ? AND scheduled_for <= ?
            ORDER BY scheduled_for ASC
            "#,
        )
        .bind(status.as_str())
        .bind(timestamp)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        rows.into_iter().map(row_to_post).collect()
    }

    /// Posts stuck in `publishing` whose lease has expired.
    ///
    /// Their previous holder crashed or stalled mid-publish; a later
    /// reconciliation pass may re-lease them.
    pub async fn list_expired_leases(&self, now: i64) -> Result<Vec<ScheduledPost>> {
        let rows = sqlx::query(
            r#"
            SELECT id, caption, platforms, scheduled_for, status, created_at,
                   published_at, attempts, lease_token, lease_expiry
            FROM posts
            WHERE status = 'publishing'
              AND lease_expiry IS NOT NULL
              AND lease_expiry <= ?
            ORDER BY scheduled_for ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        rows.into_iter().map(row_to_post).collect()
    }

    /// Atomically claim a post for one publish pass.
    ///
    /// The transition succeeds iff the row is `scheduled`, or `publishing`
    /// under an expired lease. Returns false when another in-flight pass
    /// holds a live lease; the caller must then skip the post.
    pub async fn acquire_lease(
        &self,
        post_id: &str,
        token: &str,
        expiry: i64,
        now: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE posts
            SET status = 'publishing', lease_token = ?, lease_expiry = ?
            WHERE id = ?
              AND (status = 'scheduled'
                   OR (status = 'publishing'
                       AND lease_expiry IS NOT NULL
                       AND lease_expiry <= ?))
            "#,
        )
        .bind(token)
        .bind(expiry)
        .bind(post_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    /// Commit the outcome of a publish pass and release the lease.
    ///
    /// Guarded by the lease token: returns false without writing anything
    /// when the lease was lost to a newer pass (this holder's outcome is
    /// then discarded). Writes the post's next status, bumps `attempts`,
    /// preserves an already-set `published_at`, optionally re-queues the
    /// post at `rescheduled_for`, and inserts one record per platform
    /// attempt, all in a single transaction.
    pub async fn complete_publish(
        &self,
        post_id: &str,
        token: &str,
        status: PostStatus,
        published_at: Option<i64>,
        rescheduled_for: Option<i64>,
        records: &[PublishRecord],
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(StoreError::SqlxError)?;

        let result = sqlx::query(
            r#"
            UPDATE posts
            SET status = ?,
                published_at = COALESCE(published_at, ?),
                scheduled_for = COALESCE(?, scheduled_for),
                attempts = attempts + 1,
                lease_token = NULL,
                lease_expiry = NULL
            WHERE id = ? AND lease_token = ?
            "#,
        )
        .bind(status.as_str())
        .bind(published_at)
        .bind(rescheduled_for)
        .bind(post_id)
        .bind(token)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::SqlxError)?;

        if result.rows_affected() == 0 {
            tx.rollback().await.map_err(StoreError::SqlxError)?;
            return Ok(false);
        }

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO publish_records
                    (post_id, platform, success, error_message, attempted_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.post_id)
            .bind(&record.platform)
            .bind(record.success as i32)
            .bind(&record.error_message)
            .bind(record.attempted_at)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::SqlxError)?;
        }

        tx.commit().await.map_err(StoreError::SqlxError)?;
        Ok(true)
    }

    /// All publish records for a post, most recent attempt first.
    pub async fn get_publish_records(&self, post_id: &str) -> Result<Vec<PublishRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, post_id, platform, success, error_message, attempted_at
            FROM publish_records
            WHERE post_id = ?
            ORDER BY attempted_at DESC, id DESC
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        Ok(rows
            .iter()
            .map(|r| PublishRecord {
                id: r.get("id"),
                post_id: r.get("post_id"),
                platform: r.get("platform"),
                success: r.get::<i32, _>("success") != 0,
                error_message: r.get("error_message"),
                attempted_at: r.get("attempted_at"),
            })
            .collect())
    }

    /// Post counts per status, for queue statistics.
    pub async fn status_counts(&self) -> Result<Vec<(PostStatus, i64)>> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM posts GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::SqlxError)?;

        let mut counts = Vec::new();
        for row in rows {
            let status: String = row.get("status");
            let status = status
                .parse::<PostStatus>()
                .map_err(StoreError::CorruptRecord)?;
            counts.push((status, row.get::<i64, _>("n")));
        }
        Ok(counts)
    }
}

fn encode_platforms(platforms: &[String]) -> Result<String> {
    serde_json::to_string(platforms)
        .map_err(|e| StoreError::CorruptRecord(format!("platforms not encodable: {}", e)).into())
}

fn row_to_post(row: sqlx::sqlite::SqliteRow) -> Result<ScheduledPost> {
    let platforms_json: String = row.get("platforms");
    let platforms: Vec<String> = serde_json::from_str(&platforms_json).map_err(|e| {
        StoreError::CorruptRecord(format!("bad platforms column: {}", e))
    })?;

    let status: String = row.get("status");
    let status = status
        .parse::<PostStatus>()
        .map_err(StoreError::CorruptRecord)?;

    Ok(ScheduledPost {
        id: row.get("id"),
        caption: row.get("caption"),
        platforms,
        scheduled_for: row.get("scheduled_for"),
        status,
        created_at: row.get("created_at"),
        published_at: row.get("published_at"),
        attempts: row.get::<i64, _>("attempts") as u32,
        lease_token: row.get("lease_token"),
        lease_expiry: row.get("lease_expiry"),
    })
}
