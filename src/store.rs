// src/store.rs
//
// Durable record store over SQLite. One row per (source, source_id);
// re-ingesting a known key updates the mutable columns in place. The
// processed flag stages rows for the transform half of the pipeline.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::error::Result;

/// Columns `get_all` may order by. A closed enum instead of a raw
/// string: unknown caller input can only ever become one of these, so
/// nothing caller-controlled reaches the SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderBy {
    Id,
    Source,
    SourceId,
    Title,
    Score,
    CreatedAt,
    UpdatedAt,
}

impl OrderBy {
    /// Maps a column name to its variant; anything unknown falls back
    /// to ordering by score, mirroring ingest CLI behavior.
    pub fn parse(name: &str) -> OrderBy {
        match name {
            "id" => OrderBy::Id,
            "source" => OrderBy::Source,
            "source_id" => OrderBy::SourceId,
            "title" => OrderBy::Title,
            "created_at" => OrderBy::CreatedAt,
            "updated_at" => OrderBy::UpdatedAt,
            _ => OrderBy::Score,
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            OrderBy::Id => "id",
            OrderBy::Source => "source",
            OrderBy::SourceId => "source_id",
            OrderBy::Title => "title",
            OrderBy::Score => "score",
            OrderBy::CreatedAt => "created_at",
            OrderBy::UpdatedAt => "updated_at",
        }
    }
}

impl Default for OrderBy {
    fn default() -> Self {
        OrderBy::Score
    }
}

/// One persisted item.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SourceRecord {
    pub id: i64,
    pub source: String,
    pub source_id: String,
    pub title: String,
    pub description: Option<String>,
    pub tags: Option<String>,
    pub score: Option<f64>,
    pub metrics_blob: Option<String>,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for `upsert`. Identity plus the mutable columns;
/// the store owns `id`, `processed` and both timestamps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewRecord {
    pub source: String,
    pub source_id: String,
    pub title: String,
    pub description: Option<String>,
    pub tags: Option<String>,
    pub score: Option<f64>,
    pub metrics_blob: Option<String>,
}

impl NewRecord {
    pub fn new(
        source: impl Into<String>,
        source_id: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            source_id: source_id.into(),
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = Some(tags.into());
        self
    }

    pub fn score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn metrics_blob(mut self, blob: impl Into<String>) -> Self {
        self.metrics_blob = Some(blob.into());
        self
    }
}

/// What a call to `upsert` did with the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// SQLite-backed store. Cheap to clone; all clones share one pool.
/// Every operation is its own implicit transaction, so concurrent
/// ingesters never wait on a long-lived batch transaction.
#[derive(Clone)]
pub struct RecordStore {
    pool: SqlitePool,
}

impl RecordStore {
    /// Opens (or creates) the database at `database_url` and applies
    /// the schema. URLs look like `sqlite://path/to/db.s3db?mode=rwc`
    /// or `sqlite::memory:` for tests.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let mut options = SqlitePoolOptions::new().max_connections(5);
        if database_url.contains(":memory:") {
            // Every pooled connection to :memory: is its own database;
            // pin a single long-lived connection so all operations see one.
            options = options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = options.connect(database_url).await?;

        sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
        // WAL lets concurrent per-platform ingesters read while one
        // writes; a no-op for in-memory databases.
        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

        let store = Self { pool };
        store.apply_schema().await?;
        info!(database_url, "record store ready");
        Ok(store)
    }

    /// Wraps an existing pool (tests, embedders owning their pool).
    /// The schema is still applied idempotently.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.apply_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn apply_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS source_records (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                source       TEXT NOT NULL,
                source_id    TEXT NOT NULL,
                title        TEXT NOT NULL,
                description  TEXT,
                tags         TEXT,
                score        REAL,
                metrics_blob TEXT,
                processed    INTEGER NOT NULL DEFAULT 0,
                created_at   TEXT NOT NULL,
                updated_at   TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_source_records_key
             ON source_records(source, source_id)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_source_records_processed
             ON source_records(processed)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_source_records_source
             ON source_records(source)",
        )
        .execute(&self.pool)
        .await?;

        debug!("source_records schema applied");
        Ok(())
    }

    /// Inserts the record, or updates the mutable columns if the
    /// `(source, source_id)` key already exists. One atomic statement:
    /// two ingesters racing on the same key resolve to one insert and
    /// one update inside SQLite, with no window for a duplicate row or
    /// a uniqueness error.
    ///
    /// The update arm never touches `id`, `processed` or `created_at`,
    /// so the insert arm binding one timestamp to both columns makes
    /// `created_at == updated_at` the insert signature.
    pub async fn upsert(&self, record: &NewRecord) -> Result<UpsertOutcome> {
        let now = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO source_records
                (source, source_id, title, description, tags, score, metrics_blob,
                 processed, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
            ON CONFLICT(source, source_id) DO UPDATE SET
                title        = excluded.title,
                description  = excluded.description,
                tags         = excluded.tags,
                score        = excluded.score,
                metrics_blob = excluded.metrics_blob,
                updated_at   = excluded.updated_at
            RETURNING created_at, updated_at
            "#,
        )
        .bind(&record.source)
        .bind(&record.source_id)
        .bind(&record.title)
        .bind(&record.description)
        .bind(&record.tags)
        .bind(record.score)
        .bind(&record.metrics_blob)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;
        if created_at == updated_at {
            Ok(UpsertOutcome::Inserted)
        } else {
            Ok(UpsertOutcome::Updated)
        }
    }

    /// Fetches up to `limit` records, best first by the chosen column.
    pub async fn get_all(&self, limit: i64, order_by: OrderBy) -> Result<Vec<SourceRecord>> {
        let sql = format!(
            "SELECT * FROM source_records ORDER BY {} DESC LIMIT ?",
            order_by.column()
        );
        let records = sqlx::query_as::<_, SourceRecord>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    pub async fn get_by_key(&self, source: &str, source_id: &str) -> Result<Option<SourceRecord>> {
        let record = sqlx::query_as::<_, SourceRecord>(
            "SELECT * FROM source_records WHERE source = ? AND source_id = ?",
        )
        .bind(source)
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Rows not yet handed downstream, oldest first so resumed runs
    /// drain the backlog in ingestion order.
    pub async fn get_unprocessed(&self, limit: i64) -> Result<Vec<SourceRecord>> {
        let records = sqlx::query_as::<_, SourceRecord>(
            "SELECT * FROM source_records WHERE processed = 0 ORDER BY id ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// Advances one record to the processed state. Returns `true` when
    /// this call performed the transition; `false` for an unknown id
    /// or one already processed. There is no way back: the flag guards
    /// against duplicate emission, not against reprocessing by hand.
    pub async fn mark_processed(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE source_records SET processed = 1, updated_at = ?
             WHERE id = ? AND processed = 0",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn count(&self) -> Result<i64> {
        let n = sqlx::query_scalar("SELECT COUNT(*) FROM source_records")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn count_by_source(&self, source: &str) -> Result<i64> {
        let n = sqlx::query_scalar("SELECT COUNT(*) FROM source_records WHERE source = ?")
            .bind(source)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn count_unprocessed(&self) -> Result<i64> {
        let n = sqlx::query_scalar("SELECT COUNT(*) FROM source_records WHERE processed = 0")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    /// Deletes every record, returning how many were removed.
    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM source_records")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_store() -> RecordStore {
        RecordStore::connect("sqlite::memory:")
            .await
            .expect("in-memory store")
    }

    #[test]
    fn order_by_rejects_unknown_columns() {
        assert_eq!(OrderBy::parse("score"), OrderBy::Score);
        assert_eq!(OrderBy::parse("created_at"), OrderBy::CreatedAt);
        // Injection attempts and typos collapse to the default.
        assert_eq!(OrderBy::parse("score; DROP TABLE source_records"), OrderBy::Score);
        assert_eq!(OrderBy::parse(""), OrderBy::Score);
        assert_eq!(OrderBy::default().column(), "score");
    }

    #[tokio::test]
    async fn upsert_classifies_insert_then_update() {
        let store = setup_store().await;
        let first = store
            .upsert(&NewRecord::new("hackernews_frontpage", "100", "First title").score(50.0))
            .await
            .unwrap();
        assert_eq!(first, UpsertOutcome::Inserted);

        let second = store
            .upsert(&NewRecord::new("hackernews_frontpage", "100", "Second title").score(100.0))
            .await
            .unwrap();
        assert_eq!(second, UpsertOutcome::Updated);

        assert_eq!(store.count().await.unwrap(), 1);
        let row = store
            .get_by_key("hackernews_frontpage", "100")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.title, "Second title");
        assert_eq!(row.score, Some(100.0));
        assert!(row.updated_at > row.created_at);
    }

    #[tokio::test]
    async fn same_id_under_different_sources_is_two_rows() {
        let store = setup_store().await;
        store
            .upsert(&NewRecord::new("reddit_rising", "abc", "A"))
            .await
            .unwrap();
        store
            .upsert(&NewRecord::new("reddit_search", "abc", "B"))
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(store.count_by_source("reddit_rising").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn mark_processed_is_one_way_and_idempotent() {
        let store = setup_store().await;
        store
            .upsert(&NewRecord::new("tiktok_trending", "v1", "Clip"))
            .await
            .unwrap();
        let row = store.get_unprocessed(10).await.unwrap().remove(0);
        assert!(!row.processed);

        assert!(store.mark_processed(row.id).await.unwrap());
        assert!(!store.mark_processed(row.id).await.unwrap());
        assert!(!store.mark_processed(9999).await.unwrap());

        assert!(store.get_unprocessed(10).await.unwrap().is_empty());
        assert_eq!(store.count_unprocessed().await.unwrap(), 0);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn upsert_preserves_processed_flag() {
        let store = setup_store().await;
        store
            .upsert(&NewRecord::new("medium_tag", "m1", "Post"))
            .await
            .unwrap();
        let id = store.get_unprocessed(1).await.unwrap()[0].id;
        store.mark_processed(id).await.unwrap();

        // Re-ingesting the same key must not resurrect the row.
        store
            .upsert(&NewRecord::new("medium_tag", "m1", "Post v2"))
            .await
            .unwrap();
        assert!(store.get_unprocessed(10).await.unwrap().is_empty());
        let row = store.get_by_key("medium_tag", "m1").await.unwrap().unwrap();
        assert!(row.processed);
        assert_eq!(row.title, "Post v2");
    }

    #[tokio::test]
    async fn get_all_orders_descending() {
        let store = setup_store().await;
        for (id, score) in [("a", 10.0), ("b", 30.0), ("c", 20.0)] {
            store
                .upsert(&NewRecord::new("kick_trending", id, id).score(score))
                .await
                .unwrap();
        }
        let by_score = store.get_all(10, OrderBy::Score).await.unwrap();
        let ids: Vec<&str> = by_score.iter().map(|r| r.source_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);

        let top_one = store.get_all(1, OrderBy::Score).await.unwrap();
        assert_eq!(top_one.len(), 1);
        assert_eq!(top_one[0].source_id, "b");
    }

    #[tokio::test]
    async fn clear_reports_deleted_rows() {
        let store = setup_store().await;
        assert_eq!(store.clear().await.unwrap(), 0);
        store
            .upsert(&NewRecord::new("twitch_trending", "t1", "X"))
            .await
            .unwrap();
        store
            .upsert(&NewRecord::new("twitch_trending", "t2", "Y"))
            .await
            .unwrap();
        assert_eq!(store.clear().await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
