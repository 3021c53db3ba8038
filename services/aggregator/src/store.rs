//! Event storage and incremental rollups.
//!
//! [`EventStore`] is the only component that touches SQL. The aggregator
//! drives it through first-class methods (one append-only insert plus three
//! upsert-increment operations), and the excluded HTTP query layer reads
//! through the projection methods at the bottom.
//!
//! Every rollup update follows the same two-step discipline: insert a
//! zero-valued row if the key is absent, then apply a delta with
//! `SET counter = counter + delta`. Deltas commute, so concurrent consumers
//! updating the same key cannot lose increments. There is deliberately no
//! transaction spanning the three rollups for one event; a crash mid-way
//! leaves the aggregates under-applied relative to the raw log, which is an
//! accepted and documented inconsistency window.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Timelike, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;
use tracing::{debug, info};
use tracker_pipeline::{EventType, FileEvent, HostInfo};

use crate::config::DatabaseConfig;

/// Fixed-width UTC timestamp format so stored values compare
/// lexicographically.
fn fmt_ts(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Daily bucket key for an event.
pub fn day_of(t: &DateTime<Utc>) -> String {
    t.format("%Y-%m-%d").to_string()
}

/// Hourly bucket key for an event.
pub fn hour_of(t: &DateTime<Utc>) -> i64 {
    t.hour() as i64
}

pub struct EventStore {
    pool: SqlitePool,
}

impl EventStore {
    /// Open (creating if missing) the embedded database.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .context("Invalid database URL")?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .context("Failed to open database")?;

        info!(url = %config.url, "Connected to event store");

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// In-memory store for tests. A single connection keeps the database
    /// alive for the pool's lifetime.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS hosts (
                id TEXT PRIMARY KEY,
                mac_address TEXT UNIQUE NOT NULL,
                hostname TEXT NOT NULL,
                platform TEXT NOT NULL,
                last_seen TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS file_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                host_id TEXT NOT NULL,
                file_path TEXT NOT NULL,
                file_name TEXT NOT NULL,
                file_type TEXT NOT NULL,
                size INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                modified_at TEXT NOT NULL,
                event_type TEXT NOT NULL,
                extension TEXT,
                mime_type TEXT,
                category TEXT NOT NULL,
                is_directory INTEGER NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_file_events_host_id ON file_events (host_id)",
            "CREATE INDEX IF NOT EXISTS idx_file_events_created_at ON file_events (created_at)",
            "CREATE INDEX IF NOT EXISTS idx_file_events_category ON file_events (category)",
            "CREATE INDEX IF NOT EXISTS idx_file_events_event_type ON file_events (event_type)",
            "CREATE INDEX IF NOT EXISTS idx_file_events_extension ON file_events (extension)",
            r#"
            CREATE TABLE IF NOT EXISTS daily_analytics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                host_id TEXT NOT NULL,
                total_events INTEGER DEFAULT 0,
                files_created INTEGER DEFAULT 0,
                files_modified INTEGER DEFAULT 0,
                files_deleted INTEGER DEFAULT 0,
                total_size INTEGER DEFAULT 0,
                unique_extensions INTEGER DEFAULT 0,
                UNIQUE(date, host_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS hourly_analytics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                hour INTEGER NOT NULL,
                host_id TEXT NOT NULL,
                event_count INTEGER DEFAULT 0,
                UNIQUE(date, hour, host_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS directory_analytics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                directory_path TEXT NOT NULL,
                host_id TEXT NOT NULL,
                event_count INTEGER DEFAULT 0,
                last_activity TEXT NOT NULL,
                file_count INTEGER DEFAULT 0,
                total_size INTEGER DEFAULT 0,
                UNIQUE(directory_path, host_id)
            )
            "#,
        ];

        for sql in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .context("Failed to initialize schema")?;
        }

        Ok(())
    }

    /// Register or refresh a host row. `id` derives from the MAC address, so
    /// repeating this for the same machine replaces rather than duplicates.
    pub async fn upsert_host(&self, host: &HostInfo) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO hosts (id, mac_address, hostname, platform, last_seen)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&host.id)
        .bind(&host.mac_address)
        .bind(&host.hostname)
        .bind(&host.platform)
        .bind(fmt_ts(&host.last_seen))
        .execute(&self.pool)
        .await
        .context("Failed to upsert host")?;

        debug!(host_id = %host.id, hostname = %host.hostname, "Registered host");
        Ok(())
    }

    /// Append one event to the raw log. Rows are never mutated afterwards.
    pub async fn insert_event(&self, event: &FileEvent) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO file_events (
                host_id, file_path, file_name, file_type, size,
                created_at, modified_at, event_type,
                extension, mime_type, category, is_directory
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(&event.host_id)
        .bind(&event.file_path)
        .bind(&event.file_name)
        .bind(event.file_type.as_str())
        .bind(event.size as i64)
        .bind(fmt_ts(&event.created_at))
        .bind(fmt_ts(&event.modified_at))
        .bind(event.event_type.as_str())
        .bind(&event.metadata.extension)
        .bind(&event.metadata.mime_type)
        .bind(event.metadata.category.as_str())
        .bind(event.metadata.is_directory)
        .execute(&self.pool)
        .await
        .context("Failed to insert file event")?;

        Ok(result.last_insert_rowid())
    }

    /// Daily rollup: monotonic counters only. Deletes increment
    /// `files_deleted`; nothing is ever decremented here.
    pub async fn bump_daily(&self, date: &str, event: &FileEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO daily_analytics
                (date, host_id, total_events, files_created, files_modified,
                 files_deleted, total_size, unique_extensions)
            VALUES ($1, $2, 0, 0, 0, 0, 0, 0)
            "#,
        )
        .bind(date)
        .bind(&event.host_id)
        .execute(&self.pool)
        .await?;

        let unique_delta = self.first_extension_today(date, event).await?;

        let (created, modified, deleted) = match event.event_type {
            EventType::Created => (1i64, 0i64, 0i64),
            EventType::Modified => (0, 1, 0),
            EventType::Deleted => (0, 0, 1),
        };

        sqlx::query(
            r#"
            UPDATE daily_analytics SET
                total_events = total_events + 1,
                files_created = files_created + $1,
                files_modified = files_modified + $2,
                files_deleted = files_deleted + $3,
                total_size = total_size + $4,
                unique_extensions = unique_extensions + $5
            WHERE date = $6 AND host_id = $7
            "#,
        )
        .bind(created)
        .bind(modified)
        .bind(deleted)
        .bind(event.size as i64)
        .bind(unique_delta)
        .bind(date)
        .bind(&event.host_id)
        .execute(&self.pool)
        .await
        .context("Failed to update daily analytics")?;

        Ok(())
    }

    /// 1 when this event's extension is the first of its kind today for the
    /// host. The raw insert has already happened by the time rollups run, so
    /// "first" means exactly one matching row in the log.
    async fn first_extension_today(&self, date: &str, event: &FileEvent) -> Result<i64> {
        if event.metadata.extension.is_empty() {
            return Ok(0);
        }

        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM file_events
            WHERE host_id = $1 AND extension = $2 AND substr(created_at, 1, 10) = $3
            "#,
        )
        .bind(&event.host_id)
        .bind(&event.metadata.extension)
        .bind(date)
        .fetch_one(&self.pool)
        .await?;

        Ok(if count == 1 { 1 } else { 0 })
    }

    /// Hourly rollup: a single monotonic event counter per (date, hour, host).
    pub async fn bump_hourly(&self, date: &str, hour: i64, host_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO hourly_analytics (date, hour, host_id, event_count)
            VALUES ($1, $2, $3, 0)
            "#,
        )
        .bind(date)
        .bind(hour)
        .bind(host_id)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            UPDATE hourly_analytics SET event_count = event_count + 1
            WHERE date = $1 AND hour = $2 AND host_id = $3
            "#,
        )
        .bind(date)
        .bind(hour)
        .bind(host_id)
        .execute(&self.pool)
        .await
        .context("Failed to update hourly analytics")?;

        Ok(())
    }

    /// Directory rollup. `file_count` is the only signed counter in the
    /// model: created +1, deleted -1, modified +0. `last_activity` keeps the
    /// max timestamp seen; `total_size` is a running sum (deletes contribute
    /// their size of 0).
    pub async fn bump_directory(&self, event: &FileEvent) -> Result<()> {
        let directory_path = event.directory_path();
        let activity = fmt_ts(&event.created_at);

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO directory_analytics
                (directory_path, host_id, event_count, last_activity, file_count, total_size)
            VALUES ($1, $2, 0, $3, 0, 0)
            "#,
        )
        .bind(&directory_path)
        .bind(&event.host_id)
        .bind(&activity)
        .execute(&self.pool)
        .await?;

        let file_delta: i64 = match event.event_type {
            EventType::Created => 1,
            EventType::Deleted => -1,
            EventType::Modified => 0,
        };

        sqlx::query(
            r#"
            UPDATE directory_analytics SET
                event_count = event_count + 1,
                file_count = file_count + $1,
                total_size = total_size + $2,
                last_activity = MAX(last_activity, $3)
            WHERE directory_path = $4 AND host_id = $5
            "#,
        )
        .bind(file_delta)
        .bind(event.size as i64)
        .bind(&activity)
        .bind(&directory_path)
        .bind(&event.host_id)
        .execute(&self.pool)
        .await
        .context("Failed to update directory analytics")?;

        Ok(())
    }

    // ---- Read projections for the query layer ----

    /// Raw events, newest first, with pagination.
    pub async fn events(
        &self,
        host_id: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<StoredEvent>> {
        let events = sqlx::query_as::<_, StoredEvent>(
            r#"
            SELECT id, host_id, file_path, file_name, file_type, size,
                   created_at, modified_at, event_type,
                   extension, mime_type, category, is_directory
            FROM file_events
            WHERE ($1 IS NULL OR host_id = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(host_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query events")?;

        Ok(events)
    }

    pub async fn hosts(&self) -> Result<Vec<HostRow>> {
        let hosts = sqlx::query_as::<_, HostRow>(
            "SELECT id, mac_address, hostname, platform, last_seen FROM hosts ORDER BY last_seen DESC",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to query hosts")?;

        Ok(hosts)
    }

    pub async fn daily(&self, host_id: Option<&str>) -> Result<Vec<DailyAnalytics>> {
        let rows = sqlx::query_as::<_, DailyAnalytics>(
            r#"
            SELECT date, host_id, total_events, files_created, files_modified,
                   files_deleted, total_size, unique_extensions
            FROM daily_analytics
            WHERE ($1 IS NULL OR host_id = $1)
            ORDER BY date DESC
            "#,
        )
        .bind(host_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query daily analytics")?;

        Ok(rows)
    }

    pub async fn hourly(&self, host_id: Option<&str>) -> Result<Vec<HourlyAnalytics>> {
        let rows = sqlx::query_as::<_, HourlyAnalytics>(
            r#"
            SELECT date, hour, host_id, event_count
            FROM hourly_analytics
            WHERE ($1 IS NULL OR host_id = $1)
            ORDER BY date DESC, hour ASC
            "#,
        )
        .bind(host_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query hourly analytics")?;

        Ok(rows)
    }

    pub async fn directories(&self, host_id: Option<&str>) -> Result<Vec<DirectoryAnalytics>> {
        let rows = sqlx::query_as::<_, DirectoryAnalytics>(
            r#"
            SELECT directory_path, host_id, event_count, last_activity, file_count, total_size
            FROM directory_analytics
            WHERE ($1 IS NULL OR host_id = $1)
            ORDER BY event_count DESC
            "#,
        )
        .bind(host_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query directory analytics")?;

        Ok(rows)
    }

    /// Overall tally over the raw log plus per-category and top-extension
    /// breakdowns.
    pub async fn stats(&self, host_id: Option<&str>) -> Result<ActivityStats> {
        let basic: BasicStats = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) as total_events,
                COUNT(CASE WHEN is_directory = 1 THEN 1 END) as directories,
                COUNT(CASE WHEN is_directory = 0 THEN 1 END) as files,
                COALESCE(SUM(size), 0) as total_size,
                COUNT(CASE WHEN event_type = 'created' THEN 1 END) as files_created,
                COUNT(CASE WHEN event_type = 'modified' THEN 1 END) as files_modified,
                COUNT(CASE WHEN event_type = 'deleted' THEN 1 END) as files_deleted
            FROM file_events
            WHERE ($1 IS NULL OR host_id = $1)
            "#,
        )
        .bind(host_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to query stats")?;

        let categories = sqlx::query_as::<_, CategoryCount>(
            r#"
            SELECT category, COUNT(*) as count, COALESCE(SUM(size), 0) as total_size
            FROM file_events
            WHERE ($1 IS NULL OR host_id = $1)
            GROUP BY category
            ORDER BY count DESC
            "#,
        )
        .bind(host_id)
        .fetch_all(&self.pool)
        .await?;

        let top_extensions = sqlx::query_as::<_, ExtensionCount>(
            r#"
            SELECT extension, COUNT(*) as count
            FROM file_events
            WHERE ($1 IS NULL OR host_id = $1) AND extension != ''
            GROUP BY extension
            ORDER BY count DESC
            LIMIT 10
            "#,
        )
        .bind(host_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ActivityStats {
            basic,
            categories,
            top_extensions,
        })
    }

    /// Per-file-type counts and sizes over the raw log.
    pub async fn file_type_distribution(
        &self,
        host_id: Option<&str>,
    ) -> Result<Vec<TypeDistribution>> {
        let rows = sqlx::query_as::<_, TypeDistribution>(
            r#"
            SELECT file_type,
                   COUNT(*) as count,
                   COALESCE(SUM(size), 0) as total_size,
                   COALESCE(AVG(size), 0.0) as avg_size
            FROM file_events
            WHERE ($1 IS NULL OR host_id = $1)
            GROUP BY file_type
            ORDER BY count DESC
            "#,
        )
        .bind(host_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query file type distribution")?;

        Ok(rows)
    }
}

/// One row of the append-only raw log, as the query layer sees it.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StoredEvent {
    pub id: i64,
    pub host_id: String,
    pub file_path: String,
    pub file_name: String,
    pub file_type: String,
    pub size: i64,
    pub created_at: String,
    pub modified_at: String,
    pub event_type: String,
    pub extension: String,
    pub mime_type: Option<String>,
    pub category: String,
    pub is_directory: bool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct HostRow {
    pub id: String,
    pub mac_address: String,
    pub hostname: String,
    pub platform: String,
    pub last_seen: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DailyAnalytics {
    pub date: String,
    pub host_id: String,
    pub total_events: i64,
    pub files_created: i64,
    pub files_modified: i64,
    pub files_deleted: i64,
    pub total_size: i64,
    pub unique_extensions: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct HourlyAnalytics {
    pub date: String,
    pub hour: i64,
    pub host_id: String,
    pub event_count: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DirectoryAnalytics {
    pub directory_path: String,
    pub host_id: String,
    pub event_count: i64,
    pub last_activity: String,
    pub file_count: i64,
    pub total_size: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BasicStats {
    pub total_events: i64,
    pub directories: i64,
    pub files: i64,
    pub total_size: i64,
    pub files_created: i64,
    pub files_modified: i64,
    pub files_deleted: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
    pub total_size: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ExtensionCount {
    pub extension: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityStats {
    pub basic: BasicStats,
    pub categories: Vec<CategoryCount>,
    pub top_extensions: Vec<ExtensionCount>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TypeDistribution {
    pub file_type: String,
    pub count: i64,
    pub total_size: i64,
    pub avg_size: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracker_pipeline::{classify, file_type_of, FileEvent};

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn event(
        host: &str,
        path: &str,
        event_type: EventType,
        size: u64,
        when: DateTime<Utc>,
    ) -> FileEvent {
        FileEvent {
            host_id: host.to_string(),
            file_path: path.to_string(),
            file_name: path.rsplit('/').next().unwrap_or(path).to_string(),
            file_type: file_type_of(path, false),
            size,
            created_at: when,
            modified_at: when,
            event_type,
            metadata: classify(path, false),
        }
    }

    async fn apply(store: &EventStore, e: &FileEvent) {
        store.insert_event(e).await.unwrap();
        let date = day_of(&e.created_at);
        store.bump_daily(&date, e).await.unwrap();
        store
            .bump_hourly(&date, hour_of(&e.created_at), &e.host_id)
            .await
            .unwrap();
        store.bump_directory(e).await.unwrap();
    }

    #[test]
    fn timestamps_format_fixed_width() {
        let t = at("2024-06-01T09:05:00Z");
        assert_eq!(fmt_ts(&t), "2024-06-01T09:05:00.000000Z");
        assert_eq!(day_of(&t), "2024-06-01");
        assert_eq!(hour_of(&t), 9);
    }

    #[tokio::test]
    async fn single_create_populates_every_rollup() {
        let store = EventStore::in_memory().await.unwrap();
        let e = event(
            "host-a",
            "/home/user/report.pdf",
            EventType::Created,
            100,
            at("2024-06-01T09:05:00Z"),
        );
        apply(&store, &e).await;

        let daily = store.daily(Some("host-a")).await.unwrap();
        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0].date, "2024-06-01");
        assert_eq!(daily[0].total_events, 1);
        assert_eq!(daily[0].files_created, 1);
        assert_eq!(daily[0].files_modified, 0);
        assert_eq!(daily[0].files_deleted, 0);
        assert_eq!(daily[0].total_size, 100);
        assert_eq!(daily[0].unique_extensions, 1);

        let hourly = store.hourly(Some("host-a")).await.unwrap();
        assert_eq!(hourly.len(), 1);
        assert_eq!(hourly[0].hour, 9);
        assert_eq!(hourly[0].event_count, 1);

        let dirs = store.directories(Some("host-a")).await.unwrap();
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0].directory_path, "/home/user");
        assert_eq!(dirs[0].event_count, 1);
        assert_eq!(dirs[0].file_count, 1);
        assert_eq!(dirs[0].total_size, 100);
    }

    #[tokio::test]
    async fn create_then_delete_returns_directory_file_count_to_zero() {
        let store = EventStore::in_memory().await.unwrap();
        let when = at("2024-06-01T10:00:00Z");
        apply(
            &store,
            &event("host-a", "/data/file.txt", EventType::Created, 50, when),
        )
        .await;
        // Deletes always arrive with size 0.
        apply(
            &store,
            &event(
                "host-a",
                "/data/file.txt",
                EventType::Deleted,
                0,
                at("2024-06-01T10:30:00Z"),
            ),
        )
        .await;

        let daily = store.daily(Some("host-a")).await.unwrap();
        assert_eq!(daily[0].total_events, 2);
        assert_eq!(daily[0].files_created, 1);
        assert_eq!(daily[0].files_deleted, 1);
        // Daily counters are monotonic: the delete does not shrink total_size.
        assert_eq!(daily[0].total_size, 50);

        let dirs = store.directories(Some("host-a")).await.unwrap();
        assert_eq!(dirs[0].event_count, 2);
        assert_eq!(dirs[0].file_count, 0);
        assert_eq!(dirs[0].total_size, 50);
        assert_eq!(dirs[0].last_activity, "2024-06-01T10:30:00.000000Z");
    }

    #[tokio::test]
    async fn unique_extensions_counts_first_sighting_per_day_only() {
        let store = EventStore::in_memory().await.unwrap();
        let day1 = at("2024-06-01T08:00:00Z");
        apply(&store, &event("host-a", "/a/x.txt", EventType::Created, 1, day1)).await;
        apply(&store, &event("host-a", "/a/y.txt", EventType::Created, 1, day1)).await;
        apply(&store, &event("host-a", "/a/z.rs", EventType::Created, 1, day1)).await;
        // Next day the same extension counts again.
        apply(
            &store,
            &event("host-a", "/a/w.txt", EventType::Created, 1, at("2024-06-02T08:00:00Z")),
        )
        .await;

        let daily = store.daily(Some("host-a")).await.unwrap();
        // Newest first.
        assert_eq!(daily[0].date, "2024-06-02");
        assert_eq!(daily[0].unique_extensions, 1);
        assert_eq!(daily[1].date, "2024-06-01");
        assert_eq!(daily[1].unique_extensions, 2);
    }

    #[tokio::test]
    async fn replay_shifts_counts_by_exactly_one_application() {
        let store = EventStore::in_memory().await.unwrap();
        let e = event(
            "host-a",
            "/tmp/dup.log",
            EventType::Created,
            10,
            at("2024-06-01T12:00:00Z"),
        );
        apply(&store, &e).await;
        apply(&store, &e).await;

        let daily = store.daily(None).await.unwrap();
        assert_eq!(daily[0].total_events, 2);
        assert_eq!(daily[0].files_created, 2);
        assert_eq!(daily[0].total_size, 20);

        let dirs = store.directories(None).await.unwrap();
        assert_eq!(dirs[0].file_count, 2);
    }

    #[tokio::test]
    async fn rollups_are_partitioned_by_host() {
        let store = EventStore::in_memory().await.unwrap();
        let when = at("2024-06-01T12:00:00Z");
        apply(&store, &event("host-a", "/p/a.txt", EventType::Created, 5, when)).await;
        apply(&store, &event("host-b", "/p/b.txt", EventType::Created, 7, when)).await;

        assert_eq!(store.daily(Some("host-a")).await.unwrap().len(), 1);
        assert_eq!(store.daily(Some("host-b")).await.unwrap().len(), 1);
        assert_eq!(store.daily(None).await.unwrap().len(), 2);

        let dirs = store.directories(Some("host-a")).await.unwrap();
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0].total_size, 5);
    }

    #[tokio::test]
    async fn host_registration_is_idempotent() {
        let store = EventStore::in_memory().await.unwrap();
        let mut host = HostInfo {
            id: "aabbccddeeff".to_string(),
            mac_address: "aa:bb:cc:dd:ee:ff".to_string(),
            hostname: "worker-1".to_string(),
            platform: "linux".to_string(),
            last_seen: at("2024-06-01T08:00:00Z"),
        };
        store.upsert_host(&host).await.unwrap();

        host.last_seen = at("2024-06-01T09:00:00Z");
        store.upsert_host(&host).await.unwrap();

        let hosts = store.hosts().await.unwrap();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].last_seen, "2024-06-01T09:00:00.000000Z");
    }

    #[tokio::test]
    async fn event_queries_paginate_newest_first() {
        let store = EventStore::in_memory().await.unwrap();
        for i in 0..5 {
            let when = at(&format!("2024-06-01T0{i}:00:00Z"));
            apply(
                &store,
                &event("host-a", &format!("/logs/{i}.log"), EventType::Created, 1, when),
            )
            .await;
        }

        let page = store.events(None, 2, 0).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].file_name, "4.log");
        assert_eq!(page[1].file_name, "3.log");

        let next = store.events(None, 2, 2).await.unwrap();
        assert_eq!(next[0].file_name, "2.log");
    }

    #[tokio::test]
    async fn stats_tally_matches_applied_events() {
        let store = EventStore::in_memory().await.unwrap();
        let when = at("2024-06-01T12:00:00Z");
        apply(&store, &event("host-a", "/m/a.jpg", EventType::Created, 100, when)).await;
        apply(&store, &event("host-a", "/m/b.jpg", EventType::Modified, 200, when)).await;
        apply(&store, &event("host-a", "/m/a.jpg", EventType::Deleted, 0, when)).await;

        let stats = store.stats(Some("host-a")).await.unwrap();
        assert_eq!(stats.basic.total_events, 3);
        assert_eq!(stats.basic.files, 3);
        assert_eq!(stats.basic.directories, 0);
        assert_eq!(stats.basic.total_size, 300);
        assert_eq!(stats.basic.files_created, 1);
        assert_eq!(stats.basic.files_modified, 1);
        assert_eq!(stats.basic.files_deleted, 1);
        assert_eq!(stats.categories[0].category, "media");
        assert_eq!(stats.top_extensions[0].extension, ".jpg");
        assert_eq!(stats.top_extensions[0].count, 3);

        let types = store.file_type_distribution(Some("host-a")).await.unwrap();
        assert_eq!(types[0].file_type, "image");
        assert_eq!(types[0].count, 3);
        assert_eq!(types[0].total_size, 300);
        assert!((types[0].avg_size - 100.0).abs() < f64::EPSILON);
    }
}
