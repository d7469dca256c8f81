use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use crawler_core::config::models::DatabaseConfig;
use crawler_core::CrawlerResult;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::debug;

pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .with_context(|| format!("无效的数据库URL: {}", config.url))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(config.connection_timeout_seconds));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .max_lifetime(Duration::from_secs(1800))
            .connect_with(options)
            .await
            .context("连接数据库失败")?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        run_migrations(&self.pool).await.context("数据库迁移失败")?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// 创建队列表与进程表
pub async fn run_migrations(pool: &SqlitePool) -> CrawlerResult<()> {
    debug!("Running SQLite database migrations");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS crawler_queue (
            qid INTEGER PRIMARY KEY AUTOINCREMENT,
            page_id INTEGER NOT NULL DEFAULT 0,
            parameters TEXT NOT NULL DEFAULT '{}',
            parameters_hash TEXT NOT NULL DEFAULT '',
            configuration_hash TEXT NOT NULL DEFAULT '',
            scheduled INTEGER NOT NULL DEFAULT 0,
            exec_time INTEGER NOT NULL DEFAULT 0,
            set_id INTEGER NOT NULL DEFAULT 0,
            result_data TEXT,
            process_scheduled INTEGER NOT NULL DEFAULT 0,
            process_id TEXT NOT NULL DEFAULT '',
            process_id_completed TEXT NOT NULL DEFAULT '',
            configuration TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS crawler_process (
            process_id TEXT PRIMARY KEY,
            system_process_id INTEGER NOT NULL DEFAULT 0,
            active INTEGER NOT NULL DEFAULT 1,
            assigned_at INTEGER NOT NULL DEFAULT 0,
            ttl INTEGER NOT NULL DEFAULT 0,
            assigned_items_count INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_queue_page_config ON crawler_queue(page_id, configuration_hash, exec_time)",
        "CREATE INDEX IF NOT EXISTS idx_queue_pending ON crawler_queue(exec_time, process_scheduled, scheduled)",
        "CREATE INDEX IF NOT EXISTS idx_queue_set_id ON crawler_queue(set_id)",
        "CREATE INDEX IF NOT EXISTS idx_queue_parameters_hash ON crawler_queue(parameters_hash)",
        "CREATE INDEX IF NOT EXISTS idx_queue_process_id ON crawler_queue(process_id)",
        "CREATE INDEX IF NOT EXISTS idx_process_active ON crawler_process(active, assigned_at)",
    ];
    for index in indexes {
        sqlx::query(index).execute(pool).await?;
    }

    debug!("SQLite database migrations completed");
    Ok(())
}
