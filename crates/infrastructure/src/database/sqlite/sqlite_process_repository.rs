use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crawler_core::{
    models::ProcessRecord, traits::ProcessRepository, CrawlerError, CrawlerResult,
};
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, instrument, warn};

use super::ImmediateTransaction;
use crate::database::mapping::MappingHelpers;

const PROCESS_COLUMNS: &str =
    "process_id, system_process_id, active, assigned_at, ttl, assigned_items_count";

pub struct SqliteProcessRepository {
    pool: SqlitePool,
}

impl SqliteProcessRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> CrawlerResult<ProcessRecord> {
        let system_process_id: i64 = row.try_get("system_process_id")?;
        Ok(ProcessRecord {
            process_id: row.try_get("process_id")?,
            system_process_id: u32::try_from(system_process_id).unwrap_or(0),
            active: row.try_get("active")?,
            assigned_at: MappingHelpers::from_timestamp(row.try_get("assigned_at")?),
            ttl: MappingHelpers::from_timestamp(row.try_get("ttl")?),
            assigned_items_count: row.try_get("assigned_items_count")?,
        })
    }

    async fn insert_record<'e, E>(executor: E, record: &ProcessRecord) -> CrawlerResult<()>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO crawler_process (process_id, system_process_id, active, assigned_at, ttl, assigned_items_count)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.process_id)
        .bind(i64::from(record.system_process_id))
        .bind(record.active)
        .bind(MappingHelpers::to_timestamp(record.assigned_at))
        .bind(MappingHelpers::to_timestamp(record.ttl))
        .bind(record.assigned_items_count)
        .execute(executor)
        .await?;
        Ok(())
    }

    async fn insert_if_below_limit(
        conn: &mut SqliteConnection,
        record: &ProcessRecord,
        limit: u32,
    ) -> CrawlerResult<bool> {
        let active: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM crawler_process WHERE active = 1")
                .fetch_one(&mut *conn)
                .await?;

        if active >= i64::from(limit) {
            debug!("活跃进程数 {} 已达上限 {}", active, limit);
            return Ok(false);
        }

        Self::insert_record(&mut *conn, record).await?;
        Ok(true)
    }

    async fn fetch_records(
        &self,
        sql: &str,
        bind: Option<i64>,
    ) -> CrawlerResult<Vec<ProcessRecord>> {
        let mut query = sqlx::query(sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_record).collect()
    }
}

#[async_trait]
impl ProcessRepository for SqliteProcessRepository {
    #[instrument(skip(self, record), fields(process_id = %record.process_id))]
    async fn create(&self, record: &ProcessRecord) -> CrawlerResult<()> {
        Self::insert_record(&self.pool, record).await?;
        debug!("创建进程记录: {}", record.process_id);
        Ok(())
    }

    #[instrument(skip(self, record), fields(process_id = %record.process_id))]
    async fn create_if_below_limit(
        &self,
        record: &ProcessRecord,
        limit: u32,
    ) -> CrawlerResult<bool> {
        let mut tx = ImmediateTransaction::begin(&self.pool).await?;

        let created = Self::insert_if_below_limit(tx.conn(), record, limit).await;
        match created {
            Ok(true) => {
                tx.commit().await?;
                Ok(true)
            }
            Ok(false) => {
                tx.rollback().await?;
                Ok(false)
            }
            Err(e) => {
                if let Err(rollback_error) = tx.rollback().await {
                    warn!("回滚进程记录事务失败: {}", rollback_error);
                }
                Err(e)
            }
        }
    }

    async fn set_system_process_id(
        &self,
        process_id: &str,
        system_process_id: u32,
    ) -> CrawlerResult<()> {
        let result = sqlx::query(
            "UPDATE crawler_process SET system_process_id = ? WHERE process_id = ?",
        )
        .bind(i64::from(system_process_id))
        .bind(process_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CrawlerError::ProcessNotFound {
                id: process_id.to_string(),
            });
        }
        Ok(())
    }

    async fn get_by_id(&self, process_id: &str) -> CrawlerResult<Option<ProcessRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {PROCESS_COLUMNS} FROM crawler_process WHERE process_id = ?"
        ))
        .bind(process_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn count_active(&self) -> CrawlerResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM crawler_process WHERE active = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn list_active(&self) -> CrawlerResult<Vec<ProcessRecord>> {
        self.fetch_records(
            &format!(
                "SELECT {PROCESS_COLUMNS} FROM crawler_process WHERE active = 1 ORDER BY assigned_at ASC"
            ),
            None,
        )
        .await
    }

    async fn active_older_than(&self, cutoff: DateTime<Utc>) -> CrawlerResult<Vec<ProcessRecord>> {
        self.fetch_records(
            &format!(
                "SELECT {PROCESS_COLUMNS} FROM crawler_process WHERE active = 1 AND assigned_at < ? ORDER BY assigned_at ASC"
            ),
            Some(MappingHelpers::to_timestamp(cutoff)),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn deactivate(&self, process_id: &str) -> CrawlerResult<()> {
        let result = sqlx::query("UPDATE crawler_process SET active = 0 WHERE process_id = ?")
            .bind(process_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CrawlerError::ProcessNotFound {
                id: process_id.to_string(),
            });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove(&self, process_id: &str) -> CrawlerResult<bool> {
        let result = sqlx::query("DELETE FROM crawler_process WHERE process_id = ?")
            .bind(process_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn increment_assigned_items(&self, process_id: &str, count: i64) -> CrawlerResult<()> {
        sqlx::query(
            "UPDATE crawler_process SET assigned_items_count = assigned_items_count + ? WHERE process_id = ?",
        )
        .bind(count)
        .bind(process_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
