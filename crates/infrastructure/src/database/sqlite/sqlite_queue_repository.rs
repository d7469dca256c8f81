use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use crawler_core::{
    models::{EnqueueBatch, LogFilter, LogQuery, LogSelector, QueueEntry, QueueFilter},
    traits::QueueRepository,
    CrawlerError, CrawlerResult,
};
use serde_json::Value;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, instrument, warn};

use super::ImmediateTransaction;
use crate::database::mapping::MappingHelpers;

const QUEUE_COLUMNS: &str = "qid, page_id, parameters, parameters_hash, configuration_hash, scheduled, exec_time, set_id, result_data, process_scheduled, process_id, process_id_completed, configuration";

const SECONDS_PER_DAY: i64 = 86_400;

pub struct SqliteQueueRepository {
    pool: SqlitePool,
}

impl SqliteQueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// 在已开启的事务中检查并插入一批条目，已存在待处理条目时返回 `None`
    async fn insert_batch(
        conn: &mut SqliteConnection,
        batch: &EnqueueBatch,
    ) -> CrawlerResult<Option<Vec<i64>>> {
        let pending: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM crawler_queue \
             WHERE page_id = ? AND configuration_hash = ? AND exec_time = 0",
        )
        .bind(batch.page_id)
        .bind(&batch.configuration_hash)
        .fetch_one(&mut *conn)
        .await?;

        if pending > 0 {
            return Ok(None);
        }

        let mut ids = Vec::with_capacity(batch.entries.len());
        for entry in &batch.entries {
            if let Some(slot) = batch.timeslot_seconds {
                let scheduled = MappingHelpers::to_timestamp(entry.scheduled);
                let duplicates: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM crawler_queue \
                     WHERE parameters_hash = ? AND exec_time = 0 AND scheduled BETWEEN ? AND ?",
                )
                .bind(&entry.parameters_hash)
                .bind(scheduled - slot)
                .bind(scheduled + slot)
                .fetch_one(&mut *conn)
                .await?;

                if duplicates > 0 {
                    debug!("参数哈希 {} 在时间槽内已入队，跳过", entry.parameters_hash);
                    continue;
                }
            }

            ids.push(Self::insert_entry(&mut *conn, entry).await?);
        }
        Ok(Some(ids))
    }

    fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> CrawlerResult<QueueEntry> {
        Ok(QueueEntry {
            id: row.try_get("qid")?,
            page_id: row.try_get("page_id")?,
            parameters: MappingHelpers::parse_json_sqlite(row, "parameters")?,
            parameters_hash: row.try_get("parameters_hash")?,
            configuration_hash: row.try_get("configuration_hash")?,
            scheduled: MappingHelpers::from_timestamp(row.try_get("scheduled")?),
            exec_time: MappingHelpers::from_optional_timestamp(row.try_get("exec_time")?),
            set_id: row.try_get("set_id")?,
            result_data: MappingHelpers::parse_optional_json_sqlite(row, "result_data")?,
            process_scheduled: MappingHelpers::from_optional_timestamp(
                row.try_get("process_scheduled")?,
            ),
            process_id: row.try_get("process_id")?,
            process_id_completed: row.try_get("process_id_completed")?,
            configuration_name: row.try_get("configuration")?,
        })
    }

    /// 追加过滤条件，调用方的SQL必须以 `WHERE 1 = 1` 结尾
    fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &QueueFilter) {
        if let Some(page_id) = filter.page_id {
            builder.push(" AND page_id = ").push_bind(page_id);
        }
        if let Some(set_id) = filter.set_id {
            builder.push(" AND set_id = ").push_bind(set_id);
        }
        if let Some(name) = &filter.configuration_name {
            builder.push(" AND configuration = ").push_bind(name.clone());
        }
        if let Some(hash) = &filter.configuration_hash {
            builder
                .push(" AND configuration_hash = ")
                .push_bind(hash.clone());
        }
        if let Some(process_id) = &filter.process_id {
            builder.push(" AND process_id = ").push_bind(process_id.clone());
        }
        match filter.status {
            LogFilter::All => {}
            LogFilter::Pending => {
                builder.push(" AND exec_time = 0");
            }
            LogFilter::Finished => {
                builder.push(" AND exec_time > 0");
            }
        }
        if filter.unclaimed {
            builder.push(" AND process_scheduled = 0");
        }
        if let Some(before) = filter.scheduled_before {
            builder
                .push(" AND scheduled < ")
                .push_bind(MappingHelpers::to_timestamp(before));
        }
        if let Some(before) = filter.executed_before {
            builder
                .push(" AND exec_time > 0 AND exec_time < ")
                .push_bind(MappingHelpers::to_timestamp(before));
        }
    }

    fn selector_filter(query: &LogQuery, status: LogFilter) -> QueueFilter {
        let filter = QueueFilter::all().status(status);
        match query.selector {
            LogSelector::Page(page_id) => filter.page_id(page_id),
            LogSelector::Set(set_id) => filter.set_id(set_id),
        }
    }

    async fn insert_entry<'e, E>(executor: E, entry: &QueueEntry) -> CrawlerResult<i64>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let parameters = serde_json::to_string(&entry.parameters)?;
        let result_data = entry
            .result_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            r#"
            INSERT INTO crawler_queue (page_id, parameters, parameters_hash, configuration_hash, scheduled,
                exec_time, set_id, result_data, process_scheduled, process_id, process_id_completed, configuration)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.page_id)
        .bind(parameters)
        .bind(&entry.parameters_hash)
        .bind(&entry.configuration_hash)
        .bind(MappingHelpers::to_timestamp(entry.scheduled))
        .bind(MappingHelpers::to_optional_timestamp(entry.exec_time))
        .bind(entry.set_id)
        .bind(result_data)
        .bind(MappingHelpers::to_optional_timestamp(entry.process_scheduled))
        .bind(&entry.process_id)
        .bind(&entry.process_id_completed)
        .bind(&entry.configuration_name)
        .execute(executor)
        .await?;

        Ok(result.last_insert_rowid())
    }
}

#[async_trait]
impl QueueRepository for SqliteQueueRepository {
    async fn exists_unprocessed(
        &self,
        page_id: i64,
        configuration_hash: &str,
    ) -> CrawlerResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM crawler_queue WHERE page_id = ? AND configuration_hash = ? AND exec_time = 0",
        )
        .bind(page_id)
        .bind(configuration_hash)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    #[instrument(skip(self, entry), fields(page_id = entry.page_id))]
    async fn enqueue(&self, entry: &QueueEntry) -> CrawlerResult<i64> {
        let id = Self::insert_entry(&self.pool, entry).await?;
        debug!("队列条目入队: {}", id);
        Ok(id)
    }

    #[instrument(skip(self, batch), fields(
        page_id = batch.page_id,
        configuration_hash = %batch.configuration_hash,
        entries = batch.entries.len()
    ))]
    async fn enqueue_if_absent(&self, batch: &EnqueueBatch) -> CrawlerResult<Vec<i64>> {
        let mut tx = ImmediateTransaction::begin(&self.pool).await?;

        let inserted = Self::insert_batch(tx.conn(), batch).await;
        match inserted {
            Ok(Some(ids)) => {
                tx.commit().await?;
                Ok(ids)
            }
            Ok(None) => {
                tx.rollback().await?;
                debug!("页面 {} 已存在待处理条目，跳过入队", batch.page_id);
                Ok(Vec::new())
            }
            Err(e) => {
                if let Err(rollback_error) = tx.rollback().await {
                    warn!("回滚入队事务失败: {}", rollback_error);
                }
                Err(e)
            }
        }
    }

    #[instrument(skip(self))]
    async fn claim_pending(
        &self,
        process_id: &str,
        limit: u32,
        now: DateTime<Utc>,
    ) -> CrawlerResult<Vec<QueueEntry>> {
        let now_ts = MappingHelpers::to_timestamp(now);
        let candidates: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT qid FROM crawler_queue
            WHERE exec_time = 0 AND process_scheduled = 0 AND scheduled <= ?
            ORDER BY scheduled ASC, qid ASC
            LIMIT ?
            "#,
        )
        .bind(now_ts)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut claimed = Vec::with_capacity(candidates.len());
        for qid in candidates {
            let result = sqlx::query(
                "UPDATE crawler_queue SET process_scheduled = ?, process_id = ? WHERE qid = ? AND process_scheduled = 0 AND exec_time = 0",
            )
            .bind(now_ts)
            .bind(process_id)
            .bind(qid)
            .execute(&self.pool)
            .await?;

            // 已被其他进程认领
            if result.rows_affected() == 0 {
                continue;
            }

            if let Some(entry) = self.get_by_id(qid).await? {
                claimed.push(entry);
            }
        }

        debug!("进程 {} 认领了 {} 个条目", process_id, claimed.len());
        Ok(claimed)
    }

    #[instrument(skip(self, result_data))]
    async fn mark_executed(
        &self,
        id: i64,
        result_data: &Value,
        process_id_completed: &str,
        exec_time: DateTime<Utc>,
    ) -> CrawlerResult<()> {
        // exec_time 为 0 表示待处理，完成时间至少记为 1
        let exec_ts = MappingHelpers::to_timestamp(exec_time).max(1);
        let result = sqlx::query(
            "UPDATE crawler_queue SET exec_time = ?, result_data = ?, process_id_completed = ? WHERE qid = ?",
        )
        .bind(exec_ts)
        .bind(serde_json::to_string(result_data)?)
        .bind(process_id_completed)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CrawlerError::QueueEntryNotFound { id });
        }
        Ok(())
    }

    async fn get_by_id(&self, id: i64) -> CrawlerResult<Option<QueueEntry>> {
        let row = sqlx::query(&format!(
            "SELECT {QUEUE_COLUMNS} FROM crawler_queue WHERE qid = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_entry).transpose()
    }

    async fn count(&self, filter: &QueueFilter) -> CrawlerResult<i64> {
        let mut builder =
            QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM crawler_queue WHERE 1 = 1");
        Self::push_filter(&mut builder, filter);
        let count: i64 = builder.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count)
    }

    #[instrument(skip(self))]
    async fn flush(&self, filter: &QueueFilter) -> CrawlerResult<u64> {
        let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM crawler_queue WHERE 1 = 1");
        Self::push_filter(&mut builder, filter);
        let result = builder.build().execute(&self.pool).await?;
        debug!("删除了 {} 个队列条目", result.rows_affected());
        Ok(result.rows_affected())
    }

    async fn query_log(&self, query: &LogQuery) -> CrawlerResult<Vec<QueueEntry>> {
        let filter = Self::selector_filter(query, query.filter);
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {QUEUE_COLUMNS} FROM crawler_queue WHERE 1 = 1"
        ));
        Self::push_filter(&mut builder, &filter);
        builder
            .push(" ORDER BY scheduled DESC, qid DESC LIMIT ")
            .push_bind(i64::from(query.page_size));

        let rows = builder.build().fetch_all(&self.pool).await?;
        let entries = rows
            .iter()
            .map(Self::row_to_entry)
            .collect::<CrawlerResult<Vec<_>>>()?;

        if query.do_flush {
            let flush_filter = Self::selector_filter(query, query.flush_filter());
            self.flush(&flush_filter).await?;
        }

        Ok(entries)
    }

    #[instrument(skip(self))]
    async fn purge_older_than(&self, days: u32) -> CrawlerResult<u64> {
        let cutoff = Utc::now().timestamp() - i64::from(days) * SECONDS_PER_DAY;
        let result = sqlx::query("DELETE FROM crawler_queue WHERE exec_time > 0 AND exec_time < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn clean_up_old_entries(
        &self,
        processed_age_days: u32,
        scheduled_age_days: u32,
    ) -> CrawlerResult<u64> {
        let now = Utc::now();
        let processed_cutoff = now - Duration::days(i64::from(processed_age_days));
        let scheduled_cutoff = now - Duration::days(i64::from(scheduled_age_days));

        let result = sqlx::query(
            r#"
            DELETE FROM crawler_queue
            WHERE (exec_time > 0 AND exec_time < ?)
               OR (exec_time = 0 AND scheduled < ?)
            "#,
        )
        .bind(processed_cutoff.timestamp())
        .bind(scheduled_cutoff.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn release_process_claims(&self, process_id: &str) -> CrawlerResult<u64> {
        if process_id.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            "UPDATE crawler_queue SET process_id = '', process_scheduled = 0 WHERE process_id = ? AND exec_time = 0",
        )
        .bind(process_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
