//! 数据仓储层接口定义
//!
//! 队列与进程记录是调度器、Worker与进程清理之间唯一的共享可变状态，
//! 所有修改都必须通过以下接口完成：
//! - 队列仓储接口 (QueueRepository)
//! - 进程记录仓储接口 (ProcessRepository)
//!
//! 所有操作都是短小的单行或谓词范围操作，不持有长期锁。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use crawler_core::traits::QueueRepository;
//! use crawler_core::models::{LogQuery, LogFilter};
//!
//! async fn show_pending(repo: &dyn QueueRepository) -> CrawlerResult<()> {
//!     let query = LogQuery::for_page(42).with_filter(LogFilter::Pending);
//!     for entry in repo.query_log(&query).await? {
//!         println!("{} -> {:?}", entry.id, entry.url());
//!     }
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::models::{EnqueueBatch, LogQuery, ProcessRecord, QueueEntry, QueueFilter};
use crate::CrawlerResult;

/// 队列仓储接口
///
/// # 线程安全
///
/// 此trait要求实现 `Send + Sync`，以 `Arc<dyn QueueRepository>` 在组件间共享。
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// 指定 (页面, 配置哈希) 是否存在待处理条目
    async fn exists_unprocessed(&self, page_id: i64, configuration_hash: &str)
        -> CrawlerResult<bool>;

    /// 指定 (页面, 配置哈希) 是否尚未入队（不存在待处理条目）
    async fn is_unqueued(&self, page_id: i64, configuration_hash: &str) -> CrawlerResult<bool> {
        Ok(!self.exists_unprocessed(page_id, configuration_hash).await?)
    }

    /// 直接追加一个待处理条目，返回新条目ID
    ///
    /// 不做去重检查，调度器应使用 [`QueueRepository::enqueue_if_absent`]。
    async fn enqueue(&self, entry: &QueueEntry) -> CrawlerResult<i64>;

    /// 原子地检查并插入一批条目
    ///
    /// 同一 (页面, 配置哈希) 已存在待处理条目时不插入任何条目，返回空列表。
    /// 启用时间槽时，`parameters_hash` 在时间槽内已有待处理条目的单个URL会被跳过。
    ///
    /// # 返回值
    ///
    /// 新插入条目的ID列表
    async fn enqueue_if_absent(&self, batch: &EnqueueBatch) -> CrawlerResult<Vec<i64>>;

    /// 为指定进程认领至多 `limit` 个到期的待处理条目
    ///
    /// 认领使用比较并设置语义：被其他进程抢先认领的条目直接跳过，不视为错误。
    async fn claim_pending(
        &self,
        process_id: &str,
        limit: u32,
        now: DateTime<Utc>,
    ) -> CrawlerResult<Vec<QueueEntry>>;

    /// 记录条目执行结果
    async fn mark_executed(
        &self,
        id: i64,
        result_data: &Value,
        process_id_completed: &str,
        exec_time: DateTime<Utc>,
    ) -> CrawlerResult<()>;

    async fn get_by_id(&self, id: i64) -> CrawlerResult<Option<QueueEntry>>;

    async fn count(&self, filter: &QueueFilter) -> CrawlerResult<i64>;

    /// 删除所有匹配过滤条件的条目，返回删除数量
    async fn flush(&self, filter: &QueueFilter) -> CrawlerResult<u64>;

    /// 查询队列日志
    ///
    /// 返回按时间倒序、至多 `page_size` 个匹配条目。设置 `do_flush` 时
    /// 返回删除前的匹配条目并删除匹配项；仅设置 `do_full_flush` 不产生任何删除。
    async fn query_log(&self, query: &LogQuery) -> CrawlerResult<Vec<QueueEntry>>;

    /// 删除完成时间早于 `days` 天的已完成条目
    async fn purge_older_than(&self, days: u32) -> CrawlerResult<u64>;

    /// 删除已处理超过 `processed_age_days` 天或计划时间超过 `scheduled_age_days` 天仍未处理的条目
    async fn clean_up_old_entries(
        &self,
        processed_age_days: u32,
        scheduled_age_days: u32,
    ) -> CrawlerResult<u64>;

    /// 释放进程持有的全部待处理条目认领，返回释放数量
    async fn release_process_claims(&self, process_id: &str) -> CrawlerResult<u64>;
}

/// 进程记录仓储接口
#[async_trait]
pub trait ProcessRepository: Send + Sync {
    async fn create(&self, record: &ProcessRecord) -> CrawlerResult<()>;

    /// 在活跃记录数低于 `limit` 时创建记录，检查与插入在同一事务中完成
    ///
    /// # 返回值
    ///
    /// 创建成功返回 `true`，没有空闲名额返回 `false`
    async fn create_if_below_limit(&self, record: &ProcessRecord, limit: u32)
        -> CrawlerResult<bool>;

    async fn set_system_process_id(&self, process_id: &str, system_process_id: u32)
        -> CrawlerResult<()>;

    async fn get_by_id(&self, process_id: &str) -> CrawlerResult<Option<ProcessRecord>>;

    async fn count_active(&self) -> CrawlerResult<i64>;

    async fn list_active(&self) -> CrawlerResult<Vec<ProcessRecord>>;

    /// 创建时间早于 `cutoff` 的活跃记录
    async fn active_older_than(&self, cutoff: DateTime<Utc>) -> CrawlerResult<Vec<ProcessRecord>>;

    async fn deactivate(&self, process_id: &str) -> CrawlerResult<()>;

    /// 删除记录，返回记录是否存在
    async fn remove(&self, process_id: &str) -> CrawlerResult<bool>;

    async fn increment_assigned_items(&self, process_id: &str, count: i64) -> CrawlerResult<()>;
}
