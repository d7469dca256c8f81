use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crawler_core::{
    config::CrawlerSettings,
    models::QueueEntry,
    traits::{ProcessRepository, QueueRepository},
    CrawlerError, CrawlerResult,
};
use crawler_infrastructure::{CrawlerMetrics, StructuredLogger};

use crate::executors::EntryExecutor;

/// 一次Worker运行的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub batches: usize,
    pub executed: usize,
    pub failed: usize,
}

/// Worker进程的主体
///
/// 以逻辑进程ID分批认领待处理条目并依次执行，直到队列清空、
/// 超过最长运行时间或进程记录被清理。结束时将进程记录置为非活跃。
pub struct CrawlWorker {
    queue_repo: Arc<dyn QueueRepository>,
    process_repo: Arc<dyn ProcessRepository>,
    executor: EntryExecutor,
    settings: Arc<CrawlerSettings>,
    metrics: Arc<CrawlerMetrics>,
}

impl CrawlWorker {
    pub fn new(
        queue_repo: Arc<dyn QueueRepository>,
        process_repo: Arc<dyn ProcessRepository>,
        executor: EntryExecutor,
        settings: Arc<CrawlerSettings>,
        metrics: Arc<CrawlerMetrics>,
    ) -> Self {
        Self {
            queue_repo,
            process_repo,
            executor,
            settings,
            metrics,
        }
    }

    pub async fn run(&self, process_id: &str) -> CrawlerResult<WorkerReport> {
        info!("Worker {} 开始运行", process_id);
        let result = self.process_batches(process_id).await;

        // 异常退出时释放未执行的认领
        if result.is_err() {
            match self.queue_repo.release_process_claims(process_id).await {
                Ok(released) if released > 0 => {
                    warn!("Worker {} 异常退出，释放了 {} 个认领", process_id, released)
                }
                Ok(_) => {}
                Err(e) => warn!("释放Worker {} 的认领失败: {}", process_id, e),
            }
        }

        match self.process_repo.deactivate(process_id).await {
            Ok(()) => {}
            Err(CrawlerError::ProcessNotFound { .. }) => {
                debug!("Worker {} 的进程记录已被移除", process_id)
            }
            Err(e) => warn!("将Worker {} 置为非活跃失败: {}", process_id, e),
        }

        let report = result?;
        info!(
            "Worker {} 结束: {} 个批次, 执行 {} 个条目, 失败 {} 个",
            process_id, report.batches, report.executed, report.failed
        );
        Ok(report)
    }

    async fn process_batches(&self, process_id: &str) -> CrawlerResult<WorkerReport> {
        let started = Instant::now();
        let max_run_time = self.settings.max_run_time();
        let mut report = WorkerReport::default();

        loop {
            if !self.still_registered(process_id).await? {
                warn!("Worker {} 的进程记录已失效，停止认领", process_id);
                break;
            }

            let entries = self
                .queue_repo
                .claim_pending(process_id, self.settings.count_in_a_run, Utc::now())
                .await?;
            if entries.is_empty() {
                debug!("Worker {} 没有可认领的条目", process_id);
                break;
            }

            StructuredLogger::log_entries_claimed(process_id, entries.len());
            self.process_repo
                .increment_assigned_items(process_id, entries.len() as i64)
                .await?;

            self.execute_batch(process_id, &entries, &mut report).await?;
            report.batches += 1;

            if started.elapsed() >= max_run_time {
                info!("Worker {} 达到最长运行时间 {:?}", process_id, max_run_time);
                break;
            }
            sleep(self.settings.sleep_after_batch()).await;
        }

        Ok(report)
    }

    async fn execute_batch(
        &self,
        process_id: &str,
        entries: &[QueueEntry],
        report: &mut WorkerReport,
    ) -> CrawlerResult<()> {
        for (index, entry) in entries.iter().enumerate() {
            if index > 0 {
                sleep(self.settings.sleep_between_entries()).await;
            }

            let result = self.executor.execute(entry, process_id).await;
            self.queue_repo
                .mark_executed(entry.id, &result.result_data, process_id, Utc::now())
                .await?;

            StructuredLogger::log_entry_executed(
                entry.id,
                entry.page_id,
                process_id,
                result.success,
                result.duration_ms,
            );
            self.metrics.record_executed(result.success);
            report.executed += 1;
            if !result.success {
                report.failed += 1;
            }
        }
        Ok(())
    }

    async fn still_registered(&self, process_id: &str) -> CrawlerResult<bool> {
        Ok(self
            .process_repo
            .get_by_id(process_id)
            .await?
            .is_some_and(|record| record.active))
    }
}
