//! 进程清理
//!
//! 每个周期依次执行两轮清理：
//! 1. 孤儿进程：记录了真实系统进程ID，但该ID不在调度进程列表中；
//! 2. 超时进程：记录创建时间超过阈值，存活则强制终止，随后无条件移除。
//!
//! 被移除记录持有的队列认领会一并释放。清理是尽力而为的，
//! 单条记录的失败只记录日志，不会中断整个周期。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crawler_core::{
    config::{ListingFailurePolicy, SupervisorConfig},
    models::{ProcessRecord, ReapStats},
    traits::{listing_contains, ProcessInspector, ProcessRepository, QueueRepository},
    CrawlerResult,
};
use crawler_infrastructure::{CrawlerMetrics, StructuredLogger};

pub struct ProcessSupervisor {
    process_repo: Arc<dyn ProcessRepository>,
    queue_repo: Arc<dyn QueueRepository>,
    inspector: Arc<dyn ProcessInspector>,
    config: SupervisorConfig,
    metrics: Arc<CrawlerMetrics>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

/// 后台任务持有的共享部分
#[derive(Clone)]
struct Reaper {
    process_repo: Arc<dyn ProcessRepository>,
    queue_repo: Arc<dyn QueueRepository>,
    inspector: Arc<dyn ProcessInspector>,
    config: SupervisorConfig,
    metrics: Arc<CrawlerMetrics>,
}

impl ProcessSupervisor {
    pub fn new(
        process_repo: Arc<dyn ProcessRepository>,
        queue_repo: Arc<dyn QueueRepository>,
        inspector: Arc<dyn ProcessInspector>,
        config: SupervisorConfig,
        metrics: Arc<CrawlerMetrics>,
    ) -> Self {
        Self {
            process_repo,
            queue_repo,
            inspector,
            config,
            metrics,
            shutdown_tx: None,
            handle: None,
        }
    }

    fn reaper(&self) -> Reaper {
        Reaper {
            process_repo: self.process_repo.clone(),
            queue_repo: self.queue_repo.clone(),
            inspector: self.inspector.clone(),
            config: self.config.clone(),
            metrics: self.metrics.clone(),
        }
    }

    /// 执行一次清理
    pub async fn reap_once(&self) -> CrawlerResult<ReapStats> {
        self.reaper().reap().await
    }

    /// 按配置的间隔启动后台清理
    pub async fn start(&mut self) -> CrawlerResult<()> {
        info!(
            "启动进程清理服务, 间隔 {}s, 超时阈值 {}s",
            self.config.interval_seconds, self.config.stale_process_threshold_seconds
        );

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let reaper = self.reaper();
        let period = Duration::from_secs(self.config.interval_seconds);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = reaper.reap().await {
                            error!("进程清理失败: {}", e);
                        }
                    }
                    _ = &mut shutdown_rx => {
                        info!("收到进程清理服务关闭信号");
                        break;
                    }
                }
            }
        });

        self.handle = Some(handle);
        Ok(())
    }

    pub async fn stop(&mut self) -> CrawlerResult<()> {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }

        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("等待进程清理服务退出时出错: {}", e);
            }
        }

        info!("进程清理服务已停止");
        Ok(())
    }
}

impl Reaper {
    async fn reap(&self) -> CrawlerResult<ReapStats> {
        let mut stats = ReapStats::default();

        self.reap_orphans(&mut stats).await?;
        self.reap_stale(&mut stats).await?;

        if stats.total_removed() > 0 {
            info!(
                "进程清理完成: 超时 {} 个 (终止 {} 个), 孤儿 {} 个, 释放认领 {} 个",
                stats.stale_removed, stats.terminated, stats.orphans_removed, stats.released_claims
            );
        } else {
            debug!("进程清理完成: 没有需要移除的记录");
        }

        self.metrics.record_reaped(stats.total_removed());
        self.metrics
            .set_active_processes(self.process_repo.count_active().await?);
        Ok(stats)
    }

    /// 孤儿进程清理，进程列表只获取一次
    async fn reap_orphans(&self, stats: &mut ReapStats) -> CrawlerResult<()> {
        let active = self.process_repo.list_active().await?;
        if active.is_empty() {
            return Ok(());
        }

        let listing = match self
            .inspector
            .list_dispatcher_processes(&self.config.dispatcher_marker)
            .await
        {
            Ok(lines) if !lines.is_empty() => Some(lines),
            Ok(_) => {
                self.listing_failed("进程列表为空");
                None
            }
            Err(e) => {
                self.listing_failed(&e.to_string());
                None
            }
        };

        let orphans: Vec<ProcessRecord> = match listing {
            Some(lines) => active
                .into_iter()
                .filter(|record| {
                    record.has_real_system_id()
                        && !listing_contains(&lines, record.system_process_id)
                })
                .collect(),
            None => {
                stats.listing_failed = true;
                match self.config.listing_failure_policy {
                    ListingFailurePolicy::SkipPass => return Ok(()),
                    ListingFailurePolicy::PurgeAll => active,
                }
            }
        };

        for record in orphans {
            if self.remove_record(&record, "orphan", stats).await {
                stats.orphans_removed += 1;
            }
        }
        Ok(())
    }

    /// 超时进程清理
    async fn reap_stale(&self, stats: &mut ReapStats) -> CrawlerResult<()> {
        let cutoff =
            Utc::now() - chrono::Duration::seconds(self.config.stale_process_threshold_seconds);
        let stale = self.process_repo.active_older_than(cutoff).await?;

        for record in stale {
            if record.has_real_system_id() {
                match self.inspector.is_alive(record.system_process_id).await {
                    Ok(true) => match self.inspector.terminate(record.system_process_id).await {
                        Ok(()) => stats.terminated += 1,
                        Err(e) => warn!(
                            "终止进程 {} (pid {}) 失败: {}",
                            record.process_id, record.system_process_id, e
                        ),
                    },
                    Ok(false) => {}
                    Err(e) => warn!(
                        "检查进程 {} (pid {}) 状态失败: {}",
                        record.process_id, record.system_process_id, e
                    ),
                }
            }

            if self.remove_record(&record, "stale", stats).await {
                stats.stale_removed += 1;
            }
        }
        Ok(())
    }

    /// 移除记录并释放其队列认领，返回是否确实移除
    async fn remove_record(
        &self,
        record: &ProcessRecord,
        reason: &str,
        stats: &mut ReapStats,
    ) -> bool {
        match self.process_repo.remove(&record.process_id).await {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                warn!("移除进程记录 {} 失败: {}", record.process_id, e);
                return false;
            }
        }

        match self.queue_repo.release_process_claims(&record.process_id).await {
            Ok(released) => stats.released_claims += released,
            Err(e) => warn!("释放进程 {} 的队列认领失败: {}", record.process_id, e),
        }

        StructuredLogger::log_process_reaped(&record.process_id, record.system_process_id, reason);
        true
    }

    fn listing_failed(&self, error: &str) {
        let policy = match self.config.listing_failure_policy {
            ListingFailurePolicy::SkipPass => "skip_pass",
            ListingFailurePolicy::PurgeAll => "purge_all",
        };
        StructuredLogger::log_process_listing_failed(error, policy);
    }
}
