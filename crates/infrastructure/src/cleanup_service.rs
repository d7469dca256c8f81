use std::sync::Arc;

use crawler_core::{config::models::CrawlerSettings, traits::QueueRepository, CrawlerResult};
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::observability::StructuredLogger;

/// 队列清理配置
#[derive(Debug, Clone)]
pub struct QueueCleanupConfig {
    /// 清理间隔（秒）
    pub cleanup_interval_seconds: u64,
    /// 已完成条目保留天数
    pub purge_queue_days: u32,
    /// 是否按处理/计划时间清理旧条目
    pub clean_up_old_entries: bool,
    pub processed_age_days: u32,
    pub scheduled_age_days: u32,
}

impl Default for QueueCleanupConfig {
    fn default() -> Self {
        Self::from_settings(&CrawlerSettings::default())
    }
}

impl QueueCleanupConfig {
    pub fn from_settings(settings: &CrawlerSettings) -> Self {
        Self {
            cleanup_interval_seconds: 3600,
            purge_queue_days: settings.purge_queue_days,
            clean_up_old_entries: settings.clean_up_old_queue_entries,
            processed_age_days: settings.clean_up_processed_age,
            scheduled_age_days: settings.clean_up_scheduled_age,
        }
    }
}

/// 队列清理服务
///
/// 定期删除过期的已完成条目，防止队列表无限增长
pub struct QueueCleanupService {
    queue_repository: Arc<dyn QueueRepository>,
    config: QueueCleanupConfig,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    cleanup_handle: Option<tokio::task::JoinHandle<()>>,
}

impl QueueCleanupService {
    pub fn new(queue_repository: Arc<dyn QueueRepository>, config: QueueCleanupConfig) -> Self {
        Self {
            queue_repository,
            config,
            shutdown_tx: None,
            cleanup_handle: None,
        }
    }

    /// 启动清理服务
    pub async fn start(&mut self) -> CrawlerResult<()> {
        info!("Starting queue cleanup service with config: {:?}", self.config);

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let queue_repository = self.queue_repository.clone();
        let config = self.config.clone();

        let handle = tokio::spawn(async move {
            let mut cleanup_interval =
                interval(std::time::Duration::from_secs(config.cleanup_interval_seconds));

            loop {
                tokio::select! {
                    _ = cleanup_interval.tick() => {
                        if let Err(e) = Self::perform_cleanup(&queue_repository, &config).await {
                            error!("Queue cleanup failed: {}", e);
                        }
                    }
                    _ = &mut shutdown_rx => {
                        info!("Queue cleanup service shutdown requested");
                        break;
                    }
                }
            }
        });

        self.cleanup_handle = Some(handle);
        Ok(())
    }

    /// 停止清理服务
    pub async fn stop(&mut self) -> CrawlerResult<()> {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }

        if let Some(handle) = self.cleanup_handle.take() {
            if let Err(e) = handle.await {
                warn!("Error waiting for queue cleanup service to stop: {}", e);
            }
        }

        info!("Queue cleanup service stopped");
        Ok(())
    }

    /// 执行一次清理操作
    pub async fn cleanup_once(&self) -> CrawlerResult<CleanupStats> {
        Self::perform_cleanup(&self.queue_repository, &self.config).await
    }

    async fn perform_cleanup(
        queue_repository: &Arc<dyn QueueRepository>,
        config: &QueueCleanupConfig,
    ) -> CrawlerResult<CleanupStats> {
        let start_time = std::time::Instant::now();
        let mut stats = CleanupStats {
            purged: queue_repository
                .purge_older_than(config.purge_queue_days)
                .await?,
            ..Default::default()
        };
        StructuredLogger::log_queue_purged("retention", stats.purged);

        if config.clean_up_old_entries {
            stats.old_entries_removed = queue_repository
                .clean_up_old_entries(config.processed_age_days, config.scheduled_age_days)
                .await?;
            StructuredLogger::log_queue_purged("old_entries", stats.old_entries_removed);
        }

        stats.duration = start_time.elapsed();
        info!(
            "Queue cleanup completed: {} entries removed in {:?}",
            stats.total(),
            stats.duration
        );
        Ok(stats)
    }
}

/// 清理统计信息
#[derive(Debug, Default)]
pub struct CleanupStats {
    /// 超过保留期被删除的已完成条目数
    pub purged: u64,
    /// 按处理/计划时间删除的条目数
    pub old_entries_removed: u64,
    pub duration: std::time::Duration,
}

impl CleanupStats {
    pub fn total(&self) -> u64 {
        self.purged + self.old_entries_removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{run_migrations, SqliteQueueRepository};
    use chrono::{Duration, Utc};
    use crawler_core::models::{QueueEntry, QueueFilter};
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn repository() -> Arc<dyn QueueRepository> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        Arc::new(SqliteQueueRepository::new(pool))
    }

    async fn finished_entry(repo: &Arc<dyn QueueRepository>, days_ago: i64) {
        let entry = QueueEntry::new(
            1,
            json!({"url": "u"}),
            "p".to_string(),
            "c".to_string(),
            "default",
            0,
            Utc::now() - Duration::days(days_ago),
        );
        let id = repo.enqueue(&entry).await.unwrap();
        repo.mark_executed(id, &json!({}), "p1", Utc::now() - Duration::days(days_ago))
            .await
            .unwrap();
    }

    #[test]
    fn test_config_from_settings() {
        let config = QueueCleanupConfig::default();
        assert_eq!(config.purge_queue_days, 14);
        assert!(config.clean_up_old_entries);
        assert_eq!(config.processed_age_days, 2);
        assert_eq!(config.scheduled_age_days, 7);
    }

    #[tokio::test]
    async fn test_cleanup_once_respects_retention() {
        let repo = repository().await;
        finished_entry(&repo, 30).await;
        finished_entry(&repo, 1).await;

        let config = QueueCleanupConfig {
            clean_up_old_entries: false,
            ..Default::default()
        };
        let service = QueueCleanupService::new(repo.clone(), config);
        let stats = service.cleanup_once().await.unwrap();

        assert_eq!(stats.purged, 1);
        assert_eq!(stats.old_entries_removed, 0);
        assert_eq!(repo.count(&QueueFilter::all()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_once_removes_old_entries() {
        let repo = repository().await;
        finished_entry(&repo, 3).await;
        finished_entry(&repo, 1).await;

        let service = QueueCleanupService::new(repo.clone(), QueueCleanupConfig::default());
        let stats = service.cleanup_once().await.unwrap();

        assert_eq!(stats.purged, 0);
        assert_eq!(stats.old_entries_removed, 1);
        assert_eq!(stats.total(), 1);
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let repo = repository().await;
        let mut service = QueueCleanupService::new(repo, QueueCleanupConfig::default());
        service.start().await.unwrap();
        service.stop().await.unwrap();
    }
}
