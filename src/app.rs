use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crawler_core::{
    config::{AppConfig, CrawlerSettings},
    models::{CrawlContext, QueueFilter, ReapStats},
    traits::{PageSource, ProcessRepository, QueueRepository, WorkerSpawner},
    DefaultCallbackRegistry,
};
use crawler_dispatcher::{BuildReport, CrawlScheduler, ProcessSupervisor, SchedulerLoop};
use crawler_infrastructure::{
    default_process_inspector, CleanupStats, CrawlerMetrics, DatabaseManager, QueueCleanupConfig,
    QueueCleanupService, SqliteProcessRepository, SqliteQueueRepository,
};
use crawler_worker::{strategy_from_settings, CrawlWorker, EntryExecutor, WorkerReport};

/// 应用组装
///
/// 持有数据库连接与共享组件，按子命令组合调度器、清理器与Worker。
pub struct Application {
    config: AppConfig,
    database: DatabaseManager,
    queue_repo: Arc<dyn QueueRepository>,
    process_repo: Arc<dyn ProcessRepository>,
    callbacks: Arc<DefaultCallbackRegistry>,
    spawner: Arc<dyn WorkerSpawner>,
    settings: Arc<CrawlerSettings>,
    metrics: Arc<CrawlerMetrics>,
}

impl Application {
    pub async fn new(config: AppConfig, spawner: Arc<dyn WorkerSpawner>) -> Result<Self> {
        let database = DatabaseManager::new(&config.database)
            .await
            .context("连接数据库失败")?;
        database.migrate().await.context("初始化数据库表失败")?;

        let pool = database.pool().clone();
        let settings = Arc::new(config.crawler.clone());

        Ok(Self {
            queue_repo: Arc::new(SqliteQueueRepository::new(pool.clone())),
            process_repo: Arc::new(SqliteProcessRepository::new(pool)),
            callbacks: Arc::new(DefaultCallbackRegistry::new()),
            metrics: Arc::new(CrawlerMetrics::new()),
            config,
            database,
            spawner,
            settings,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 回调注册表，嵌入使用时在此注册自定义回调
    pub fn callbacks(&self) -> Arc<DefaultCallbackRegistry> {
        self.callbacks.clone()
    }

    pub fn queue_repository(&self) -> Arc<dyn QueueRepository> {
        self.queue_repo.clone()
    }

    pub fn process_repository(&self) -> Arc<dyn ProcessRepository> {
        self.process_repo.clone()
    }

    pub fn scheduler(&self) -> CrawlScheduler {
        CrawlScheduler::new(
            self.queue_repo.clone(),
            self.process_repo.clone(),
            self.callbacks.clone(),
            self.spawner.clone(),
            self.settings.clone(),
            self.metrics.clone(),
        )
    }

    fn supervisor(&self) -> ProcessSupervisor {
        ProcessSupervisor::new(
            self.process_repo.clone(),
            self.queue_repo.clone(),
            default_process_inspector(),
            self.config.supervisor.clone(),
            self.metrics.clone(),
        )
    }

    fn cleanup_service(&self) -> QueueCleanupService {
        QueueCleanupService::new(
            self.queue_repo.clone(),
            QueueCleanupConfig::from_settings(&self.settings),
        )
    }

    pub async fn build_queue(
        &self,
        source: &dyn PageSource,
        context: &CrawlContext,
    ) -> Result<BuildReport> {
        let pages = source.pages().await.context("读取页面列表失败")?;
        let report = self
            .scheduler()
            .build_queue(&pages, context)
            .await
            .context("构建队列失败")?;
        Ok(report)
    }

    /// 运行调度循环、进程清理与队列清理，直到收到关闭信号
    pub async fn run_dispatcher(
        &self,
        source: Arc<dyn PageSource>,
        interval: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        info!("启动调度服务");

        let mut scheduler_loop = SchedulerLoop::new(Arc::new(self.scheduler()), source, interval);
        let mut supervisor = self.supervisor();
        let mut cleanup = self.cleanup_service();

        scheduler_loop.start().await?;
        supervisor.start().await?;
        cleanup.start().await?;

        if let Err(e) = shutdown_rx.recv().await {
            warn!("关闭信号通道异常: {}", e);
        }

        info!("停止调度服务");
        scheduler_loop.stop().await?;
        supervisor.stop().await?;
        cleanup.stop().await?;
        Ok(())
    }

    pub async fn run_worker(&self, process_id: &str) -> Result<WorkerReport> {
        let strategy = strategy_from_settings(&self.settings)?;
        let worker = CrawlWorker::new(
            self.queue_repo.clone(),
            self.process_repo.clone(),
            EntryExecutor::new(strategy, self.callbacks.clone()),
            self.settings.clone(),
            self.metrics.clone(),
        );
        let report = worker
            .run(process_id)
            .await
            .with_context(|| format!("Worker {process_id} 运行失败"))?;
        Ok(report)
    }

    /// 执行一次进程清理与队列清理
    pub async fn cleanup(&self) -> Result<(ReapStats, CleanupStats)> {
        let reap = self.supervisor().reap_once().await.context("进程清理失败")?;
        let purge = self
            .cleanup_service()
            .cleanup_once()
            .await
            .context("队列清理失败")?;
        Ok((reap, purge))
    }

    pub async fn flush(&self, filter: &QueueFilter) -> Result<u64> {
        let removed = self.queue_repo.flush(filter).await.context("删除队列条目失败")?;
        info!("删除了 {} 个队列条目", removed);
        Ok(removed)
    }

    pub async fn close(&self) {
        self.database.close().await;
    }
}
