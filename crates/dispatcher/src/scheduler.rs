use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crawler_core::{
    config::CrawlerSettings,
    models::{
        CrawlConfiguration, CrawlContext, EnqueueBatch, LogFilter, PageRow, ParameterSpec,
        ProcessRecord, QueueEntry, QueueFilter, CALLBACK_PARAMETER, URL_PARAMETER,
    },
    traits::{CallbackRegistry, PageSource, ProcessRepository, QueueRepository, WorkerSpawner},
    CrawlerError, CrawlerResult,
};
use crawler_infrastructure::{CrawlerMetrics, StructuredLogger};

use crate::configuration_hash::{configuration_hash, parameters_hash};
use crate::eligibility::{has_group_access, pi_filter, should_skip};
use crate::url_compiler::UrlCompiler;

/// 参数中记录处理指令的键
pub const PROC_INSTRUCTIONS_PARAMETER: &str = "procInstructions";

/// 启用时间槽去重时的时间槽宽度（秒）
pub const TIMESLOT_SECONDS: i64 = 100;

/// 一次队列构建的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub pages_seen: usize,
    pub pages_skipped: usize,
    /// 被运行上下文、访问组或处理指令过滤掉的配置数
    pub configurations_filtered: usize,
    /// 因配置错误被放弃的任务数
    pub configuration_errors: usize,
    /// 已存在待处理条目而未入队的任务数
    pub duplicates: usize,
    /// 写入队列失败的任务数
    pub store_errors: usize,
    pub entries_enqueued: usize,
}

/// 一次调度周期的结果
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub build: BuildReport,
    /// 本周期启动的Worker进程ID
    pub spawned: Vec<String>,
}

/// 抓取调度器
///
/// 将候选页面展开为队列条目，并在进程上限内启动Worker进程。
pub struct CrawlScheduler {
    queue_repo: Arc<dyn QueueRepository>,
    process_repo: Arc<dyn ProcessRepository>,
    callbacks: Arc<dyn CallbackRegistry>,
    spawner: Arc<dyn WorkerSpawner>,
    settings: Arc<CrawlerSettings>,
    metrics: Arc<CrawlerMetrics>,
    compiler: UrlCompiler,
}

impl CrawlScheduler {
    pub fn new(
        queue_repo: Arc<dyn QueueRepository>,
        process_repo: Arc<dyn ProcessRepository>,
        callbacks: Arc<dyn CallbackRegistry>,
        spawner: Arc<dyn WorkerSpawner>,
        settings: Arc<CrawlerSettings>,
        metrics: Arc<CrawlerMetrics>,
    ) -> Self {
        let compiler = UrlCompiler::new(settings.max_compile_urls);
        Self {
            queue_repo,
            process_repo,
            callbacks,
            spawner,
            settings,
            metrics,
            compiler,
        }
    }

    /// 将候选页面展开并写入队列
    ///
    /// 单个任务的配置错误或写入失败只记录日志并跳过该任务，不中断本次构建。
    pub async fn build_queue(
        &self,
        pages: &[PageRow],
        context: &CrawlContext,
    ) -> CrawlerResult<BuildReport> {
        let mut report = BuildReport::default();
        info!(
            "开始构建队列: {} 个候选页面, set_id={}",
            pages.len(),
            context.set_id
        );

        for page in pages {
            report.pages_seen += 1;

            if let Some(reason) = should_skip(page, &self.settings) {
                StructuredLogger::log_page_skipped(page.uid, &reason.to_string());
                report.pages_skipped += 1;
                continue;
            }

            for configuration in &page.configurations {
                if !self.accepts(page, configuration, context) {
                    report.configurations_filtered += 1;
                    continue;
                }

                match self.enqueue_configuration(page, configuration, context).await {
                    Ok(Some(count)) => report.entries_enqueued += count,
                    Ok(None) => report.duplicates += 1,
                    Err(e) if e.is_configuration_error() => {
                        warn!(
                            "页面 {} 的配置 {} 无效，已跳过: {}",
                            page.uid, configuration.name, e
                        );
                        report.configuration_errors += 1;
                    }
                    Err(e) => {
                        error!(
                            "页面 {} 的配置 {} 入队失败: {}",
                            page.uid, configuration.name, e
                        );
                        report.store_errors += 1;
                    }
                }
            }
        }

        self.metrics.record_enqueued(report.entries_enqueued);
        info!(
            "队列构建完成: 入队 {} 个条目, 跳过 {} 个页面, 重复 {} 个任务",
            report.entries_enqueued, report.pages_skipped, report.duplicates
        );
        Ok(report)
    }

    fn accepts(
        &self,
        page: &PageRow,
        configuration: &CrawlConfiguration,
        context: &CrawlContext,
    ) -> bool {
        if !context.accepts_configuration(&configuration.name) {
            debug!("配置 {} 不在本次运行范围内", configuration.name);
            return false;
        }
        if !has_group_access(&page.fe_group, &configuration.access_groups) {
            debug!(
                "页面 {} 的访问组不满足配置 {} 的限制",
                page.uid, configuration.name
            );
            return false;
        }
        if !pi_filter(
            &configuration.proc_instr_filter,
            &context.incoming_proc_instructions,
        ) {
            debug!("配置 {} 不支持请求的处理指令", configuration.name);
            return false;
        }
        true
    }

    /// 展开一个 (页面, 配置) 任务并原子地入队，已存在待处理条目时返回 None
    async fn enqueue_configuration(
        &self,
        page: &PageRow,
        configuration: &CrawlConfiguration,
        context: &CrawlContext,
    ) -> CrawlerResult<Option<usize>> {
        if let Some(callback) = &configuration.callback {
            self.callbacks.resolve(callback).await?;
        }

        let spec = if configuration.parameters.is_empty() {
            self.compiler.expand(&configuration.base_parameters)?
        } else {
            configuration.parameters.clone()
        };
        let urls = self.compile_page_urls(page, configuration, &spec);
        let config_hash = configuration_hash(configuration)?;

        let mut entries = Vec::with_capacity(urls.len());
        for url in urls {
            let parameters = self.entry_parameters(&url, configuration);
            let hash = parameters_hash(&parameters)?;
            entries.push(QueueEntry::new(
                page.uid,
                parameters,
                hash,
                config_hash.clone(),
                configuration.name.clone(),
                context.set_id,
                context.scheduled,
            ));
        }

        let batch = EnqueueBatch {
            page_id: page.uid,
            configuration_hash: config_hash.clone(),
            entries,
            timeslot_seconds: self.settings.enable_timeslot.then_some(TIMESLOT_SECONDS),
        };
        let inserted = self.queue_repo.enqueue_if_absent(&batch).await?;
        if inserted.is_empty() {
            debug!(
                "页面 {} 的配置 {} 已有待处理条目",
                page.uid, configuration.name
            );
            return Ok(None);
        }

        StructuredLogger::log_entries_enqueued(
            page.uid,
            &configuration.name,
            &config_hash,
            inserted.len(),
            context.scheduled,
        );
        Ok(Some(inserted.len()))
    }

    fn compile_page_urls(
        &self,
        page: &PageRow,
        configuration: &CrawlConfiguration,
        spec: &ParameterSpec,
    ) -> Vec<String> {
        let base_urls = if configuration.urls.is_empty() {
            vec![format!(
                "{}index.php?id={}",
                self.settings.frontend_base_url, page.uid
            )]
        } else {
            configuration.urls.clone()
        };
        self.compiler.compile(spec, &base_urls)
    }

    fn entry_parameters(&self, url: &str, configuration: &CrawlConfiguration) -> Value {
        let mut parameters = Map::new();
        parameters.insert(URL_PARAMETER.to_string(), json!(url));
        parameters.insert(
            PROC_INSTRUCTIONS_PARAMETER.to_string(),
            json!(configuration.proc_instructions()),
        );
        if let Some(callback) = &configuration.callback {
            parameters.insert(CALLBACK_PARAMETER.to_string(), json!(callback));
        }
        Value::Object(parameters)
    }

    /// 添加一个由回调处理的条目
    ///
    /// 回调名称必须已注册，参数必须是JSON对象。
    pub async fn add_callback_entry(
        &self,
        set_id: i64,
        parameters: Value,
        callback: &str,
        page_id: i64,
        scheduled: DateTime<Utc>,
    ) -> CrawlerResult<i64> {
        self.callbacks.resolve(callback).await?;

        let Value::Object(mut map) = parameters else {
            return Err(CrawlerError::InvalidConfiguration(
                "回调条目的参数必须是JSON对象".to_string(),
            ));
        };
        map.insert(CALLBACK_PARAMETER.to_string(), json!(callback));
        let parameters = Value::Object(map);
        let hash = parameters_hash(&parameters)?;

        let entry = QueueEntry::new(
            page_id,
            parameters,
            hash,
            String::new(),
            String::new(),
            set_id,
            scheduled,
        );
        let id = self.queue_repo.enqueue(&entry).await?;
        StructuredLogger::log_entries_enqueued(page_id, callback, "", 1, scheduled);
        self.metrics.record_enqueued(1);
        Ok(id)
    }

    /// 在进程上限内启动Worker进程，返回新进程ID
    pub async fn dispatch_workers(&self) -> CrawlerResult<Vec<String>> {
        let active = self.process_repo.count_active().await?;
        self.metrics.set_active_processes(active);

        let free_slots = i64::from(self.settings.process_limit) - active;
        if free_slots <= 0 {
            debug!("没有空闲的进程槽位: 活跃进程 {}", active);
            return Ok(Vec::new());
        }

        let pending = self
            .queue_repo
            .count(
                &QueueFilter::all()
                    .status(LogFilter::Pending)
                    .unclaimed()
                    .scheduled_before(Utc::now() + chrono::Duration::seconds(1)),
            )
            .await?;
        if pending == 0 {
            debug!("没有待处理的队列条目");
            return Ok(Vec::new());
        }

        let batch_size = i64::from(self.settings.count_in_a_run);
        let wanted = free_slots.min((pending + batch_size - 1) / batch_size);

        let mut spawned = Vec::new();
        for _ in 0..wanted {
            match self.spawn_worker().await {
                Ok(Some(process_id)) => spawned.push(process_id),
                Ok(None) => break,
                Err(e) => {
                    error!("启动Worker进程失败: {}", e);
                    break;
                }
            }
        }

        if !spawned.is_empty() {
            info!(
                "启动了 {} 个Worker进程, 待处理条目 {}",
                spawned.len(),
                pending
            );
        }
        Ok(spawned)
    }

    /// 占用一个进程槽位并启动Worker；槽位已满时返回 None
    async fn spawn_worker(&self) -> CrawlerResult<Option<String>> {
        let process_id = new_process_id();
        let record = ProcessRecord::new(&process_id, self.settings.process_max_run_time);

        if !self
            .process_repo
            .create_if_below_limit(&record, self.settings.process_limit)
            .await?
        {
            debug!("进程槽位已被占满");
            return Ok(None);
        }

        let system_process_id = match self.spawner.spawn(&process_id).await {
            Ok(pid) => pid,
            Err(e) => {
                if let Err(remove_err) = self.process_repo.remove(&process_id).await {
                    warn!("移除进程记录 {} 失败: {}", process_id, remove_err);
                }
                return Err(e);
            }
        };

        self.process_repo
            .set_system_process_id(&process_id, system_process_id)
            .await?;
        StructuredLogger::log_process_spawned(&process_id, system_process_id);
        Ok(Some(process_id))
    }

    /// 执行一个完整的调度周期：构建队列，然后启动Worker
    pub async fn run_cycle(
        &self,
        source: &dyn PageSource,
        context: &CrawlContext,
    ) -> CrawlerResult<CycleReport> {
        let pages = source.pages().await?;
        let build = self.build_queue(&pages, context).await?;
        let spawned = self.dispatch_workers().await?;
        Ok(CycleReport { build, spawned })
    }
}

/// 生成逻辑进程ID
fn new_process_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..10].to_string()
}

/// 定时运行调度周期的后台循环
pub struct SchedulerLoop {
    scheduler: Arc<CrawlScheduler>,
    source: Arc<dyn PageSource>,
    interval: Duration,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl SchedulerLoop {
    pub fn new(
        scheduler: Arc<CrawlScheduler>,
        source: Arc<dyn PageSource>,
        interval: Duration,
    ) -> Self {
        Self {
            scheduler,
            source,
            interval,
            shutdown_tx: None,
            handle: None,
        }
    }

    pub async fn start(&mut self) -> CrawlerResult<()> {
        info!("启动调度循环, 间隔 {:?}", self.interval);

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let scheduler = self.scheduler.clone();
        let source = self.source.clone();
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            let mut set_id = Utc::now().timestamp();

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let context = CrawlContext::new(set_id);
                        set_id += 1;
                        if let Err(e) = scheduler.run_cycle(source.as_ref(), &context).await {
                            error!("调度周期执行失败: {}", e);
                        }
                    }
                    _ = &mut shutdown_rx => {
                        info!("收到调度循环关闭信号");
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
                warn!("等待调度循环退出时出错: {}", e);
            }
        }

        info!("调度循环已停止");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::mocks::{memory_pool, memory_repositories, RecordingSpawner};
    use crawler_infrastructure::{SqliteProcessRepository, SqliteQueueRepository};
    use crawler_core::{
        models::LogQuery,
        traits::{CallbackContext, CrawlCallback, StaticPageSource},
        DefaultCallbackRegistry,
    };

    struct NoopCallback;

    #[async_trait::async_trait]
    impl CrawlCallback for NoopCallback {
        fn name(&self) -> &str {
            "noop"
        }

        async fn execute(&self, _: &Value, _: &CallbackContext) -> CrawlerResult<Value> {
            Ok(json!({}))
        }
    }

    struct Fixture {
        scheduler: CrawlScheduler,
        queue: Arc<dyn QueueRepository>,
        processes: Arc<dyn ProcessRepository>,
        spawner: Arc<RecordingSpawner>,
    }

    async fn fixture(settings: CrawlerSettings) -> Fixture {
        let (queue, processes) = memory_repositories().await;
        let registry = Arc::new(DefaultCallbackRegistry::new());
        registry
            .register("noop".to_string(), Arc::new(NoopCallback))
            .await
            .unwrap();
        let spawner = Arc::new(RecordingSpawner::new());

        let scheduler = CrawlScheduler::new(
            queue.clone(),
            processes.clone(),
            registry,
            spawner.clone(),
            Arc::new(settings),
            Arc::new(CrawlerMetrics::new()),
        );
        Fixture {
            scheduler,
            queue,
            processes,
            spawner,
        }
    }

    fn page(uid: i64) -> PageRow {
        PageRow::new(uid, 1)
            .with_configuration(CrawlConfiguration::new("default").with_base_parameters("&L=[0|1]"))
    }

    #[tokio::test]
    async fn test_build_queue_expands_and_deduplicates() {
        let f = fixture(CrawlerSettings::default()).await;
        let context = CrawlContext::new(1);

        let report = f.scheduler.build_queue(&[page(10)], &context).await.unwrap();
        assert_eq!(report.entries_enqueued, 2);
        assert_eq!(report.duplicates, 0);

        let entries = f
            .queue
            .query_log(&LogQuery::for_page(10))
            .await
            .unwrap();
        let mut urls: Vec<&str> = entries.iter().filter_map(|e| e.url()).collect();
        urls.sort();
        assert_eq!(urls, vec!["/index.php?id=10&L=0", "/index.php?id=10&L=1"]);

        // 第二次构建不会重复入队
        let report = f
            .scheduler
            .build_queue(&[page(10)], &CrawlContext::new(2))
            .await
            .unwrap();
        assert_eq!(report.entries_enqueued, 0);
        assert_eq!(report.duplicates, 1);
        assert_eq!(f.queue.count(&QueueFilter::all()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_build_queue_skips_ineligible_pages() {
        let mut settings = CrawlerSettings::default();
        settings.exclude_doktype.insert("news".to_string(), 7);
        let f = fixture(settings).await;

        let pages = vec![
            PageRow::new(1, 3).with_configuration(CrawlConfiguration::new("default")),
            PageRow::new(2, 7).with_configuration(CrawlConfiguration::new("default")),
            PageRow::new(3, 1)
                .hidden(true)
                .with_configuration(CrawlConfiguration::new("default")),
            PageRow::new(4, 1).with_configuration(CrawlConfiguration::new("default")),
        ];

        let report = f
            .scheduler
            .build_queue(&pages, &CrawlContext::new(1))
            .await
            .unwrap();
        assert_eq!(report.pages_seen, 4);
        assert_eq!(report.pages_skipped, 3);
        assert_eq!(report.entries_enqueued, 1);
    }

    #[tokio::test]
    async fn test_configuration_error_only_skips_that_job() {
        let f = fixture(CrawlerSettings::default()).await;
        let pages = vec![PageRow::new(5, 1)
            .with_configuration(CrawlConfiguration::new("broken").with_base_parameters("&p=[3-1]"))
            .with_configuration(CrawlConfiguration::new("unknown").with_callback("missing"))
            .with_configuration(CrawlConfiguration::new("fine"))];

        let report = f
            .scheduler
            .build_queue(&pages, &CrawlContext::new(1))
            .await
            .unwrap();
        assert_eq!(report.configuration_errors, 2);
        assert_eq!(report.entries_enqueued, 1);
    }

    #[tokio::test]
    async fn test_store_error_only_skips_that_job() {
        let pool = memory_pool().await;
        sqlx::query(
            "CREATE TRIGGER reject_page_20 BEFORE INSERT ON crawler_queue \
             WHEN NEW.page_id = 20 BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(&pool)
        .await
        .unwrap();

        let queue: Arc<dyn QueueRepository> = Arc::new(SqliteQueueRepository::new(pool.clone()));
        let scheduler = CrawlScheduler::new(
            queue.clone(),
            Arc::new(SqliteProcessRepository::new(pool)),
            Arc::new(DefaultCallbackRegistry::new()),
            Arc::new(RecordingSpawner::new()),
            Arc::new(CrawlerSettings::default()),
            Arc::new(CrawlerMetrics::new()),
        );

        let report = scheduler
            .build_queue(&[page(20), page(21)], &CrawlContext::new(1))
            .await
            .unwrap();
        assert_eq!(report.store_errors, 1);
        assert_eq!(report.entries_enqueued, 2);

        // 失败的事务已回滚，连接仍可继续使用
        assert!(queue.is_unqueued(20, "any").await.unwrap());
        assert_eq!(queue.count(&QueueFilter::all().page_id(20)).await.unwrap(), 0);
        assert_eq!(queue.count(&QueueFilter::all().page_id(21)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_context_filters_configurations() {
        let f = fixture(CrawlerSettings::default()).await;
        let reindex =
            CrawlConfiguration::new("reindex").with_proc_instr_filter("tx_indexedsearch_reindex");
        let warmup = CrawlConfiguration::new("warmup").with_proc_instr_filter("tx_cachewarmup");
        let members = CrawlConfiguration::new("members").with_access_groups("9");
        let pages = vec![PageRow::new(6, 1)
            .with_configuration(reindex)
            .with_configuration(warmup)
            .with_configuration(members)];

        let context = CrawlContext::new(1)
            .with_proc_instructions(vec!["tx_cachewarmup".to_string()]);
        let report = f.scheduler.build_queue(&pages, &context).await.unwrap();

        assert_eq!(report.configurations_filtered, 2);
        assert_eq!(report.entries_enqueued, 1);
        let entries = f.queue.query_log(&LogQuery::for_page(6)).await.unwrap();
        assert_eq!(entries[0].configuration_name, "warmup");
        assert_eq!(entries[0].parameters[PROC_INSTRUCTIONS_PARAMETER], json!(["tx_cachewarmup"]));
    }

    #[tokio::test]
    async fn test_add_callback_entry() {
        let f = fixture(CrawlerSettings::default()).await;

        let id = f
            .scheduler
            .add_callback_entry(7, json!({"foo": "bar"}), "noop", 12, Utc::now())
            .await
            .unwrap();
        let entry = f.queue.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(entry.callback_name(), Some("noop"));
        assert_eq!(entry.parameters["foo"], "bar");
        assert_eq!(entry.set_id, 7);

        let err = f
            .scheduler
            .add_callback_entry(7, json!({}), "missing", 12, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlerError::UnknownCallback { .. }));

        let err = f
            .scheduler
            .add_callback_entry(7, json!([1, 2]), "noop", 12, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlerError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn test_dispatch_respects_process_limit() {
        let mut settings = CrawlerSettings::default();
        settings.process_limit = 2;
        settings.count_in_a_run = 1;
        let f = fixture(settings).await;

        let pages: Vec<PageRow> = (1..=5)
            .map(|uid| PageRow::new(uid, 1).with_configuration(CrawlConfiguration::new("default")))
            .collect();
        f.scheduler
            .build_queue(&pages, &CrawlContext::new(1))
            .await
            .unwrap();

        let spawned = f.scheduler.dispatch_workers().await.unwrap();
        assert_eq!(spawned.len(), 2);
        assert_eq!(f.spawner.spawned(), spawned);
        assert_eq!(f.processes.count_active().await.unwrap(), 2);

        let record = f.processes.get_by_id(&spawned[0]).await.unwrap().unwrap();
        assert!(record.has_real_system_id());

        // 槽位已满
        assert!(f.scheduler.dispatch_workers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_without_pending_entries() {
        let f = fixture(CrawlerSettings::default()).await;
        assert!(f.scheduler.dispatch_workers().await.unwrap().is_empty());
        assert!(f.spawner.spawned().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_failure_releases_slot() {
        let f = fixture(CrawlerSettings::default()).await;
        f.spawner.fail_next();
        f.scheduler
            .build_queue(&[page(1)], &CrawlContext::new(1))
            .await
            .unwrap();

        assert!(f.scheduler.dispatch_workers().await.unwrap().is_empty());
        assert_eq!(f.processes.count_active().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_cycle() {
        let f = fixture(CrawlerSettings::default()).await;
        let source = StaticPageSource::new(vec![page(20)]);

        let report = f
            .scheduler
            .run_cycle(&source, &CrawlContext::new(3))
            .await
            .unwrap();
        assert_eq!(report.build.entries_enqueued, 2);
        assert_eq!(report.spawned.len(), 1);
    }

    #[test]
    fn test_process_id_format() {
        let id = new_process_id();
        assert_eq!(id.len(), 10);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
