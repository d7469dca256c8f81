use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::{error, info, warn};

use crawler::{
    app::Application,
    cli::{flush_filter, Cli, Commands},
    shutdown::{wait_for_os_signal, ShutdownSignal},
};
use crawler_core::{config::AppConfig, models::CrawlContext, traits::StaticPageSource};
use crawler_infrastructure::{init_logging, init_metrics, CommandWorkerSpawner};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("加载配置失败")?;
    cli.apply_overrides(&mut config)?;

    init_logging(
        &config.observability.log_level,
        config.observability.log_format,
    )?;

    let spawner = CommandWorkerSpawner::current_exe()?.with_args(cli.worker_args());
    let app = Application::new(config, Arc::new(spawner)).await?;

    let result = run(&app, cli.command).await;
    if let Err(e) = &result {
        error!("执行失败: {e:#}");
    }
    app.close().await;
    result
}

async fn run(app: &Application, command: Commands) -> Result<()> {
    match command {
        Commands::BuildQueue {
            pages,
            set_id,
            configuration,
            proc_instructions,
        } => {
            let source = load_pages(&pages)?;
            let context = CrawlContext::new(set_id.unwrap_or_else(|| Utc::now().timestamp()))
                .with_configurations(configuration)
                .with_proc_instructions(proc_instructions);

            let report = app.build_queue(&source, &context).await?;
            info!(
                "队列构建完成: set_id={}, 页面 {}, 跳过 {}, 入队 {}, 重复 {}, 配置错误 {}",
                context.set_id,
                report.pages_seen,
                report.pages_skipped,
                report.entries_enqueued,
                report.duplicates,
                report.configuration_errors
            );
        }
        Commands::Dispatch { pages, interval } => {
            let observability = &app.config().observability;
            if observability.metrics_enabled {
                init_metrics(observability.metrics_port)?;
            }

            let source = match pages {
                Some(path) => load_pages(&path)?,
                None => StaticPageSource::default(),
            };

            let shutdown = ShutdownSignal::new();
            let shutdown_rx = shutdown.subscribe();
            let signal_task = {
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    wait_for_os_signal().await;
                    shutdown.trigger();
                })
            };

            app.run_dispatcher(
                Arc::new(source),
                Duration::from_secs(interval.max(1)),
                shutdown_rx,
            )
            .await?;
            signal_task.abort();
        }
        Commands::Process { process_id } => {
            tokio::select! {
                report = app.run_worker(&process_id) => {
                    report?;
                }
                _ = wait_for_os_signal() => {
                    warn!("Worker {} 被中断", process_id);
                }
            }
        }
        Commands::Cleanup => {
            let (reap, purge) = app.cleanup().await?;
            info!(
                "清理完成: 移除进程记录 {}, 删除队列条目 {}",
                reap.total_removed(),
                purge.total()
            );
        }
        Commands::Flush {
            mode,
            configuration,
            page_id,
            set_id,
        } => {
            let filter = flush_filter(&mode, configuration.as_deref(), page_id, set_id);
            app.flush(&filter).await?;
        }
    }
    Ok(())
}

fn load_pages(path: &std::path::Path) -> Result<StaticPageSource> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("读取页面列表失败: {}", path.display()))?;
    StaticPageSource::from_json(&json)
        .with_context(|| format!("解析页面列表失败: {}", path.display()))
}
