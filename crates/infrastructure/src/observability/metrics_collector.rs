//! 抓取队列指标
//!
//! 基于 `metrics` 门面，未安装导出器时所有记录操作均为空操作。

use anyhow::Result;
use metrics::{counter, gauge, Counter, Gauge};

pub struct CrawlerMetrics {
    entries_enqueued_total: Counter,
    entries_executed_total: Counter,
    entries_failed_total: Counter,
    processes_reaped_total: Counter,
    active_processes: Gauge,
}

impl CrawlerMetrics {
    pub fn new() -> Self {
        Self {
            entries_enqueued_total: counter!("crawler_queue_entries_enqueued_total"),
            entries_executed_total: counter!("crawler_queue_entries_executed_total"),
            entries_failed_total: counter!("crawler_queue_entries_failed_total"),
            processes_reaped_total: counter!("crawler_processes_reaped_total"),
            active_processes: gauge!("crawler_active_processes"),
        }
    }

    pub fn record_enqueued(&self, count: usize) {
        self.entries_enqueued_total.increment(count as u64);
    }

    pub fn record_executed(&self, success: bool) {
        self.entries_executed_total.increment(1);
        if !success {
            self.entries_failed_total.increment(1);
        }
    }

    pub fn record_reaped(&self, count: usize) {
        self.processes_reaped_total.increment(count as u64);
    }

    pub fn set_active_processes(&self, count: i64) {
        self.active_processes.set(count as f64);
    }
}

impl Default for CrawlerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// 安装 Prometheus 导出器，必须在 tokio 运行时内调用
pub fn init_metrics(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    tracing::info!("Prometheus metrics exporter listening on :{}", port);
    Ok(())
}
