use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_sleep_time() -> u64 {
    1000
}

fn default_sleep_after_finish() -> u64 {
    10
}

fn default_count_in_a_run() -> u32 {
    100
}

fn default_purge_queue_days() -> u32 {
    14
}

fn default_process_limit() -> u32 {
    1
}

fn default_process_max_run_time() -> u64 {
    300
}

fn default_max_compile_urls() -> usize {
    10_000
}

fn default_frontend_base_url() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}

fn default_clean_up_processed_age() -> u32 {
    2
}

fn default_clean_up_scheduled_age() -> u32 {
    7
}

/// 抓取扩展配置
///
/// 所有组件通过构造函数显式接收此配置（通常包装为 `Arc<CrawlerSettings>`），
/// 不存在全局可变配置。字段名使用 snake_case，同时接受原有的 camelCase 写法。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerSettings {
    /// 同一批次内两个条目之间的等待时间（毫秒）
    #[serde(default = "default_sleep_time", alias = "sleepTime")]
    pub sleep_time: u64,
    /// 一个批次处理完成后的等待时间（秒）
    #[serde(default = "default_sleep_after_finish", alias = "sleepAfterFinish")]
    pub sleep_after_finish: u64,
    /// 每个批次认领的条目数
    #[serde(default = "default_count_in_a_run", alias = "countInARun")]
    pub count_in_a_run: u32,
    /// 已完成条目的保留天数
    #[serde(default = "default_purge_queue_days", alias = "purgeQueueDays")]
    pub purge_queue_days: u32,
    /// 同时活跃的Worker进程上限
    #[serde(default = "default_process_limit", alias = "processLimit")]
    pub process_limit: u32,
    /// Worker进程最长运行时间（秒）
    #[serde(default = "default_process_max_run_time", alias = "processMaxRunTime")]
    pub process_max_run_time: u64,
    /// 单个配置最多展开的URL数量
    #[serde(default = "default_max_compile_urls", alias = "maxCompileUrls")]
    pub max_compile_urls: usize,
    #[serde(default, alias = "crawlHiddenPages")]
    pub crawl_hidden_pages: bool,
    /// 标签 -> 页面类型
    #[serde(default, alias = "excludeDoktype")]
    pub exclude_doktype: BTreeMap<String, i32>,
    #[serde(default = "default_true", alias = "enableTimeslot")]
    pub enable_timeslot: bool,
    #[serde(default, alias = "makeDirectRequests")]
    pub make_direct_requests: bool,
    /// 直接请求模式下执行的程序
    #[serde(default, alias = "directRequestCommand")]
    pub direct_request_command: String,
    #[serde(default = "default_frontend_base_url", alias = "frontendBaseUrl")]
    pub frontend_base_url: String,
    #[serde(default = "default_true", alias = "cleanUpOldQueueEntries")]
    pub clean_up_old_queue_entries: bool,
    /// 已处理条目的清理阈值（天）
    #[serde(
        default = "default_clean_up_processed_age",
        alias = "cleanUpProcessedAge"
    )]
    pub clean_up_processed_age: u32,
    /// 从未处理条目的清理阈值（天）
    #[serde(
        default = "default_clean_up_scheduled_age",
        alias = "cleanUpScheduledAge"
    )]
    pub clean_up_scheduled_age: u32,
}

impl Default for CrawlerSettings {
    fn default() -> Self {
        Self {
            sleep_time: default_sleep_time(),
            sleep_after_finish: default_sleep_after_finish(),
            count_in_a_run: default_count_in_a_run(),
            purge_queue_days: default_purge_queue_days(),
            process_limit: default_process_limit(),
            process_max_run_time: default_process_max_run_time(),
            max_compile_urls: default_max_compile_urls(),
            crawl_hidden_pages: false,
            exclude_doktype: BTreeMap::new(),
            enable_timeslot: true,
            make_direct_requests: false,
            direct_request_command: String::new(),
            frontend_base_url: default_frontend_base_url(),
            clean_up_old_queue_entries: true,
            clean_up_processed_age: default_clean_up_processed_age(),
            clean_up_scheduled_age: default_clean_up_scheduled_age(),
        }
    }
}

impl CrawlerSettings {
    pub fn sleep_between_entries(&self) -> Duration {
        Duration::from_millis(self.sleep_time)
    }

    pub fn sleep_after_batch(&self) -> Duration {
        Duration::from_secs(self.sleep_after_finish)
    }

    pub fn max_run_time(&self) -> Duration {
        Duration::from_secs(self.process_max_run_time)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.count_in_a_run == 0 {
            return Err(anyhow::anyhow!("每批次条目数必须大于0"));
        }

        if self.process_limit == 0 {
            return Err(anyhow::anyhow!("Worker进程上限必须大于0"));
        }

        if self.process_max_run_time == 0 {
            return Err(anyhow::anyhow!("Worker最长运行时间必须大于0"));
        }

        if self.max_compile_urls == 0 {
            return Err(anyhow::anyhow!("URL展开上限必须大于0"));
        }

        if self.make_direct_requests && self.direct_request_command.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "启用直接请求时必须配置 direct_request_command"
            ));
        }

        Ok(())
    }
}
