use serde::{Deserialize, Serialize};

/// 进程列表获取失败（或为空）时孤儿清理阶段的处理策略
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ListingFailurePolicy {
    /// 跳过本轮孤儿清理
    #[default]
    SkipPass,
    /// 将所有活跃进程记录视为孤儿并移除
    PurgeAll,
}

fn default_interval_seconds() -> u64 {
    60
}

fn default_stale_process_threshold_seconds() -> i64 {
    3600
}

fn default_dispatcher_marker() -> String {
    "crawler process".to_string()
}

/// 进程清理器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// 清理间隔（秒）
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    /// 超过该时长的活跃进程被视为僵死（秒）
    #[serde(default = "default_stale_process_threshold_seconds")]
    pub stale_process_threshold_seconds: i64,
    /// 用于在系统进程列表中识别Worker进程的标记
    #[serde(default = "default_dispatcher_marker")]
    pub dispatcher_marker: String,
    #[serde(default)]
    pub listing_failure_policy: ListingFailurePolicy,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            stale_process_threshold_seconds: default_stale_process_threshold_seconds(),
            dispatcher_marker: default_dispatcher_marker(),
            listing_failure_policy: ListingFailurePolicy::default(),
        }
    }
}

impl SupervisorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.interval_seconds == 0 {
            return Err(anyhow::anyhow!("清理间隔必须大于0"));
        }

        if self.stale_process_threshold_seconds <= 0 {
            return Err(anyhow::anyhow!("僵死进程阈值必须大于0"));
        }

        if self.dispatcher_marker.trim().is_empty() {
            return Err(anyhow::anyhow!("Worker进程标记不能为空"));
        }

        Ok(())
    }
}
