use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Worker进程记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessRecord {
    /// 逻辑进程ID
    pub process_id: String,
    /// 操作系统进程ID，0 或 1 表示未知
    pub system_process_id: u32,
    pub active: bool,
    pub assigned_at: DateTime<Utc>,
    /// 记录预期的失效时间
    pub ttl: DateTime<Utc>,
    pub assigned_items_count: i64,
}

impl ProcessRecord {
    /// 创建新的活跃进程记录
    pub fn new(process_id: impl Into<String>, max_run_time_seconds: u64) -> Self {
        let now = Utc::now();
        Self {
            process_id: process_id.into(),
            system_process_id: 0,
            active: true,
            assigned_at: now,
            ttl: now + Duration::seconds(max_run_time_seconds as i64),
            assigned_items_count: 0,
        }
    }

    /// 是否记录了真实的系统进程ID
    pub fn has_real_system_id(&self) -> bool {
        self.system_process_id > 1
    }

    /// 记录创建时间是否早于给定阈值
    pub fn is_older_than(&self, threshold: Duration, now: DateTime<Utc>) -> bool {
        self.assigned_at < now - threshold
    }
}

/// 一次进程清理的统计结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReapStats {
    /// 因超时被移除的记录数
    pub stale_removed: usize,
    /// 超时且仍存活、被强制终止的进程数
    pub terminated: usize,
    /// 因找不到对应系统进程被移除的记录数
    pub orphans_removed: usize,
    /// 进程列表获取失败或为空
    pub listing_failed: bool,
    /// 释放的队列条目认领数
    pub released_claims: u64,
}

impl ReapStats {
    pub fn total_removed(&self) -> usize {
        self.stale_removed + self.orphans_removed
    }
}
