use async_trait::async_trait;

use crate::CrawlerResult;

/// 操作系统进程检查能力
///
/// 按目标平台在启动时选择实现，业务逻辑中不出现平台分支。
#[async_trait]
pub trait ProcessInspector: Send + Sync {
    /// 系统进程是否仍在运行
    async fn is_alive(&self, system_process_id: u32) -> CrawlerResult<bool>;

    /// 强制终止系统进程；进程已退出时视为成功
    async fn terminate(&self, system_process_id: u32) -> CrawlerResult<()>;

    /// 列出命令行包含 `marker` 的进程，返回原始列表行
    async fn list_dispatcher_processes(&self, marker: &str) -> CrawlerResult<Vec<String>>;
}

/// 从进程列表行中提取进程ID（第二个空白分隔字段）
pub fn listing_pid(line: &str) -> Option<u32> {
    line.split_whitespace().nth(1)?.parse().ok()
}

/// 进程列表中是否包含指定进程ID
pub fn listing_contains(lines: &[String], system_process_id: u32) -> bool {
    lines
        .iter()
        .any(|line| listing_pid(line) == Some(system_process_id))
}
