use async_trait::async_trait;

use crate::CrawlerResult;

/// 启动Worker进程
#[async_trait]
pub trait WorkerSpawner: Send + Sync {
    /// 为逻辑进程ID启动一个Worker，返回系统进程ID
    async fn spawn(&self, process_id: &str) -> CrawlerResult<u32>;
}
