use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::CrawlerResult;

/// 回调执行时的上下文
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CallbackContext {
    pub queue_entry_id: i64,
    pub page_id: i64,
    pub set_id: i64,
    pub configuration_name: String,
    pub process_id: String,
}

/// 可按名称注册的抓取回调
#[async_trait]
pub trait CrawlCallback: Send + Sync {
    fn name(&self) -> &str;

    /// 执行回调，返回写入条目结果的负载
    async fn execute(&self, parameters: &Value, context: &CallbackContext) -> CrawlerResult<Value>;
}

/// 回调注册表
#[async_trait]
pub trait CallbackRegistry: Send + Sync {
    async fn register(&self, name: String, callback: Arc<dyn CrawlCallback>) -> CrawlerResult<()>;

    async fn get(&self, name: &str) -> Option<Arc<dyn CrawlCallback>>;

    /// 按名称解析回调，未注册时返回 `UnknownCallback`
    async fn resolve(&self, name: &str) -> CrawlerResult<Arc<dyn CrawlCallback>>;

    async fn contains(&self, name: &str) -> bool;

    async fn list(&self) -> Vec<String>;
}
