use async_trait::async_trait;

use crate::models::PageRow;
use crate::CrawlerResult;

/// 页面候选来源
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn pages(&self) -> CrawlerResult<Vec<PageRow>>;
}

/// 内存中的固定页面列表
#[derive(Debug, Clone, Default)]
pub struct StaticPageSource {
    pages: Vec<PageRow>,
}

impl StaticPageSource {
    pub fn new(pages: Vec<PageRow>) -> Self {
        Self { pages }
    }

    /// 从JSON数组解析页面列表
    pub fn from_json(json: &str) -> CrawlerResult<Self> {
        Ok(Self::new(serde_json::from_str(json)?))
    }
}

#[async_trait]
impl PageSource for StaticPageSource {
    async fn pages(&self) -> CrawlerResult<Vec<PageRow>> {
        Ok(self.pages.clone())
    }
}
