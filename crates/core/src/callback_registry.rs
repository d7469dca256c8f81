use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    traits::{CallbackRegistry, CrawlCallback},
    CrawlerError, CrawlerResult,
};

pub struct DefaultCallbackRegistry {
    callbacks: Arc<RwLock<HashMap<String, Arc<dyn CrawlCallback>>>>,
}

impl DefaultCallbackRegistry {
    pub fn new() -> Self {
        Self {
            callbacks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 以回调自身的名称注册一组回调
    pub async fn register_batch(
        &self,
        callbacks: Vec<Arc<dyn CrawlCallback>>,
    ) -> CrawlerResult<()> {
        let mut registry = self.callbacks.write().await;
        for callback in callbacks {
            registry.insert(callback.name().to_string(), callback);
        }
        Ok(())
    }

    pub async fn unregister(&self, name: &str) -> bool {
        let mut registry = self.callbacks.write().await;
        registry.remove(name).is_some()
    }

    pub async fn count(&self) -> usize {
        let registry = self.callbacks.read().await;
        registry.len()
    }
}

impl Default for DefaultCallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CallbackRegistry for DefaultCallbackRegistry {
    async fn register(&self, name: String, callback: Arc<dyn CrawlCallback>) -> CrawlerResult<()> {
        if name.trim().is_empty() {
            return Err(CrawlerError::InvalidConfiguration(
                "回调名称不能为空".to_string(),
            ));
        }
        let mut registry = self.callbacks.write().await;
        registry.insert(name, callback);
        Ok(())
    }

    async fn get(&self, name: &str) -> Option<Arc<dyn CrawlCallback>> {
        let registry = self.callbacks.read().await;
        registry.get(name).cloned()
    }

    async fn resolve(&self, name: &str) -> CrawlerResult<Arc<dyn CrawlCallback>> {
        self.get(name)
            .await
            .ok_or_else(|| CrawlerError::UnknownCallback {
                name: name.to_string(),
            })
    }

    async fn contains(&self, name: &str) -> bool {
        let registry = self.callbacks.read().await;
        registry.contains_key(name)
    }

    async fn list(&self) -> Vec<String> {
        let registry = self.callbacks.read().await;
        let mut names: Vec<String> = registry.keys().cloned().collect();
        names.sort();
        names
    }
}
