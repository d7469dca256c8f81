use thiserror::Error;

/// 抓取调度器错误类型定义
#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("未注册的回调: {name}")]
    UnknownCallback { name: String },

    #[error("配置错误: {0}")]
    InvalidConfiguration(String),

    #[error("无效的参数定义: {0}")]
    InvalidParameters(String),

    #[error("队列条目未找到: {id}")]
    QueueEntryNotFound { id: i64 },

    #[error("进程记录未找到: {id}")]
    ProcessNotFound { id: String },

    #[error("进程检查失败: {0}")]
    ProcessInspection(String),

    #[error("任务执行错误: {0}")]
    Execution(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for CrawlerError {
    fn from(e: serde_json::Error) -> Self {
        CrawlerError::Serialization(e.to_string())
    }
}

impl CrawlerError {
    /// 是否属于单个任务的配置错误（只影响当前任务，不中断整个周期）
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            CrawlerError::UnknownCallback { .. }
                | CrawlerError::InvalidConfiguration(_)
                | CrawlerError::InvalidParameters(_)
        )
    }
}

/// 统一的Result类型
pub type CrawlerResult<T> = std::result::Result<T, CrawlerError>;
