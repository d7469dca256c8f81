//! 抓取Worker
//!
//! Worker进程认领队列条目，通过回调或内置抓取方式执行，并写回结果。

pub mod executors;
pub mod service;

pub use executors::{
    strategy_from_settings, EntryExecutor, ExecutionResult, FetchOutcome, FetchStrategy,
    HttpFetchStrategy, SubProcessFetchStrategy,
};
pub use service::{CrawlWorker, WorkerReport};
