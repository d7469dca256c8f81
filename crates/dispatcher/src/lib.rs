//! 抓取调度
//!
//! 配置哈希、URL展开、页面准入判断、队列构建与Worker进程清理。

pub mod configuration_hash;
pub mod eligibility;
pub mod process_supervisor;
pub mod scheduler;
pub mod url_compiler;

#[cfg(test)]
pub mod test_utils;

pub use configuration_hash::{configuration_hash, hash_value, parameters_hash};
pub use eligibility::{has_group_access, pi_filter, should_skip};
pub use process_supervisor::ProcessSupervisor;
pub use scheduler::{BuildReport, CrawlScheduler, CycleReport, SchedulerLoop};
pub use url_compiler::{compile_urls, expand_parameters, UrlCompiler};
