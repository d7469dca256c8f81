//! # 数据模型
//!
//! 队列条目、Worker进程记录、页面候选与抓取配置。
//!
//! ## 数据库映射
//!
//! ### crawler_queue 表
//! - `qid` - 主键
//! - `page_id` / `configuration_hash` - 去重键
//! - `exec_time` - 完成时间，0 表示待处理
//! - `process_scheduled` / `process_id` - 认领状态
//!
//! ### crawler_process 表
//! - `process_id` - 逻辑进程ID
//! - `system_process_id` - 操作系统进程ID
//! - `active` / `assigned_at` / `ttl`

pub mod configuration;
pub mod page;
pub mod process;
pub mod queue_entry;

pub use configuration::*;
pub use page::*;
pub use process::*;
pub use queue_entry::*;
