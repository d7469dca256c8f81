//! 配置管理
//!
//! 配置由 TOML 文件与 `CRAWLER_` 前缀的环境变量组成，加载后不可变，
//! 通过构造函数显式传递给各组件。
//!
//! ```rust,no_run
//! use crawler_core::config::AppConfig;
//!
//! let config = AppConfig::load(Some("config/crawler.toml")).unwrap();
//! println!("进程上限: {}", config.crawler.process_limit);
//! ```

pub mod models;

pub use models::*;
