use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use crawler_core::{
    config::{AppConfig, LogFormat},
    models::{LogFilter, QueueFilter},
};

/// 命令行入口
#[derive(Parser, Debug)]
#[command(name = "crawler")]
#[command(version = "1.0.0")]
#[command(about = "页面抓取队列调度系统")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 配置文件路径
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// 日志级别，覆盖配置文件
    #[arg(
        short = 'l',
        long,
        global = true,
        value_parser = ["trace", "debug", "info", "warn", "error"]
    )]
    pub log_level: Option<String>,

    /// 日志格式，覆盖配置文件
    #[arg(long, global = true, value_parser = ["json", "pretty", "compact"])]
    pub log_format: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// 根据页面列表构建队列
    BuildQueue {
        /// 页面列表 (JSON数组文件)
        #[arg(long)]
        pages: PathBuf,
        /// 批次ID，默认使用当前时间戳
        #[arg(long)]
        set_id: Option<i64>,
        /// 只处理指定的配置，逗号分隔
        #[arg(long, value_delimiter = ',')]
        configuration: Vec<String>,
        /// 请求的处理指令，逗号分隔
        #[arg(long = "proc-instruction", value_delimiter = ',')]
        proc_instructions: Vec<String>,
    },
    /// 运行调度循环与进程清理
    Dispatch {
        /// 每个周期重新读取的页面列表，不指定时只启动Worker
        #[arg(long)]
        pages: Option<PathBuf>,
        /// 调度间隔（秒）
        #[arg(long, default_value_t = 60)]
        interval: u64,
    },
    /// 作为Worker进程处理队列
    Process {
        #[arg(long)]
        process_id: String,
    },
    /// 执行一次进程清理与队列清理
    Cleanup,
    /// 删除队列条目
    Flush {
        /// 条目状态
        #[arg(long, default_value = "all", value_parser = ["all", "pending", "finished"])]
        mode: String,
        #[arg(long)]
        configuration: Option<String>,
        #[arg(long)]
        page_id: Option<i64>,
        #[arg(long)]
        set_id: Option<i64>,
    },
}

impl Cli {
    /// 将命令行中的日志设置写入配置
    pub fn apply_overrides(&self, config: &mut AppConfig) -> Result<()> {
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.observability.log_format = format.parse::<LogFormat>()?;
        }
        Ok(())
    }

    /// 启动Worker子进程时需要透传的全局参数
    pub fn worker_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(config) = &self.config {
            args.extend(["--config".to_string(), config.clone()]);
        }
        if let Some(level) = &self.log_level {
            args.extend(["--log-level".to_string(), level.clone()]);
        }
        if let Some(format) = &self.log_format {
            args.extend(["--log-format".to_string(), format.clone()]);
        }
        args
    }
}

/// flush 子命令的过滤条件
pub fn flush_filter(
    mode: &str,
    configuration: Option<&str>,
    page_id: Option<i64>,
    set_id: Option<i64>,
) -> QueueFilter {
    let status = match mode {
        "pending" => LogFilter::Pending,
        "finished" => LogFilter::Finished,
        _ => LogFilter::All,
    };

    let mut filter = QueueFilter::all().status(status);
    if let Some(name) = configuration {
        filter = filter.configuration_name(name);
    }
    if let Some(page_id) = page_id {
        filter = filter.page_id(page_id);
    }
    if let Some(set_id) = set_id {
        filter = filter.set_id(set_id);
    }
    filter
}
