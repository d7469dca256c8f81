use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use crawler_core::{traits::WorkerSpawner, CrawlerError, CrawlerResult};
use tokio::process::Command;
use tracing::debug;

/// 以子进程方式启动Worker：`<program> process --process-id <id> [args...]`
///
/// 子进程独立运行，父进程不等待其退出。
#[derive(Debug, Clone)]
pub struct CommandWorkerSpawner {
    program: PathBuf,
    extra_args: Vec<String>,
}

impl CommandWorkerSpawner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
        }
    }

    /// 使用当前可执行文件启动Worker
    pub fn current_exe() -> CrawlerResult<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    fn command(&self, process_id: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("process")
            .arg("--process-id")
            .arg(process_id)
            .args(&self.extra_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());
        command
    }
}

#[async_trait]
impl WorkerSpawner for CommandWorkerSpawner {
    async fn spawn(&self, process_id: &str) -> CrawlerResult<u32> {
        let child = self.command(process_id).spawn().map_err(|e| {
            CrawlerError::Execution(format!(
                "启动Worker进程失败: {}: {e}",
                self.program.display()
            ))
        })?;

        let pid = child.id().ok_or_else(|| {
            CrawlerError::Execution(format!("Worker进程 {process_id} 已退出，无法获取PID"))
        })?;
        debug!("启动Worker进程: process_id={}, pid={}", process_id, pid);
        Ok(pid)
    }
}
