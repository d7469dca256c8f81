//! 操作系统进程检查
//!
//! POSIX 实现通过 `/proc`（不存在时使用 `kill -0`）判断存活，`kill -9` 终止，
//! `ps aux` 列出进程；Windows 实现使用 `tasklist` 与 `taskkill`。

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use crawler_core::{traits::ProcessInspector, CrawlerError, CrawlerResult};
use tokio::process::Command;
use tracing::{debug, warn};

async fn run_command(program: &str, args: &[&str]) -> CrawlerResult<std::process::Output> {
    Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| CrawlerError::ProcessInspection(format!("执行{program}命令失败: {e}")))
}

#[derive(Debug, Clone, Default)]
pub struct PosixProcessInspector;

impl PosixProcessInspector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessInspector for PosixProcessInspector {
    async fn is_alive(&self, system_process_id: u32) -> CrawlerResult<bool> {
        if Path::new("/proc").is_dir() {
            return Ok(Path::new(&format!("/proc/{system_process_id}")).exists());
        }
        let pid = system_process_id.to_string();
        let output = run_command("kill", &["-0", &pid]).await?;
        Ok(output.status.success())
    }

    async fn terminate(&self, system_process_id: u32) -> CrawlerResult<()> {
        let pid = system_process_id.to_string();
        let output = run_command("kill", &["-9", &pid]).await?;
        if output.status.success() {
            debug!("已终止进程: pid={}", system_process_id);
            return Ok(());
        }

        // 进程已退出视为成功
        if !self.is_alive(system_process_id).await? {
            return Ok(());
        }

        let error_msg = String::from_utf8_lossy(&output.stderr);
        Err(CrawlerError::ProcessInspection(format!(
            "终止进程失败: pid={system_process_id}, error={error_msg}"
        )))
    }

    async fn list_dispatcher_processes(&self, marker: &str) -> CrawlerResult<Vec<String>> {
        let output = run_command("ps", &["aux"]).await?;
        if !output.status.success() {
            return Err(CrawlerError::ProcessInspection(format!(
                "ps命令返回失败状态: {}",
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(filter_listing(&stdout, marker))
    }
}

#[derive(Debug, Clone)]
pub struct WindowsProcessInspector {
    image_name: String,
}

impl WindowsProcessInspector {
    pub fn new(image_name: impl Into<String>) -> Self {
        Self {
            image_name: image_name.into(),
        }
    }
}

impl Default for WindowsProcessInspector {
    fn default() -> Self {
        Self::new("crawler.exe")
    }
}

#[async_trait]
impl ProcessInspector for WindowsProcessInspector {
    async fn is_alive(&self, system_process_id: u32) -> CrawlerResult<bool> {
        let filter = format!("PID eq {system_process_id}");
        let output = run_command("tasklist", &["/FI", &filter, "/NH"]).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let lines: Vec<String> = stdout.lines().map(str::to_string).collect();
        Ok(crawler_core::traits::listing_contains(
            &lines,
            system_process_id,
        ))
    }

    async fn terminate(&self, system_process_id: u32) -> CrawlerResult<()> {
        let pid = system_process_id.to_string();
        let output = run_command("taskkill", &["/PID", &pid, "/F"]).await?;
        if output.status.success() || !self.is_alive(system_process_id).await? {
            return Ok(());
        }

        let error_msg = String::from_utf8_lossy(&output.stderr);
        Err(CrawlerError::ProcessInspection(format!(
            "终止进程失败: pid={system_process_id}, error={error_msg}"
        )))
    }

    async fn list_dispatcher_processes(&self, _marker: &str) -> CrawlerResult<Vec<String>> {
        // tasklist 不包含命令行，按映像名称过滤
        let filter = format!("IMAGENAME eq {}", self.image_name);
        let output = run_command("tasklist", &["/FI", &filter, "/NH"]).await?;
        if !output.status.success() {
            return Err(CrawlerError::ProcessInspection(format!(
                "tasklist命令返回失败状态: {}",
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(filter_listing(&stdout, &self.image_name))
    }
}

/// 保留包含 `marker` 的列表行，排除 grep 自身
pub fn filter_listing(listing: &str, marker: &str) -> Vec<String> {
    listing
        .lines()
        .filter(|line| line.contains(marker) && !line.contains("grep "))
        .map(|line| line.trim().to_string())
        .collect()
}

/// 按编译目标平台选择进程检查实现
pub fn default_process_inspector() -> Arc<dyn ProcessInspector> {
    #[cfg(windows)]
    {
        Arc::new(WindowsProcessInspector::default())
    }
    #[cfg(not(windows))]
    {
        if !Path::new("/proc").is_dir() {
            warn!("/proc 不可用，使用 kill -0 检查进程存活");
        }
        Arc::new(PosixProcessInspector::new())
    }
}
