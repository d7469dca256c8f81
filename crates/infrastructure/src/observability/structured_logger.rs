//! Structured logging utilities
//!
//! 每个调度动作（入队、认领、执行、跳过、清理）输出一条带 `event` 字段的结构化日志。

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// Structured logging utilities
pub struct StructuredLogger;

impl StructuredLogger {
    pub fn log_entries_enqueued(
        page_id: i64,
        configuration_name: &str,
        configuration_hash: &str,
        count: usize,
        scheduled: DateTime<Utc>,
    ) {
        info!(
            event = "queue_entry_enqueued",
            page.id = page_id,
            configuration.name = configuration_name,
            configuration.hash = configuration_hash,
            entries = count,
            scheduled = %scheduled,
            "Queue entries enqueued"
        );
    }

    pub fn log_entries_claimed(process_id: &str, count: usize) {
        info!(
            event = "queue_entries_claimed",
            process.id = process_id,
            entries = count,
            "Queue entries claimed"
        );
    }

    pub fn log_entry_executed(
        entry_id: i64,
        page_id: i64,
        process_id: &str,
        success: bool,
        duration_ms: u64,
    ) {
        if success {
            info!(
                event = "queue_entry_executed",
                entry.id = entry_id,
                page.id = page_id,
                process.id = process_id,
                duration_ms = duration_ms,
                "Queue entry executed"
            );
        } else {
            warn!(
                event = "queue_entry_executed",
                entry.id = entry_id,
                page.id = page_id,
                process.id = process_id,
                duration_ms = duration_ms,
                "Queue entry execution failed"
            );
        }
    }

    pub fn log_page_skipped(page_id: i64, reason: &str) {
        debug!(
            event = "page_skipped",
            page.id = page_id,
            reason = reason,
            "Page skipped"
        );
    }

    pub fn log_process_reaped(process_id: &str, system_process_id: u32, reason: &str) {
        info!(
            event = "process_reaped",
            process.id = process_id,
            process.system_id = system_process_id,
            reason = reason,
            "Process record reaped"
        );
    }

    pub fn log_process_listing_failed(error: &str, policy: &str) {
        warn!(
            event = "process_listing_failed",
            error = error,
            policy = policy,
            "Dispatcher process listing unavailable"
        );
    }

    pub fn log_process_spawned(process_id: &str, system_process_id: u32) {
        info!(
            event = "process_spawned",
            process.id = process_id,
            process.system_id = system_process_id,
            "Worker process spawned"
        );
    }

    pub fn log_queue_purged(kind: &str, removed: u64) {
        info!(
            event = "queue_purged",
            kind = kind,
            removed = removed,
            "Queue entries purged"
        );
    }
}
