#[cfg(test)]
pub mod mocks {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

    use crawler_core::{
        traits::{ProcessInspector, ProcessRepository, QueueRepository, WorkerSpawner},
        CrawlerError, CrawlerResult,
    };
    use crawler_infrastructure::{run_migrations, SqliteProcessRepository, SqliteQueueRepository};

    /// 已建表的单连接内存SQLite连接池
    pub async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    /// 基于内存SQLite的队列与进程仓储
    pub async fn memory_repositories() -> (Arc<dyn QueueRepository>, Arc<dyn ProcessRepository>) {
        let pool = memory_pool().await;
        (
            Arc::new(SqliteQueueRepository::new(pool.clone())),
            Arc::new(SqliteProcessRepository::new(pool)),
        )
    }

    #[derive(Default)]
    struct InspectorState {
        alive: HashSet<u32>,
        listing: Vec<String>,
        listing_fails: bool,
        terminated: Vec<u32>,
        listing_calls: usize,
    }

    /// 可控的进程检查器
    #[derive(Default)]
    pub struct FakeProcessInspector {
        state: Mutex<InspectorState>,
    }

    impl FakeProcessInspector {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_alive(&self, pid: u32) {
            self.state.lock().unwrap().alive.insert(pid);
        }

        pub fn set_listing(&self, lines: Vec<String>) {
            self.state.lock().unwrap().listing = lines;
        }

        pub fn fail_listing(&self) {
            self.state.lock().unwrap().listing_fails = true;
        }

        pub fn terminated(&self) -> Vec<u32> {
            self.state.lock().unwrap().terminated.clone()
        }

        pub fn listing_calls(&self) -> usize {
            self.state.lock().unwrap().listing_calls
        }
    }

    #[async_trait]
    impl ProcessInspector for FakeProcessInspector {
        async fn is_alive(&self, system_process_id: u32) -> CrawlerResult<bool> {
            Ok(self.state.lock().unwrap().alive.contains(&system_process_id))
        }

        async fn terminate(&self, system_process_id: u32) -> CrawlerResult<()> {
            let mut state = self.state.lock().unwrap();
            state.alive.remove(&system_process_id);
            state.terminated.push(system_process_id);
            Ok(())
        }

        async fn list_dispatcher_processes(&self, _marker: &str) -> CrawlerResult<Vec<String>> {
            let mut state = self.state.lock().unwrap();
            state.listing_calls += 1;
            if state.listing_fails {
                return Err(CrawlerError::ProcessInspection("ps 执行失败".to_string()));
            }
            Ok(state.listing.clone())
        }
    }

    /// 记录启动请求的Worker启动器
    pub struct RecordingSpawner {
        spawned: Mutex<Vec<String>>,
        next_pid: AtomicU32,
        fail_next: AtomicBool,
    }

    impl RecordingSpawner {
        pub fn new() -> Self {
            Self {
                spawned: Mutex::new(Vec::new()),
                next_pid: AtomicU32::new(10_000),
                fail_next: AtomicBool::new(false),
            }
        }

        pub fn fail_next(&self) {
            self.fail_next.store(true, Ordering::SeqCst);
        }

        pub fn spawned(&self) -> Vec<String> {
            self.spawned.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WorkerSpawner for RecordingSpawner {
        async fn spawn(&self, process_id: &str) -> CrawlerResult<u32> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(CrawlerError::Execution("无法启动Worker进程".to_string()));
            }
            self.spawned.lock().unwrap().push(process_id.to_string());
            Ok(self.next_pid.fetch_add(1, Ordering::SeqCst))
        }
    }
}
