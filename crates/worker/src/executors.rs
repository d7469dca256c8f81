use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crawler_core::{
    config::CrawlerSettings,
    models::QueueEntry,
    traits::{CallbackContext, CallbackRegistry},
    CrawlerError, CrawlerResult,
};

/// 请求头：携带条目ID与参数哈希，便于前端识别抓取请求
pub const CRAWLER_REQUEST_HEADER: &str = "X-Crawler-Request";

/// 默认请求超时（秒）
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// 单次抓取的结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub execution_time_ms: u64,
}

impl FetchOutcome {
    fn failed(message: String, started: Instant) -> Self {
        Self {
            success: false,
            error_message: Some(message),
            execution_time_ms: started.elapsed().as_millis() as u64,
            ..Default::default()
        }
    }
}

/// 内置抓取方式
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// 执行条目的请求；请求失败体现在结果中，参数无效时返回错误
    async fn fetch(&self, entry: &QueueEntry) -> CrawlerResult<FetchOutcome>;
}

fn entry_url(entry: &QueueEntry) -> CrawlerResult<&str> {
    entry.url().ok_or_else(|| {
        CrawlerError::InvalidConfiguration(format!("队列条目 {} 缺少url参数", entry.id))
    })
}

/// HTTP抓取
pub struct HttpFetchStrategy {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetchStrategy {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for HttpFetchStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FetchStrategy for HttpFetchStrategy {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, entry: &QueueEntry) -> CrawlerResult<FetchOutcome> {
        let url = entry_url(entry)?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(CrawlerError::InvalidConfiguration(format!(
                "无法请求相对URL: {url}，请配置 frontend_base_url"
            )));
        }

        let started = Instant::now();
        debug!("HTTP请求: entry_id={}, url={}", entry.id, url);

        let response = match self
            .client
            .get(url)
            .timeout(self.timeout)
            .header(
                CRAWLER_REQUEST_HEADER,
                format!("{}:{}", entry.id, entry.parameters_hash),
            )
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Ok(FetchOutcome::failed(format!("HTTP请求失败: {e}"), started)),
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return Ok(FetchOutcome::failed(format!("读取响应体失败: {e}"), started)),
        };

        // 前端返回JSON时保留其内容
        let output = serde_json::from_str::<Value>(&body).ok();

        Ok(FetchOutcome {
            success: status.is_success(),
            status_code: Some(status.as_u16()),
            content_length: Some(body.len()),
            output,
            error_message: (!status.is_success())
                .then(|| format!("HTTP请求失败，状态码: {}", status.as_u16())),
            execution_time_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// 子进程抓取：`<command> <url>`，标准输出作为结果
pub struct SubProcessFetchStrategy {
    command: PathBuf,
    timeout: Duration,
}

impl SubProcessFetchStrategy {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl FetchStrategy for SubProcessFetchStrategy {
    fn name(&self) -> &str {
        "sub_process"
    }

    async fn fetch(&self, entry: &QueueEntry) -> CrawlerResult<FetchOutcome> {
        let url = entry_url(entry)?;
        let started = Instant::now();

        let mut command = Command::new(&self.command);
        command
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|e| {
            CrawlerError::Execution(format!("启动请求命令失败: {}: {e}", self.command.display()))
        })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Ok(FetchOutcome::failed(format!("等待请求命令失败: {e}"), started))
            }
            Err(_) => {
                return Ok(FetchOutcome::failed(
                    format!("请求命令超时: {:?}", self.timeout),
                    started,
                ))
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let success = output.status.success();

        let error_message = if !success {
            Some(if stderr.is_empty() {
                format!("请求命令执行失败，退出码: {:?}", output.status.code())
            } else {
                stderr
            })
        } else {
            None
        };

        Ok(FetchOutcome {
            success,
            status_code: None,
            content_length: Some(stdout.len()),
            output: Some(serde_json::from_str(&stdout).unwrap_or(Value::String(stdout))),
            error_message,
            execution_time_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// 按配置选择内置抓取方式
pub fn strategy_from_settings(settings: &CrawlerSettings) -> CrawlerResult<Arc<dyn FetchStrategy>> {
    if settings.make_direct_requests {
        if settings.direct_request_command.trim().is_empty() {
            return Err(CrawlerError::InvalidConfiguration(
                "启用直接请求时必须配置 direct_request_command".to_string(),
            ));
        }
        Ok(Arc::new(SubProcessFetchStrategy::new(
            settings.direct_request_command.trim(),
        )))
    } else {
        Ok(Arc::new(HttpFetchStrategy::new()))
    }
}

/// 条目执行器
///
/// 带回调名称的条目交给注册的回调处理，其他条目使用内置抓取方式。
/// 任何失败都转换为结果数据，不会向调用方返回错误。
pub struct EntryExecutor {
    strategy: Arc<dyn FetchStrategy>,
    callbacks: Arc<dyn CallbackRegistry>,
}

/// 条目执行结果
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub success: bool,
    pub result_data: Value,
    pub duration_ms: u64,
}

impl EntryExecutor {
    pub fn new(strategy: Arc<dyn FetchStrategy>, callbacks: Arc<dyn CallbackRegistry>) -> Self {
        Self {
            strategy,
            callbacks,
        }
    }

    pub async fn execute(&self, entry: &QueueEntry, process_id: &str) -> ExecutionResult {
        let started = Instant::now();

        let outcome = match entry.callback_name() {
            Some(name) => self.run_callback(name, entry, process_id).await,
            None => self
                .strategy
                .fetch(entry)
                .await
                .map(|outcome| (outcome.success, json!(outcome))),
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok((success, result_data)) => ExecutionResult {
                success,
                result_data,
                duration_ms,
            },
            Err(e) => {
                warn!("队列条目 {} 执行失败: {}", entry.id, e);
                ExecutionResult {
                    success: false,
                    result_data: json!({
                        "success": false,
                        "error_message": e.to_string(),
                        "configuration_error": e.is_configuration_error(),
                    }),
                    duration_ms,
                }
            }
        }
    }

    async fn run_callback(
        &self,
        name: &str,
        entry: &QueueEntry,
        process_id: &str,
    ) -> CrawlerResult<(bool, Value)> {
        let callback = self.callbacks.resolve(name).await?;
        let context = CallbackContext {
            queue_entry_id: entry.id,
            page_id: entry.page_id,
            set_id: entry.set_id,
            configuration_name: entry.configuration_name.clone(),
            process_id: process_id.to_string(),
        };

        info!("执行回调 {}: entry_id={}", name, entry.id);
        let output = callback.execute(&entry.parameters, &context).await?;
        Ok((
            true,
            json!({
                "success": true,
                "callback": name,
                "output": output,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crawler_core::{traits::CrawlCallback, DefaultCallbackRegistry};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn entry(parameters: Value) -> QueueEntry {
        let mut entry = QueueEntry::new(
            3,
            parameters,
            "p-hash".to_string(),
            "c-hash".to_string(),
            "default",
            1,
            Utc::now(),
        );
        entry.id = 11;
        entry
    }

    struct ContextEcho;

    #[async_trait]
    impl CrawlCallback for ContextEcho {
        fn name(&self) -> &str {
            "context_echo"
        }

        async fn execute(
            &self,
            parameters: &Value,
            context: &CallbackContext,
        ) -> CrawlerResult<Value> {
            Ok(json!({
                "entry": context.queue_entry_id,
                "process": context.process_id,
                "foo": parameters["foo"],
            }))
        }
    }

    struct StaticStrategy(bool);

    #[async_trait]
    impl FetchStrategy for StaticStrategy {
        fn name(&self) -> &str {
            "static"
        }

        async fn fetch(&self, _entry: &QueueEntry) -> CrawlerResult<FetchOutcome> {
            Ok(FetchOutcome {
                success: self.0,
                status_code: Some(if self.0 { 200 } else { 500 }),
                ..Default::default()
            })
        }
    }

    async fn executor(strategy: Arc<dyn FetchStrategy>) -> EntryExecutor {
        let registry = Arc::new(DefaultCallbackRegistry::new());
        registry
            .register("context_echo".to_string(), Arc::new(ContextEcho))
            .await
            .unwrap();
        EntryExecutor::new(strategy, registry)
    }

    #[tokio::test]
    async fn test_callback_entry_dispatch() {
        let executor = executor(Arc::new(StaticStrategy(true))).await;
        let result = executor
            .execute(&entry(json!({"_callback": "context_echo", "foo": "bar"})), "worker-1")
            .await;

        assert!(result.success);
        assert_eq!(result.result_data["callback"], "context_echo");
        assert_eq!(result.result_data["output"]["entry"], 11);
        assert_eq!(result.result_data["output"]["process"], "worker-1");
        assert_eq!(result.result_data["output"]["foo"], "bar");
    }

    #[tokio::test]
    async fn test_unknown_callback_is_recorded_as_configuration_error() {
        let executor = executor(Arc::new(StaticStrategy(true))).await;
        let result = executor
            .execute(&entry(json!({"_callback": "missing"})), "worker-1")
            .await;

        assert!(!result.success);
        assert_eq!(result.result_data["configuration_error"], true);
        assert!(result.result_data["error_message"]
            .as_str()
            .unwrap()
            .contains("missing"));
    }

    #[tokio::test]
    async fn test_builtin_strategy_result() {
        let executor = executor(Arc::new(StaticStrategy(false))).await;
        let result = executor
            .execute(&entry(json!({"url": "http://localhost/"})), "worker-1")
            .await;
        assert!(!result.success);
        assert_eq!(result.result_data["status_code"], 500);
    }

    #[tokio::test]
    async fn test_http_strategy_rejects_relative_url() {
        let strategy = HttpFetchStrategy::new();
        let err = strategy
            .fetch(&entry(json!({"url": "/index.php?id=3"})))
            .await
            .unwrap_err();
        assert!(err.is_configuration_error());

        let err = strategy.fetch(&entry(json!({}))).await.unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[tokio::test]
    async fn test_http_strategy_fetches_page() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buffer = vec![0u8; 4096];
            let read = socket.read(&mut buffer).await.unwrap();
            let request = String::from_utf8_lossy(&buffer[..read]).to_lowercase();

            let body = r#"{"indexed":true}"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            request
        });

        let url = format!("http://{addr}/index.php?id=3");
        let outcome = HttpFetchStrategy::new()
            .with_timeout(Duration::from_secs(5))
            .fetch(&entry(json!({ "url": url })))
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.status_code, Some(200));
        assert_eq!(outcome.output, Some(json!({"indexed": true})));

        let request = server.await.unwrap();
        assert!(request.contains("x-crawler-request: 11:p-hash"));
    }

    #[tokio::test]
    async fn test_http_strategy_connection_failure_is_outcome() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let outcome = HttpFetchStrategy::new()
            .with_timeout(Duration::from_secs(2))
            .fetch(&entry(json!({ "url": format!("http://{addr}/") })))
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.error_message.is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sub_process_strategy() {
        let outcome = SubProcessFetchStrategy::new("echo")
            .fetch(&entry(json!({"url": "/index.php?id=3"})))
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.output, Some(json!("/index.php?id=3")));

        let outcome = SubProcessFetchStrategy::new("false")
            .fetch(&entry(json!({"url": "/index.php?id=3"})))
            .await
            .unwrap();
        assert!(!outcome.success);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sub_process_strategy_timeout() {
        let outcome = SubProcessFetchStrategy::new("sleep")
            .with_timeout(Duration::from_millis(100))
            .fetch(&entry(json!({"url": "5"})))
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.error_message.unwrap().contains("超时"));
    }

    #[test]
    fn test_strategy_selection() {
        let settings = CrawlerSettings::default();
        assert_eq!(strategy_from_settings(&settings).unwrap().name(), "http");

        let mut settings = CrawlerSettings::default();
        settings.make_direct_requests = true;
        assert!(strategy_from_settings(&settings).is_err());

        settings.direct_request_command = "/usr/bin/crawl-page".to_string();
        assert_eq!(
            strategy_from_settings(&settings).unwrap().name(),
            "sub_process"
        );
    }
}
