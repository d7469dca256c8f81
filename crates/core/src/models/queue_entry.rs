use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 参数中标记回调名称的键
pub const CALLBACK_PARAMETER: &str = "_callback";
/// 参数中保存请求URL的键
pub const URL_PARAMETER: &str = "url";

/// 队列条目：某个页面在某个配置下的一次抓取任务
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueEntry {
    pub id: i64,
    pub page_id: i64,
    pub parameters: Value,
    pub parameters_hash: String,
    pub configuration_hash: String,
    /// 最早可执行时间
    pub scheduled: DateTime<Utc>,
    /// 执行完成时间，None 表示待处理
    pub exec_time: Option<DateTime<Utc>>,
    pub set_id: i64,
    pub result_data: Option<Value>,
    /// 被Worker认领的时间，None 表示未认领
    pub process_scheduled: Option<DateTime<Utc>>,
    /// 认领该条目的进程ID，空字符串表示未认领
    pub process_id: String,
    /// 完成该条目的进程ID
    pub process_id_completed: String,
    pub configuration_name: String,
}

impl QueueEntry {
    /// 创建新的待处理条目（尚未持久化，id 为 0）
    pub fn new(
        page_id: i64,
        parameters: Value,
        parameters_hash: String,
        configuration_hash: String,
        configuration_name: impl Into<String>,
        set_id: i64,
        scheduled: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            page_id,
            parameters,
            parameters_hash,
            configuration_hash,
            scheduled,
            exec_time: None,
            set_id,
            result_data: None,
            process_scheduled: None,
            process_id: String::new(),
            process_id_completed: String::new(),
            configuration_name: configuration_name.into(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.exec_time.is_none()
    }

    pub fn is_claimed(&self) -> bool {
        self.process_scheduled.is_some()
    }

    /// 条目请求的URL
    pub fn url(&self) -> Option<&str> {
        self.parameters.get(URL_PARAMETER).and_then(Value::as_str)
    }

    /// 条目指定的回调名称
    pub fn callback_name(&self) -> Option<&str> {
        self.parameters
            .get(CALLBACK_PARAMETER)
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
    }
}

/// 队列日志的状态过滤
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFilter {
    #[default]
    All,
    Pending,
    Finished,
}

/// 队列日志的查询范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSelector {
    Page(i64),
    Set(i64),
}

/// 队列日志查询
#[derive(Debug, Clone)]
pub struct LogQuery {
    pub selector: LogSelector,
    pub filter: LogFilter,
    /// 删除匹配的条目
    pub do_flush: bool,
    /// 与 do_flush 同时使用时忽略状态过滤，删除该范围内的全部条目
    pub do_full_flush: bool,
    pub page_size: u32,
}

impl LogQuery {
    pub fn for_page(page_id: i64) -> Self {
        Self {
            selector: LogSelector::Page(page_id),
            filter: LogFilter::All,
            do_flush: false,
            do_full_flush: false,
            page_size: 20,
        }
    }

    pub fn for_set(set_id: i64) -> Self {
        Self {
            selector: LogSelector::Set(set_id),
            ..Self::for_page(0)
        }
    }

    pub fn with_filter(mut self, filter: LogFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_flush(mut self, do_flush: bool, do_full_flush: bool) -> Self {
        self.do_flush = do_flush;
        self.do_full_flush = do_full_flush;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// 实际删除时使用的状态过滤
    pub fn flush_filter(&self) -> LogFilter {
        if self.do_full_flush {
            LogFilter::All
        } else {
            self.filter
        }
    }
}

/// 队列条目过滤条件，所有已设置的条件以 AND 组合
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueFilter {
    pub page_id: Option<i64>,
    pub set_id: Option<i64>,
    pub configuration_name: Option<String>,
    pub configuration_hash: Option<String>,
    pub process_id: Option<String>,
    pub status: LogFilter,
    /// 只匹配未被认领的条目
    pub unclaimed: bool,
    pub scheduled_before: Option<DateTime<Utc>>,
    pub executed_before: Option<DateTime<Utc>>,
}

impl QueueFilter {
    /// 匹配全部条目
    pub fn all() -> Self {
        Self::default()
    }

    pub fn page_id(mut self, page_id: i64) -> Self {
        self.page_id = Some(page_id);
        self
    }

    pub fn set_id(mut self, set_id: i64) -> Self {
        self.set_id = Some(set_id);
        self
    }

    pub fn configuration_name(mut self, name: impl Into<String>) -> Self {
        self.configuration_name = Some(name.into());
        self
    }

    pub fn configuration_hash(mut self, hash: impl Into<String>) -> Self {
        self.configuration_hash = Some(hash.into());
        self
    }

    pub fn process_id(mut self, process_id: impl Into<String>) -> Self {
        self.process_id = Some(process_id.into());
        self
    }

    pub fn status(mut self, status: LogFilter) -> Self {
        self.status = status;
        self
    }

    pub fn unclaimed(mut self) -> Self {
        self.unclaimed = true;
        self
    }

    pub fn scheduled_before(mut self, time: DateTime<Utc>) -> Self {
        self.scheduled_before = Some(time);
        self
    }

    pub fn executed_before(mut self, time: DateTime<Utc>) -> Self {
        self.executed_before = Some(time);
        self
    }
}

/// 待入队的一组条目：同一页面、同一配置哈希
#[derive(Debug, Clone)]
pub struct EnqueueBatch {
    pub page_id: i64,
    pub configuration_hash: String,
    pub entries: Vec<QueueEntry>,
    /// 启用时间槽去重：同一 parameters_hash 在时间槽内已有待处理条目则跳过该URL
    pub timeslot_seconds: Option<i64>,
}
