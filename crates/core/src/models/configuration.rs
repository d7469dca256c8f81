use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 有序的参数展开结果：参数名 -> 取值列表，保持声明顺序
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec(Vec<(String, Vec<String>)>);

impl ParameterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加参数；同名参数覆盖原取值但保持原位置
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<String>) {
        let name = name.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, existing_values)) => *existing_values = values,
            None => self.0.push((name, values)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, values: Vec<String>) -> Self {
        self.insert(name, values);
        self
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.0
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, values)| values.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// 展开后的组合总数
    pub fn combinations(&self) -> usize {
        if self.0.is_empty() {
            return 0;
        }
        self.0
            .iter()
            .map(|(_, values)| values.len())
            .fold(1usize, |acc, n| acc.saturating_mul(n))
    }
}

/// 页面挂载的抓取配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrawlConfiguration {
    pub name: String,
    /// 声明式参数定义，如 `&L=[0|1]&page=[1-3]`
    #[serde(default, rename = "baseParameters")]
    pub base_parameters: String,
    /// 已展开的参数，属于易变字段，不参与配置哈希
    #[serde(default, rename = "paramExpanded")]
    pub parameters: ParameterSpec,
    /// 显式URL列表，属于易变字段，不参与配置哈希
    #[serde(default, rename = "URLs")]
    pub urls: Vec<String>,
    /// 逗号分隔的允许处理指令
    #[serde(default, rename = "procInstrFilter")]
    pub proc_instr_filter: String,
    /// 逗号分隔的访问组限制，空表示不限制
    #[serde(default, rename = "feGroups")]
    pub access_groups: String,
    #[serde(default, rename = "userAgent")]
    pub user_agent: String,
    /// 条目执行时使用的回调名称
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<String>,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

impl CrawlConfiguration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_base_parameters(mut self, base_parameters: impl Into<String>) -> Self {
        self.base_parameters = base_parameters.into();
        self
    }

    pub fn with_proc_instr_filter(mut self, filter: impl Into<String>) -> Self {
        self.proc_instr_filter = filter.into();
        self
    }

    pub fn with_access_groups(mut self, groups: impl Into<String>) -> Self {
        self.access_groups = groups.into();
        self
    }

    pub fn with_callback(mut self, callback: impl Into<String>) -> Self {
        self.callback = Some(callback.into());
        self
    }

    /// 允许的处理指令列表
    pub fn proc_instructions(&self) -> Vec<String> {
        split_list(&self.proc_instr_filter)
    }
}

/// 一次队列构建的运行上下文
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlContext {
    pub set_id: i64,
    pub scheduled: DateTime<Utc>,
    /// 本次运行请求的处理指令，空表示不过滤
    pub incoming_proc_instructions: Vec<String>,
    /// 只处理指定名称的配置，空表示全部
    pub configuration_names: Vec<String>,
}

impl CrawlContext {
    pub fn new(set_id: i64) -> Self {
        Self {
            set_id,
            scheduled: Utc::now(),
            incoming_proc_instructions: Vec::new(),
            configuration_names: Vec::new(),
        }
    }

    pub fn with_proc_instructions(mut self, instructions: Vec<String>) -> Self {
        self.incoming_proc_instructions = instructions;
        self
    }

    pub fn with_configurations(mut self, names: Vec<String>) -> Self {
        self.configuration_names = names;
        self
    }

    pub fn scheduled_at(mut self, scheduled: DateTime<Utc>) -> Self {
        self.scheduled = scheduled;
        self
    }

    pub fn accepts_configuration(&self, name: &str) -> bool {
        self.configuration_names.is_empty() || self.configuration_names.iter().any(|n| n == name)
    }
}

/// 解析逗号分隔列表，去除空白与空项
pub fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
