use serde::{Deserialize, Serialize};

/// 页面类型：外部链接
pub const DOKTYPE_LINK: i32 = 3;
/// 页面类型：快捷方式
pub const DOKTYPE_SHORTCUT: i32 = 4;
/// 页面类型：分隔符
pub const DOKTYPE_SPACER: i32 = 199;
/// 页面类型：系统文件夹
pub const DOKTYPE_SYSFOLDER: i32 = 254;
/// 页面类型：回收站
pub const DOKTYPE_RECYCLER: i32 = 255;
/// 不小于此值的页面类型均不可抓取
pub const DOKTYPE_NON_CRAWLABLE_FROM: i32 = 200;

/// 页面候选行，由外部页面源提供
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageRow {
    pub uid: i64,
    #[serde(default = "default_doktype")]
    pub doktype: i32,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub title: String,
    /// 逗号分隔的访问组列表，空字符串表示不限制
    #[serde(default)]
    pub fe_group: String,
    /// 页面挂载的抓取配置
    #[serde(default)]
    pub configurations: Vec<super::CrawlConfiguration>,
}

fn default_doktype() -> i32 {
    1
}

impl PageRow {
    pub fn new(uid: i64, doktype: i32) -> Self {
        Self {
            uid,
            doktype,
            hidden: false,
            title: String::new(),
            fe_group: String::new(),
            configurations: Vec::new(),
        }
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn with_configuration(mut self, configuration: super::CrawlConfiguration) -> Self {
        self.configurations.push(configuration);
        self
    }
}

/// 页面被跳过的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    DoktypeNotAllowed,
    DoktypeExcluded { label: String },
    Hidden,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::DoktypeNotAllowed => write!(f, "doktype is not allowed"),
            SkipReason::DoktypeExcluded { label } => {
                write!(f, "Doktype was excluded by \"{label}\"")
            }
            SkipReason::Hidden => write!(f, "page is hidden"),
        }
    }
}
