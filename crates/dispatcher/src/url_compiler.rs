//! URL展开
//!
//! 声明式参数 `&L=[0|1]&page=[1-3]` 先解析为有序的 [`ParameterSpec`]，
//! 再与基础URL做笛卡尔积：外层为基础URL，内层为参数取值，参数按声明顺序展开。

use crawler_core::{models::ParameterSpec, CrawlerError, CrawlerResult};
use tracing::warn;

/// 解析声明式参数定义
///
/// 方括号内以 `|` 分隔多个取值，`a-b` 表示闭区间整数范围；
/// 不带方括号的值按字面量处理。
pub fn expand_parameters(definition: &str, max_values: usize) -> CrawlerResult<ParameterSpec> {
    let mut spec = ParameterSpec::new();

    for pair in definition.split('&').map(str::trim).filter(|p| !p.is_empty()) {
        let (name, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        let name = name.trim();
        if name.is_empty() {
            return Err(CrawlerError::InvalidParameters(format!(
                "参数名不能为空: {pair}"
            )));
        }

        let raw_value = raw_value.trim();
        let values = match raw_value
            .strip_prefix('[')
            .and_then(|v| v.strip_suffix(']'))
        {
            Some(inner) => expand_value_list(inner, max_values)?,
            None => vec![raw_value.to_string()],
        };
        spec.insert(name, values);
    }

    Ok(spec)
}

fn expand_value_list(inner: &str, max_values: usize) -> CrawlerResult<Vec<String>> {
    let mut values = Vec::new();
    for part in inner.split('|').map(str::trim) {
        match parse_range(part)? {
            Some((start, end)) => {
                let count = end
                    .checked_sub(start)
                    .and_then(|span| span.checked_add(1))
                    .and_then(|count| usize::try_from(count).ok())
                    .ok_or_else(|| {
                        CrawlerError::InvalidParameters(format!("范围过大: {part}"))
                    })?;
                if values.len().saturating_add(count) > max_values {
                    return Err(CrawlerError::InvalidParameters(format!(
                        "范围 {part} 超过展开上限 {max_values}"
                    )));
                }
                values.extend((start..=end).map(|v| v.to_string()));
            }
            None => values.push(part.to_string()),
        }
    }
    Ok(values)
}

/// 解析 `a-b` 整数范围，只有两侧均为数字时才视为范围，其余按字面量处理
fn parse_range(part: &str) -> CrawlerResult<Option<(u64, u64)>> {
    let Some((start, end)) = part.split_once('-') else {
        return Ok(None);
    };
    let is_number = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !is_number(start) || !is_number(end) {
        return Ok(None);
    }

    let parse = |s: &str| {
        s.parse::<u64>()
            .map_err(|_| CrawlerError::InvalidParameters(format!("范围超出整数范围: {part}")))
    };
    let (start, end) = (parse(start)?, parse(end)?);
    if start > end {
        return Err(CrawlerError::InvalidParameters(format!(
            "范围起点大于终点: {part}"
        )));
    }
    Ok(Some((start, end)))
}

/// 展开参数与基础URL的笛卡尔积，不去重
pub fn compile_urls(spec: &ParameterSpec, base_urls: &[String]) -> Vec<String> {
    compile_bounded(spec, base_urls, usize::MAX)
}

/// 按笛卡尔积顺序展开，结果最多保留 `limit` 个URL
///
/// 每一步都只保留前 `limit` 个，结果等于完整展开后的前缀。
fn compile_bounded(spec: &ParameterSpec, base_urls: &[String], limit: usize) -> Vec<String> {
    let mut urls: Vec<String> = base_urls.iter().take(limit).cloned().collect();
    for (name, values) in spec.iter() {
        let capacity = urls.len().checked_mul(values.len()).unwrap_or(limit).min(limit);
        let mut expanded = Vec::with_capacity(capacity);
        'outer: for url in &urls {
            for value in values {
                if expanded.len() >= limit {
                    break 'outer;
                }
                expanded.push(append_parameter(url, name, value));
            }
        }
        urls = expanded;
    }
    urls
}

fn append_parameter(url: &str, name: &str, value: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!(
        "{url}{separator}{}={}",
        urlencoding::encode(name),
        urlencoding::encode(value)
    )
}

/// 带展开上限的URL编译器
#[derive(Debug, Clone, Copy)]
pub struct UrlCompiler {
    max_compile_urls: usize,
}

impl UrlCompiler {
    pub fn new(max_compile_urls: usize) -> Self {
        Self { max_compile_urls }
    }

    /// 展开URL，超过上限时只保留前 `max_compile_urls` 个
    pub fn compile(&self, spec: &ParameterSpec, base_urls: &[String]) -> Vec<String> {
        let total = if spec.is_empty() {
            base_urls.len()
        } else {
            base_urls.len().saturating_mul(spec.combinations())
        };
        if total > self.max_compile_urls {
            warn!(
                "展开将得到 {} 个URL，超过上限 {}，已截断",
                total, self.max_compile_urls
            );
        }
        compile_bounded(spec, base_urls, self.max_compile_urls)
    }

    pub fn expand(&self, definition: &str) -> CrawlerResult<ParameterSpec> {
        expand_parameters(definition, self.max_compile_urls)
    }
}
