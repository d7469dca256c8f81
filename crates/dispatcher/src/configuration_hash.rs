//! 配置哈希
//!
//! 对象键递归排序后序列化为规范JSON，再计算 XXH3-128 摘要（32位小写十六进制）。
//! 顶层的易变字段 `paramExpanded` 与 `URLs` 不参与哈希。

use crawler_core::{models::CrawlConfiguration, CrawlerResult};
use serde_json::Value;
use xxhash_rust::xxh3::xxh3_128;

/// 不参与配置哈希的顶层字段
pub const VOLATILE_FIELDS: [&str; 2] = ["paramExpanded", "URLs"];

/// 计算抓取配置的去重键
pub fn configuration_hash(configuration: &CrawlConfiguration) -> CrawlerResult<String> {
    let mut value = serde_json::to_value(configuration)?;
    if let Value::Object(map) = &mut value {
        for field in VOLATILE_FIELDS {
            map.remove(field);
        }
    }
    hash_value(&value)
}

/// 计算单个条目参数负载的哈希
pub fn parameters_hash(parameters: &Value) -> CrawlerResult<String> {
    hash_value(parameters)
}

/// 任意JSON值的规范哈希
pub fn hash_value(value: &Value) -> CrawlerResult<String> {
    let mut canonical = String::new();
    write_canonical(value, &mut canonical)?;
    Ok(format!("{:032x}", xxh3_128(canonical.as_bytes())))
}

fn write_canonical(value: &Value, out: &mut String) -> CrawlerResult<()> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                if let Some(child) = map.get(key) {
                    write_canonical(child, out)?;
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawler_core::models::ParameterSpec;
    use serde_json::json;

    #[test]
    fn test_hash_ignores_volatile_fields() {
        let base = CrawlConfiguration::new("default").with_base_parameters("&L=[0|1]");

        let mut expanded = base.clone();
        expanded.parameters = ParameterSpec::new().with("L", vec!["0".into(), "1".into()]);
        expanded.urls = vec!["index.php?id=1&L=0".to_string()];

        assert_eq!(
            configuration_hash(&base).unwrap(),
            configuration_hash(&expanded).unwrap()
        );
    }

    #[test]
    fn test_hash_changes_with_stable_fields() {
        let a = CrawlConfiguration::new("default").with_base_parameters("&L=[0|1]");
        let b = CrawlConfiguration::new("default").with_base_parameters("&L=[0|2]");
        let c = CrawlConfiguration::new("other").with_base_parameters("&L=[0|1]");

        let hash_a = configuration_hash(&a).unwrap();
        assert_ne!(hash_a, configuration_hash(&b).unwrap());
        assert_ne!(hash_a, configuration_hash(&c).unwrap());
    }

    #[test]
    fn test_hash_format() {
        let hash = hash_value(&json!({"a": 1})).unwrap();
        assert_eq!(hash.len(), 32);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_hash_is_independent_of_key_order() {
        let a: Value = serde_json::from_str(r#"{"a": 1, "b": {"x": [1, 2], "y": "z"}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"b": {"y": "z", "x": [1, 2]}, "a": 1}"#).unwrap();
        assert_eq!(hash_value(&a).unwrap(), hash_value(&b).unwrap());

        // 数组顺序有意义
        let c: Value = serde_json::from_str(r#"{"a": 1, "b": {"x": [2, 1], "y": "z"}}"#).unwrap();
        assert_ne!(hash_value(&a).unwrap(), hash_value(&c).unwrap());
    }

    #[test]
    fn test_extra_fields_participate() {
        let mut a = CrawlConfiguration::new("default");
        let b = a.clone();
        a.extra.insert("cHash".to_string(), json!(true));
        assert_ne!(
            configuration_hash(&a).unwrap(),
            configuration_hash(&b).unwrap()
        );
    }
}
