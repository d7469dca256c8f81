//! 数据库行映射工具
//!
//! 时间字段以 Unix 秒存储，0 表示未设置；JSON 字段以文本存储。

use chrono::{DateTime, Utc};
use crawler_core::{CrawlerError, CrawlerResult};
use serde_json::Value;
use sqlx::Row;

pub struct MappingHelpers;

impl MappingHelpers {
    pub fn to_timestamp(time: DateTime<Utc>) -> i64 {
        time.timestamp()
    }

    pub fn to_optional_timestamp(time: Option<DateTime<Utc>>) -> i64 {
        time.map(|t| t.timestamp()).unwrap_or(0)
    }

    pub fn from_timestamp(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(seconds, 0).unwrap_or_default()
    }

    pub fn from_optional_timestamp(seconds: i64) -> Option<DateTime<Utc>> {
        if seconds <= 0 {
            None
        } else {
            DateTime::from_timestamp(seconds, 0)
        }
    }

    pub fn parse_json_sqlite(
        row: &sqlx::sqlite::SqliteRow,
        field_name: &str,
    ) -> CrawlerResult<Value> {
        let json_str: String = row.try_get(field_name)?;
        if json_str.is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        json_str
            .parse()
            .map_err(|e| CrawlerError::Serialization(format!("解析{field_name}失败: {e}")))
    }

    pub fn parse_optional_json_sqlite(
        row: &sqlx::sqlite::SqliteRow,
        field_name: &str,
    ) -> CrawlerResult<Option<Value>> {
        match row.try_get::<Option<String>, _>(field_name)? {
            Some(json_str) if !json_str.is_empty() => json_str
                .parse()
                .map(Some)
                .map_err(|e| CrawlerError::Serialization(format!("解析{field_name}失败: {e}"))),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_timestamp_is_unset() {
        assert_eq!(MappingHelpers::from_optional_timestamp(0), None);
        assert_eq!(MappingHelpers::to_optional_timestamp(None), 0);

        let now = DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap();
        let stored = MappingHelpers::to_optional_timestamp(Some(now));
        assert_eq!(MappingHelpers::from_optional_timestamp(stored), Some(now));
    }
}
