// ==========================================
// 参考数据导入引擎 - 提取记录模型
// ==========================================
// 用途: 解析器产出、落库器消费的中间结构
// 生命周期: 每个源元素/对象创建一次，落库后丢弃
// ==========================================

use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// 时间戳列
pub const CREATED_COLUMN: &str = "created";
pub const MODIFIED_COLUMN: &str = "modified";

/// 主键候选列（按优先级）
pub const KEY_COLUMNS: [&str; 2] = ["id", "code"];

// ==========================================
// FieldValue - 类型转换后的字段值
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Array(Vec<String>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// 落库文本表示（日期统一 ISO，数组逗号拼接）
    pub fn to_sql_text(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Integer(i) => Some(i.to_string()),
            FieldValue::Float(f) => Some(f.to_string()),
            FieldValue::Boolean(b) => Some(if *b { "1" } else { "0" }.to_string()),
            FieldValue::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            FieldValue::DateTime(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
            FieldValue::Array(items) => Some(items.join(",")),
        }
    }
}

// ==========================================
// ExtractedRecord - 目标列 → 值
// ==========================================
// 红线: 至少一个非时间戳字段有值才允许落库
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedRecord {
    pub table: String,
    pub columns: BTreeMap<String, FieldValue>,
}

impl ExtractedRecord {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, column: impl Into<String>, value: FieldValue) {
        self.columns.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.columns.get(column)
    }

    /// 补齐 created/modified（已存在则保留）
    pub fn stamp_timestamps(&mut self) {
        let now = Utc::now().naive_utc();
        self.columns
            .entry(CREATED_COLUMN.to_string())
            .or_insert(FieldValue::DateTime(now));
        self.columns
            .entry(MODIFIED_COLUMN.to_string())
            .or_insert(FieldValue::DateTime(now));
    }

    /// 是否存在非时间戳的有效字段
    pub fn has_payload(&self) -> bool {
        self.columns.iter().any(|(column, value)| {
            column != CREATED_COLUMN && column != MODIFIED_COLUMN && !value.is_null()
        })
    }

    /// 标识列（id 优先，其次 code），值为空视为缺失
    pub fn key_column(&self) -> Option<&'static str> {
        KEY_COLUMNS
            .into_iter()
            .find(|key| self.columns.get(*key).map_or(false, |v| !v.is_null()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamp_keeps_existing_created() {
        let created = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let mut record = ExtractedRecord::new("country");
        record.set(CREATED_COLUMN, FieldValue::DateTime(created));
        record.stamp_timestamps();

        assert_eq!(record.get(CREATED_COLUMN), Some(&FieldValue::DateTime(created)));
        assert!(matches!(record.get(MODIFIED_COLUMN), Some(FieldValue::DateTime(_))));
    }

    #[test]
    fn test_payload_ignores_timestamps_and_nulls() {
        let mut record = ExtractedRecord::new("country");
        record.stamp_timestamps();
        assert!(!record.has_payload());

        record.set("region_id", FieldValue::Null);
        assert!(!record.has_payload());

        record.set("name", FieldValue::Text("Austria".to_string()));
        assert!(record.has_payload());
    }

    #[test]
    fn test_key_column_priority() {
        let mut record = ExtractedRecord::new("country");
        assert_eq!(record.key_column(), None);

        record.set("code", FieldValue::Text("AT".to_string()));
        assert_eq!(record.key_column(), Some("code"));

        record.set("id", FieldValue::Integer(7));
        assert_eq!(record.key_column(), Some("id"));

        record.set("id", FieldValue::Null);
        assert_eq!(record.key_column(), Some("code"));
    }

    #[test]
    fn test_sql_text_rendering() {
        let date = NaiveDate::from_ymd_opt(2025, 2, 4).unwrap();
        assert_eq!(FieldValue::Date(date).to_sql_text().as_deref(), Some("2025-02-04"));
        assert_eq!(FieldValue::Boolean(true).to_sql_text().as_deref(), Some("1"));
        assert_eq!(
            FieldValue::Array(vec!["a".into(), "b".into()]).to_sql_text().as_deref(),
            Some("a,b")
        );
        assert_eq!(FieldValue::Null.to_sql_text(), None);
    }
}
