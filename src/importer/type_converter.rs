// ==========================================
// 参考数据导入引擎 - 字段类型转换器
// ==========================================
// 职责: 原始值（XML 文本 / JSON 值）→ 目标列类型
// 规则:
// - 空值 / 空白字符串 → NULL
// - 转换失败 → 记录错误日志并返回 NULL（不中断导入）
// - array 类型: 列表原样、逗号分隔字符串拆分、空值 → 空列表
// ==========================================

use crate::domain::{FieldType, FieldValue};
use crate::importer::date_parser::{
    parse_date_with_format, parse_datetime_with_format, parse_flexible_date,
    parse_flexible_datetime,
};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, warn};

/// 布尔真值（小写比较）
const TRUE_TOKENS: [&str; 5] = ["true", "yes", "1", "t", "y"];

/// 单值转换错误（仅在转换器内部流转，对外降级为 NULL）
#[derive(Error, Debug, PartialEq)]
pub enum ConversionError {
    #[error("无法转换为整数: {0}")]
    InvalidInteger(String),

    #[error("无法转换为浮点数: {0}")]
    InvalidFloat(String),

    #[error("无法识别的日期: {0}")]
    InvalidDate(String),

    #[error("无法识别的日期时间: {0}")]
    InvalidDateTime(String),

    #[error("非标量值不能转换为 {0}")]
    NotScalar(FieldType),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TypeConverter;

impl TypeConverter {
    pub fn new() -> Self {
        Self
    }

    /// 转换单个值
    ///
    /// # 参数
    /// - value: 原始值（XML 文本以 Value::String 传入）
    /// - field_type: 目标类型
    /// - format: 可选的 chrono 格式串（仅 date/datetime 使用）
    pub fn convert(&self, value: &Value, field_type: FieldType, format: Option<&str>) -> FieldValue {
        match self.try_convert(value, field_type, format) {
            Ok(converted) => converted,
            Err(e) => {
                error!(
                    value = %value,
                    field_type = %field_type,
                    error = %e,
                    "字段类型转换失败"
                );
                FieldValue::Null
            }
        }
    }

    /// 转换单个值，失败时返回具体错误
    pub fn try_convert(
        &self,
        value: &Value,
        field_type: FieldType,
        format: Option<&str>,
    ) -> Result<FieldValue, ConversionError> {
        if field_type != FieldType::Array && is_blank(value) {
            return Ok(FieldValue::Null);
        }

        match field_type {
            FieldType::String => Ok(FieldValue::Text(scalar_text(value))),
            FieldType::Integer => to_integer(value).map(FieldValue::Integer),
            FieldType::Float => to_float(value).map(FieldValue::Float),
            FieldType::Boolean => to_boolean(value).map(FieldValue::Boolean),
            FieldType::Date => {
                let text = scalar_only(value, field_type)?;
                convert_date(&text, format)
                    .map(FieldValue::Date)
                    .ok_or(ConversionError::InvalidDate(text))
            }
            FieldType::Datetime => {
                let text = scalar_only(value, field_type)?;
                convert_datetime(&text, format)
                    .map(FieldValue::DateTime)
                    .ok_or(ConversionError::InvalidDateTime(text))
            }
            FieldType::Array => Ok(FieldValue::Array(to_string_list(value))),
        }
    }
}

// ==========================================
// 内部工具函数
// ==========================================

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// 标量转文本（字符串去首尾空白，其余按 JSON 文本）
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn scalar_only(value: &Value, field_type: FieldType) -> Result<String, ConversionError> {
    match value {
        Value::Array(_) | Value::Object(_) => Err(ConversionError::NotScalar(field_type)),
        other => Ok(scalar_text(other)),
    }
}

fn to_integer(value: &Value) -> Result<i64, ConversionError> {
    match value {
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(truncate_to_i64))
            .ok_or_else(|| ConversionError::InvalidInteger(n.to_string())),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().and_then(truncate_to_i64))
                .ok_or_else(|| ConversionError::InvalidInteger(trimmed.to_string()))
        }
        _ => Err(ConversionError::NotScalar(FieldType::Integer)),
    }
}

/// 小数向零截断；超出 i64 范围或非有限值视为失败
fn truncate_to_i64(f: f64) -> Option<i64> {
    if !f.is_finite() {
        return None;
    }
    let truncated = f.trunc();
    if truncated < i64::MIN as f64 || truncated > i64::MAX as f64 {
        return None;
    }
    Some(truncated as i64)
}

fn to_float(value: &Value) -> Result<f64, ConversionError> {
    match value {
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ConversionError::InvalidFloat(n.to_string())),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .ok_or_else(|| ConversionError::InvalidFloat(trimmed.to_string()))
        }
        _ => Err(ConversionError::NotScalar(FieldType::Float)),
    }
}

fn to_boolean(value: &Value) -> Result<bool, ConversionError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Array(_) | Value::Object(_) => Err(ConversionError::NotScalar(FieldType::Boolean)),
        other => {
            let lowered = scalar_text(other).to_lowercase();
            Ok(TRUE_TOKENS.contains(&lowered.as_str()))
        }
    }
}

fn convert_date(text: &str, format: Option<&str>) -> Option<chrono::NaiveDate> {
    if let Some(fmt) = format {
        if let Some(date) = parse_date_with_format(text, fmt) {
            return Some(date);
        }
        warn!(value = %text, format = %fmt, "指定格式解析失败，回退到宽松解析");
    }
    parse_flexible_date(text)
}

fn convert_datetime(text: &str, format: Option<&str>) -> Option<chrono::NaiveDateTime> {
    if let Some(fmt) = format {
        if let Some(dt) = parse_datetime_with_format(text, fmt) {
            return Some(dt);
        }
        warn!(value = %text, format = %fmt, "指定格式解析失败，回退到宽松解析");
    }
    parse_flexible_datetime(text)
}

fn to_string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items
            .iter()
            .filter(|item| !item.is_null())
            .map(scalar_text)
            .collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect(),
        other => vec![scalar_text(other)],
    }
}
