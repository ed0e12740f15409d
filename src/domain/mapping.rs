// ==========================================
// 参考数据导入引擎 - 字段映射领域模型
// ==========================================
// 职责: 描述"源文件 → 数据表"的声明式映射
// 生命周期: 每次运行从配置加载一次，运行期内只读
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// TableName - 经校验的 SQL 标识符
// ==========================================
// 红线: 表名/列名只能来自配置白名单，不可来自数据
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TableName(String);

impl TableName {
    /// 校验并构造标识符（仅允许 `[A-Za-z_][A-Za-z0-9_]*`）
    pub fn parse(raw: &str) -> Option<Self> {
        if is_valid_identifier(raw) {
            Some(Self(raw.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 判断字符串是否为合法 SQL 标识符
pub fn is_valid_identifier(raw: &str) -> bool {
    let mut chars = raw.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ==========================================
// FieldType - 目标字段类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    Datetime,
    Array,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Datetime => "datetime",
            FieldType::Array => "array",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// LookupSpec - 外键代码解析规则
// ==========================================
// query 模板包含 `{table}` 占位符与 `:value` 绑定参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupSpec {
    pub table: TableName,
    pub query: String,
}

impl LookupSpec {
    /// 占位符
    pub const TABLE_PLACEHOLDER: &'static str = "{table}";
    /// 绑定参数名
    pub const VALUE_PARAM: &'static str = ":value";

    /// 渲染查询语句（表名已在配置加载时校验）
    pub fn render_query(&self) -> String {
        self.query
            .replace(Self::TABLE_PLACEHOLDER, self.table.as_str())
    }
}

// ==========================================
// FieldRule - 单字段映射规则
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldRule {
    pub source_key: String,    // XML 标签名 / JSON 键名
    pub target_column: String, // 目标列名（已校验）
    pub field_type: FieldType,
    pub format: Option<String>, // chrono 格式串（date/datetime 优先尝试）
    pub lookup: Option<LookupSpec>,
}

// ==========================================
// TableConfig - 单表映射
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableConfig {
    pub name: TableName,
    /// 根元素选择器（仅 XML 使用；空串表示文档根节点本身）
    pub root_element: String,
    pub fields: Vec<FieldRule>,
}

// ==========================================
// ImportMapping - 单个源文件的映射
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportMapping {
    pub file_name: String,
    pub tables: Vec<TableConfig>,
}

impl ImportMapping {
    /// JSON 源只使用第一张表
    pub fn primary_table(&self) -> Option<&TableConfig> {
        self.tables.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_validation() {
        assert!(is_valid_identifier("country"));
        assert!(is_valid_identifier("_ref_2"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("2fast"));
        assert!(!is_valid_identifier("country; DROP TABLE x"));
        assert!(!is_valid_identifier("a-b"));
    }

    #[test]
    fn test_render_lookup_query() {
        let spec = LookupSpec {
            table: TableName::parse("region").unwrap(),
            query: "SELECT id FROM {table} WHERE code = :value".to_string(),
        };
        assert_eq!(
            spec.render_query(),
            "SELECT id FROM region WHERE code = :value"
        );
    }
}
