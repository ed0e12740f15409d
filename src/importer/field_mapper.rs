// ==========================================
// 参考数据导入引擎 - 字段映射器
// ==========================================
// 职责: 按 FieldRule 把单个源值写入 ExtractedRecord
// 规则:
// - 源值缺失或为空: 不设置该列（不是设为 NULL）
// - 普通字段: TypeConverter 转换，结果为 NULL 时不设置
// - 外键字段: LookupResolver 解析，未命中时显式设为 NULL 并告警
// ==========================================

use crate::domain::{ExtractedRecord, FieldRule, FieldValue};
use crate::importer::lookup_resolver::LookupResolver;
use crate::importer::type_converter::TypeConverter;
use crate::repository::DbSession;
use serde_json::Value;
use tracing::warn;

/// 单字段映射结果
#[derive(Debug, Clone, PartialEq)]
pub enum MappedField {
    /// 写入该列（可能为 NULL）
    Set(FieldValue),
    /// 不设置该列
    Skip,
}

/// 字段映射器（持有一次解析所需的会话与解析器借用）
pub struct FieldMapper<'a> {
    converter: TypeConverter,
    resolver: &'a mut LookupResolver,
    session: &'a mut dyn DbSession,
}

impl<'a> FieldMapper<'a> {
    pub fn new(resolver: &'a mut LookupResolver, session: &'a mut dyn DbSession) -> Self {
        Self {
            converter: TypeConverter::new(),
            resolver,
            session,
        }
    }

    /// 映射单个字段
    ///
    /// # 参数
    /// - rule: 字段规则
    /// - raw: 源值（None 表示源中不存在）
    pub fn map_field(&mut self, rule: &FieldRule, raw: Option<&Value>) -> MappedField {
        let raw = match raw {
            Some(value) if !is_absent(value) => value,
            _ => return MappedField::Skip,
        };

        if let Some(lookup) = &rule.lookup {
            let code = lookup_code(raw);
            return match self.resolver.resolve(&mut *self.session, lookup, &code) {
                Some(found) => MappedField::Set(found),
                None => {
                    warn!(
                        table = %lookup.table,
                        value = %code,
                        column = %rule.target_column,
                        "外键未匹配，字段置为 NULL"
                    );
                    MappedField::Set(FieldValue::Null)
                }
            };
        }

        match self
            .converter
            .convert(raw, rule.field_type, rule.format.as_deref())
        {
            FieldValue::Null => MappedField::Skip,
            converted => MappedField::Set(converted),
        }
    }

    /// 映射单个字段并写入记录
    pub fn apply(&mut self, record: &mut ExtractedRecord, rule: &FieldRule, raw: Option<&Value>) {
        if let MappedField::Set(value) = self.map_field(rule, raw) {
            record.set(rule.target_column.clone(), value);
        }
    }
}

fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// 外键查询值（字符串去空白，其余按 JSON 文本）
fn lookup_code(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FieldType, LookupSpec, TableName};
    use crate::repository::SqliteSession;
    use serde_json::json;

    fn session_with_regions() -> SqliteSession {
        let session = SqliteSession::open_in_memory().unwrap();
        session
            .connection()
            .execute_batch(
                "CREATE TABLE region (id INTEGER PRIMARY KEY, code TEXT UNIQUE);
                 INSERT INTO region (id, code) VALUES (3, 'EU');",
            )
            .unwrap();
        session
    }

    fn rule(source: &str, column: &str, field_type: FieldType) -> FieldRule {
        FieldRule {
            source_key: source.to_string(),
            target_column: column.to_string(),
            field_type,
            format: None,
            lookup: None,
        }
    }

    fn lookup_rule() -> FieldRule {
        FieldRule {
            lookup: Some(LookupSpec {
                table: TableName::parse("region").unwrap(),
                query: "SELECT id FROM {table} WHERE code = :value".to_string(),
            }),
            ..rule("region", "region_id", FieldType::Integer)
        }
    }

    #[test]
    fn test_absent_and_empty_sources_are_skipped() {
        let mut session = session_with_regions();
        let mut resolver = LookupResolver::new();
        let mut mapper = FieldMapper::new(&mut resolver, &mut session);

        let name = rule("name", "name", FieldType::String);
        assert_eq!(mapper.map_field(&name, None), MappedField::Skip);
        assert_eq!(mapper.map_field(&name, Some(&json!(null))), MappedField::Skip);
        assert_eq!(mapper.map_field(&name, Some(&json!("  "))), MappedField::Skip);
        assert_eq!(mapper.map_field(&lookup_rule(), None), MappedField::Skip);
    }

    #[test]
    fn test_conversion_failure_leaves_column_unset() {
        let mut session = session_with_regions();
        let mut resolver = LookupResolver::new();
        let mut mapper = FieldMapper::new(&mut resolver, &mut session);

        let mut record = ExtractedRecord::new("country");
        mapper.apply(&mut record, &rule("pop", "population", FieldType::Integer), Some(&json!("abc")));
        mapper.apply(&mut record, &rule("pop", "area", FieldType::Integer), Some(&json!("12")));

        assert_eq!(record.get("population"), None);
        assert_eq!(record.get("area"), Some(&FieldValue::Integer(12)));
    }

    #[test]
    fn test_lookup_hit_and_miss() {
        let mut session = session_with_regions();
        let mut resolver = LookupResolver::new();
        let mut mapper = FieldMapper::new(&mut resolver, &mut session);
        let rule = lookup_rule();

        assert_eq!(
            mapper.map_field(&rule, Some(&json!(" EU "))),
            MappedField::Set(FieldValue::Integer(3))
        );
        // 未命中显式置 NULL
        assert_eq!(
            mapper.map_field(&rule, Some(&json!("XX"))),
            MappedField::Set(FieldValue::Null)
        );

        let mut record = ExtractedRecord::new("country");
        mapper.apply(&mut record, &rule, Some(&json!("XX")));
        assert_eq!(record.get("region_id"), Some(&FieldValue::Null));
    }

    #[test]
    fn test_numeric_json_value_used_as_lookup_code() {
        let mut session = session_with_regions();
        session
            .connection()
            .execute_batch("INSERT INTO region (id, code) VALUES (9, '42')")
            .unwrap();
        let mut resolver = LookupResolver::new();
        let mut mapper = FieldMapper::new(&mut resolver, &mut session);

        assert_eq!(
            mapper.map_field(&lookup_rule(), Some(&json!(42))),
            MappedField::Set(FieldValue::Integer(9))
        );
    }
}
