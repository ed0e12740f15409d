// ==========================================
// 参考数据导入引擎 - 结构化文件解析器
// ==========================================
// 支持: XML (.xml) / JSON (.json)，按扩展名选择
// 产出: 每个源元素/对象一条 ExtractedRecord（已打时间戳、已剔除空记录）
// 约束: 整个文件解析完成后才交给落库器
// ==========================================

use crate::domain::{ExtractedRecord, ImportMapping, SecurityPolicy, TableConfig};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_mapper::FieldMapper;
use crate::importer::xml_tree::XmlDocument;
use crate::security::structure_validator::validate_json_structure;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

// ==========================================
// StructuredFileParser Trait
// ==========================================
pub trait StructuredFileParser {
    /// 按映射解析文件为记录列表
    fn parse(
        &self,
        path: &Path,
        mapping: &ImportMapping,
        mapper: &mut FieldMapper<'_>,
    ) -> ImportResult<Vec<ExtractedRecord>>;
}

/// 读取文本文件（去除 UTF-8 BOM）
fn read_source(path: &Path) -> ImportResult<String> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }
    let content = fs::read_to_string(path)
        .map_err(|e| ImportError::FileReadError(format!("{}: {}", path.display(), e)))?;
    Ok(content
        .strip_prefix('\u{feff}')
        .map(str::to_string)
        .unwrap_or(content))
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// 打时间戳并判断是否保留
fn finish_record(mut record: ExtractedRecord, out: &mut Vec<ExtractedRecord>) {
    if !record.has_payload() {
        debug!(table = %record.table, "记录无有效字段，丢弃");
        return;
    }
    record.stamp_timestamps();
    out.push(record);
}

// ==========================================
// XmlSource
// ==========================================
pub struct XmlSource {
    max_depth: usize,
}

impl XmlSource {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    fn extract_table(
        &self,
        doc: &XmlDocument,
        table: &TableConfig,
        mapper: &mut FieldMapper<'_>,
        out: &mut Vec<ExtractedRecord>,
    ) {
        let candidates = if table.root_element.is_empty() {
            vec![doc.root()]
        } else {
            doc.descendants_named(doc.root(), &table.root_element)
        };
        info!(
            table = %table.name,
            root_element = %table.root_element,
            elements = candidates.len(),
            "定位待处理元素"
        );

        let before = out.len();
        for element in candidates {
            let mut record = ExtractedRecord::new(table.name.as_str());
            for rule in &table.fields {
                let raw = doc
                    .child_text(element, &rule.source_key)
                    .map(|text| Value::String(text.to_string()));
                mapper.apply(&mut record, rule, raw.as_ref());
            }
            finish_record(record, out);
        }
        debug!(table = %table.name, records = out.len() - before, "表记录提取完成");
    }
}

impl StructuredFileParser for XmlSource {
    fn parse(
        &self,
        path: &Path,
        mapping: &ImportMapping,
        mapper: &mut FieldMapper<'_>,
    ) -> ImportResult<Vec<ExtractedRecord>> {
        let label = file_label(path);
        let content = read_source(path)?;
        let doc = XmlDocument::parse(&label, &content, self.max_depth)?;

        info!(file = %label, tables = mapping.tables.len(), "解析 XML 文件");
        let mut records = Vec::new();
        for table in &mapping.tables {
            self.extract_table(&doc, table, mapper, &mut records);
        }
        Ok(records)
    }
}

// ==========================================
// JsonSource
// ==========================================
pub struct JsonSource {
    max_depth: usize,
    max_array_length: usize,
}

impl JsonSource {
    pub fn new(max_depth: usize, max_array_length: usize) -> Self {
        Self {
            max_depth,
            max_array_length,
        }
    }
}

impl StructuredFileParser for JsonSource {
    fn parse(
        &self,
        path: &Path,
        mapping: &ImportMapping,
        mapper: &mut FieldMapper<'_>,
    ) -> ImportResult<Vec<ExtractedRecord>> {
        let label = file_label(path);
        let table = mapping.primary_table().ok_or_else(|| {
            ImportError::Configuration(format!("文件 {} 的映射未配置目标表", mapping.file_name))
        })?;
        if mapping.tables.len() > 1 {
            warn!(file = %label, tables = mapping.tables.len(), "JSON 文件只使用第一个表映射");
        }

        let content = read_source(path)?;
        let document: Value =
            serde_json::from_str(&content).map_err(|e| ImportError::JsonParseError {
                file: label.clone(),
                message: e.to_string(),
            })?;
        validate_json_structure(&document, self.max_depth, self.max_array_length)
            .map_err(|reason| ImportError::validation(label.as_str(), reason))?;

        let objects: Vec<&serde_json::Map<String, Value>> = match &document {
            Value::Object(object) => vec![object],
            Value::Array(items) => items
                .iter()
                .filter_map(|item| {
                    let object = item.as_object();
                    if object.is_none() {
                        warn!(file = %label, value = %item, "数组元素不是对象，跳过");
                    }
                    object
                })
                .collect(),
            _ => {
                return Err(ImportError::JsonParseError {
                    file: label,
                    message: "顶层必须是对象或对象数组".to_string(),
                })
            }
        };

        info!(file = %label, table = %table.name, objects = objects.len(), "解析 JSON 文件");
        let mut records = Vec::with_capacity(objects.len());
        for object in objects {
            let mut record = ExtractedRecord::new(table.name.as_str());
            for rule in &table.fields {
                mapper.apply(&mut record, rule, object.get(&rule.source_key));
            }
            finish_record(record, &mut records);
        }
        Ok(records)
    }
}

// ==========================================
// 通用文件解析器（根据扩展名自动选择）
// ==========================================
pub struct UniversalFileParser {
    policy: SecurityPolicy,
}

impl UniversalFileParser {
    pub fn new(policy: SecurityPolicy) -> Self {
        Self { policy }
    }

    /// 按扩展名选择解析器
    pub fn select(&self, path: &Path) -> ImportResult<Box<dyn StructuredFileParser>> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "xml" => Ok(Box::new(XmlSource::new(self.policy.max_xml_depth))),
            "json" => Ok(Box::new(JsonSource::new(
                self.policy.max_json_depth,
                self.policy.max_array_length,
            ))),
            _ => Err(ImportError::UnsupportedFormat(ext)),
        }
    }

    pub fn parse(
        &self,
        path: &Path,
        mapping: &ImportMapping,
        mapper: &mut FieldMapper<'_>,
    ) -> ImportResult<Vec<ExtractedRecord>> {
        self.select(path)?.parse(path, mapping, mapper)
    }
}
