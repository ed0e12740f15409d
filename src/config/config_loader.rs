// ==========================================
// 参考数据导入引擎 - YAML 导入配置加载器
// ==========================================
// 职责: 读取 YAML → 校验 → 转换为领域模型（ImportMapping / SecurityPolicy）
// 校验（加载时一次性完成，失败即 Configuration 错误）:
// - 表名/列名必须是合法标识符
// - 外键查询模板必须包含 `{table}` 与 `:value`，命名引用必须存在
// - reference_order 中的每个文件都必须有映射
// 大小字符串: "50MB" / "10 KB" / "1024"，二进制单位（1KB = 1024B）
// ==========================================

use crate::config::import_config_trait::ImportConfigProvider;
use crate::domain::{
    FieldRule, FieldType, ImportMapping, LookupSpec, SecurityPolicy, TableConfig, TableName,
};
use crate::domain::mapping::is_valid_identifier;
use crate::importer::error::{ImportError, ImportResult};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 配置文件路径环境变量
pub const CONFIG_PATH_ENV: &str = "REFERENCE_IMPORT_CONFIG";

/// 默认查找位置（按顺序）
pub const DEFAULT_CONFIG_LOCATIONS: [&str; 3] = [
    "./config/import_config.yaml",
    "./import_config.yaml",
    "/etc/reference-import/config.yaml",
];

// ==========================================
// YAML 原始结构
// ==========================================

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    imports: BTreeMap<String, RawImport>,
}

#[derive(Debug, Deserialize)]
struct RawImport {
    #[serde(default)]
    reference_order: Vec<String>,
    #[serde(default)]
    reference_patterns: Vec<String>,
    #[serde(default)]
    mappings: BTreeMap<String, RawMapping>,
    #[serde(default)]
    security: RawSecurity,
    #[serde(default)]
    lookup_queries: BTreeMap<String, String>,
    #[serde(default)]
    database: RawDatabase,
}

/// 多表写法 `{ tables: [...] }` 或单表简写 `{ table, fields }`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawMapping {
    Tables {
        tables: Vec<RawTable>,
    },
    Single {
        table: String,
        #[serde(default)]
        root_element: String,
        fields: BTreeMap<String, RawField>,
    },
}

#[derive(Debug, Deserialize)]
struct RawTable {
    name: String,
    #[serde(default)]
    root_element: String,
    fields: BTreeMap<String, RawField>,
}

#[derive(Debug, Deserialize)]
struct RawField {
    /// 目标列名（缺省与源键同名）
    db_field: Option<String>,
    #[serde(rename = "type", default = "default_field_type")]
    field_type: FieldType,
    format: Option<String>,
    lookup: Option<RawLookup>,
}

fn default_field_type() -> FieldType {
    FieldType::String
}

#[derive(Debug, Deserialize)]
struct RawLookup {
    table: String,
    /// 内联模板或 lookup_queries 中的名称
    query: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawSecurity {
    #[serde(default)]
    file_validation: RawFileValidation,
}

#[derive(Debug, Default, Deserialize)]
struct RawFileValidation {
    max_size: Option<RawSize>,
    #[serde(default)]
    zip_extraction: RawZipExtraction,
    #[serde(default)]
    xml: RawXmlLimits,
    #[serde(default)]
    json: RawJsonLimits,
}

#[derive(Debug, Default, Deserialize)]
struct RawZipExtraction {
    max_ratio: Option<f64>,
    max_files: Option<usize>,
    max_file_size: Option<RawSize>,
    allowed_types: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawXmlLimits {
    max_depth: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RawJsonLimits {
    max_depth: Option<usize>,
    max_array_length: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDatabase {
    path: Option<String>,
}

/// 大小: 数字（字节）或带单位字符串
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawSize {
    Bytes(u64),
    Text(String),
}

// ==========================================
// 已校验的导入类型配置
// ==========================================
#[derive(Debug, Clone)]
struct ImportProfile {
    reference_order: Vec<String>,
    reference_patterns: Vec<String>,
    mappings: BTreeMap<String, ImportMapping>,
    policy: SecurityPolicy,
    lookup_queries: BTreeMap<String, String>,
    database_path: Option<String>,
}

// ==========================================
// ImportConfigLoader
// ==========================================
#[derive(Debug, Clone)]
pub struct ImportConfigLoader {
    source: Option<PathBuf>,
    profiles: BTreeMap<String, ImportProfile>,
}

impl ImportConfigLoader {
    /// 从 YAML 文件加载
    pub fn from_path(path: impl AsRef<Path>) -> ImportResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }
        let raw = fs::read_to_string(path)?;
        let mut loader = Self::from_yaml_str(&raw)?;
        loader.source = Some(path.to_path_buf());
        info!(
            config = %path.display(),
            import_types = loader.profiles.len(),
            "导入配置已加载"
        );
        Ok(loader)
    }

    /// 从 YAML 文本加载
    pub fn from_yaml_str(yaml: &str) -> ImportResult<Self> {
        let raw: RawConfig = serde_yaml::from_str(yaml)
            .map_err(|e| ImportError::Configuration(format!("YAML 解析失败: {}", e)))?;

        let mut profiles = BTreeMap::new();
        for (import_type, raw_import) in raw.imports {
            let profile = build_profile(&import_type, raw_import)?;
            debug!(
                import_type = %import_type,
                mappings = profile.mappings.len(),
                "导入类型配置校验通过"
            );
            profiles.insert(import_type, profile);
        }

        Ok(Self {
            source: None,
            profiles,
        })
    }

    /// 按默认位置查找配置文件
    ///
    /// 优先级: REFERENCE_IMPORT_CONFIG > ./config/import_config.yaml
    ///         > ./import_config.yaml > /etc/reference-import/config.yaml
    pub fn from_default_locations() -> ImportResult<Self> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Self::from_path(trimmed);
            }
        }

        DEFAULT_CONFIG_LOCATIONS
            .iter()
            .map(Path::new)
            .find(|p| p.exists())
            .map(Self::from_path)
            .unwrap_or_else(|| {
                Err(ImportError::Configuration(format!(
                    "未找到配置文件，已检查: {}",
                    DEFAULT_CONFIG_LOCATIONS.join(", ")
                )))
            })
    }

    /// 配置来源文件（从文本加载时为 None）
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    fn profile(&self, import_type: &str) -> ImportResult<&ImportProfile> {
        self.profiles.get(import_type).ok_or_else(|| {
            ImportError::Configuration(format!("未配置导入类型: {}", import_type))
        })
    }
}

impl ImportConfigProvider for ImportConfigLoader {
    fn import_types(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    fn file_mapping(&self, import_type: &str, file_name: &str) -> ImportResult<ImportMapping> {
        self.profile(import_type)?
            .mappings
            .get(file_name)
            .cloned()
            .ok_or_else(|| {
                ImportError::Configuration(format!(
                    "导入类型 {} 未配置文件 {} 的映射",
                    import_type, file_name
                ))
            })
    }

    fn reference_order(&self, import_type: &str) -> ImportResult<Vec<String>> {
        Ok(self.profile(import_type)?.reference_order.clone())
    }

    fn reference_patterns(&self, import_type: &str) -> ImportResult<Vec<String>> {
        Ok(self.profile(import_type)?.reference_patterns.clone())
    }

    fn security_policy(&self, import_type: &str) -> ImportResult<SecurityPolicy> {
        Ok(self.profile(import_type)?.policy.clone())
    }

    fn lookup_query_templates(&self, import_type: &str) -> ImportResult<BTreeMap<String, String>> {
        Ok(self.profile(import_type)?.lookup_queries.clone())
    }

    fn database_path(&self, import_type: &str) -> ImportResult<Option<String>> {
        Ok(self
            .profile(import_type)?
            .database_path
            .as_deref()
            .map(expand_env_vars)
            .filter(|p| !p.trim().is_empty()))
    }
}

// ==========================================
// 校验与转换
// ==========================================

fn build_profile(import_type: &str, raw: RawImport) -> ImportResult<ImportProfile> {
    for (name, template) in &raw.lookup_queries {
        check_query_template(template).map_err(|reason| {
            ImportError::Configuration(format!(
                "导入类型 {} 的查询 {} 无效: {}",
                import_type, name, reason
            ))
        })?;
    }

    let mut mappings = BTreeMap::new();
    for (file_name, raw_mapping) in raw.mappings {
        let mapping = build_mapping(&file_name, raw_mapping, &raw.lookup_queries)
            .map_err(|reason| {
                ImportError::Configuration(format!(
                    "导入类型 {} 文件 {}: {}",
                    import_type, file_name, reason
                ))
            })?;
        mappings.insert(file_name, mapping);
    }

    if let Some(missing) = raw
        .reference_order
        .iter()
        .find(|file| !mappings.contains_key(*file))
    {
        return Err(ImportError::Configuration(format!(
            "导入类型 {} 的 reference_order 包含未映射文件: {}",
            import_type, missing
        )));
    }

    let policy = build_policy(&raw.security).map_err(|reason| {
        ImportError::Configuration(format!("导入类型 {} 安全策略无效: {}", import_type, reason))
    })?;

    Ok(ImportProfile {
        reference_order: raw.reference_order,
        reference_patterns: raw.reference_patterns,
        mappings,
        policy,
        lookup_queries: raw.lookup_queries,
        database_path: raw.database.path,
    })
}

fn build_mapping(
    file_name: &str,
    raw: RawMapping,
    named_queries: &BTreeMap<String, String>,
) -> Result<ImportMapping, String> {
    let raw_tables = match raw {
        RawMapping::Tables { tables } => tables,
        RawMapping::Single {
            table,
            root_element,
            fields,
        } => vec![RawTable {
            name: table,
            root_element,
            fields,
        }],
    };
    if raw_tables.is_empty() {
        return Err("映射未包含任何表".to_string());
    }

    let tables = raw_tables
        .into_iter()
        .map(|t| build_table(t, named_queries))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ImportMapping {
        file_name: file_name.to_string(),
        tables,
    })
}

fn build_table(
    raw: RawTable,
    named_queries: &BTreeMap<String, String>,
) -> Result<TableConfig, String> {
    let name = TableName::parse(&raw.name).ok_or_else(|| format!("非法表名: {}", raw.name))?;

    let mut fields = Vec::with_capacity(raw.fields.len());
    for (source_key, field) in raw.fields {
        let target_column = field.db_field.unwrap_or_else(|| source_key.clone());
        if !is_valid_identifier(&target_column) {
            return Err(format!("非法列名: {}", target_column));
        }

        let lookup = match field.lookup {
            Some(raw_lookup) => Some(build_lookup(raw_lookup, named_queries)?),
            None => None,
        };

        fields.push(FieldRule {
            source_key,
            target_column,
            field_type: field.field_type,
            format: field.format,
            lookup,
        });
    }

    Ok(TableConfig {
        name,
        root_element: raw.root_element,
        fields,
    })
}

fn build_lookup(
    raw: RawLookup,
    named_queries: &BTreeMap<String, String>,
) -> Result<LookupSpec, String> {
    let table =
        TableName::parse(&raw.table).ok_or_else(|| format!("非法外键表名: {}", raw.table))?;

    // 含占位符视为内联模板，否则按名称引用
    let query = if raw.query.contains(LookupSpec::TABLE_PLACEHOLDER) {
        raw.query
    } else {
        named_queries
            .get(raw.query.trim())
            .cloned()
            .ok_or_else(|| format!("未定义的查询: {}", raw.query))?
    };
    check_query_template(&query)?;

    Ok(LookupSpec { table, query })
}

fn check_query_template(template: &str) -> Result<(), String> {
    if !template.contains(LookupSpec::TABLE_PLACEHOLDER) {
        return Err(format!("缺少 {} 占位符", LookupSpec::TABLE_PLACEHOLDER));
    }
    if !template.contains(LookupSpec::VALUE_PARAM) {
        return Err(format!("缺少 {} 绑定参数", LookupSpec::VALUE_PARAM));
    }
    Ok(())
}

fn build_policy(raw: &RawSecurity) -> Result<SecurityPolicy, String> {
    let defaults = SecurityPolicy::default();
    let validation = &raw.file_validation;
    let zip = &validation.zip_extraction;

    let max_file_size = match &validation.max_size {
        Some(size) => resolve_size(size)?,
        None => defaults.max_file_size,
    };
    let max_entry_size = match &zip.max_file_size {
        Some(size) => resolve_size(size)?,
        None => defaults.max_entry_size,
    };
    let max_compression_ratio = zip.max_ratio.unwrap_or(defaults.max_compression_ratio);
    if !(max_compression_ratio.is_finite() && max_compression_ratio > 0.0) {
        return Err(format!("max_ratio 必须为正数: {}", max_compression_ratio));
    }

    let allowed_extensions = match &zip.allowed_types {
        Some(types) => types.iter().map(|t| normalize_extension(t)).collect(),
        None => defaults.allowed_extensions,
    };

    Ok(SecurityPolicy {
        max_file_size,
        max_files: zip.max_files.unwrap_or(defaults.max_files),
        max_compression_ratio,
        max_entry_size,
        allowed_extensions,
        max_xml_depth: validation.xml.max_depth.unwrap_or(defaults.max_xml_depth),
        max_json_depth: validation.json.max_depth.unwrap_or(defaults.max_json_depth),
        max_array_length: validation
            .json
            .max_array_length
            .unwrap_or(defaults.max_array_length),
    })
}

/// 统一为小写并带点号（"XML" → ".xml"）
fn normalize_extension(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    if lower.starts_with('.') {
        lower
    } else {
        format!(".{}", lower)
    }
}

fn resolve_size(raw: &RawSize) -> Result<u64, String> {
    match raw {
        RawSize::Bytes(bytes) => Ok(*bytes),
        RawSize::Text(text) => parse_size(text),
    }
}

/// 解析大小字符串（二进制单位）
pub fn parse_size(raw: &str) -> Result<u64, String> {
    let pattern = Regex::new(r"(?i)^\s*(\d+(?:\.\d+)?)\s*(B|KB|MB|GB|TB)?\s*$")
        .map_err(|e| e.to_string())?;
    let caps = pattern
        .captures(raw)
        .ok_or_else(|| format!("无法识别的大小: {}", raw))?;

    let number: f64 = caps[1]
        .parse()
        .map_err(|_| format!("无法识别的大小: {}", raw))?;
    let exponent = match caps.get(2).map(|m| m.as_str().to_uppercase()).as_deref() {
        None | Some("B") => 0,
        Some("KB") => 1,
        Some("MB") => 2,
        Some("GB") => 3,
        _ => 4,
    };

    let bytes = number * 1024f64.powi(exponent);
    if bytes > u64::MAX as f64 {
        return Err(format!("大小超出范围: {}", raw));
    }
    Ok(bytes as u64)
}

/// 展开 `${VAR}` / `${VAR:-default}`（未设置且无默认值时替换为空串）
pub fn expand_env_vars(raw: &str) -> String {
    let pattern = match Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}") {
        Ok(re) => re,
        Err(_) => return raw.to_string(),
    };
    pattern
        .replace_all(raw, |caps: &regex::Captures<'_>| {
            std::env::var(&caps[1])
                .ok()
                .filter(|v| !v.is_empty())
                .or_else(|| caps.get(2).map(|m| m.as_str().to_string()))
                .unwrap_or_default()
        })
        .into_owned()
}
