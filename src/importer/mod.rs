// ==========================================
// 参考数据导入引擎 - 导入层
// ==========================================
// 职责: 参考文件解析、类型转换、外键解析、变更跟踪、导入编排
// 支持: XML, JSON（经附件压缩包解压）
// ==========================================

// 模块声明
pub mod change_tracker;
pub mod date_parser;
pub mod error;
pub mod field_mapper;
pub mod file_parser;
pub mod lookup_resolver;
pub mod reference_importer;
pub mod type_converter;
pub mod xml_tree;

// 重导出核心类型
pub use change_tracker::{compute_sha256, ChangeTracker};
pub use date_parser::{parse_flexible_date, parse_flexible_datetime};
pub use error::{ImportError, ImportResult, ValidationReason};
pub use field_mapper::{FieldMapper, MappedField};
pub use file_parser::{JsonSource, StructuredFileParser, UniversalFileParser, XmlSource};
pub use lookup_resolver::LookupResolver;
pub use reference_importer::{ProcessOutcome, ReferenceImporter};
pub use type_converter::{ConversionError, TypeConverter};
pub use xml_tree::{XmlDocument, XmlNode};
