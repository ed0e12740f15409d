// ==========================================
// 参考数据导入引擎 - 领域层
// ==========================================
// 职责: 映射配置、提取记录、安全策略
// ==========================================

pub mod mapping;
pub mod policy;
pub mod record;

pub use mapping::{FieldRule, FieldType, ImportMapping, LookupSpec, TableConfig, TableName};
pub use policy::{ArchiveEntry, ArchiveManifest, SecurityPolicy};
pub use record::{ExtractedRecord, FieldValue};
