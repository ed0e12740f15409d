// ==========================================
// 参考数据导入引擎 - 安全校验层
// ==========================================
// 职责: 压缩包防护（zip bomb / 目录穿越 / 扩展名白名单）
//       单文件大小与内容类型校验、结构深度限制
// 红线: 校验失败一律以 ImportError::Validation 上抛，不做降级
// ==========================================

pub mod archive_validator;
pub mod file_validator;
pub mod structure_validator;

pub use archive_validator::ArchiveValidator;
pub use file_validator::FileValidator;
pub use structure_validator::{check_xml_depth, validate_json_structure};
