// ==========================================
// 参考数据导入引擎 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 分级:
// - 致命: Validation / Configuration / Persistence（回滚当前文件后上抛）
// - 非致命: 类型转换、代码查找（降级为 NULL 并记录日志，不在此定义）
// ==========================================

use crate::repository::error::RepositoryError;
use std::fmt;
use thiserror::Error;

// ==========================================
// ValidationReason - 安全校验失败原因
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationReason {
    TooManyFiles { count: usize, max: usize },
    CompressionRatio { ratio: f64, max: f64 },
    EmptyArchive,
    EntryTooLarge { size: u64, max: u64 },
    PathTraversal,
    TargetExists,
    ExtensionNotAllowed,
    FileTooLarge { size: u64, max: u64 },
    ContentTypeMismatch { expected: String, detected: String },
    NestingTooDeep { depth: usize, max: usize },
    ArrayTooLong { length: usize, max: usize },
    DoctypeForbidden,
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationReason::TooManyFiles { count, max } => {
                write!(f, "压缩包文件数过多: {} (上限 {})", count, max)
            }
            ValidationReason::CompressionRatio { ratio, max } => {
                write!(f, "压缩比过高: {:.2} (上限 {})", ratio, max)
            }
            ValidationReason::EmptyArchive => write!(f, "压缩包大小为 0"),
            ValidationReason::EntryTooLarge { size, max } => {
                write!(f, "条目解压后大小 {} 字节超出上限 {} 字节", size, max)
            }
            ValidationReason::PathTraversal => write!(f, "疑似目录穿越路径"),
            ValidationReason::ExtensionNotAllowed => write!(f, "文件类型不在白名单内"),
            ValidationReason::FileTooLarge { size, max } => {
                write!(f, "文件大小 {} 字节超出上限 {} 字节", size, max)
            }
            ValidationReason::ContentTypeMismatch { expected, detected } => {
                write!(f, "内容类型不一致: 期望 {}，实际 {}", expected, detected)
            }
            ValidationReason::NestingTooDeep { depth, max } => {
                write!(f, "嵌套深度 {} 超出上限 {}", depth, max)
            }
            ValidationReason::ArrayTooLong { length, max } => {
                write!(f, "数组长度 {} 超出上限 {}", length, max)
            }
            ValidationReason::DoctypeForbidden => write!(f, "禁止 DOCTYPE 声明"),
            ValidationReason::TargetExists => write!(f, "解压目标已存在同名文件"),
        }
    }
}

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 安全校验错误 =====
    #[error("安全校验失败 ({entry}): {reason}")]
    Validation {
        entry: String,
        reason: ValidationReason,
    },

    // ===== 配置错误 =====
    #[error("配置错误: {0}")]
    Configuration(String),

    // ===== 文件相关错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件格式不支持: {0}（仅支持 .xml/.json）")]
    UnsupportedFormat(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("压缩包读取失败: {0}")]
    ArchiveError(String),

    #[error("XML 解析失败 ({file}): {message}")]
    XmlParseError { file: String, message: String },

    #[error("JSON 解析失败 ({file}): {message}")]
    JsonParseError { file: String, message: String },

    // ===== 数据库错误 =====
    #[error("数据持久化失败 (表 {table}): {source}")]
    Persistence {
        table: String,
        #[source]
        source: RepositoryError,
    },

    #[error("数据库事务失败: {0}")]
    Transaction(#[from] RepositoryError),

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    /// 构造安全校验错误
    pub fn validation(entry: impl Into<String>, reason: ValidationReason) -> Self {
        ImportError::Validation {
            entry: entry.into(),
            reason,
        }
    }

    /// 校验失败原因（非校验错误返回 None）
    pub fn validation_reason(&self) -> Option<&ValidationReason> {
        match self {
            ImportError::Validation { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

// 实现 From<zip::result::ZipError>
impl From<zip::result::ZipError> for ImportError {
    fn from(err: zip::result::ZipError) -> Self {
        ImportError::ArchiveError(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
