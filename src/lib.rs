// ==========================================
// 参考数据导入引擎 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 附件压缩包安全解压 → XML/JSON 解析 → 参考数据表 upsert
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 映射、记录、安全策略
pub mod domain;

// 数据仓储层 - 数据库会话与落库
pub mod repository;

// 导入层 - 解析与编排
pub mod importer;

// 安全层 - 压缩包/文件/结构校验
pub mod security;

// 配置层 - 导入配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::{
    ExtractedRecord, FieldRule, FieldType, FieldValue, ImportMapping, LookupSpec, SecurityPolicy,
    TableConfig, TableName,
};

// 导入
pub use importer::{ImportError, ImportResult, ProcessOutcome, ReferenceImporter};

// 配置
pub use config::{ImportConfigLoader, ImportConfigProvider};

// 仓储
pub use repository::{DbSession, SqliteSession};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "参考数据导入引擎";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
