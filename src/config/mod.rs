// ==========================================
// 参考数据导入引擎 - 配置层
// ==========================================
// 职责: 按导入类型提供映射、处理顺序、安全策略、外键查询模板
// 存储: YAML 文件（serde_yaml）
// ==========================================

pub mod config_loader;
pub mod import_config_trait;

// 重导出核心类型
pub use config_loader::{expand_env_vars, parse_size, ImportConfigLoader, CONFIG_PATH_ENV};
pub use import_config_trait::ImportConfigProvider;
