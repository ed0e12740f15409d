// ==========================================
// 参考数据导入引擎 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入核心所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含导入规则
// ==========================================

use crate::domain::{ImportMapping, SecurityPolicy};
use crate::importer::error::ImportResult;
use std::collections::BTreeMap;

// ==========================================
// ImportConfigProvider Trait
// ==========================================
// 用途: 按导入类型提供映射、处理顺序、安全策略
// 实现者: ImportConfigLoader（YAML 文件）
// 约定: 返回的表名/列名均已通过标识符校验
pub trait ImportConfigProvider {
    /// 已配置的导入类型
    fn import_types(&self) -> Vec<String>;

    /// 获取单个文件的映射
    ///
    /// # 错误
    /// - Configuration: 导入类型或文件映射不存在
    fn file_mapping(&self, import_type: &str, file_name: &str) -> ImportResult<ImportMapping>;

    /// 参考文件处理顺序（被引用的表在前）
    fn reference_order(&self, import_type: &str) -> ImportResult<Vec<String>>;

    /// 参考文件通配模式（变更跟踪范围）
    fn reference_patterns(&self, import_type: &str) -> ImportResult<Vec<String>>;

    /// 安全策略（未配置项取默认值）
    fn security_policy(&self, import_type: &str) -> ImportResult<SecurityPolicy>;

    /// 命名的外键查询模板
    fn lookup_query_templates(&self, import_type: &str) -> ImportResult<BTreeMap<String, String>>;

    /// 数据库路径（已展开环境变量；未配置返回 None）
    fn database_path(&self, import_type: &str) -> ImportResult<Option<String>>;
}
